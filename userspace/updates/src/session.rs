// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Streaming update session (header -> manifest -> image)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: 5 unit tests + tests/updates_host
//!
//! The package is `[DER manifest][image]`. The first `HEADER_SIZE` bytes are
//! buffered to learn the manifest length; the manifest is then buffered in
//! full and handed to the engine; every later byte is streamed to the engine
//! as an image fragment. The phase is derived from `(manifest_size,
//! input_offset)` alone, so any chunking of the input behaves the same.
//!
//! Every failure reports a status, aborts the engine's active update and
//! poisons the session.

use alloc::vec::Vec;

use log::{debug, error, info, warn};

use crate::deferred::ActionKind;
use crate::engine::{UpdateEngine, UpdateHooks};
use crate::manifest::{self, HEADER_SIZE};
use crate::status::{StatusCode, UpdateFailure, VendorStatus};

/// Manifest buffer cap used when none is configured.
pub const DEFAULT_MAX_MANIFEST_SIZE: usize = 64 * 1024;

/// Upper bound on callbacks drained by one `finish`.
pub const MAX_DEFERRED_STEPS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CollectingHeader,
    CollectingManifest,
    StreamingImage,
}

pub struct UpdateSession<E: UpdateEngine> {
    input_offset: u64,
    /// 0 until the header has been decoded.
    manifest_size: u64,
    header: [u8; HEADER_SIZE],
    manifest: Option<Vec<u8>>,
    max_manifest_size: usize,
    hooks: UpdateHooks<E>,
    poisoned: bool,
}

impl<E: UpdateEngine> UpdateSession<E> {
    pub fn new() -> Self {
        Self::with_manifest_limit(DEFAULT_MAX_MANIFEST_SIZE)
    }

    pub fn with_manifest_limit(max_manifest_size: usize) -> Self {
        Self {
            input_offset: 0,
            manifest_size: 0,
            header: [0; HEADER_SIZE],
            manifest: None,
            max_manifest_size,
            hooks: UpdateHooks::new(),
            poisoned: false,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.manifest_size == 0 {
            Phase::CollectingHeader
        } else if self.input_offset < self.manifest_size {
            Phase::CollectingManifest
        } else {
            Phase::StreamingImage
        }
    }

    pub fn input_offset(&self) -> u64 {
        self.input_offset
    }

    pub fn manifest_size(&self) -> u64 {
        self.manifest_size
    }

    /// Manifest bytes received so far; `None` outside `CollectingManifest`.
    pub fn manifest_buffer(&self) -> Option<&[u8]> {
        self.manifest.as_deref()
    }

    pub fn hooks(&self) -> &UpdateHooks<E> {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut UpdateHooks<E> {
        &mut self.hooks
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Consumes `data`, dispatching each part to the current phase.
    pub fn write(&mut self, engine: &mut E, data: &[u8]) -> Result<(), UpdateFailure> {
        if self.poisoned {
            return Err(self.hooks.failure());
        }
        let mut rest = data;
        while !rest.is_empty() {
            let consumed = match self.phase() {
                Phase::CollectingHeader => self.write_header(engine, rest)?,
                Phase::CollectingManifest => self.write_manifest(engine, rest)?,
                Phase::StreamingImage => self.write_image(engine, rest)?,
            };
            rest = &rest[consumed..];
        }
        Ok(())
    }

    fn write_header(&mut self, engine: &mut E, data: &[u8]) -> Result<usize, UpdateFailure> {
        let filled = self.input_offset as usize;
        let take = data.len().min(HEADER_SIZE - filled);
        self.header[filled..filled + take].copy_from_slice(&data[..take]);
        self.input_offset += take as u64;
        if (self.input_offset as usize) < HEADER_SIZE {
            return Ok(take);
        }

        let total = match manifest::outer_record_len(&self.header) {
            Some(total) if total >= HEADER_SIZE => total,
            _ => {
                error!("update: manifest header is not a DER sequence");
                return Err(self.fail(engine, VendorStatus::OutOfMemory));
            }
        };
        if total > self.max_manifest_size {
            error!("update: manifest of {total} bytes exceeds {} byte limit", self.max_manifest_size);
            return Err(self.fail(engine, VendorStatus::OutOfMemory));
        }
        let mut buffer = Vec::new();
        if buffer.try_reserve_exact(total).is_err() {
            error!("update: cannot allocate {total} byte manifest buffer");
            return Err(self.fail(engine, VendorStatus::OutOfMemory));
        }
        buffer.extend_from_slice(&self.header);
        debug!("update: manifest size {total}");
        self.manifest = Some(buffer);
        self.manifest_size = total as u64;
        if self.input_offset == self.manifest_size {
            self.complete_manifest(engine)?;
        }
        Ok(take)
    }

    fn write_manifest(&mut self, engine: &mut E, data: &[u8]) -> Result<usize, UpdateFailure> {
        let take = data.len().min((self.manifest_size - self.input_offset) as usize);
        let Some(buffer) = self.manifest.as_mut() else {
            return Err(self.fail(engine, VendorStatus::InternalError));
        };
        buffer.extend_from_slice(&data[..take]);
        self.input_offset += take as u64;
        if self.input_offset == self.manifest_size {
            self.complete_manifest(engine)?;
        }
        Ok(take)
    }

    fn complete_manifest(&mut self, engine: &mut E) -> Result<(), UpdateFailure> {
        let manifest = self.manifest.take().unwrap_or_default();
        debug!("update: manifest complete, validating {} bytes", manifest.len());
        engine.on_manifest(&manifest, &mut self.hooks);
        drop(manifest);

        if !engine.is_update_active() {
            error!("update: manifest rejected");
            return Err(self.fail(engine, VendorStatus::ManifestMalformed));
        }
        if self.hooks.pending() != ActionKind::AuthorizeInstall {
            error!("update: manifest accepted without install authorization request");
            return Err(self.fail(engine, VendorStatus::InternalError));
        }
        self.hooks.perform(engine);
        if !engine.is_update_active() {
            error!("update: download authorization not granted");
            return Err(self.fail(engine, VendorStatus::InternalError));
        }
        info!("update: manifest accepted, streaming image");
        Ok(())
    }

    fn write_image(&mut self, engine: &mut E, data: &[u8]) -> Result<usize, UpdateFailure> {
        let offset = self.input_offset - self.manifest_size;
        if let Err(code) = engine.write_fragment(offset, data, &mut self.hooks) {
            error!("update: image fragment at {offset} failed ({code})");
            return Err(self.fail(engine, code));
        }
        self.input_offset += data.len() as u64;
        Ok(data.len())
    }

    /// Signals end of input and drains the engine's finalization callbacks.
    /// On success exactly one `AuthorizeInstall` is left pending for
    /// [`flash`](Self::flash).
    pub fn finish(&mut self, engine: &mut E) -> Result<(), UpdateFailure> {
        if self.poisoned {
            return Err(self.hooks.failure());
        }
        if self.phase() != Phase::StreamingImage {
            error!("update: input ended inside the manifest ({} bytes seen)", self.input_offset);
            return Err(self.fail(engine, VendorStatus::ManifestMalformed));
        }
        if let Err(code) = engine.on_image_ready(&mut self.hooks) {
            error!("update: image finalization failed ({code})");
            return Err(self.fail(engine, code));
        }
        if self.hooks.pending() == ActionKind::None {
            error!("update: nothing scheduled after image ready");
            return Err(self.fail(engine, VendorStatus::InternalError));
        }

        let mut steps = 0;
        while self.hooks.pending() == ActionKind::Callback {
            if steps == MAX_DEFERRED_STEPS {
                error!("update: finalization exceeded {MAX_DEFERRED_STEPS} deferred steps");
                return Err(self.fail(engine, VendorStatus::InternalError));
            }
            self.hooks.perform(engine);
            steps += 1;
        }
        debug!("update: drained {steps} finalization step(s)");

        match self.hooks.pending() {
            ActionKind::AuthorizeInstall => {
                info!("update: image ready, install authorization pending");
                Ok(())
            }
            _ => {
                error!("update: finalization ended without install authorization request");
                Err(self.fail(engine, VendorStatus::InternalError))
            }
        }
    }

    /// Runs the pending install authorization. Reaching the end of this call
    /// means the install did not take over, so it always yields a failure.
    pub fn flash(&mut self, engine: &mut E) -> UpdateFailure {
        if self.hooks.pending() == ActionKind::AuthorizeInstall {
            info!("update: authorizing install");
            self.hooks.perform(engine);
        } else {
            warn!("update: flash without pending install authorization");
        }
        self.hooks.report(VendorStatus::FwInstallationFailed);
        let failure = self.hooks.failure();
        error!("update: install returned ({}): {failure}", self.hooks.last_result());
        failure
    }

    /// Cancels pending work and aborts the engine's active update.
    pub fn abort(&mut self, engine: &mut E) {
        self.poisoned = true;
        self.manifest = None;
        self.hooks.cancel_pending();
        if engine.is_update_active() {
            warn!("update: aborting active update");
            engine.abort();
        }
    }

    fn fail(&mut self, engine: &mut E, code: impl Into<StatusCode>) -> UpdateFailure {
        self.hooks.report(code);
        self.abort(engine);
        self.hooks.failure()
    }
}

impl<E: UpdateEngine> Default for UpdateSession<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: UpdateEngine> core::fmt::Debug for UpdateSession<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UpdateSession")
            .field("phase", &self.phase())
            .field("input_offset", &self.input_offset)
            .field("manifest_size", &self.manifest_size)
            .field("hooks", &self.hooks)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}
