// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Firmware update context (open/write/finish/reset/perform_upgrade)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: tests/updates_host

use log::{debug, info, warn};

use crate::engine::UpdateEngine;
use crate::session::{UpdateSession, DEFAULT_MAX_MANIFEST_SIZE};
use crate::status::UpdateFailure;

/// Owns the engine and at most one streaming session.
///
/// The session is created lazily by the first non-empty write and dropped
/// on open, on reset and after an install attempt. A failed session stays in
/// place, so later writes and finishes keep returning its first failure.
pub struct FirmwareUpdate<E: UpdateEngine> {
    engine: E,
    session: Option<UpdateSession<E>>,
    max_manifest_size: usize,
}

impl<E: UpdateEngine> FirmwareUpdate<E> {
    pub fn new(engine: E) -> Self {
        Self { engine, session: None, max_manifest_size: DEFAULT_MAX_MANIFEST_SIZE }
    }

    pub fn with_manifest_limit(mut self, max_manifest_size: usize) -> Self {
        self.max_manifest_size = max_manifest_size;
        self
    }

    pub fn max_manifest_size(&self) -> usize {
        self.max_manifest_size
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn session(&self) -> Option<&UpdateSession<E>> {
        self.session.as_ref()
    }

    /// Starts a new package download, discarding any previous one.
    pub fn open(&mut self) {
        self.reset();
        if self.engine.is_update_active() {
            warn!("update: engine still active on open, aborting");
            self.engine.abort();
        }
        debug!("update: stream opened");
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), UpdateFailure> {
        if data.is_empty() {
            return Ok(());
        }
        let limit = self.max_manifest_size;
        let session = self.session.get_or_insert_with(|| UpdateSession::with_manifest_limit(limit));
        session.write(&mut self.engine, data)
    }

    pub fn finish(&mut self) -> Result<(), UpdateFailure> {
        let Some(session) = self.session.as_mut() else {
            warn!("update: finish without any package data");
            return Err(UpdateFailure::GenericFailure);
        };
        session.finish(&mut self.engine)
    }

    /// Aborts and drops the session, if any.
    pub fn reset(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.abort(&mut self.engine);
            debug!("update: session reset");
        }
    }

    /// Installs the downloaded candidate. A successful install does not
    /// return; the returned value describes why this one did.
    pub fn perform_upgrade(&mut self) -> UpdateFailure {
        let Some(session) = self.session.as_mut() else {
            warn!("update: upgrade requested without a downloaded package");
            return UpdateFailure::GenericFailure;
        };
        let failure = if session.is_poisoned() {
            warn!("update: upgrade requested after a failed download");
            session.hooks().failure()
        } else {
            info!("update: performing upgrade");
            session.flash(&mut self.engine)
        };
        self.reset();
        failure
    }
}

impl<E: UpdateEngine> Drop for FirmwareUpdate<E> {
    fn drop(&mut self) {
        self.reset();
    }
}
