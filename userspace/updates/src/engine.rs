// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Seams between the streaming session and the update engine
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: 3 unit tests + tests/updates_host
//!
//! The engine validates manifests (`ManifestValidator`) and stores image
//! fragments (`ImageSink`). Every engine call receives the session's
//! [`UpdateHooks`], the only channel back into the session: it carries the
//! deferred action slot and the sticky last result.

use alloc::boxed::Box;

use crate::deferred::{ActionKind, DeferredAction, DeferredSlot, SlotBusy};
use crate::status::{LastResult, StatusCode, UpdateFailure};

/// Deferred engine continuation.
pub type Callback<E> = Box<dyn FnOnce(&mut E, &mut UpdateHooks<E>)>;

/// Validates manifests and grants install authorization.
pub trait ManifestValidator {
    /// Called once with the complete manifest. Accepting it must leave the
    /// update active with exactly one `AuthorizeInstall` pending.
    fn on_manifest(&mut self, manifest: &[u8], hooks: &mut UpdateHooks<Self>);

    fn is_update_active(&self) -> bool;

    /// Runs a pending `AuthorizeInstall`. The first grant starts the
    /// download; the grant after image ready installs the candidate.
    fn authorize_install(&mut self, hooks: &mut UpdateHooks<Self>);
}

/// Receives image bytes and completion notifications.
pub trait ImageSink {
    /// `offset` counts image bytes only, starting at 0.
    fn write_fragment(
        &mut self,
        offset: u64,
        data: &[u8],
        hooks: &mut UpdateHooks<Self>,
    ) -> Result<(), StatusCode>;

    /// Called once after the last fragment. Finalization work is expected
    /// to be scheduled as deferred callbacks.
    fn on_image_ready(&mut self, hooks: &mut UpdateHooks<Self>) -> Result<(), StatusCode>;

    /// Drops the in-progress update and discards the candidate.
    fn abort(&mut self);
}

pub trait UpdateEngine: ManifestValidator + ImageSink {}

impl<T: ManifestValidator + ImageSink + ?Sized> UpdateEngine for T {}

/// Session state exposed to engine code.
pub struct UpdateHooks<E: ?Sized> {
    actions: DeferredSlot<Callback<E>>,
    last_result: LastResult,
}

impl<E: ?Sized> UpdateHooks<E> {
    pub fn new() -> Self {
        Self { actions: DeferredSlot::new(), last_result: LastResult::new() }
    }

    pub fn request_install_authorization(&mut self) -> Result<(), SlotBusy> {
        self.actions.set(DeferredAction::AuthorizeInstall)
    }

    /// Schedules `callback` to run at the next continuation point.
    pub fn defer<F>(&mut self, callback: F) -> Result<(), SlotBusy>
    where
        F: FnOnce(&mut E, &mut UpdateHooks<E>) + 'static,
    {
        self.actions.set(DeferredAction::InvokeCallback(Box::new(callback)))
    }

    pub fn cancel_pending(&mut self) {
        self.actions.cancel();
    }

    pub fn pending(&self) -> ActionKind {
        self.actions.kind()
    }

    pub fn report(&mut self, code: impl Into<StatusCode>) {
        self.last_result.report(code);
    }

    pub fn last_result(&self) -> StatusCode {
        self.last_result.get()
    }

    pub fn failure(&self) -> UpdateFailure {
        self.last_result.failure()
    }
}

impl<E: ManifestValidator + ?Sized> UpdateHooks<E> {
    /// Runs the pending action, if any. The slot is empty while the action
    /// runs, so the action may schedule its successor.
    pub fn perform(&mut self, engine: &mut E) {
        match self.actions.take() {
            DeferredAction::None => {}
            DeferredAction::AuthorizeInstall => engine.authorize_install(self),
            DeferredAction::InvokeCallback(callback) => callback(engine, self),
        }
    }
}

impl<E: ?Sized> Default for UpdateHooks<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ?Sized> core::fmt::Debug for UpdateHooks<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UpdateHooks")
            .field("pending", &self.pending())
            .field("last_result", &self.last_result)
            .finish()
    }
}
