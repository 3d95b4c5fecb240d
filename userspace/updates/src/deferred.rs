// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Single-slot deferred action holder
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: 4 unit tests
//!
//! At most one action is pending at a time. Taking the action out of the
//! slot before running it lets the action schedule its successor.

/// Work scheduled by the engine to run at the next continuation point.
pub enum DeferredAction<C> {
    None,
    /// Install authorization handled by the manifest validator.
    AuthorizeInstall,
    InvokeCallback(C),
}

/// Payload-free view of a pending action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    None,
    AuthorizeInstall,
    Callback,
}

impl<C> DeferredAction<C> {
    pub fn kind(&self) -> ActionKind {
        match self {
            DeferredAction::None => ActionKind::None,
            DeferredAction::AuthorizeInstall => ActionKind::AuthorizeInstall,
            DeferredAction::InvokeCallback(_) => ActionKind::Callback,
        }
    }
}

impl<C> core::fmt::Debug for DeferredAction<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self.kind())
    }
}

/// Returned by [`DeferredSlot::set`] while another action is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deferred action already pending ({pending:?})")]
pub struct SlotBusy {
    pub pending: ActionKind,
}

pub struct DeferredSlot<C> {
    pending: DeferredAction<C>,
}

impl<C> DeferredSlot<C> {
    pub const fn new() -> Self {
        Self { pending: DeferredAction::None }
    }

    /// Stores `action` if the slot is empty; the pending action is left untouched otherwise.
    pub fn set(&mut self, action: DeferredAction<C>) -> Result<(), SlotBusy> {
        if let DeferredAction::None = self.pending {
            self.pending = action;
            Ok(())
        } else {
            Err(SlotBusy { pending: self.pending.kind() })
        }
    }

    /// Empties the slot and hands the action to the caller.
    pub fn take(&mut self) -> DeferredAction<C> {
        core::mem::replace(&mut self.pending, DeferredAction::None)
    }

    pub fn cancel(&mut self) {
        self.pending = DeferredAction::None;
    }

    pub fn kind(&self) -> ActionKind {
        self.pending.kind()
    }

    pub fn is_empty(&self) -> bool {
        self.kind() == ActionKind::None
    }
}

impl<C> Default for DeferredSlot<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> core::fmt::Debug for DeferredSlot<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeferredSlot").field("pending", &self.pending).finish()
    }
}
