// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Deferred action slot semantics as seen by engine code
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 5 tests
//!
//! TEST_SCOPE:
//!   - One pending action at a time; a busy set leaves the pending one intact
//!   - perform() empties the slot before running the action
//!   - Callback chains are drained iteratively by finish()
//!
//! TEST_SCENARIOS:
//!   - test_busy_slot_keeps_pending_callback(): identity of the first action preserved
//!   - test_cancel_then_set(): cancel frees the slot
//!   - test_callback_reschedules_itself(): successor scheduled from inside perform
//!   - test_long_callback_chain_is_drained(): hundreds of steps without recursion
//!   - test_runaway_callback_chain_is_cut(): bounded drain

use std::cell::Cell;
use std::rc::Rc;

use updates::session::MAX_DEFERRED_STEPS;
use updates::{ActionKind, SlotBusy, UpdateFailure, UpdateHooks, UpdateSession};
use updates_host::ScriptedEngine;

fn package() -> Vec<u8> {
    let mut package = vec![0x30, 0x06, 1, 2, 3, 4, 5, 6];
    package.extend_from_slice(b"payload");
    package
}

#[test]
fn test_busy_slot_keeps_pending_callback() {
    let mut engine = ScriptedEngine::default();
    let mut hooks: UpdateHooks<ScriptedEngine> = UpdateHooks::new();
    let first = Rc::new(Cell::new(0));
    let second = Rc::new(Cell::new(0));

    let marker = first.clone();
    hooks
        .defer(move |_: &mut ScriptedEngine, _: &mut UpdateHooks<ScriptedEngine>| {
            marker.set(marker.get() + 1);
        })
        .unwrap();
    let marker = second.clone();
    let err = hooks
        .defer(move |_: &mut ScriptedEngine, _: &mut UpdateHooks<ScriptedEngine>| {
            marker.set(marker.get() + 1);
        })
        .unwrap_err();
    assert_eq!(err, SlotBusy { pending: ActionKind::Callback });
    assert_eq!(
        hooks.request_install_authorization(),
        Err(SlotBusy { pending: ActionKind::Callback })
    );

    hooks.perform(&mut engine);
    assert_eq!(first.get(), 1);
    assert_eq!(second.get(), 0);
    assert_eq!(engine.authorizations, 0);
    assert_eq!(hooks.pending(), ActionKind::None);
}

#[test]
fn test_cancel_then_set() {
    let mut engine = ScriptedEngine::default();
    let mut hooks: UpdateHooks<ScriptedEngine> = UpdateHooks::new();
    hooks.request_install_authorization().unwrap();
    hooks.cancel_pending();
    hooks.perform(&mut engine);
    assert_eq!(engine.authorizations, 0);

    hooks.request_install_authorization().unwrap();
    hooks.perform(&mut engine);
    assert_eq!(engine.authorizations, 1);
}

#[test]
fn test_callback_reschedules_itself() {
    let mut engine = ScriptedEngine::default();
    let mut hooks: UpdateHooks<ScriptedEngine> = UpdateHooks::new();
    hooks
        .defer(|engine: &mut ScriptedEngine, hooks: &mut UpdateHooks<ScriptedEngine>| {
            engine.callbacks_run += 1;
            hooks.request_install_authorization().unwrap();
        })
        .unwrap();
    hooks.perform(&mut engine);
    assert_eq!(engine.callbacks_run, 1);
    assert_eq!(hooks.pending(), ActionKind::AuthorizeInstall);
    hooks.perform(&mut engine);
    assert_eq!(engine.authorizations, 1);
}

#[test]
fn test_long_callback_chain_is_drained() {
    let mut engine = ScriptedEngine { ready_callbacks: 500, ..Default::default() };
    let mut session = UpdateSession::new();
    session.write(&mut engine, &package()).unwrap();
    session.finish(&mut engine).unwrap();
    assert_eq!(engine.callbacks_run, 500);
    assert_eq!(session.hooks().pending(), ActionKind::AuthorizeInstall);
}

#[test]
fn test_runaway_callback_chain_is_cut() {
    let mut engine =
        ScriptedEngine { ready_callbacks: MAX_DEFERRED_STEPS as u32 + 10, ..Default::default() };
    let mut session = UpdateSession::new();
    session.write(&mut engine, &package()).unwrap();
    assert_eq!(session.finish(&mut engine), Err(UpdateFailure::GenericFailure));
    assert_eq!(engine.callbacks_run, MAX_DEFERRED_STEPS as u32);
    assert_eq!(engine.aborts, 1);
}
