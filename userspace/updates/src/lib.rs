// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Streaming firmware update library (package session + candidate slot)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: unit tests per module + integration tests (via tests/updates_host)
//!   - header/manifest/image phases under arbitrary chunking
//!   - deferred action chaining and busy slot
//!   - status classification and sticky last result
//!   - candidate writer and boot-time probe on simulated NOR
//!
//! PUBLIC API:
//!   - FirmwareUpdate: open/write/finish/reset/perform_upgrade over an engine
//!   - UpdateSession: the header -> manifest -> image state machine
//!   - ManifestValidator / ImageSink: engine seams, driven through UpdateHooks
//!   - CandidateWriter / initial_result: candidate slot on a BlockStorage
//!   - TrustAnchors / UpdateConfig (std): provisioning
//!
//! DEPENDENCIES:
//!   - der: outer manifest length decoding
//!   - storage-nor-flash: candidate slot storage
//!   - sha2: candidate image digest
//!   - base64 / hex: trust anchor decoding
//!   - serde / toml (std): configuration
//!   - log: diagnostics

#![forbid(unsafe_code)]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

#[cfg(all(not(feature = "std"), not(feature = "os-lite")))]
compile_error!("Either 'std' or 'os-lite' feature must be enabled");

pub mod candidate;
#[cfg(feature = "std")]
pub mod config;
pub mod context;
pub mod deferred;
pub mod engine;
pub mod manifest;
pub mod session;
pub mod status;
pub mod trust;

pub use candidate::{
    initial_result, probe_initial_result, CandidateError, CandidateLayout, CandidateRegion,
    CandidateWriter, ComponentName, ImageHeader, InitialResult,
};
#[cfg(feature = "std")]
pub use config::{ConfigError, UpdateConfig};
pub use context::FirmwareUpdate;
pub use deferred::{ActionKind, DeferredAction, DeferredSlot, SlotBusy};
pub use engine::{Callback, ImageSink, ManifestValidator, UpdateEngine, UpdateHooks};
pub use manifest::{outer_record_len, HEADER_SIZE};
pub use session::{Phase, UpdateSession};
pub use status::{LastResult, StatusCode, UpdateFailure, VendorStatus};
pub use trust::{TrustAnchorProvider, TrustAnchors, TrustError};
