// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Result code classification and sticky last result
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 5 tests + 2 property tests
//!
//! TEST_SCENARIOS:
//!   - test_not_enough_space_codes()
//!   - test_out_of_memory_codes()
//!   - test_integrity_codes()
//!   - test_unsupported_package_codes()
//!   - test_everything_else_is_generic()
//!   - prop_unknown_codes_are_generic()
//!   - prop_first_failure_wins()

use proptest::prelude::*;

use updates::status::{classify, lwm2m};
use updates::{LastResult, StatusCode, UpdateFailure, VendorStatus};

fn assert_all(codes: &[StatusCode], expected: UpdateFailure) {
    for code in codes {
        assert_eq!(classify(*code), expected, "code {code}");
    }
}

#[test]
fn test_not_enough_space_codes() {
    assert_all(
        &[lwm2m::NOT_ENOUGH_STORAGE, VendorStatus::InsufficientStorage.into()],
        UpdateFailure::NotEnoughSpace,
    );
}

#[test]
fn test_out_of_memory_codes() {
    assert_all(&[lwm2m::OUT_OF_MEMORY, VendorStatus::OutOfMemory.into()], UpdateFailure::OutOfMemory);
}

#[test]
fn test_integrity_codes() {
    assert_all(
        &[
            lwm2m::MANIFEST_INTEGRITY,
            lwm2m::MANIFEST_CERT_NOT_FOUND,
            lwm2m::MANIFEST_SIGNATURE,
            lwm2m::DEPENDENT_MANIFEST_NOT_FOUND,
            lwm2m::ASSET_INTEGRITY,
            VendorStatus::ManifestSignatureInvalid.into(),
            VendorStatus::ManifestPayloadCorrupted.into(),
            VendorStatus::ManifestVersionRejected.into(),
            VendorStatus::ManifestWrongVendorId.into(),
            VendorStatus::ManifestWrongClassId.into(),
            VendorStatus::ManifestPrecursorMismatch.into(),
        ],
        UpdateFailure::IntegrityFailure,
    );
}

#[test]
fn test_unsupported_package_codes() {
    assert_all(
        &[
            lwm2m::MANIFEST_REJECTED,
            lwm2m::UNSUPPORTED_ASSET,
            lwm2m::UNSUPPORTED_DELTA,
            lwm2m::UNSUPPORTED_ENCRYPTION,
            VendorStatus::ManifestMalformed.into(),
            VendorStatus::ManifestPayloadUnsupported.into(),
            VendorStatus::ManifestSchemaUnsupported.into(),
            VendorStatus::ManifestCustomDataTooBig.into(),
            VendorStatus::UnexpectedComponent.into(),
            VendorStatus::CombPackageMalformed.into(),
            VendorStatus::CombPackageWrongImageNum.into(),
            VendorStatus::CombPackageImageIdNameTooLong.into(),
            VendorStatus::CombPackageVendorDataTooLong.into(),
        ],
        UpdateFailure::UnsupportedPackageType,
    );
}

#[test]
fn test_everything_else_is_generic() {
    assert_all(
        &[
            StatusCode::SUCCESS,
            lwm2m::SUCCESS,
            lwm2m::MANIFEST_TIMEOUT,
            lwm2m::CONNECTION_LOST,
            lwm2m::INVALID_ASSET_URI,
            lwm2m::DOWNLOAD_TIMEOUT,
            lwm2m::ASSET_UPDATED,
            VendorStatus::StorageWriteFailed.into(),
            VendorStatus::InstallAuthNotGranted.into(),
            VendorStatus::FwInstallationFailed.into(),
            VendorStatus::InternalError.into(),
            StatusCode(-5),
        ],
        UpdateFailure::GenericFailure,
    );
}

proptest! {
    #[test]
    fn prop_unknown_codes_are_generic(code in prop_oneof![i32::MIN..0, 51i32..=i32::MAX]) {
        prop_assert_eq!(classify(StatusCode(code)), UpdateFailure::GenericFailure);
    }

    #[test]
    fn prop_first_failure_wins(codes in prop::collection::vec(0i32..60, 0..12)) {
        let mut last = LastResult::new();
        for code in &codes {
            last.report(StatusCode(*code));
        }
        let expected = codes
            .iter()
            .map(|code| StatusCode(*code))
            .find(|code| !code.is_success_like())
            .or_else(|| codes.last().map(|code| StatusCode(*code)))
            .unwrap_or(StatusCode::SUCCESS);
        prop_assert_eq!(last.get(), expected);
    }
}
