// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Candidate writer and boot probe over the NOR driver and simulated chip
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 6 tests
//!
//! TEST_SCENARIOS:
//!   - test_image_spanning_erase_pages(): lazy erase, page-split programming
//!   - test_program_bus_error_maps_to_storage_status(): controller failure
//!   - test_discard_invalidates_candidate(): ready header erased
//!   - test_probe_blank_flash_is_neutral()
//!   - test_probe_unreadable_flash_is_neutral()
//!   - test_probe_old_firmware_is_failed()

use sha2::{Digest, Sha256};
use storage_nor_flash::sim::SimulatedNor;
use storage_nor_flash::{opcode, NorError, NorFlash};
use updates::{
    initial_result, probe_initial_result, CandidateError, CandidateWriter, ComponentName,
    ImageHeader, InitialResult, StatusCode, VendorStatus,
};
use updates_host::{test_image, GEOMETRY, LAYOUT, REGION};

fn writer() -> CandidateWriter<NorFlash<SimulatedNor>> {
    let flash = NorFlash::new(SimulatedNor::new(GEOMETRY), GEOMETRY).unwrap();
    CandidateWriter::new(flash, REGION, LAYOUT).unwrap()
}

fn stage(image: &[u8], chunk: usize) -> (CandidateWriter<NorFlash<SimulatedNor>>, ImageHeader) {
    let mut writer = writer();
    writer.begin(image.len() as u64).unwrap();
    let mut offset = 0;
    for part in image.chunks(chunk) {
        writer.write_fragment(offset, part).unwrap();
        offset += part.len() as u64;
    }
    let header = writer.finish(4, ComponentName::MAIN).unwrap();
    (writer, header)
}

#[test]
fn test_image_spanning_erase_pages() {
    let image = test_image(9000, 3);
    let (writer, header) = stage(&image, 333);
    assert_eq!(header.fw_size, 9000);
    assert_eq!(header.digest.as_slice(), Sha256::digest(&image).as_slice());

    let nor = writer.storage().bus();
    assert_eq!(nor.erased_pages(), vec![0x1_0000, 0x1_1000, 0x1_2000]);
    let base = (REGION.start + LAYOUT.image_offset()) as usize;
    assert_eq!(&nor.memory()[base..base + image.len()], image.as_slice());
    assert!(nor.memory()[base + image.len()..base + image.len() + 3].iter().all(|&b| b == 0xFF));
    assert!(nor
        .ops()
        .iter()
        .filter(|op| op.opcode == opcode::PAGE_PROGRAM)
        .all(|op| op.len <= GEOMETRY.write_page as usize));
}

#[test]
fn test_program_bus_error_maps_to_storage_status() {
    let mut writer = writer();
    writer.storage_mut().bus_mut().faults_mut().fail_opcode = Some(opcode::PAGE_PROGRAM);
    writer.begin(64).unwrap();
    let err = writer.write_fragment(0, &[0xA5; 64]).unwrap_err();
    assert!(matches!(err, CandidateError::Storage(NorError::Bus(_))));
    assert_eq!(StatusCode::from(err), StatusCode::from(VendorStatus::StorageWriteFailed));
}

#[test]
fn test_discard_invalidates_candidate() {
    let image = test_image(600, 8);
    let (mut writer, header) = stage(&image, 600);
    writer.discard().unwrap();
    let mut flash = writer.into_inner();
    assert_eq!(
        probe_initial_result(&mut flash, REGION, LAYOUT, ComponentName::MAIN, &header),
        InitialResult::Neutral
    );
}

#[test]
fn test_probe_blank_flash_is_neutral() {
    let mut flash = NorFlash::new(SimulatedNor::new(GEOMETRY), GEOMETRY).unwrap();
    let current = ImageHeader { fw_size: 1, version: 1, digest: [0; 32] };
    let result = initial_result(&mut flash, REGION, LAYOUT, ComponentName::MAIN, &current);
    assert_eq!(result, InitialResult::Neutral);
    assert_eq!(result.update_result(), 0);
}

#[test]
fn test_probe_unreadable_flash_is_neutral() {
    let image = test_image(100, 1);
    let (writer, header) = stage(&image, 100);
    let mut flash = writer.into_inner();
    flash.bus_mut().faults_mut().fail_opcode = Some(opcode::READ);
    assert_eq!(
        probe_initial_result(&mut flash, REGION, LAYOUT, ComponentName::MAIN, &header),
        InitialResult::Neutral
    );
}

#[test]
fn test_probe_old_firmware_is_failed() {
    let image = test_image(256, 2);
    let (writer, header) = stage(&image, 64);
    let mut flash = writer.into_inner();
    let running = ImageHeader { digest: [0x11; 32], ..header };
    let result = initial_result(&mut flash, REGION, LAYOUT, ComponentName::MAIN, &running);
    assert_eq!(result, InitialResult::Failed);
    let mut ready = [0u8; 4];
    flash.read(REGION.start, &mut ready).unwrap();
    assert_eq!(ready, [0xFF; 4]);
}
