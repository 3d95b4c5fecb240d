// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Candidate firmware slot on NOR flash (streamed writer + boot-time probe)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: 9 unit tests + tests/updates_host
//!
//! Region layout (all little-endian):
//!
//! ```text
//! [ready header, 20 B, optional][image header, 56 B][image ...]
//! ```
//!
//! Headers are programmed after the last image byte, the ready header last.
//! A candidate without a valid ready header is never reported as installed.

use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use storage_nor_flash::{BlockStorage, NorError, BLOCK_MULTIPLE};

use crate::status::{StatusCode, VendorStatus};

pub const COMPONENT_NAME_SIZE: usize = 12;
pub const DIGEST_SIZE: usize = 32;

pub const READY_HEADER_MAGIC: u32 = 0x4E58_5244;
pub const READY_HEADER_FOOTER: u32 = 0x4452_584E;
pub const READY_HEADER_SIZE: usize = 4 + COMPONENT_NAME_SIZE + 4;

pub const IMAGE_HEADER_MAGIC: u32 = 0x4E58_494D;
pub const IMAGE_HEADER_FOOTER: u32 = 0x4D49_584E;
pub const IMAGE_HEADER_SIZE: usize = 4 + 8 + 8 + DIGEST_SIZE + 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CandidateError {
    #[error("storage: {0}")]
    Storage(#[from] NorError),
    #[error("candidate region {start:#x}+{size:#x} does not fit the flash geometry")]
    Region { start: u32, size: u32 },
    #[error("fragment at offset {offset}, expected {expected}")]
    OutOfOrder { expected: u64, offset: u64 },
    #[error("image needs {needed} bytes, slot holds {available}")]
    Capacity { needed: u64, available: u64 },
    #[error("invalid component name")]
    ComponentName,
}

impl CandidateError {
    pub fn status(&self) -> VendorStatus {
        match self {
            CandidateError::Storage(_) => VendorStatus::StorageWriteFailed,
            CandidateError::Region { .. } | CandidateError::ComponentName => {
                VendorStatus::InvalidArgument
            }
            CandidateError::OutOfOrder { .. } => VendorStatus::DownloadFragmentFailed,
            CandidateError::Capacity { .. } => VendorStatus::InsufficientStorage,
        }
    }
}

impl From<CandidateError> for StatusCode {
    fn from(err: CandidateError) -> Self {
        err.status().into()
    }
}

/// NUL-padded ASCII component name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentName([u8; COMPONENT_NAME_SIZE]);

impl ComponentName {
    pub const MAIN: Self = Self(*b"MAIN\0\0\0\0\0\0\0\0");

    pub fn new(name: &str) -> Result<Self, CandidateError> {
        let bytes = name.as_bytes();
        if bytes.is_empty()
            || bytes.len() > COMPONENT_NAME_SIZE
            || !bytes.iter().all(|b| b.is_ascii_graphic())
        {
            return Err(CandidateError::ComponentName);
        }
        let mut raw = [0u8; COMPONENT_NAME_SIZE];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(COMPONENT_NAME_SIZE);
        core::str::from_utf8(&self.0[..len]).unwrap_or("")
    }
}

impl Default for ComponentName {
    fn default() -> Self {
        Self::MAIN
    }
}

/// Marks the candidate as complete and names its component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CandidateReadyHeader {
    pub component: ComponentName,
}

impl CandidateReadyHeader {
    pub fn to_bytes(&self) -> [u8; READY_HEADER_SIZE] {
        let mut raw = [0u8; READY_HEADER_SIZE];
        raw[0..4].copy_from_slice(&READY_HEADER_MAGIC.to_le_bytes());
        raw[4..4 + COMPONENT_NAME_SIZE].copy_from_slice(&self.component.0);
        raw[READY_HEADER_SIZE - 4..].copy_from_slice(&READY_HEADER_FOOTER.to_le_bytes());
        raw
    }

    /// `None` unless both magic and footer are intact.
    pub fn from_bytes(raw: &[u8; READY_HEADER_SIZE]) -> Option<Self> {
        if le_u32(raw, 0) != READY_HEADER_MAGIC
            || le_u32(raw, READY_HEADER_SIZE - 4) != READY_HEADER_FOOTER
        {
            return None;
        }
        let mut name = [0u8; COMPONENT_NAME_SIZE];
        name.copy_from_slice(&raw[4..4 + COMPONENT_NAME_SIZE]);
        Some(Self { component: ComponentName(name) })
    }
}

/// Describes a firmware image; also used for the running firmware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageHeader {
    pub fw_size: u64,
    pub version: u64,
    pub digest: [u8; DIGEST_SIZE],
}

impl ImageHeader {
    pub fn to_bytes(&self) -> [u8; IMAGE_HEADER_SIZE] {
        let mut raw = [0u8; IMAGE_HEADER_SIZE];
        raw[0..4].copy_from_slice(&IMAGE_HEADER_MAGIC.to_le_bytes());
        raw[4..12].copy_from_slice(&self.fw_size.to_le_bytes());
        raw[12..20].copy_from_slice(&self.version.to_le_bytes());
        raw[20..20 + DIGEST_SIZE].copy_from_slice(&self.digest);
        raw[IMAGE_HEADER_SIZE - 4..].copy_from_slice(&IMAGE_HEADER_FOOTER.to_le_bytes());
        raw
    }

    pub fn from_bytes(raw: &[u8; IMAGE_HEADER_SIZE]) -> Option<Self> {
        if le_u32(raw, 0) != IMAGE_HEADER_MAGIC
            || le_u32(raw, IMAGE_HEADER_SIZE - 4) != IMAGE_HEADER_FOOTER
        {
            return None;
        }
        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&raw[20..20 + DIGEST_SIZE]);
        Some(Self { fw_size: le_u64(raw, 4), version: le_u64(raw, 12), digest })
    }
}

fn le_u32(raw: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&raw[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn le_u64(raw: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&raw[at..at + 8]);
    u64::from_le_bytes(bytes)
}

/// Flash range reserved for the candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CandidateRegion {
    pub start: u32,
    pub size: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CandidateLayout {
    /// Whether the region starts with a [`CandidateReadyHeader`].
    pub ready_header: bool,
}

impl CandidateLayout {
    pub const fn image_header_offset(self) -> u32 {
        if self.ready_header {
            READY_HEADER_SIZE as u32
        } else {
            0
        }
    }

    pub const fn image_offset(self) -> u32 {
        self.image_header_offset() + IMAGE_HEADER_SIZE as u32
    }
}

/// Streams an image into the candidate region.
///
/// Erase pages are erased just ahead of the write frontier. Bytes that do
/// not fill a `BLOCK_MULTIPLE` block are carried to the next fragment; the
/// final partial block is padded on [`finish`](Self::finish).
pub struct CandidateWriter<S: BlockStorage> {
    storage: S,
    region: CandidateRegion,
    layout: CandidateLayout,
    received: u64,
    programmed: u64,
    erased_to: u32,
    carry: [u8; BLOCK_MULTIPLE],
    carry_len: usize,
    hasher: Sha256,
}

impl<S: BlockStorage> CandidateWriter<S> {
    pub fn new(
        storage: S,
        region: CandidateRegion,
        layout: CandidateLayout,
    ) -> Result<Self, CandidateError> {
        let geometry = storage.geometry();
        let bad_region = CandidateError::Region { start: region.start, size: region.size };
        let end = region.start.checked_add(region.size).ok_or(bad_region)?;
        if region.start % geometry.erase_page != 0
            || region.size % geometry.erase_page != 0
            || region.size <= layout.image_offset()
            || end > geometry.size
        {
            return Err(bad_region);
        }
        Ok(Self {
            storage,
            region,
            layout,
            received: 0,
            programmed: 0,
            erased_to: region.start,
            carry: [0; BLOCK_MULTIPLE],
            carry_len: 0,
            hasher: Sha256::new(),
        })
    }

    pub fn region(&self) -> CandidateRegion {
        self.region
    }

    pub fn layout(&self) -> CandidateLayout {
        self.layout
    }

    /// Image bytes the region can hold.
    pub fn capacity(&self) -> u64 {
        u64::from(self.region.size - self.layout.image_offset())
    }

    /// Image bytes accepted since [`begin`](Self::begin).
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_inner(self) -> S {
        self.storage
    }

    /// Starts a new image of `expected_size` bytes.
    pub fn begin(&mut self, expected_size: u64) -> Result<(), CandidateError> {
        if expected_size > self.capacity() {
            warn!(
                "candidate: image of {expected_size} bytes exceeds {} byte slot",
                self.capacity()
            );
            return Err(CandidateError::Capacity {
                needed: expected_size,
                available: self.capacity(),
            });
        }
        self.received = 0;
        self.programmed = 0;
        self.erased_to = self.region.start;
        self.carry_len = 0;
        self.hasher = Sha256::new();
        debug!("candidate: begin {expected_size} bytes at {:#x}", self.region.start);
        Ok(())
    }

    /// Appends `data`. Fragments must arrive in order without gaps.
    pub fn write_fragment(&mut self, offset: u64, data: &[u8]) -> Result<(), CandidateError> {
        if offset != self.received {
            return Err(CandidateError::OutOfOrder { expected: self.received, offset });
        }
        let needed = self.received + data.len() as u64;
        if needed > self.capacity() {
            return Err(CandidateError::Capacity { needed, available: self.capacity() });
        }
        self.hasher.update(data);

        let mut rest = data;
        if self.carry_len > 0 {
            let take = rest.len().min(BLOCK_MULTIPLE - self.carry_len);
            self.carry[self.carry_len..self.carry_len + take].copy_from_slice(&rest[..take]);
            self.carry_len += take;
            rest = &rest[take..];
            if self.carry_len == BLOCK_MULTIPLE {
                let block = self.carry;
                self.program(&block)?;
                self.carry_len = 0;
            }
        }
        let aligned = rest.len() - rest.len() % BLOCK_MULTIPLE;
        if aligned > 0 {
            self.program(&rest[..aligned])?;
        }
        let tail = &rest[aligned..];
        self.carry[self.carry_len..self.carry_len + tail.len()].copy_from_slice(tail);
        self.carry_len += tail.len();

        self.received = needed;
        Ok(())
    }

    /// Flushes the carried tail and programs the headers, marking the
    /// candidate ready.
    pub fn finish(
        &mut self,
        version: u64,
        component: ComponentName,
    ) -> Result<ImageHeader, CandidateError> {
        if self.carry_len > 0 {
            let block = self.carry;
            let len = self.carry_len;
            self.program(&block[..len])?;
            self.carry_len = 0;
        }
        let hash = core::mem::take(&mut self.hasher).finalize();
        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&hash);
        let header = ImageHeader { fw_size: self.received, version, digest };

        self.ensure_erased(self.region.start + self.layout.image_offset())?;
        self.storage
            .write(self.region.start + self.layout.image_header_offset(), &header.to_bytes())?;
        if self.layout.ready_header {
            let ready = CandidateReadyHeader { component };
            self.storage.write(self.region.start, &ready.to_bytes())?;
        }
        info!(
            "candidate: {} bytes ready, version {version}, component {}",
            self.received,
            component.as_str()
        );
        Ok(header)
    }

    /// Erases every page touched since [`begin`](Self::begin), header page included.
    pub fn discard(&mut self) -> Result<(), CandidateError> {
        let touched = (self.erased_to - self.region.start).max(self.storage.geometry().erase_page);
        self.storage.erase_at_least(self.region.start, touched)?;
        self.erased_to = self.region.start;
        self.received = 0;
        self.programmed = 0;
        self.carry_len = 0;
        debug!("candidate: discarded {touched:#x} bytes at {:#x}", self.region.start);
        Ok(())
    }

    fn program(&mut self, data: &[u8]) -> Result<(), CandidateError> {
        let address = self.region.start + self.layout.image_offset() + self.programmed as u32;
        let end = address + data.len().next_multiple_of(BLOCK_MULTIPLE) as u32;
        self.ensure_erased(end)?;
        self.storage.write(address, data)?;
        self.programmed += data.len() as u64;
        Ok(())
    }

    fn ensure_erased(&mut self, end: u32) -> Result<(), CandidateError> {
        let erase_page = self.storage.geometry().erase_page;
        while self.erased_to < end {
            self.storage.erase_page(self.erased_to)?;
            self.erased_to += erase_page;
        }
        Ok(())
    }
}

/// Outcome of the previous update as seen at boot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitialResult {
    /// No update was attempted, or the candidate cannot be read.
    Neutral,
    /// The running firmware is the candidate.
    Success,
    /// A candidate was staged but the running firmware differs.
    Failed,
}

impl InitialResult {
    /// LwM2M Firmware Update "Update Result" (/5/0/5).
    pub const fn update_result(self) -> u8 {
        match self {
            InitialResult::Neutral => 0,
            InitialResult::Success => 1,
            InitialResult::Failed => 8,
        }
    }
}

/// Compares the staged candidate with the running firmware.
pub fn probe_initial_result<S: BlockStorage>(
    storage: &mut S,
    region: CandidateRegion,
    layout: CandidateLayout,
    component: ComponentName,
    current: &ImageHeader,
) -> InitialResult {
    if layout.ready_header {
        let mut raw = [0u8; READY_HEADER_SIZE];
        if let Err(err) = storage.read(region.start, &mut raw) {
            warn!("candidate: ready header unreadable: {err}");
            return InitialResult::Neutral;
        }
        match CandidateReadyHeader::from_bytes(&raw) {
            Some(ready) if ready.component == component => {}
            Some(ready) => {
                debug!("candidate: staged for component {}", ready.component.as_str());
                return InitialResult::Neutral;
            }
            None => return InitialResult::Neutral,
        }
    }

    let mut raw = [0u8; IMAGE_HEADER_SIZE];
    if let Err(err) = storage.read(region.start + layout.image_header_offset(), &mut raw) {
        warn!("candidate: image header unreadable: {err}");
        return InitialResult::Neutral;
    }
    match ImageHeader::from_bytes(&raw) {
        Some(staged) if staged == *current => InitialResult::Success,
        Some(_) => InitialResult::Failed,
        None => InitialResult::Neutral,
    }
}

/// Probes the candidate, then erases the whole region.
pub fn initial_result<S: BlockStorage>(
    storage: &mut S,
    region: CandidateRegion,
    layout: CandidateLayout,
    component: ComponentName,
    current: &ImageHeader,
) -> InitialResult {
    let result = probe_initial_result(storage, region, layout, component, current);
    if let Err(err) = storage.erase_at_least(region.start, region.size) {
        warn!("candidate: erase after probe failed: {err}");
    }
    info!("candidate: initial update result {result:?}");
    result
}
