// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(any(test, feature = "sim")), no_std)]

//! CONTEXT: Serial NOR flash driver (aligned read, verified page program, sector erase)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 16 unit tests + 2 property tests
//!
//! PUBLIC API:
//!   - NorFlash: driver over any `flash_hal::QspiBus`
//!   - BlockStorage: byte-addressed storage seam used by the update stack
//!   - FlashGeometry / ReadMode: chip description
//!   - sim::SimulatedNor (feature `sim`): in-memory chip for host tests
//!
//! DEPENDENCIES:
//!   - flash-hal::QspiBus: controller transactions
//!   - bitflags: status register decoding

mod driver;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use driver::{NorFlash, Status};
pub use flash_hal::{BusError, QspiBus};

/// Transfer granularity of the controller. Every read/program transaction
/// must start on and span a multiple of this many bytes.
pub const BLOCK_MULTIPLE: usize = 4;

/// Value of an erased flash byte.
pub const ERASED_BYTE: u8 = 0xFF;

/// Opcodes understood by the supported parts.
pub mod opcode {
    pub const WRITE_ENABLE: u8 = 0x06;
    pub const READ_STATUS: u8 = 0x05;
    pub const PAGE_PROGRAM: u8 = 0x02;
    pub const SECTOR_ERASE: u8 = 0x20;
    pub const READ: u8 = 0x03;
    pub const FAST_READ: u8 = 0x0B;
}

/// Size of the status register response in bytes.
pub const STATUS_RESPONSE_LEN: usize = 2;

/// Physical layout of a flash part.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlashGeometry {
    /// Total addressable bytes.
    pub size: u32,
    /// Largest single page-program transaction.
    pub write_page: u32,
    /// Erase granularity.
    pub erase_page: u32,
}

impl FlashGeometry {
    /// Macronix MX25R6435F (NRF52840-DK, DISCO-L496AG).
    pub const MX25R6435F: Self = Self { size: 0x80_0000, write_page: 0x100, erase_page: 0x1000 };

    /// Checks `erase_page % write_page == 0`, `write_page % BLOCK_MULTIPLE == 0`
    /// and that the part is a whole number of erase pages.
    pub fn validate(&self) -> Result<(), NorError> {
        let block = BLOCK_MULTIPLE as u32;
        if self.write_page == 0
            || self.erase_page == 0
            || self.write_page % block != 0
            || self.erase_page % self.write_page != 0
            || self.size % self.erase_page != 0
        {
            return Err(NorError::Geometry);
        }
        Ok(())
    }

    /// Number of erase pages needed to cover `len` bytes.
    pub fn erase_pages_for(&self, len: u32) -> u32 {
        len.div_ceil(self.erase_page)
    }
}

impl Default for FlashGeometry {
    fn default() -> Self {
        Self::MX25R6435F
    }
}

/// Read opcode selection.
///
/// Fast read carries a dummy cycle that some controllers forward as a garbage
/// leading byte, so it is opt-in per board.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadMode {
    #[default]
    Normal,
    Fast,
}

impl ReadMode {
    pub const fn opcode(self) -> u8 {
        match self {
            ReadMode::Normal => opcode::READ,
            ReadMode::Fast => opcode::FAST_READ,
        }
    }
}

/// Driver failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NorError {
    /// The controller reported a failed transaction.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    /// The controller moved fewer bytes than requested.
    #[error("short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },
    /// Caller passed an address violating the operation's alignment contract.
    #[error("address {address:#x} is not {alignment}-byte aligned")]
    Misaligned { address: u32, alignment: u32 },
    /// The transfer reaches past the end of the part.
    #[error("range {address:#x}+{len} exceeds flash size")]
    OutOfRange { address: u32, len: usize },
    /// Read-back after programming did not match the source.
    #[error("verification failed at {address:#x}")]
    Verify { address: u32 },
    /// Status polling exceeded the configured limit.
    #[error("flash still busy after {polls} status reads")]
    Timeout { polls: u32 },
    /// Geometry violates the page-size invariants.
    #[error("invalid flash geometry")]
    Geometry,
}

/// Byte-addressed flash storage.
///
/// `write` requires a `BLOCK_MULTIPLE`-aligned address and `erase_page` an
/// erase-page-aligned one; neither is corrected internally.
pub trait BlockStorage {
    fn geometry(&self) -> FlashGeometry;

    /// Reads exactly `buf.len()` bytes from `address`; any alignment.
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), NorError>;

    /// Programs `data` at `address`, padding a short tail with `ERASED_BYTE`.
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), NorError>;

    /// Erases the single erase page starting at `address`.
    fn erase_page(&mut self, address: u32) -> Result<(), NorError>;

    /// Erases `ceil(len / erase_page)` consecutive pages starting at `address`.
    fn erase_at_least(&mut self, address: u32, len: u32) -> Result<(), NorError> {
        let erase_page = self.geometry().erase_page;
        let pages = self.geometry().erase_pages_for(len);
        for page in 0..pages {
            self.erase_page(address + page * erase_page)?;
        }
        Ok(())
    }
}

impl<T: BlockStorage + ?Sized> BlockStorage for &mut T {
    fn geometry(&self) -> FlashGeometry {
        (**self).geometry()
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), NorError> {
        (**self).read(address, buf)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), NorError> {
        (**self).write(address, data)
    }

    fn erase_page(&mut self, address: u32) -> Result<(), NorError> {
        (**self).erase_page(address)
    }

    fn erase_at_least(&mut self, address: u32, len: u32) -> Result<(), NorError> {
        (**self).erase_at_least(address, len)
    }
}
