// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: In-memory serial NOR model for host tests
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable (test support)
//! TEST_COVERAGE: Exercised by driver unit tests and tests/updates_host
//!
//! Models the parts of a MX25R-class chip the driver depends on: the write
//! latch (cleared by every program/erase), a write-in-progress window lasting
//! a configurable number of status reads, program-only-clears-bits semantics,
//! page-buffer wrap, and a controller that only moves whole 4-byte blocks.

use flash_hal::{BusError, QspiBus};

use crate::driver::Status;
use crate::{opcode, FlashGeometry, BLOCK_MULTIPLE, ERASED_BYTE};

/// One recorded bus transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Op {
    pub opcode: u8,
    pub address: Option<u32>,
    pub len: usize,
}

/// Fault injection switches.
#[derive(Clone, Copy, Debug, Default)]
pub struct Faults {
    /// WIP never clears; every command but status reads is ignored.
    pub stuck_busy: bool,
    /// Transactions with this opcode fail at the controller.
    pub fail_opcode: Option<u8>,
    /// Reads transfer one byte less than requested.
    pub short_read: bool,
    /// Programs silently skip their first byte.
    pub corrupt_program: bool,
}

/// Simulated chip + controller.
pub struct SimulatedNor {
    memory: Vec<u8>,
    geometry: FlashGeometry,
    latch: bool,
    busy_polls: u32,
    remaining_busy: u32,
    faults: Faults,
    ops: Vec<Op>,
}

impl SimulatedNor {
    /// A fully erased part.
    pub fn new(geometry: FlashGeometry) -> Self {
        Self {
            memory: vec![ERASED_BYTE; geometry.size as usize],
            geometry,
            latch: false,
            busy_polls: 1,
            remaining_busy: 0,
            faults: Faults::default(),
            ops: Vec::new(),
        }
    }

    /// Number of status reads that report WIP after each program/erase.
    pub fn with_busy_polls(mut self, polls: u32) -> Self {
        self.busy_polls = polls;
        self
    }

    pub fn geometry(&self) -> FlashGeometry {
        self.geometry
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Addresses of every accepted sector erase, in order.
    pub fn erased_pages(&self) -> Vec<u32> {
        self.ops
            .iter()
            .filter(|op| op.opcode == opcode::SECTOR_ERASE)
            .filter_map(|op| op.address)
            .collect()
    }

    fn busy(&self) -> bool {
        self.faults.stuck_busy || self.remaining_busy > 0
    }

    fn status(&self) -> Status {
        let mut status = Status::empty();
        if self.busy() {
            status |= Status::WRITE_IN_PROGRESS;
        }
        if self.latch {
            status |= Status::WRITE_LATCH_ENABLED;
        }
        status
    }

    fn check_fault(&self, opcode: u8) -> Result<(), BusError> {
        if self.faults.fail_opcode == Some(opcode) {
            return Err(BusError::Transaction);
        }
        Ok(())
    }

    fn check_block(&self, address: u32, len: usize) -> Result<(), BusError> {
        if address as usize % BLOCK_MULTIPLE != 0
            || len % BLOCK_MULTIPLE != 0
            || address as usize + len > self.memory.len()
        {
            return Err(BusError::Transaction);
        }
        Ok(())
    }

    fn start_busy(&mut self) {
        self.latch = false;
        self.remaining_busy = self.busy_polls;
    }
}

impl QspiBus for SimulatedNor {
    fn command_transfer(
        &mut self,
        opcode: u8,
        address: Option<u32>,
        _tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), BusError> {
        self.check_fault(opcode)?;
        match opcode {
            opcode::READ_STATUS => {
                let status = self.status();
                rx.fill(0);
                if let Some(first) = rx.first_mut() {
                    *first = status.bits();
                }
                self.remaining_busy = self.remaining_busy.saturating_sub(1);
            }
            opcode::WRITE_ENABLE => {
                if !self.busy() {
                    self.latch = true;
                }
            }
            opcode::SECTOR_ERASE => {
                let address = address.ok_or(BusError::Transaction)?;
                if address >= self.geometry.size {
                    return Err(BusError::Transaction);
                }
                if self.busy() || !self.latch {
                    return Ok(());
                }
                let start = (address - address % self.geometry.erase_page) as usize;
                let end = start + self.geometry.erase_page as usize;
                self.memory[start..end].fill(ERASED_BYTE);
                self.start_busy();
            }
            _ => return Err(BusError::Unsupported),
        }
        self.ops.push(Op { opcode, address, len: rx.len() });
        Ok(())
    }

    fn read(&mut self, opcode: u8, address: u32, buf: &mut [u8]) -> Result<usize, BusError> {
        self.check_fault(opcode)?;
        if opcode != opcode::READ && opcode != opcode::FAST_READ {
            return Err(BusError::Unsupported);
        }
        self.check_block(address, buf.len())?;
        let start = address as usize;
        buf.copy_from_slice(&self.memory[start..start + buf.len()]);
        self.ops.push(Op { opcode, address: Some(address), len: buf.len() });
        if self.faults.short_read {
            return Ok(buf.len().saturating_sub(1));
        }
        Ok(buf.len())
    }

    fn write(&mut self, opcode: u8, address: u32, buf: &[u8]) -> Result<usize, BusError> {
        self.check_fault(opcode)?;
        if opcode != opcode::PAGE_PROGRAM {
            return Err(BusError::Unsupported);
        }
        self.check_block(address, buf.len())?;
        self.ops.push(Op { opcode, address: Some(address), len: buf.len() });
        if self.busy() || !self.latch {
            return Ok(buf.len());
        }

        // The page buffer keeps only the last `write_page` bytes clocked in and
        // wraps within the page.
        let page = self.geometry.write_page as usize;
        let page_base = address as usize - address as usize % page;
        let skip = buf.len().saturating_sub(page);
        let first = if self.faults.corrupt_program { skip + 1 } else { skip };
        for (i, byte) in buf.iter().enumerate().skip(first) {
            let column = (address as usize % page + i) % page;
            self.memory[page_base + column] &= *byte;
        }
        self.start_busy();
        Ok(buf.len())
    }
}
