// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), no_std)]

//! CONTEXT: Bus seam between NOR flash drivers and the (Q)SPI controller
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 2 unit tests
//!
//! PUBLIC API:
//!   - QspiBus: single-opcode command / read / program transactions
//!   - BusError: controller-level transaction failures

/// Failures reported by the controller for a single transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The controller rejected or aborted the transaction.
    #[error("transaction failed")]
    Transaction,
    /// The controller is owned by another transfer.
    #[error("bus busy")]
    Busy,
    /// The controller does not implement the requested opcode/addressing mode.
    #[error("unsupported transaction")]
    Unsupported,
}

/// Raw (Q)SPI controller access.
///
/// Every call is one chip-select framed transaction: an opcode byte, an
/// optional 24-bit address, then a data phase. Drivers own all sequencing
/// (write-enable, status polling); the bus only moves bytes.
pub trait QspiBus {
    /// Issues `opcode` with an optional address, sends `tx`, then clocks in `rx`.
    fn command_transfer(
        &mut self,
        opcode: u8,
        address: Option<u32>,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), BusError>;

    /// Reads into `buf` starting at `address`. Returns the number of bytes the
    /// controller actually transferred.
    fn read(&mut self, opcode: u8, address: u32, buf: &mut [u8]) -> Result<usize, BusError>;

    /// Programs `buf` starting at `address`. Returns the number of bytes the
    /// controller actually transferred.
    fn write(&mut self, opcode: u8, address: u32, buf: &[u8]) -> Result<usize, BusError>;
}

impl<T: QspiBus + ?Sized> QspiBus for &mut T {
    fn command_transfer(
        &mut self,
        opcode: u8,
        address: Option<u32>,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), BusError> {
        (**self).command_transfer(opcode, address, tx, rx)
    }

    fn read(&mut self, opcode: u8, address: u32, buf: &mut [u8]) -> Result<usize, BusError> {
        (**self).read(opcode, address, buf)
    }

    fn write(&mut self, opcode: u8, address: u32, buf: &[u8]) -> Result<usize, BusError> {
        (**self).write(opcode, address, buf)
    }
}
