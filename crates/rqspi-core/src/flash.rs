//! Flash transaction layer
//!
//! A stateless protocol encoder over the master role. Every command is a
//! 1-byte opcode followed by a 3-byte big-endian address; program
//! commands carry one data byte after the address. Read-back resolution
//! policy lives here: a word the master sampled off an undriven bus
//! comes back as [`UNDRIVEN_READBACK`], modeling an unprogrammed or
//! unselected part.
//!
//! A read issues two chip-select assertions: the command transaction and
//! an immediately following read transaction. Device models are expected
//! to hold their reply across that boundary.

use log::debug;

use crate::error::{Error, Result};
use crate::master::QspiMaster;
use crate::opcodes;
use crate::signal::{SignalHandle, Timebase};

/// Highest address a 3-byte command frame can carry.
pub const MAX_ADDRESS: u32 = 0x00FF_FFFF;

/// Byte read back when nothing drives the bus during a read phase.
pub const UNDRIVEN_READBACK: u8 = 0xFF;

/// Encode a 24-bit address big-endian into `buf[0..3]`.
pub fn encode_address(address: u32, buf: &mut [u8]) -> Result<()> {
    if address > MAX_ADDRESS {
        return Err(Error::AddressOutOfBounds(address));
    }
    buf[0] = (address >> 16) as u8;
    buf[1] = (address >> 8) as u8;
    buf[2] = address as u8;
    Ok(())
}

/// Decode the 3 big-endian address bytes of a command frame.
pub fn decode_address(bytes: [u8; 3]) -> u32 {
    ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32
}

/// Flash command session over a QSPI master.
pub struct QspiFlash<S, T> {
    master: QspiMaster<S, T>,
}

impl<S: SignalHandle, T: Timebase> QspiFlash<S, T> {
    /// Wrap a master in the flash command protocol.
    pub fn new(master: QspiMaster<S, T>) -> Self {
        Self { master }
    }

    /// Take the underlying master back out.
    pub fn into_master(self) -> QspiMaster<S, T> {
        self.master
    }

    /// Establish the chip-select idle level and wait one clock edge.
    ///
    /// Pre-condition: clock generation is already running; with no clock
    /// source this call never returns.
    pub async fn initialize(&mut self) -> Result<()> {
        self.master.initialize().await
    }

    /// Program one byte: opcode 0x02, address, data, as one unbroken
    /// write transaction. Returns once the transfer (and its settle
    /// delays) completed.
    pub async fn write(&mut self, address: u32, data: u8) -> Result<()> {
        let mut frame = [0u8; 5];
        frame[0] = opcodes::PP;
        encode_address(address, &mut frame[1..4])?;
        frame[4] = data;
        debug!("program 0x{:06X} = 0x{:02X}", address, data);
        self.master.write(&frame).await
    }

    /// Read one byte: opcode 0x03 plus address in a write transaction,
    /// then a 1-byte read phase in the immediately following
    /// transaction. An undriven bus resolves to [`UNDRIVEN_READBACK`].
    pub async fn read(&mut self, address: u32) -> Result<u8> {
        let mut frame = [0u8; 4];
        frame[0] = opcodes::READ;
        encode_address(address, &mut frame[1..4])?;
        self.master.write(&frame).await?;
        let words = self.master.read(1).await?;
        let value = words[0].unwrap_or(UNDRIVEN_READBACK);
        debug!("read 0x{:06X} -> 0x{:02X}", address, value);
        Ok(value)
    }

    /// Erase the sector holding `address`: opcode 0x20 plus address, no
    /// payload. The device contract is that the erased region
    /// subsequently reads 0xFF; this layer does not verify it.
    pub async fn erase(&mut self, address: u32) -> Result<()> {
        let mut frame = [0u8; 4];
        frame[0] = opcodes::SE_20;
        encode_address(address, &mut frame[1..4])?;
        debug!("sector erase 0x{:06X}", address);
        self.master.write(&frame).await
    }
}
