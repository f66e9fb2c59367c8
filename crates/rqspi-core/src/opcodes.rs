//! Flash command opcodes
//!
//! The subset of standard JEDEC SPI flash opcodes the flash transaction
//! layer speaks. All three take a 3-byte address.

/// Page Program
pub const PP: u8 = 0x02;
/// Read Data
pub const READ: u8 = 0x03;
/// Sector Erase 4KB
pub const SE_20: u8 = 0x20;
