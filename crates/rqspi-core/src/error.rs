//! Error types for the rqspi protocol engine

use thiserror::Error;

/// Core error type
///
/// Every failure here is a caller-side defect: a misused transaction
/// state machine, a configuration the transfer engine cannot honor, or a
/// malformed frame. The engine itself never retries anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// A transaction is already open on this master
    #[error("transaction already open")]
    TransactionAlreadyOpen,

    /// A transfer was attempted outside an open transaction
    #[error("no transaction open")]
    TransactionNotOpen,

    /// Requested I/O mode is not supported by the transfer engine
    #[error("I/O mode not supported by the transfer engine")]
    IoModeNotSupported,

    /// Word width the transfer engine cannot shift
    #[error("word width of {0} bits not supported")]
    WordWidthNotSupported(u32),

    /// Address does not fit the 3-byte command frame
    #[error("address 0x{0:08X} outside the 24-bit address space")]
    AddressOutOfBounds(u32),

    /// A data line was undriven while the slave sampled a word
    #[error("data line io{0} undriven during a transfer")]
    LineUndriven(u8),
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
