//! Protocol configuration
//!
//! One immutable parameter set per bus session. The defaults describe
//! the usual flash part: 8-bit words, 25 MHz clock, mode 0, active-low
//! chip select, quad I/O.

use crate::error::{Error, Result};
use crate::signal::Level;

/// I/O mode for bus transfers
///
/// How many data lines carry payload bits per clock edge. Every mode is
/// representable in configuration, but the transfer engine itself only
/// shifts in [`IoMode::Quad`]; see [`check_transfer_support`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IoMode {
    /// One data line per direction
    Single,
    /// Two shared data lines
    Dual,
    /// Four shared data lines
    #[default]
    Quad,
    /// Eight shared data lines
    Octal,
}

impl IoMode {
    /// Returns the number of data lines used per clock edge
    pub const fn data_lines(&self) -> u8 {
        match self {
            Self::Single => 1,
            Self::Dual => 2,
            Self::Quad => 4,
            Self::Octal => 8,
        }
    }
}

/// Bus session parameters
///
/// Immutable after construction. `cpol`/`cpha` are carried for
/// completeness but do not select edges: the transfer engine always
/// samples and drives on the rising clock edge, a simplification that
/// attached device models depend on.
#[derive(Debug, Clone)]
pub struct QspiConfig {
    /// Word width in bits; must be a multiple of 4
    pub word_width: u32,
    /// Serial clock frequency in Hz (informational - the engine reacts
    /// to edges, it does not generate them)
    pub sclk_freq_hz: u64,
    /// Clock polarity: idle level of the clock
    pub cpol: bool,
    /// Clock phase: which edge latches data
    pub cpha: bool,
    /// Chip select asserts low when true
    pub cs_active_low: bool,
    /// Data line mode
    pub io_mode: IoMode,
}

impl Default for QspiConfig {
    fn default() -> Self {
        Self {
            word_width: 8,
            sclk_freq_hz: 25_000_000,
            cpol: false,
            cpha: false,
            cs_active_low: true,
            io_mode: IoMode::Quad,
        }
    }
}

impl QspiConfig {
    /// Check the structural invariants of the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.word_width == 0 || self.word_width % 4 != 0 {
            return Err(Error::WordWidthNotSupported(self.word_width));
        }
        Ok(())
    }

    /// Level that asserts chip select.
    pub const fn cs_active_level(&self) -> Level {
        if self.cs_active_low {
            Level::Low
        } else {
            Level::High
        }
    }

    /// Level that deasserts chip select.
    pub const fn cs_inactive_level(&self) -> Level {
        if self.cs_active_low {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Check that a configuration can be shifted by the quad transfer engine
///
/// Returns `Ok(())` for valid quad-mode, 8-bit-word configurations, or
/// the matching error otherwise. Both bus roles call this at
/// construction so a misconfigured session fails fast instead of
/// corrupting bus state mid-transfer.
pub fn check_transfer_support(config: &QspiConfig) -> Result<()> {
    config.validate()?;
    if config.io_mode != IoMode::Quad {
        return Err(Error::IoModeNotSupported);
    }
    // The transfer loops move exactly two nibbles per word.
    if config.word_width != 8 {
        return Err(Error::WordWidthNotSupported(config.word_width));
    }
    Ok(())
}
