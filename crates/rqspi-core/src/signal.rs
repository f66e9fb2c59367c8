//! Signal-level interface to the simulation engine
//!
//! The protocol engine is host-agnostic: it sees the bus as a set of
//! [`SignalHandle`]s and the passage of virtual time as a [`Timebase`].
//! Both are injected at construction, never reached through a global.

use core::fmt;

/// A logic level actively driven onto a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Logic 0
    Low,
    /// Logic 1
    High,
}

impl Level {
    /// Level for the least significant bit of `bit`.
    pub const fn from_bit(bit: u8) -> Self {
        if bit & 1 != 0 {
            Level::High
        } else {
            Level::Low
        }
    }

    /// The bit value this level represents.
    pub const fn bit(self) -> u8 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }
}

/// A sampled signal value.
///
/// `HighZ` is the unresolved state: nothing is driving the signal. The
/// transfer engine surfaces it as-is; only the flash layer applies the
/// 0xFF fallback policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalValue {
    /// Driven to logic 0
    Low,
    /// Driven to logic 1
    High,
    /// Undriven / floating
    HighZ,
}

impl SignalValue {
    /// The bit value, or `None` when the signal is undriven.
    pub const fn bit(self) -> Option<u8> {
        match self {
            SignalValue::Low => Some(0),
            SignalValue::High => Some(1),
            SignalValue::HighZ => None,
        }
    }

    /// True unless the signal is floating.
    pub const fn is_resolved(self) -> bool {
        !matches!(self, SignalValue::HighZ)
    }
}

impl From<Level> for SignalValue {
    fn from(level: Level) -> Self {
        match level {
            Level::Low => SignalValue::Low,
            Level::High => SignalValue::High,
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            SignalValue::Low => '0',
            SignalValue::High => '1',
            SignalValue::HighZ => 'Z',
        };
        write!(f, "{}", c)
    }
}

/// Handle to one simulated signal.
///
/// `drive` and `release` are observable level changes on the bus; when
/// they take effect relative to concurrently sampling tasks is the
/// engine's business (the `rqspi-sim` engine defers them to the end of
/// the current delta cycle). The edge waits are the only way the
/// protocol engine ever blocks on the bus - there is no polling and no
/// timeout, so a wait on a dead clock never returns.
pub trait SignalHandle {
    /// Drive the signal to `level`.
    fn drive(&self, level: Level);

    /// Stop driving the signal; it falls back to [`SignalValue::HighZ`].
    fn release(&self);

    /// Current value of the signal.
    fn sample(&self) -> SignalValue;

    /// Suspend until the signal next transitions to [`SignalValue::High`].
    async fn rising_edge(&self);

    /// Suspend until the signal next transitions to [`SignalValue::Low`].
    async fn falling_edge(&self);
}

/// Virtual-time delays, in nanoseconds.
pub trait Timebase {
    /// Suspend for `ns` nanoseconds of simulated time.
    async fn delay_ns(&self, ns: u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_bit_round_trip() {
        assert_eq!(Level::from_bit(0), Level::Low);
        assert_eq!(Level::from_bit(1), Level::High);
        // only the LSB matters
        assert_eq!(Level::from_bit(0xFE), Level::Low);
        assert_eq!(Level::from_bit(0x0F), Level::High);
        assert_eq!(Level::High.bit(), 1);
        assert_eq!(Level::Low.bit(), 0);
    }

    #[test]
    fn highz_is_unresolved() {
        assert_eq!(SignalValue::Low.bit(), Some(0));
        assert_eq!(SignalValue::High.bit(), Some(1));
        assert_eq!(SignalValue::HighZ.bit(), None);
        assert!(!SignalValue::HighZ.is_resolved());
        assert!(SignalValue::Low.is_resolved());
    }

    #[test]
    fn display_uses_hdl_shorthand() {
        assert_eq!(SignalValue::Low.to_string(), "0");
        assert_eq!(SignalValue::High.to_string(), "1");
        assert_eq!(SignalValue::HighZ.to_string(), "Z");
    }
}
