//! Clock generation
//!
//! The protocol engine only reacts to edges; this is the one component
//! that creates them. A `Clock` is a plain task - spawn its `run` future
//! on the simulator and it toggles its signal forever.

use log::debug;
use rqspi_core::signal::{Level, SignalHandle};

use crate::signal::SimSignal;
use crate::simulator::Delay;

/// Periodic clock generator, idle low, 50% duty cycle.
pub struct Clock {
    signal: SimSignal,
    period_ns: u64,
}

impl Clock {
    /// A clock with the given period. The first rising edge lands one
    /// half period after the task starts.
    ///
    /// # Panics
    ///
    /// Panics when `period_ns < 2` - a half period must be at least one
    /// time unit.
    pub fn new(signal: SimSignal, period_ns: u64) -> Self {
        assert!(period_ns >= 2, "clock period must be at least 2 ns");
        Self { signal, period_ns }
    }

    /// A clock from a frequency in Hz.
    pub fn from_hz(signal: SimSignal, hz: u64) -> Self {
        Self::new(signal, 1_000_000_000 / hz)
    }

    /// The configured period in nanoseconds.
    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }

    /// Toggle forever. Spawn this on the simulator.
    pub async fn run(self) {
        let half = self.period_ns / 2;
        debug!(
            "clock on {}: period {} ns",
            self.signal.name(),
            self.period_ns
        );
        let core = self.signal.core();
        self.signal.drive(Level::Low);
        loop {
            Delay {
                core: core.clone(),
                ns: half,
                deadline: None,
            }
            .await;
            self.signal.drive(Level::High);
            Delay {
                core: core.clone(),
                ns: half,
                deadline: None,
            }
            .await;
            self.signal.drive(Level::Low);
        }
    }
}
