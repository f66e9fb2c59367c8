//! Slave (responder) role
//!
//! The mirror image of the master: it samples the four lines on each
//! rising clock edge to receive and drives them on each edge to
//! transmit, using the same fixed nibble order. It never touches chip
//! select - selection is the master's business; a device model built on
//! top of this role watches the chip-select signal itself.

use log::trace;

use crate::bus::QspiBus;
use crate::config::{check_transfer_support, QspiConfig};
use crate::error::{Error, Result};
use crate::master::SETTLE_NS;
use crate::signal::{Level, SignalHandle, Timebase};

/// QSPI slave role.
pub struct QspiSlave<S, T> {
    bus: QspiBus<S>,
    config: QspiConfig,
    timer: T,
}

impl<S: SignalHandle, T: Timebase> QspiSlave<S, T> {
    /// Create a slave over `bus`.
    ///
    /// Rejects configurations the quad transfer engine cannot shift.
    pub fn new(bus: QspiBus<S>, config: QspiConfig, timer: T) -> Result<Self> {
        check_transfer_support(&config)?;
        Ok(Self { bus, config, timer })
    }

    /// The wiring this slave is attached to.
    pub fn bus(&self) -> &QspiBus<S> {
        &self.bus
    }

    /// Session configuration.
    pub fn config(&self) -> &QspiConfig {
        &self.config
    }

    /// Sample one word off the bus, MSB-first.
    ///
    /// Two rising clock edges, four bits per edge, in the master's bit
    /// order. The master always drives during a command phase, so an
    /// undriven line here is a bus fault, not a policy case.
    pub async fn receive_byte(&mut self) -> Result<u8> {
        let mut byte = 0u8;
        for _ in 0..2 {
            self.bus.sclk.rising_edge().await;
            let nibble = self.sample_nibble()?;
            byte = (byte << 4) | nibble;
        }
        trace!("slave rx 0x{:02X}", byte);
        Ok(byte)
    }

    /// Drive one word onto the bus, most-significant nibble first.
    ///
    /// Bit `k` of each nibble rides `io[k]`, one rising clock edge per
    /// nibble, then a settle delay. The lines keep their final values
    /// until [`QspiSlave::release_lines`] is called.
    pub async fn transmit_byte(&mut self, data: u8) {
        for shift in [4u32, 0] {
            let nibble = (data >> shift) & 0xF;
            for (k, line) in self.bus.io.iter().enumerate() {
                line.drive(Level::from_bit(nibble >> k));
            }
            self.bus.sclk.rising_edge().await;
        }
        self.timer.delay_ns(SETTLE_NS).await;
        trace!("slave tx 0x{:02X}", data);
    }

    /// Stop driving all four data lines.
    pub fn release_lines(&self) {
        for line in &self.bus.io {
            line.release();
        }
    }

    fn sample_nibble(&self) -> Result<u8> {
        let mut nibble = 0u8;
        for (k, line) in self.bus.io.iter().enumerate() {
            match line.sample().bit() {
                Some(bit) => nibble |= bit << k,
                None => return Err(Error::LineUndriven(k as u8)),
            }
        }
        Ok(nibble)
    }
}
