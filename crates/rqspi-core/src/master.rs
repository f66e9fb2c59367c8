//! Master (controller) role
//!
//! The master owns transaction framing: it asserts chip select, shifts
//! words out four bits per rising clock edge, samples words in the same
//! cadence, and deasserts chip select. Each word moves as two nibbles,
//! high nibble first, with bit `k` of every nibble on line `io[k]`.
//!
//! All waits are edge- or timer-triggered; a missing clock source leaves
//! the calling task suspended forever.

use log::{debug, trace};

use crate::bus::QspiBus;
use crate::config::{check_transfer_support, QspiConfig};
use crate::error::{Error, Result};
use crate::signal::{Level, SignalHandle, Timebase};

/// Settle delay after chip-select moves and after each transferred word,
/// in virtual nanoseconds.
pub(crate) const SETTLE_NS: u64 = 1;

/// Lifecycle of one chip-select-framed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No transaction has been opened yet
    Idle,
    /// Chip select is at its active level
    Asserted,
    /// A word transfer is in flight
    Transferring,
    /// The previous transaction has been closed
    Deasserted,
}

/// QSPI master role.
///
/// At most one transaction may be open at a time; the state machine
/// fails fast on misuse rather than corrupting bus state.
pub struct QspiMaster<S, T> {
    bus: QspiBus<S>,
    config: QspiConfig,
    timer: T,
    state: TransactionState,
}

impl<S: SignalHandle, T: Timebase> QspiMaster<S, T> {
    /// Create a master over `bus`.
    ///
    /// Rejects configurations the quad transfer engine cannot shift.
    pub fn new(bus: QspiBus<S>, config: QspiConfig, timer: T) -> Result<Self> {
        check_transfer_support(&config)?;
        Ok(Self {
            bus,
            config,
            timer,
            state: TransactionState::Idle,
        })
    }

    /// Session configuration.
    pub fn config(&self) -> &QspiConfig {
        &self.config
    }

    /// Current transaction state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Park chip select at its inactive level and wait one clock edge.
    ///
    /// Pre-condition: clock generation is already running.
    pub async fn initialize(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Asserted | TransactionState::Transferring => {
                return Err(Error::TransactionAlreadyOpen)
            }
            _ => {}
        }
        self.bus.cs.drive(self.config.cs_inactive_level());
        self.bus.sclk.rising_edge().await;
        self.state = TransactionState::Idle;
        Ok(())
    }

    /// Drive chip select to its active level and settle.
    pub async fn start_transaction(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Asserted | TransactionState::Transferring => {
                return Err(Error::TransactionAlreadyOpen)
            }
            _ => {}
        }
        debug!("cs assert");
        self.bus.cs.drive(self.config.cs_active_level());
        self.timer.delay_ns(SETTLE_NS).await;
        self.state = TransactionState::Asserted;
        Ok(())
    }

    /// Drive chip select to its inactive level and settle.
    ///
    /// Deselecting also releases the four data lines, so a following
    /// read phase starts from an undriven bus (turnaround).
    pub async fn end_transaction(&mut self) -> Result<()> {
        if self.state != TransactionState::Asserted {
            return Err(Error::TransactionNotOpen);
        }
        debug!("cs deassert");
        self.bus.cs.drive(self.config.cs_inactive_level());
        for line in &self.bus.io {
            line.release();
        }
        self.timer.delay_ns(SETTLE_NS).await;
        self.state = TransactionState::Deasserted;
        Ok(())
    }

    /// Shift `data` out over the four lines.
    ///
    /// Per word: high nibble then low nibble, one rising clock edge per
    /// nibble, then a settle delay. The whole call suspends for
    /// `2 * data.len()` clock edges plus one settle per word.
    pub async fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if self.state != TransactionState::Asserted {
            return Err(Error::TransactionNotOpen);
        }
        self.state = TransactionState::Transferring;
        for &byte in data {
            for shift in [4u32, 0] {
                let nibble = (byte >> shift) & 0xF;
                self.drive_nibble(nibble);
                self.bus.sclk.rising_edge().await;
                trace!("tx nibble 0x{:X}", nibble);
            }
            self.timer.delay_ns(SETTLE_NS).await;
        }
        debug!("wrote {} bytes", data.len());
        self.state = TransactionState::Asserted;
        Ok(())
    }

    /// Sample `len` words off the four lines.
    ///
    /// Per word: twice {wait for a rising clock edge, sample the lines,
    /// pack `(io3<<3)|(io2<<2)|(io1<<1)|io0`}, high nibble first. A word
    /// is `None` when any line was undriven during either nibble; the
    /// fallback interpretation of such a word belongs to the caller
    /// (the flash layer maps it to 0xFF).
    pub async fn read_bytes(&mut self, len: usize) -> Result<Vec<Option<u8>>> {
        if self.state != TransactionState::Asserted {
            return Err(Error::TransactionNotOpen);
        }
        self.state = TransactionState::Transferring;
        let mut words = Vec::with_capacity(len);
        for _ in 0..len {
            let mut word: Option<u8> = Some(0);
            for _ in 0..2 {
                self.bus.sclk.rising_edge().await;
                let nibble = self.sample_nibble();
                word = match (word, nibble) {
                    (Some(acc), Some(n)) => Some((acc << 4) | n),
                    _ => None,
                };
            }
            trace!("rx word {:02X?}", word);
            words.push(word);
        }
        debug!("read {} words", len);
        self.state = TransactionState::Asserted;
        Ok(words)
    }

    /// One complete write transaction.
    ///
    /// The transaction is closed even when the transfer step fails.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.start_transaction().await?;
        let transferred = self.write_bytes(data).await;
        self.end_transaction().await?;
        transferred
    }

    /// One complete read transaction.
    ///
    /// The transaction is closed even when the transfer step fails.
    pub async fn read(&mut self, len: usize) -> Result<Vec<Option<u8>>> {
        self.start_transaction().await?;
        let words = self.read_bytes(len).await;
        self.end_transaction().await?;
        words
    }

    fn drive_nibble(&self, nibble: u8) {
        for (k, line) in self.bus.io.iter().enumerate() {
            line.drive(Level::from_bit(nibble >> k));
        }
    }

    fn sample_nibble(&self) -> Option<u8> {
        let mut nibble = 0u8;
        for (k, line) in self.bus.io.iter().enumerate() {
            nibble |= line.sample().bit()? << k;
        }
        Some(nibble)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalValue;
    use std::cell::Cell;
    use std::future::Future;
    use std::rc::Rc;
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    /// Fake signal that applies drives immediately and never delivers
    /// edges - enough to exercise framing and the state machine.
    #[derive(Clone, Default)]
    struct FakeSignal {
        value: Rc<Cell<Option<Level>>>,
    }

    impl SignalHandle for FakeSignal {
        fn drive(&self, level: Level) {
            self.value.set(Some(level));
        }

        fn release(&self) {
            self.value.set(None);
        }

        fn sample(&self) -> SignalValue {
            match self.value.get() {
                Some(Level::Low) => SignalValue::Low,
                Some(Level::High) => SignalValue::High,
                None => SignalValue::HighZ,
            }
        }

        async fn rising_edge(&self) {
            unreachable!("no clock in these tests")
        }

        async fn falling_edge(&self) {
            unreachable!("no clock in these tests")
        }
    }

    struct InstantTimer;

    impl Timebase for InstantTimer {
        async fn delay_ns(&self, _ns: u64) {}
    }

    fn noop_waker() -> Waker {
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        fn noop(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        // SAFETY: every vtable entry is a no-op over a null pointer.
        unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
    }

    /// Drive a future that only awaits instantly-ready fakes.
    fn run_now<F: Future>(fut: F) -> F::Output {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = std::pin::pin!(fut);
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(out) => out,
            Poll::Pending => panic!("future suspended on a fake"),
        }
    }

    fn fake_master(config: QspiConfig) -> (QspiMaster<FakeSignal, InstantTimer>, QspiBus<FakeSignal>) {
        let bus = QspiBus::new(
            FakeSignal::default(),
            FakeSignal::default(),
            [
                FakeSignal::default(),
                FakeSignal::default(),
                FakeSignal::default(),
                FakeSignal::default(),
            ],
        );
        let master = QspiMaster::new(bus.clone(), config, InstantTimer).unwrap();
        (master, bus)
    }

    #[test]
    fn start_drives_cs_to_active_level() {
        let (mut master, bus) = fake_master(QspiConfig::default());
        run_now(master.start_transaction()).unwrap();
        assert_eq!(bus.cs.sample(), SignalValue::Low);
        assert_eq!(master.state(), TransactionState::Asserted);

        run_now(master.end_transaction()).unwrap();
        assert_eq!(bus.cs.sample(), SignalValue::High);
        assert_eq!(master.state(), TransactionState::Deasserted);
    }

    #[test]
    fn cs_polarity_inverts_with_active_high_config() {
        let config = QspiConfig {
            cs_active_low: false,
            ..QspiConfig::default()
        };
        let (mut master, bus) = fake_master(config);
        run_now(master.start_transaction()).unwrap();
        assert_eq!(bus.cs.sample(), SignalValue::High);
        run_now(master.end_transaction()).unwrap();
        assert_eq!(bus.cs.sample(), SignalValue::Low);
    }

    #[test]
    fn double_start_is_a_usage_error() {
        let (mut master, _bus) = fake_master(QspiConfig::default());
        run_now(master.start_transaction()).unwrap();
        assert_eq!(
            run_now(master.start_transaction()),
            Err(Error::TransactionAlreadyOpen)
        );
        // the open transaction is untouched by the failed start
        assert_eq!(master.state(), TransactionState::Asserted);
    }

    #[test]
    fn transfers_require_an_open_transaction() {
        let (mut master, _bus) = fake_master(QspiConfig::default());
        assert_eq!(
            run_now(master.write_bytes(&[0xA5])),
            Err(Error::TransactionNotOpen)
        );
        assert_eq!(run_now(master.read_bytes(1)), Err(Error::TransactionNotOpen));
        assert_eq!(run_now(master.end_transaction()), Err(Error::TransactionNotOpen));
    }

    #[test]
    fn restart_after_end_is_allowed() {
        let (mut master, _bus) = fake_master(QspiConfig::default());
        run_now(master.start_transaction()).unwrap();
        run_now(master.end_transaction()).unwrap();
        run_now(master.start_transaction()).unwrap();
        assert_eq!(master.state(), TransactionState::Asserted);
    }

    #[test]
    fn end_releases_the_data_lines() {
        let (mut master, bus) = fake_master(QspiConfig::default());
        run_now(master.start_transaction()).unwrap();
        master.drive_nibble(0xF);
        assert_eq!(bus.io[3].sample(), SignalValue::High);
        run_now(master.end_transaction()).unwrap();
        for line in &bus.io {
            assert_eq!(line.sample(), SignalValue::HighZ);
        }
    }

    #[test]
    fn nibble_maps_bit_k_onto_line_k() {
        let (master, bus) = fake_master(QspiConfig::default());
        master.drive_nibble(0xB); // 0b1011
        assert_eq!(bus.io[0].sample(), SignalValue::High);
        assert_eq!(bus.io[1].sample(), SignalValue::High);
        assert_eq!(bus.io[2].sample(), SignalValue::Low);
        assert_eq!(bus.io[3].sample(), SignalValue::High);
        assert_eq!(master.sample_nibble(), Some(0xB));
    }

    #[test]
    fn sampling_an_undriven_line_is_unresolved() {
        let (master, bus) = fake_master(QspiConfig::default());
        master.drive_nibble(0x7);
        bus.io[2].release();
        assert_eq!(master.sample_nibble(), None);
    }
}
