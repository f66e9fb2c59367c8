//! rqspi-device - In-memory flash device model
//!
//! A flash chip emulated behind the wire: the device sits on the slave
//! role, watches chip select, decodes the opcode + 3-byte address frames
//! the flash transaction layer emits, and answers reads from an
//! in-memory model. Useful for exercising the whole protocol stack
//! without hardware or an HDL simulator.
//!
//! Cell semantics distinguish three states so the bus-level fallback
//! policy can actually be observed: a *written* cell reads back its
//! byte, an *erased* cell actively drives 0xFF, and a *never-touched*
//! cell leaves the bus undriven - the master samples HighZ and the flash
//! layer resolves it to 0xFF.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::{debug, warn};
use rqspi_core::flash::decode_address;
use rqspi_core::opcodes;
use rqspi_core::signal::{SignalHandle, Timebase};
use rqspi_core::slave::QspiSlave;

/// Byte an erased cell reads back.
pub const ERASED: u8 = 0xFF;

/// Geometry of the emulated flash part.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Total addressable size in bytes
    pub size: u32,
    /// Smallest erase unit in bytes; must be a power of two
    pub sector_size: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            size: 16 * 1024 * 1024,
            sector_size: 4096,
        }
    }
}

/// What a read of one cell observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// Programmed with a value
    Written(u8),
    /// Erased; reads back [`ERASED`], actively driven
    Erased,
    /// Never programmed or erased; the device does not drive the bus
    Untouched,
}

/// Pure memory model: byte-granular programs, sector-granular erases.
#[derive(Debug)]
pub struct FlashModel {
    config: DeviceConfig,
    written: HashMap<u32, u8>,
    erased_sectors: HashSet<u32>,
}

impl FlashModel {
    /// An empty model with the given geometry.
    ///
    /// # Panics
    ///
    /// Panics when the sector size is not a power of two.
    pub fn new(config: DeviceConfig) -> Self {
        assert!(
            config.sector_size.is_power_of_two(),
            "sector size must be a power of two"
        );
        Self {
            config,
            written: HashMap::new(),
            erased_sectors: HashSet::new(),
        }
    }

    /// The geometry this model was created with.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Store one byte.
    pub fn program(&mut self, address: u32, data: u8) {
        if address >= self.config.size {
            warn!("program 0x{:06X} beyond device size, ignored", address);
            return;
        }
        self.written.insert(address, data);
    }

    /// Erase the sector holding `address`: drop every programmed byte in
    /// it and mark the whole sector as reading [`ERASED`].
    pub fn erase_sector(&mut self, address: u32) {
        if address >= self.config.size {
            warn!("erase 0x{:06X} beyond device size, ignored", address);
            return;
        }
        let base = address & !(self.config.sector_size - 1);
        let end = base + self.config.sector_size;
        self.written.retain(|&a, _| a < base || a >= end);
        self.erased_sectors.insert(base);
        debug!("erased sector 0x{:06X}..0x{:06X}", base, end);
    }

    /// Observe one cell.
    pub fn read(&self, address: u32) -> CellState {
        if let Some(&byte) = self.written.get(&address) {
            return CellState::Written(byte);
        }
        let base = address & !(self.config.sector_size - 1);
        if self.erased_sectors.contains(&base) {
            CellState::Erased
        } else {
            CellState::Untouched
        }
    }
}

/// Reply owed from a READ command, served in the next selection.
enum Pending {
    /// Drive this byte back
    Reply(u8),
    /// Leave the bus undriven for the whole read phase
    Silent,
}

/// Flash device on the slave role.
///
/// [`SimFlash::run`] is the device task; spawn it on the simulator. The
/// memory model is shared out through [`SimFlash::model`] so tests can
/// seed and inspect it while the task runs.
pub struct SimFlash<S, T> {
    slave: QspiSlave<S, T>,
    model: Rc<RefCell<FlashModel>>,
    pending: Option<Pending>,
}

impl<S: SignalHandle, T: Timebase> SimFlash<S, T> {
    /// A device with the given geometry, all cells untouched.
    pub fn new(slave: QspiSlave<S, T>, config: DeviceConfig) -> Self {
        Self {
            slave,
            model: Rc::new(RefCell::new(FlashModel::new(config))),
            pending: None,
        }
    }

    /// Shared handle to the memory model.
    pub fn model(&self) -> Rc<RefCell<FlashModel>> {
        self.model.clone()
    }

    /// Serve the bus forever. Spawn this on the simulator.
    pub async fn run(mut self) {
        loop {
            self.wait_selected().await;
            match self.pending.take() {
                Some(Pending::Reply(byte)) => {
                    debug!("read reply 0x{:02X}", byte);
                    self.slave.transmit_byte(byte).await;
                    self.slave.release_lines();
                }
                Some(Pending::Silent) => {
                    debug!("read reply for untouched cell: staying silent");
                    self.wait_deselected().await;
                }
                None => self.serve_command().await,
            }
        }
    }

    async fn wait_selected(&self) {
        let cs = &self.slave.bus().cs;
        if self.slave.config().cs_active_low {
            cs.falling_edge().await;
        } else {
            cs.rising_edge().await;
        }
    }

    async fn wait_deselected(&self) {
        let cs = &self.slave.bus().cs;
        if self.slave.config().cs_active_low {
            cs.rising_edge().await;
        } else {
            cs.falling_edge().await;
        }
    }

    /// Decode and execute one command transaction.
    async fn serve_command(&mut self) {
        let opcode = match self.slave.receive_byte().await {
            Ok(opcode) => opcode,
            Err(e) => {
                warn!("command aborted: {}", e);
                return;
            }
        };
        let mut addr_bytes = [0u8; 3];
        for slot in &mut addr_bytes {
            match self.slave.receive_byte().await {
                Ok(byte) => *slot = byte,
                Err(e) => {
                    warn!("address truncated: {}", e);
                    return;
                }
            }
        }
        let address = decode_address(addr_bytes);

        match opcode {
            opcodes::PP => match self.slave.receive_byte().await {
                Ok(data) => {
                    debug!("program 0x{:06X} = 0x{:02X}", address, data);
                    self.model.borrow_mut().program(address, data);
                }
                Err(e) => warn!("program data truncated: {}", e),
            },
            opcodes::READ => {
                let state = self.model.borrow().read(address);
                debug!("read command 0x{:06X}: {:?}", address, state);
                self.pending = Some(match state {
                    CellState::Written(byte) => Pending::Reply(byte),
                    CellState::Erased => Pending::Reply(ERASED),
                    CellState::Untouched => Pending::Silent,
                });
            }
            opcodes::SE_20 => {
                self.model.borrow_mut().erase_sector(address);
            }
            other => warn!("opcode 0x{:02X} not supported", other),
        }
    }
}
