//! Full-stack flash protocol tests
//!
//! Flash transaction layer -> master -> simulated wiring -> slave ->
//! device model, with the clock as the only thing keeping the two sides
//! in lockstep.

use std::cell::RefCell;
use std::rc::Rc;

use rqspi_core::config::QspiConfig;
use rqspi_core::error::Error;
use rqspi_core::flash::QspiFlash;
use rqspi_core::master::QspiMaster;
use rqspi_core::slave::QspiSlave;
use rqspi_device::{CellState, DeviceConfig, FlashModel, SimFlash};
use rqspi_sim::{Clock, SimHandle, SimSignal, Simulator};

type Flash = QspiFlash<SimSignal, SimHandle>;

fn setup() -> (Simulator, Flash, Rc<RefCell<FlashModel>>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let sim = Simulator::new();
    let bus = sim.qspi_bus("qspi");
    let config = QspiConfig::default();
    sim.spawn(Clock::from_hz(bus.sclk.clone(), config.sclk_freq_hz).run());

    let slave = QspiSlave::new(bus.clone(), config.clone(), sim.handle()).unwrap();
    let device = SimFlash::new(slave, DeviceConfig::default());
    let model = device.model();
    sim.spawn(device.run());

    let master = QspiMaster::new(bus, config, sim.handle()).unwrap();
    (sim, QspiFlash::new(master), model)
}

#[test]
fn write_then_read_round_trips() {
    let (sim, mut flash, _model) = setup();
    let read_back = sim.run(async move {
        flash.initialize().await.unwrap();
        flash.write(0x01, 0xA5).await.unwrap();
        flash.read(0x01).await.unwrap()
    });
    assert_eq!(read_back, 0xA5);
}

#[test]
fn erase_resets_the_cell_to_ff() {
    let (sim, mut flash, model) = setup();
    let (before, after) = sim.run(async move {
        flash.initialize().await.unwrap();
        flash.write(0x01, 0x5A).await.unwrap();
        let before = flash.read(0x01).await.unwrap();
        flash.erase(0x01).await.unwrap();
        (before, flash.read(0x01).await.unwrap())
    });
    assert_eq!(before, 0x5A);
    assert_eq!(after, 0xFF);
    assert_eq!(model.borrow().read(0x01), CellState::Erased);
}

#[test]
fn never_touched_cell_reads_ff_through_the_highz_policy() {
    let (sim, mut flash, model) = setup();
    let (floating, written) = sim.run(async move {
        flash.initialize().await.unwrap();
        // nothing drives the bus during this read phase
        let floating = flash.read(0x7777).await.unwrap();
        // the device state machine is still in sync afterwards
        flash.write(0x7777, 0x3C).await.unwrap();
        (floating, flash.read(0x7777).await.unwrap())
    });
    assert_eq!(floating, 0xFF);
    assert_eq!(written, 0x3C);
    assert_eq!(model.borrow().read(0x7777), CellState::Written(0x3C));
}

#[test]
fn address_travels_big_endian() {
    let (sim, mut flash, model) = setup();
    sim.run(async move {
        flash.initialize().await.unwrap();
        flash.write(0x010203, 0x42).await.unwrap();
    });
    // the device decoded [0x01, 0x02, 0x03] back into 0x010203
    assert_eq!(model.borrow().read(0x010203), CellState::Written(0x42));
    assert_eq!(model.borrow().read(0x030201), CellState::Untouched);
}

#[test]
fn erase_is_sector_granular_on_the_device() {
    let (sim, mut flash, _model) = setup();
    let (same_sector, other_sector) = sim.run(async move {
        flash.initialize().await.unwrap();
        flash.write(0x0010, 0x11).await.unwrap();
        flash.write(0x1010, 0x22).await.unwrap();
        flash.erase(0x0000).await.unwrap();
        (
            flash.read(0x0010).await.unwrap(),
            flash.read(0x1010).await.unwrap(),
        )
    });
    assert_eq!(same_sector, 0xFF);
    assert_eq!(other_sector, 0x22);
}

#[test]
fn several_cells_hold_independent_values() {
    let (sim, mut flash, _model) = setup();
    let values = sim.run(async move {
        flash.initialize().await.unwrap();
        for (address, data) in [(0x00, 0xDE), (0x01, 0xAD), (0x100, 0xBE), (0x101, 0xEF)] {
            flash.write(address, data).await.unwrap();
        }
        let mut values = Vec::new();
        for address in [0x00, 0x01, 0x100, 0x101] {
            values.push(flash.read(address).await.unwrap());
        }
        values
    });
    assert_eq!(values, [0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn out_of_range_address_fails_before_touching_the_bus() {
    let (sim, mut flash, _model) = setup();
    let result = sim.run(async move {
        flash.initialize().await.unwrap();
        flash.write(0x0100_0000, 0x00).await
    });
    assert_eq!(result, Err(Error::AddressOutOfBounds(0x0100_0000)));
}
