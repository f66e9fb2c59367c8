//! rqspi-core - Protocol engine for a simulated QSPI bus
//!
//! This crate models both roles of a chip-select-framed quad-wire serial
//! bus: the master, which frames transactions and shifts words four bits
//! per clock edge, and the slave, which mirrors the shifting under
//! external control. A flash transaction layer on top of the master role
//! encodes the classic program/read/sector-erase command set.
//!
//! The engine never talks to a simulator directly. It is generic over the
//! [`signal::SignalHandle`] and [`signal::Timebase`] traits, so any event
//! source that can deliver clock edges and virtual-time delays can drive
//! it - the `rqspi-sim` crate provides one, and unit tests use trivial
//! fakes.
//!
//! # Example
//!
//! ```ignore
//! use rqspi_core::{config::QspiConfig, flash::QspiFlash, master::QspiMaster};
//!
//! let master = QspiMaster::new(bus, QspiConfig::default(), timer)?;
//! let mut flash = QspiFlash::new(master);
//! flash.initialize().await?;
//! flash.write(0x0100, 0xA5).await?;
//! assert_eq!(flash.read(0x0100).await?, 0xA5);
//! # Ok::<(), rqspi_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(async_fn_in_trait)]

pub mod bus;
pub mod config;
pub mod error;
pub mod flash;
pub mod master;
pub mod opcodes;
pub mod signal;
pub mod slave;

pub use error::{Error, Result};
