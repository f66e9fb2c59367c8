//! rqspi-sim - Simulation engine for the rqspi protocol stack
//!
//! A single-threaded cooperative scheduler with virtual time, tri-state
//! signals and a clock generator: the "external collaborator" side of
//! the `rqspi-core` signal interface, usable without any hardware or HDL
//! simulator.
//!
//! Two rules make concurrent bus roles deterministic:
//!
//! - **Deferred deposits**: a `drive`/`release` does not take effect
//!   immediately. Writes are buffered and applied when every task
//!   runnable at the current timestamp has yielded (the end of a delta
//!   cycle). A task woken by a clock edge therefore samples the values
//!   driven *before* that edge, even if another task woken by the same
//!   edge is already driving new ones.
//! - **Event-queue exhaustion is fatal**: when no task is runnable, no
//!   write is pending and no timer is armed, nothing can ever happen
//!   again; the simulator panics with a diagnostic instead of hanging
//!   the process.
//!
//! # Example
//!
//! ```
//! use rqspi_core::signal::{SignalHandle, Timebase};
//! use rqspi_sim::{Clock, Simulator};
//!
//! let sim = Simulator::new();
//! let sclk = sim.signal("sclk");
//! sim.spawn(Clock::new(sclk.clone(), 40).run());
//! let handle = sim.handle();
//! let t = sim.run(async move {
//!     sclk.rising_edge().await;
//!     handle.now_ns()
//! });
//! assert_eq!(t, 20);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod clock;
pub mod signal;
pub mod simulator;

pub use clock::Clock;
pub use signal::SimSignal;
pub use simulator::{SimHandle, Simulator};
