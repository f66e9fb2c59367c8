//! QSPI bus wiring
//!
//! A named bundle of signal handles, nothing more. Both roles hold a
//! `QspiBus` whose handles alias the same underlying signals; the clone
//! is cheap because handles are themselves lightweight references into
//! the engine.

/// Signal bundle for one QSPI bus.
///
/// Invariant: exactly four data lines. `io[k]` carries bit `k` of every
/// transferred nibble - the mapping is protocol-fixed and both roles
/// assume it.
#[derive(Clone)]
pub struct QspiBus<S> {
    /// Serial clock
    pub sclk: S,
    /// Chip select
    pub cs: S,
    /// Bidirectional data lines io0..io3
    pub io: [S; 4],
}

impl<S> QspiBus<S> {
    /// Bundle the given handles into a bus.
    pub fn new(sclk: S, cs: S, io: [S; 4]) -> Self {
        Self { sclk, cs, io }
    }
}
