//! Simulated tri-state signals
//!
//! A [`SimSignal`] is a cheap handle into the simulator's signal table.
//! Drives and releases are deposits - they take effect at the end of the
//! current delta cycle - while `sample` always reads the applied value.
//! Edge waits arm a one-shot watcher that the scheduler fires when the
//! matching transition is applied.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use log::trace;
use rqspi_core::signal::{Level, SignalHandle, SignalValue};

use crate::simulator::{DriveOp, EdgeKind, EdgeWatcher, SimCore};

/// Handle to one simulated signal.
///
/// Clones alias the same signal; this is how both bus roles share one
/// set of wiring.
#[derive(Clone)]
pub struct SimSignal {
    core: Rc<RefCell<SimCore>>,
    id: usize,
}

impl SimSignal {
    pub(crate) fn new(core: Rc<RefCell<SimCore>>, id: usize) -> Self {
        Self { core, id }
    }

    pub(crate) fn core(&self) -> Rc<RefCell<SimCore>> {
        self.core.clone()
    }

    /// The name this signal was created with.
    pub fn name(&self) -> String {
        self.core.borrow().signals[self.id].name.clone()
    }

    fn deposit(&self, op: DriveOp) {
        self.core.borrow_mut().pending.push((self.id, op));
    }

    fn edge(&self, kind: EdgeKind) -> EdgeWait {
        EdgeWait {
            core: self.core.clone(),
            id: self.id,
            kind,
            fired: Rc::new(Cell::new(false)),
            armed: false,
        }
    }
}

impl SignalHandle for SimSignal {
    fn drive(&self, level: Level) {
        trace!(
            "{} <- {}",
            self.core.borrow().signals[self.id].name,
            SignalValue::from(level)
        );
        self.deposit(DriveOp::Drive(level));
    }

    fn release(&self) {
        trace!("{} <- Z", self.core.borrow().signals[self.id].name);
        self.deposit(DriveOp::Release);
    }

    fn sample(&self) -> SignalValue {
        self.core.borrow().signals[self.id].value
    }

    async fn rising_edge(&self) {
        self.edge(EdgeKind::Rising).await
    }

    async fn falling_edge(&self) {
        self.edge(EdgeKind::Falling).await
    }
}

/// One-shot edge wait future.
struct EdgeWait {
    core: Rc<RefCell<SimCore>>,
    id: usize,
    kind: EdgeKind,
    fired: Rc<Cell<bool>>,
    armed: bool,
}

impl Future for EdgeWait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.fired.get() {
            return Poll::Ready(());
        }
        if !this.armed {
            this.core.borrow_mut().signals[this.id]
                .watchers
                .push(EdgeWatcher {
                    kind: this.kind,
                    fired: this.fired.clone(),
                    waker: cx.waker().clone(),
                });
            this.armed = true;
        }
        Poll::Pending
    }
}
