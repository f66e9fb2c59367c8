//! The cooperative scheduler
//!
//! Tasks are plain futures; the only things they can wait on are signal
//! edges and virtual-time delays, so the scheduler's event loop is:
//! poll everything runnable, apply the deposited signal writes, fire
//! edge watchers (another delta at the same timestamp), and only when a
//! timestamp is fully quiescent advance virtual time to the earliest
//! armed timer.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

use log::trace;
use rqspi_core::bus::QspiBus;
use rqspi_core::signal::{Level, SignalValue, Timebase};

use crate::signal::SimSignal;

/// Edge kinds a watcher can be armed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EdgeKind {
    Rising,
    Falling,
}

/// A deposited signal operation, applied at the end of the delta cycle.
pub(crate) enum DriveOp {
    Drive(Level),
    Release,
}

/// One armed edge wait. Fired exactly once, then discarded.
pub(crate) struct EdgeWatcher {
    pub(crate) kind: EdgeKind,
    pub(crate) fired: Rc<Cell<bool>>,
    pub(crate) waker: Waker,
}

pub(crate) struct SignalState {
    pub(crate) name: String,
    pub(crate) value: SignalValue,
    pub(crate) watchers: Vec<EdgeWatcher>,
}

struct TimerEntry {
    deadline: u64,
    seq: u64,
    waker: Waker,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // Reversed so the BinaryHeap pops the earliest deadline first;
    // sequence numbers keep equal deadlines in arming order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

type TaskFuture = Pin<Box<dyn Future<Output = ()>>>;

pub(crate) struct SimCore {
    pub(crate) now: u64,
    next_task_id: usize,
    timer_seq: u64,
    tasks: HashMap<usize, TaskFuture>,
    timers: BinaryHeap<TimerEntry>,
    pub(crate) signals: Vec<SignalState>,
    pub(crate) pending: Vec<(usize, DriveOp)>,
}

struct TaskWaker {
    ready: Arc<Mutex<VecDeque<usize>>>,
    id: usize,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.ready.lock().unwrap().push_back(self.id);
    }
}

/// The simulation engine.
///
/// Owns every signal, task and timer of one simulated session. Not
/// thread-safe by design: the whole point is deterministic cooperative
/// scheduling on one thread.
pub struct Simulator {
    core: Rc<RefCell<SimCore>>,
    ready: Arc<Mutex<VecDeque<usize>>>,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    /// Create an empty simulation at t = 0.
    pub fn new() -> Self {
        Self {
            core: Rc::new(RefCell::new(SimCore {
                now: 0,
                next_task_id: 0,
                timer_seq: 0,
                tasks: HashMap::new(),
                timers: BinaryHeap::new(),
                signals: Vec::new(),
                pending: Vec::new(),
            })),
            ready: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// A cheap cloneable handle usable from inside tasks (delays,
    /// current time).
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            core: self.core.clone(),
        }
    }

    /// Create a named signal, initially [`SignalValue::HighZ`].
    pub fn signal(&self, name: &str) -> SimSignal {
        let mut core = self.core.borrow_mut();
        let id = core.signals.len();
        core.signals.push(SignalState {
            name: name.to_string(),
            value: SignalValue::HighZ,
            watchers: Vec::new(),
        });
        SimSignal::new(self.core.clone(), id)
    }

    /// Create the six signals of one QSPI bus, named `<prefix>_sclk`,
    /// `<prefix>_cs` and `<prefix>_io0` .. `<prefix>_io3`, and bundle
    /// them into wiring. Clone the bundle to attach both roles to the
    /// same bus.
    pub fn qspi_bus(&self, prefix: &str) -> QspiBus<SimSignal> {
        QspiBus::new(
            self.signal(&format!("{prefix}_sclk")),
            self.signal(&format!("{prefix}_cs")),
            [
                self.signal(&format!("{prefix}_io0")),
                self.signal(&format!("{prefix}_io1")),
                self.signal(&format!("{prefix}_io2")),
                self.signal(&format!("{prefix}_io3")),
            ],
        )
    }

    /// Add a task to the simulation. Tasks spawned before [`run`] are
    /// polled in spawn order, so watchers arm before later tasks drive.
    ///
    /// [`run`]: Simulator::run
    pub fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        let id = {
            let mut core = self.core.borrow_mut();
            let id = core.next_task_id;
            core.next_task_id += 1;
            core.tasks.insert(id, Box::pin(task));
            id
        };
        self.ready.lock().unwrap().push_back(id);
    }

    /// Drive the simulation until `root` completes and return its
    /// output. Other tasks (clocks, device models) are simply abandoned
    /// at that point.
    ///
    /// # Panics
    ///
    /// Panics when the event queue runs dry while `root` is still
    /// pending - the simulated session has deadlocked (typically a wait
    /// for an edge on a clock nobody generates).
    pub fn run<R: 'static>(&self, root: impl Future<Output = R> + 'static) -> R {
        let slot: Rc<RefCell<Option<R>>> = Rc::new(RefCell::new(None));
        let out = slot.clone();
        self.spawn(async move {
            *out.borrow_mut() = Some(root.await);
        });

        loop {
            loop {
                let next = self.ready.lock().unwrap().pop_front();
                match next {
                    Some(id) => self.poll_task(id),
                    None => break,
                }
            }
            if let Some(result) = slot.borrow_mut().take() {
                return result;
            }
            if self.apply_writes() {
                continue;
            }
            if !self.advance_time() {
                panic!(
                    "simulation stalled at {} ns: no runnable task, pending write, or armed timer",
                    self.core.borrow().now
                );
            }
        }
    }

    fn poll_task(&self, id: usize) {
        let task = self.core.borrow_mut().tasks.remove(&id);
        let Some(mut task) = task else {
            // stale wake for a task that already completed
            return;
        };
        let waker = Waker::from(Arc::new(TaskWaker {
            ready: self.ready.clone(),
            id,
        }));
        let mut cx = Context::from_waker(&waker);
        if task.as_mut().poll(&mut cx).is_pending() {
            self.core.borrow_mut().tasks.insert(id, task);
        }
    }

    /// Apply deposited writes and fire matching edge watchers. Returns
    /// true when any watcher fired, i.e. another delta cycle is due at
    /// the same timestamp.
    fn apply_writes(&self) -> bool {
        let mut core = self.core.borrow_mut();
        if core.pending.is_empty() {
            return false;
        }
        let pending = std::mem::take(&mut core.pending);
        let now = core.now;
        let mut fired = false;
        for (id, op) in pending {
            let new = match op {
                DriveOp::Drive(level) => SignalValue::from(level),
                DriveOp::Release => SignalValue::HighZ,
            };
            let sig = &mut core.signals[id];
            let old = sig.value;
            if old == new {
                continue;
            }
            sig.value = new;
            trace!("{} = {} @ {} ns", sig.name, new, now);
            let mut kept = Vec::with_capacity(sig.watchers.len());
            for watcher in sig.watchers.drain(..) {
                let hit = match watcher.kind {
                    EdgeKind::Rising => new == SignalValue::High,
                    EdgeKind::Falling => new == SignalValue::Low,
                };
                if hit {
                    watcher.fired.set(true);
                    watcher.waker.wake();
                    fired = true;
                } else {
                    kept.push(watcher);
                }
            }
            sig.watchers = kept;
        }
        fired
    }

    /// Jump virtual time to the earliest armed timer and wake it (and
    /// any others sharing the deadline). Returns false when no timer is
    /// armed.
    fn advance_time(&self) -> bool {
        let mut core = self.core.borrow_mut();
        let Some(deadline) = core.timers.peek().map(|e| e.deadline) else {
            return false;
        };
        core.now = deadline;
        trace!("t -> {} ns", deadline);
        while core
            .timers
            .peek()
            .is_some_and(|e| e.deadline <= deadline)
        {
            if let Some(entry) = core.timers.pop() {
                entry.waker.wake();
            }
        }
        true
    }
}

/// Cloneable in-task handle to the simulation: virtual-time delays and
/// the current timestamp. Implements [`Timebase`] for the protocol
/// engine.
#[derive(Clone)]
pub struct SimHandle {
    pub(crate) core: Rc<RefCell<SimCore>>,
}

impl SimHandle {
    /// Current virtual time in nanoseconds.
    pub fn now_ns(&self) -> u64 {
        self.core.borrow().now
    }
}

impl Timebase for SimHandle {
    async fn delay_ns(&self, ns: u64) {
        Delay {
            core: self.core.clone(),
            ns,
            deadline: None,
        }
        .await
    }
}

/// Virtual-time delay future.
pub(crate) struct Delay {
    pub(crate) core: Rc<RefCell<SimCore>>,
    pub(crate) ns: u64,
    pub(crate) deadline: Option<u64>,
}

impl Future for Delay {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let mut core = this.core.borrow_mut();
        match this.deadline {
            None => {
                if this.ns == 0 {
                    return Poll::Ready(());
                }
                let deadline = core.now + this.ns;
                let seq = core.timer_seq;
                core.timer_seq += 1;
                core.timers.push(TimerEntry {
                    deadline,
                    seq,
                    waker: cx.waker().clone(),
                });
                this.deadline = Some(deadline);
                Poll::Pending
            }
            Some(deadline) => {
                if core.now >= deadline {
                    Poll::Ready(())
                } else {
                    Poll::Pending
                }
            }
        }
    }
}
