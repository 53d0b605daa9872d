//! Event driver interface.
//!
//! The scheduler does not block or keep time itself; it delegates both to a
//! per-thread [`EventDriver`]. A driver owns the blocking event loop, issues
//! timers, and can be woken from other threads. The built-in [`ParkDriver`]
//! backs timers with a deadline registry and parks the thread between
//! events; an I/O readiness multiplexer can be substituted through
//! [`set_driver_factory`].

mod park;

pub use park::ParkDriver;

use crate::error::DriverError;
use crate::sync::ManualEvent;

use parking_lot::Mutex;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

/// Outcome of driving the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStatus {
    /// [`EventDriver::exit_event_loop`] was requested.
    Exited,
    /// Nothing is left to wait for: no armed timers, no suspended tasks.
    NoEvents,
    /// Events were delivered and the loop can be driven again.
    Ran,
    /// The driver failed.
    Error(DriverError),
}

/// What the scheduler reports back to the driver from an idle tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleStatus {
    /// More runnable work is queued; do not block.
    Busy,
    /// Tasks are suspended waiting for events; block until one arrives.
    Waiting,
    /// No live tasks remain.
    Drained,
}

/// Callback invoked by the driver whenever the loop goes idle.
pub type IdleCallback = Box<dyn FnMut() -> IdleStatus>;

/// Callback attached to a timer, invoked on the driver's thread when it fires.
pub type TimerCallback = Box<dyn FnMut()>;

/// Cross-thread wakeup handle for a driver's blocked event loop.
pub trait RemoteWake: Send + Sync {
    /// Interrupt the driver's blocking wait, if any.
    fn wakeup(&self);
}

/// Contract between the runtime and the per-thread event driver.
///
/// Drivers are per-thread singletons reached through [`event_driver`]; all
/// methods except [`EventDriver::remote`] are called on the owning thread.
pub trait EventDriver {
    /// Run the event loop until exit is requested or no events remain.
    fn run_event_loop(&self) -> LoopStatus;

    /// Run a single event-delivery round, blocking for it if necessary.
    fn run_event_loop_once(&self) -> LoopStatus;

    /// Non-blocking drain of due events. Returns `false` iff exit was
    /// requested.
    fn process_events(&self) -> bool;

    /// Request the loop to exit. Idempotent.
    fn exit_event_loop(&self);

    /// Install the scheduler's idle hook.
    fn set_idle_callback(&self, callback: Option<IdleCallback>);

    /// Create an unarmed timer.
    fn create_timer(&self, callback: Option<TimerCallback>) -> Timer;

    /// Whether any timer is currently armed.
    fn timers_armed(&self) -> bool;

    /// Cross-thread wakeup handle for this driver.
    fn remote(&self) -> Arc<dyn RemoteWake>;

    /// Create a cross-thread manual-reset event.
    fn create_manual_event(&self) -> ManualEvent {
        ManualEvent::new()
    }
}

/// Driver-side representation of a timer.
pub(crate) trait TimerBackend {
    fn rearm(&self, timeout: Duration, periodic: bool);
    fn stop(&self);
    fn armed(&self) -> bool;
    /// Number of times the timer has fired since creation.
    fn fire_count(&self) -> u64;
    fn register_waiter(&self, waker: &Waker);
}

/// Handle to a driver-issued timer.
///
/// Dropping the handle stops the timer; the driver keeps only a weak
/// reference to it.
#[derive(Clone)]
pub struct Timer {
    backend: Rc<dyn TimerBackend>,
}

impl Timer {
    pub(crate) fn new(backend: Rc<dyn TimerBackend>) -> Self {
        Self { backend }
    }

    /// Arm (or re-arm) the timer to fire after `timeout`, and every
    /// `timeout` thereafter when `periodic`.
    pub fn rearm(&self, timeout: Duration, periodic: bool) {
        self.backend.rearm(timeout, periodic);
    }

    /// Disarm the timer. Pending waiters stay suspended until the timer is
    /// armed again or they are interrupted.
    pub fn stop(&self) {
        self.backend.stop();
    }

    /// Whether the timer is currently armed.
    pub fn armed(&self) -> bool {
        self.backend.armed()
    }

    /// Suspend the calling task until the timer next fires.
    ///
    /// Resolves to `Err(TaskError::Interrupted)` if the task is interrupted
    /// while waiting.
    pub fn wait(&self) -> TimerWait {
        TimerWait {
            backend: self.backend.clone(),
            observed: self.backend.fire_count(),
        }
    }
}

/// Future returned by [`Timer::wait`].
pub struct TimerWait {
    backend: Rc<dyn TimerBackend>,
    observed: u64,
}

impl Future for TimerWait {
    type Output = crate::error::TaskResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(err) = crate::scheduler::take_injected_error() {
            return Poll::Ready(Err(err));
        }
        if self.backend.fire_count() > self.observed {
            return Poll::Ready(Ok(()));
        }
        self.backend.register_waiter(cx.waker());
        Poll::Pending
    }
}

/// Factory producing the driver for each new thread.
pub type DriverFactory = fn() -> Rc<dyn EventDriver>;

fn default_driver_factory() -> Rc<dyn EventDriver> {
    Rc::new(ParkDriver::new())
}

static DRIVER_FACTORY: Mutex<DriverFactory> = Mutex::new(default_driver_factory);

thread_local! {
    static DRIVER: RefCell<Option<Rc<dyn EventDriver>>> = const { RefCell::new(None) };
}

/// Install the driver factory used by threads that have not yet touched
/// their driver. Threads with an initialized driver are unaffected.
pub fn set_driver_factory(factory: DriverFactory) {
    *DRIVER_FACTORY.lock() = factory;
}

/// The calling thread's event driver, created on first use.
pub fn event_driver() -> Rc<dyn EventDriver> {
    DRIVER.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(driver) = slot.as_ref() {
            return driver.clone();
        }
        let driver = (*DRIVER_FACTORY.lock())();
        *slot = Some(driver.clone());
        driver
    })
}
