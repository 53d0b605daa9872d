//! Reference event driver: deadline-registry timers plus condvar parking.
//!
//! Carries timers, manual events and scheduler wakeups without any OS I/O
//! backend, which is all the runtime itself needs. Readiness-based drivers
//! plug in through [`set_driver_factory`](super::set_driver_factory).

use super::{
    EventDriver, IdleCallback, IdleStatus, LoopStatus, RemoteWake, Timer, TimerBackend,
    TimerCallback,
};
use crate::error::DriverError;

use parking_lot::{Condvar, Mutex};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::task::Waker;
use std::time::{Duration, Instant};
use tracing::trace;

/// Longest uninterrupted park. Bounded so process signals and other
/// out-of-band state changes are observed promptly even without a wakeup.
const MAX_PARK: Duration = Duration::from_millis(500);

struct ParkSignal {
    pending: Mutex<bool>,
    condvar: Condvar,
}

impl ParkSignal {
    fn new() -> Self {
        Self {
            pending: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Block until woken or until `deadline` (capped at [`MAX_PARK`]).
    /// Consumes the pending wakeup.
    fn park(&self, deadline: Option<Instant>) {
        let cap = Instant::now() + MAX_PARK;
        let deadline = deadline.map_or(cap, |d| d.min(cap));
        let mut pending = self.pending.lock();
        while !*pending {
            if self.condvar.wait_until(&mut pending, deadline).timed_out() {
                break;
            }
        }
        *pending = false;
    }
}

impl RemoteWake for ParkSignal {
    fn wakeup(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.condvar.notify_one();
    }
}

struct ParkTimer {
    deadline: Cell<Option<Instant>>,
    period: Cell<Option<Duration>>,
    callback: RefCell<Option<TimerCallback>>,
    waiters: RefCell<Vec<Waker>>,
    fires: Cell<u64>,
}

impl TimerBackend for ParkTimer {
    fn rearm(&self, timeout: Duration, periodic: bool) {
        self.deadline.set(Some(Instant::now() + timeout));
        self.period.set(periodic.then_some(timeout));
    }

    fn stop(&self) {
        self.deadline.set(None);
        self.period.set(None);
    }

    fn armed(&self) -> bool {
        self.deadline.get().is_some()
    }

    fn fire_count(&self) -> u64 {
        self.fires.get()
    }

    fn register_waiter(&self, waker: &Waker) {
        let mut waiters = self.waiters.borrow_mut();
        if !waiters.iter().any(|w| w.will_wake(waker)) {
            waiters.push(waker.clone());
        }
    }
}

/// The built-in driver. One per thread; see [`event_driver`](super::event_driver).
pub struct ParkDriver {
    timers: RefCell<Vec<Weak<ParkTimer>>>,
    idle: RefCell<Option<IdleCallback>>,
    exit: Cell<bool>,
    running: Cell<bool>,
    signal: Arc<ParkSignal>,
}

impl ParkDriver {
    pub fn new() -> Self {
        Self {
            timers: RefCell::new(Vec::new()),
            idle: RefCell::new(None),
            exit: Cell::new(false),
            running: Cell::new(false),
            signal: Arc::new(ParkSignal::new()),
        }
    }

    /// Fire every timer whose deadline has passed. Returns whether any fired.
    fn fire_due_timers(&self) -> bool {
        let now = Instant::now();
        let due: Vec<Rc<ParkTimer>> = {
            let mut timers = self.timers.borrow_mut();
            timers.retain(|t| t.strong_count() > 0);
            timers
                .iter()
                .filter_map(Weak::upgrade)
                .filter(|t| t.deadline.get().is_some_and(|d| d <= now))
                .collect()
        };

        for timer in &due {
            timer.fires.set(timer.fires.get() + 1);
            match timer.period.get() {
                Some(period) => timer.deadline.set(Some(now + period)),
                None => timer.deadline.set(None),
            }
            for waker in timer.waiters.borrow_mut().drain(..) {
                waker.wake();
            }
            // The callback may run tasks, which may re-enter the driver;
            // no registry borrow is held here.
            if let Some(callback) = timer.callback.borrow_mut().as_mut() {
                callback();
            }
        }
        !due.is_empty()
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .filter_map(|t| t.deadline.get())
            .min()
    }

    fn run_idle(&self) -> IdleStatus {
        let callback = self.idle.borrow_mut().take();
        let Some(mut callback) = callback else {
            return IdleStatus::Drained;
        };
        let status = callback();
        let mut slot = self.idle.borrow_mut();
        if slot.is_none() {
            *slot = Some(callback);
        }
        status
    }
}

impl Default for ParkDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDriver for ParkDriver {
    fn run_event_loop(&self) -> LoopStatus {
        if self.running.replace(true) {
            return LoopStatus::Error(DriverError::AlreadyRunning);
        }
        let status = loop {
            self.fire_due_timers();
            let idle = self.run_idle();
            if self.exit.get() {
                break LoopStatus::Exited;
            }
            match idle {
                IdleStatus::Busy => continue,
                IdleStatus::Waiting => self.signal.park(self.next_deadline()),
                IdleStatus::Drained => match self.next_deadline() {
                    Some(deadline) => self.signal.park(Some(deadline)),
                    None => break LoopStatus::NoEvents,
                },
            }
        };
        trace!(?status, "event loop finished");
        self.running.set(false);
        self.exit.set(false);
        status
    }

    fn run_event_loop_once(&self) -> LoopStatus {
        if self.exit.replace(false) {
            return LoopStatus::Exited;
        }
        self.fire_due_timers();
        let idle = self.run_idle();
        if self.exit.replace(false) {
            return LoopStatus::Exited;
        }
        match idle {
            IdleStatus::Busy => LoopStatus::Ran,
            IdleStatus::Waiting | IdleStatus::Drained => {
                let deadline = self.next_deadline();
                if idle == IdleStatus::Drained && deadline.is_none() {
                    return LoopStatus::NoEvents;
                }
                self.signal.park(deadline);
                self.fire_due_timers();
                self.run_idle();
                if self.exit.replace(false) {
                    LoopStatus::Exited
                } else {
                    LoopStatus::Ran
                }
            }
        }
    }

    fn process_events(&self) -> bool {
        self.fire_due_timers();
        !self.exit.get()
    }

    fn exit_event_loop(&self) {
        self.exit.set(true);
        self.signal.wakeup();
    }

    fn set_idle_callback(&self, callback: Option<IdleCallback>) {
        *self.idle.borrow_mut() = callback;
    }

    fn create_timer(&self, callback: Option<TimerCallback>) -> Timer {
        let timer = Rc::new(ParkTimer {
            deadline: Cell::new(None),
            period: Cell::new(None),
            callback: RefCell::new(callback),
            waiters: RefCell::new(Vec::new()),
            fires: Cell::new(0),
        });
        self.timers.borrow_mut().push(Rc::downgrade(&timer));
        Timer::new(timer)
    }

    fn timers_armed(&self) -> bool {
        self.timers
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .any(|t| t.deadline.get().is_some())
    }

    fn remote(&self) -> Arc<dyn RemoteWake> {
        self.signal.clone()
    }
}
