//! Per-thread scheduler core.
//!
//! Each thread that runs tasks owns one `Scheduler`, reached lazily through
//! a thread-local slot. The scheduler keeps the slot table and reuse pool,
//! the yielded-task FIFO drained on idle ticks, and a thread-safe ready
//! queue fed by wakers (possibly from other threads). The blocking parts are
//! delegated to the thread's [`EventDriver`]; the scheduler hooks into it as
//! the idle callback.

use crate::driver::{event_driver, EventDriver, IdleStatus, LoopStatus, RemoteWake, Timer};
use crate::error::{DriverError, TaskError, TaskResult};
use crate::task::{TaskEvent, TaskFuture, TaskHandle, TaskSlot, TaskState};

use parking_lot::Mutex;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::time::Duration;
use tracing::{debug, error, trace};

/// Default interval between opportunistic pool reclamations.
const DEFAULT_RECLAIM_INTERVAL: Duration = Duration::from_secs(2);

/// Pooled slots kept resident through a reclamation pass.
const POOL_KEEP: usize = 16;

/// Ready-task queue. Shared with wakers, which may live on other threads.
pub(crate) struct ReadyQueue {
    queue: Mutex<VecDeque<(usize, u64)>>,
    remote: Arc<dyn RemoteWake>,
}

impl ReadyQueue {
    fn push(&self, id: usize, generation: u64) {
        self.queue.lock().push_back((id, generation));
        self.remote.wakeup();
    }

    fn pop(&self) -> Option<(usize, u64)> {
        self.queue.lock().pop_front()
    }

    fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// Waker that re-queues its task on the owning thread's ready queue.
struct TaskWaker {
    ready: Arc<ReadyQueue>,
    id: usize,
    generation: u64,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.ready.push(self.id, self.generation);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.ready.push(self.id, self.generation);
    }
}

type IdleHandler = Box<dyn FnMut() -> bool>;
type EventHandler = Box<dyn FnMut(TaskEvent, &TaskHandle)>;

pub(crate) struct Scheduler {
    driver: Rc<dyn EventDriver>,
    slots: RefCell<Vec<Rc<TaskSlot>>>,
    pool: RefCell<Vec<usize>>,
    yielded: RefCell<VecDeque<TaskHandle>>,
    ready: Arc<ReadyQueue>,
    idle_handler: RefCell<Option<IdleHandler>>,
    event_handler: RefCell<Option<EventHandler>>,
    current: Cell<Option<usize>>,
    live: Cell<usize>,
    reclaim_timer: RefCell<Option<Timer>>,
    reclaim_interval: Cell<Duration>,
    skip_reclaim_rearm: Cell<bool>,
}

thread_local! {
    static SCHEDULER: RefCell<Option<Rc<Scheduler>>> = const { RefCell::new(None) };
}

/// The calling thread's scheduler, created (and hooked into the driver) on
/// first use.
pub(crate) fn scheduler() -> Rc<Scheduler> {
    let existing = SCHEDULER.with(|slot| slot.borrow().clone());
    if let Some(sched) = existing {
        return sched;
    }
    let driver = event_driver();
    let sched = Rc::new(Scheduler {
        ready: Arc::new(ReadyQueue {
            queue: Mutex::new(VecDeque::new()),
            remote: driver.remote(),
        }),
        driver,
        slots: RefCell::new(Vec::new()),
        pool: RefCell::new(Vec::new()),
        yielded: RefCell::new(VecDeque::new()),
        idle_handler: RefCell::new(None),
        event_handler: RefCell::new(None),
        current: Cell::new(None),
        live: Cell::new(0),
        reclaim_timer: RefCell::new(None),
        reclaim_interval: Cell::new(DEFAULT_RECLAIM_INTERVAL),
        skip_reclaim_rearm: Cell::new(false),
    });
    let weak = Rc::downgrade(&sched);
    sched.driver.set_idle_callback(Some(Box::new(move || match weak.upgrade() {
        Some(sched) => sched.notify_idle(),
        None => IdleStatus::Drained,
    })));
    SCHEDULER.with(|slot| *slot.borrow_mut() = Some(sched.clone()));
    sched
}

impl Scheduler {
    /// Pop a reusable slot, growing the table by doubling when exhausted.
    fn acquire_slot(&self) -> Rc<TaskSlot> {
        let id = {
            let mut pool = self.pool.borrow_mut();
            if pool.is_empty() {
                let mut slots = self.slots.borrow_mut();
                let grow = slots.len().max(1);
                for _ in 0..grow {
                    let id = slots.len();
                    slots.push(TaskSlot::new(id));
                    pool.push(id);
                }
                trace!(total = slots.len(), "grew task pool");
            }
            pool.pop().expect("pool refilled above")
        };
        self.slots.borrow()[id].clone()
    }

    pub(crate) fn run_task(&self, future: TaskFuture) -> TaskHandle {
        let slot = self.acquire_slot();
        slot.generation.set(slot.generation.get() + 1);
        *slot.future.borrow_mut() = Some(future);
        slot.injected.borrow_mut().take();
        slot.running.set(true);
        self.live.set(self.live.get() + 1);
        let handle = slot.handle();
        self.emit_event(TaskEvent::Start, &handle);
        // First dispatch happens synchronously: run_task returns only after
        // the body completed or suspended for the first time.
        self.resume_slot(&slot, handle.generation);
        handle
    }

    /// Resume a suspended task, optionally injecting an error it will
    /// observe at its suspension point. Stale handles are ignored.
    pub(crate) fn resume_task(&self, handle: &TaskHandle, injected: Option<TaskError>) {
        let Some(slot) = handle.slot.upgrade() else {
            return;
        };
        if !slot.is_live(handle.generation) {
            return;
        }
        if let Some(err) = injected {
            *slot.injected.borrow_mut() = Some(err);
        }
        self.resume_slot(&slot, handle.generation);
    }

    fn resume_slot(&self, slot: &Rc<TaskSlot>, generation: u64) {
        if slot.state.get() != TaskState::Hold {
            return;
        }
        let Some(mut future) = slot.future.borrow_mut().take() else {
            return;
        };
        slot.state.set(TaskState::Exec);
        let waker = Waker::from(Arc::new(TaskWaker {
            ready: self.ready.clone(),
            id: slot.id,
            generation,
        }));
        let mut cx = Context::from_waker(&waker);
        let previous = self.current.replace(Some(slot.id));
        let result = future.as_mut().poll(&mut cx);
        self.current.set(previous);
        match result {
            Poll::Pending => {
                *slot.future.borrow_mut() = Some(future);
                slot.state.set(TaskState::Hold);
            }
            Poll::Ready(outcome) => {
                let handle = TaskHandle {
                    slot: Rc::downgrade(slot),
                    generation,
                };
                match outcome {
                    Ok(()) => self.emit_event(TaskEvent::End, &handle),
                    Err(err) => {
                        // The task boundary swallows errors; the scheduler
                        // must survive any body.
                        error!(task = slot.id, %err, "task terminated with error");
                        self.emit_event(TaskEvent::Fail, &handle);
                    }
                }
                self.finish_slot(slot);
            }
        }
    }

    fn finish_slot(&self, slot: &Rc<TaskSlot>) {
        slot.state.set(TaskState::Term);
        slot.running.set(false);
        slot.injected.borrow_mut().take();
        slot.locals.borrow_mut().reset();
        for waker in slot.joiners.borrow_mut().drain(..) {
            waker.wake();
        }
        self.live.set(self.live.get() - 1);
        // Term is transient: the slot is immediately reusable.
        slot.state.set(TaskState::Hold);
        self.pool.borrow_mut().push(slot.id);
    }

    /// Idle tick, invoked by the driver between event deliveries.
    pub(crate) fn notify_idle(self: &Rc<Self>) -> IdleStatus {
        #[cfg(unix)]
        if crate::signals::take_exit_request() {
            tracing::info!("termination signal received, shutting down");
            crate::worker::shutdown_worker_threads();
            self.driver.exit_event_loop();
        }
        let mut busy_hint = false;
        loop {
            busy_hint = self.run_idle_handler() || busy_hint;
            let progressed = self.drain_ready() | self.drain_yielded();
            if progressed {
                continue;
            }
            if !self.driver.process_events() {
                trace!("exit requested during idle processing");
            }
            break;
        }
        self.maintain_reclaim_timer();
        if busy_hint || !self.ready.is_empty() || !self.yielded.borrow().is_empty() {
            IdleStatus::Busy
        } else if self.live.get() > 0 {
            IdleStatus::Waiting
        } else {
            IdleStatus::Drained
        }
    }

    fn run_idle_handler(&self) -> bool {
        let handler = self.idle_handler.borrow_mut().take();
        let Some(mut handler) = handler else {
            return false;
        };
        let again = handler();
        let mut slot = self.idle_handler.borrow_mut();
        if slot.is_none() {
            *slot = Some(handler);
        }
        again
    }

    fn drain_ready(&self) -> bool {
        let mut any = false;
        while let Some((id, generation)) = self.ready.pop() {
            // The slot may have been reclaimed since the waker was created.
            let Some(slot) = self.slots.borrow().get(id).cloned() else {
                continue;
            };
            if slot.generation.get() == generation && slot.state.get() == TaskState::Hold {
                any = true;
                self.resume_slot(&slot, generation);
            }
        }
        any
    }

    /// Drain the current batch of yielded tasks, FIFO. Tasks yielding again
    /// land in the next batch.
    fn drain_yielded(&self) -> bool {
        let batch = std::mem::take(&mut *self.yielded.borrow_mut());
        let mut any = false;
        for handle in batch {
            let Some(slot) = handle.slot.upgrade() else {
                continue;
            };
            if slot.is_live(handle.generation) && slot.state.get() == TaskState::Hold {
                any = true;
                self.resume_slot(&slot, handle.generation);
            }
        }
        any
    }

    /// Keep the reclaim timer armed while tasks are live; stop it otherwise
    /// so an empty loop can terminate. A reclamation pass suppresses exactly
    /// one rearm to avoid firing back-to-back.
    fn maintain_reclaim_timer(self: &Rc<Self>) {
        if self.live.get() == 0 {
            if let Some(timer) = self.reclaim_timer.borrow().as_ref() {
                timer.stop();
            }
            return;
        }
        if self.skip_reclaim_rearm.replace(false) {
            return;
        }
        if self.reclaim_timer.borrow().is_none() {
            let weak = Rc::downgrade(self);
            let timer = self.driver.create_timer(Some(Box::new(move || {
                if let Some(sched) = weak.upgrade() {
                    sched.reclaim();
                }
            })));
            *self.reclaim_timer.borrow_mut() = Some(timer);
        }
        if let Some(timer) = self.reclaim_timer.borrow().as_ref() {
            timer.rearm(self.reclaim_interval.get(), false);
        }
    }

    /// Opportunistic reclamation: drop surplus pooled slots and shrink the
    /// queues.
    fn reclaim(&self) {
        let mut slots = self.slots.borrow_mut();
        let mut pool = self.pool.borrow_mut();
        let before = slots.len();
        while slots.len() > POOL_KEEP {
            let last = slots.len() - 1;
            let Some(position) = pool.iter().position(|&id| id == last) else {
                break;
            };
            pool.swap_remove(position);
            slots.pop();
        }
        pool.shrink_to_fit();
        slots.shrink_to_fit();
        if slots.len() < before {
            debug!(dropped = before - slots.len(), "reclaimed pooled tasks");
        }
        self.skip_reclaim_rearm.set(true);
    }

    pub(crate) fn emit_event(&self, event: TaskEvent, handle: &TaskHandle) {
        let handler = self.event_handler.borrow_mut().take();
        let Some(mut handler) = handler else {
            return;
        };
        handler(event, handle);
        let mut slot = self.event_handler.borrow_mut();
        if slot.is_none() {
            *slot = Some(handler);
        }
    }

    pub(crate) fn current_handle(&self) -> Option<TaskHandle> {
        let id = self.current.get()?;
        Some(self.slots.borrow()[id].handle())
    }

    fn run_event_loop(self: &Rc<Self>) -> i32 {
        #[cfg(unix)]
        crate::signals::install();
        // Drain startup-yielded tasks and honour an exit requested before
        // the loop even started.
        let _ = self.notify_idle();
        match self.driver.run_event_loop() {
            LoopStatus::Exited | LoopStatus::NoEvents | LoopStatus::Ran => 0,
            LoopStatus::Error(err) => {
                error!(%err, "event loop failed");
                1
            }
        }
    }
}

/// The currently executing task's slot, if any.
pub(crate) fn current_task_slot() -> Option<Rc<TaskSlot>> {
    let sched = SCHEDULER.with(|slot| slot.borrow().clone())?;
    let id = sched.current.get()?;
    let result = sched.slots.borrow().get(id).cloned();
    result
}

/// Consume the current task's injected error, if any. Suspension-point
/// futures call this first on every poll.
pub(crate) fn take_injected_error() -> Option<TaskError> {
    let sched = SCHEDULER.with(|slot| slot.borrow().clone())?;
    let id = sched.current.get()?;
    let slot = sched.slots.borrow()[id].clone();
    let err = slot.injected.borrow_mut().take();
    err
}

/// Start a new task.
///
/// The body is dispatched synchronously: `run_task` returns only once it has
/// completed or suspended for the first time. Errors reaching the task
/// boundary are logged and swallowed.
pub fn run_task<F>(body: F) -> TaskHandle
where
    F: Future<Output = TaskResult> + 'static,
{
    scheduler().run_task(Box::pin(body))
}

/// Run the calling thread's event loop until it exits or runs out of events.
///
/// Returns `0` on a clean exit and `1` on a driver error.
pub fn run_event_loop() -> i32 {
    scheduler().run_event_loop()
}

/// Drive a single event-loop iteration from outside the loop.
///
/// Only meaningful before [`run_event_loop`] has been started; draining a
/// loop with nothing registered is an error.
pub fn drive_event_loop_once() -> Result<(), DriverError> {
    let sched = scheduler();
    match sched.driver.run_event_loop_once() {
        LoopStatus::NoEvents => Err(DriverError::NoEvents),
        LoopStatus::Error(err) => Err(err),
        LoopStatus::Exited | LoopStatus::Ran => Ok(()),
    }
}

/// Request the calling thread's event loop to exit; with `shutdown_workers`,
/// also stop and wait for the worker threads.
pub fn exit_event_loop(shutdown_workers: bool) {
    if shutdown_workers {
        crate::worker::shutdown_worker_threads();
    }
    event_driver().exit_event_loop();
}

/// Install the per-thread idle handler. It runs on every idle tick; a `true`
/// return asks for another tick without blocking.
pub fn set_idle_handler<F>(handler: F)
where
    F: FnMut() -> bool + 'static,
{
    *scheduler().idle_handler.borrow_mut() = Some(Box::new(handler));
}

/// Remove the per-thread idle handler.
pub fn clear_idle_handler() {
    scheduler().idle_handler.borrow_mut().take();
}

/// Install the per-thread task lifecycle observer.
pub fn set_task_event_handler<F>(handler: F)
where
    F: FnMut(TaskEvent, &TaskHandle) + 'static,
{
    *scheduler().event_handler.borrow_mut() = Some(Box::new(handler));
}

/// Remove the per-thread task lifecycle observer.
pub fn clear_task_event_handler() {
    scheduler().event_handler.borrow_mut().take();
}

/// Set the interval of the opportunistic pool reclamation timer.
pub fn set_reclaim_interval(interval: Duration) {
    scheduler().reclaim_interval.set(interval);
}

/// Yield to the scheduler; the task resumes no later than the next idle
/// tick, in FIFO order with other yielders.
pub fn yield_now() -> YieldNow {
    YieldNow { enqueued: false }
}

/// Future returned by [`yield_now`].
pub struct YieldNow {
    enqueued: bool,
}

impl Future for YieldNow {
    type Output = TaskResult;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.enqueued {
            return match take_injected_error() {
                Some(err) => Poll::Ready(Err(err)),
                None => Poll::Ready(Ok(())),
            };
        }
        let sched = scheduler();
        let Some(handle) = sched.current_handle() else {
            // Off-task there is nothing to yield to.
            return Poll::Ready(Ok(()));
        };
        sched.emit_event(TaskEvent::Yield, &handle);
        sched.yielded.borrow_mut().push_back(handle);
        self.enqueued = true;
        Poll::Pending
    }
}

/// Suspend without scheduling a wakeup. The task runs again only when
/// something resumes it explicitly (a waker, an interrupt, or the driver).
pub fn raw_yield() -> RawYield {
    RawYield { suspended: false }
}

/// Future returned by [`raw_yield`].
pub struct RawYield {
    suspended: bool,
}

impl Future for RawYield {
    type Output = TaskResult;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.suspended {
            return match take_injected_error() {
                Some(err) => Poll::Ready(Err(err)),
                None => Poll::Ready(Ok(())),
            };
        }
        self.suspended = true;
        Poll::Pending
    }
}

/// Suspend the caller until the referenced body has completed.
///
/// Joining a stale or completed handle returns immediately; a task must not
/// join itself.
pub fn join(handle: &TaskHandle) -> Join {
    Join {
        handle: handle.clone(),
    }
}

/// Future returned by [`join`].
pub struct Join {
    handle: TaskHandle,
}

impl Future for Join {
    type Output = TaskResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(err) = take_injected_error() {
            return Poll::Ready(Err(err));
        }
        let Some(slot) = self.handle.slot.upgrade() else {
            return Poll::Ready(Ok(()));
        };
        if !slot.is_live(self.handle.generation) {
            return Poll::Ready(Ok(()));
        }
        debug_assert!(
            scheduler().current.get() != Some(slot.id),
            "a task cannot join itself"
        );
        let mut joiners = slot.joiners.borrow_mut();
        if !joiners.iter().any(|w| w.will_wake(cx.waker())) {
            joiners.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

/// Schedule `TaskError::Interrupted` for the target's next resume and, if it
/// is suspended, resume it.
///
/// Interrupting a stale handle (including one whose task has terminated in
/// the meantime) is a no-op. A task must not interrupt itself.
pub fn interrupt(handle: &TaskHandle) {
    let sched = scheduler();
    let Some(slot) = handle.slot.upgrade() else {
        return;
    };
    if !slot.is_live(handle.generation) {
        return;
    }
    debug_assert!(
        sched.current.get() != Some(slot.id),
        "a task cannot interrupt itself"
    );
    *slot.injected.borrow_mut() = Some(TaskError::Interrupted);
    if slot.state.get() == TaskState::Hold {
        sched.ready.push(slot.id, handle.generation);
    }
}
