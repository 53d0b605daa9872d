//! Cross-thread signalling primitives.

use crate::error::TaskError;

use parking_lot::{Condvar, Mutex};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

struct EventState {
    count: u64,
    wakers: Vec<Waker>,
}

struct EventInner {
    state: Mutex<EventState>,
    condvar: Condvar,
}

/// A manual-reset event usable across threads.
///
/// Each [`emit`](ManualEvent::emit) increments a monotonic counter and wakes
/// every waiter. Waiters that pass a previously observed count cannot miss an
/// emit that happened in between, which makes the event safe for
/// check-then-wait loops.
#[derive(Clone)]
pub struct ManualEvent {
    inner: Arc<EventInner>,
}

impl ManualEvent {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EventInner {
                state: Mutex::new(EventState {
                    count: 0,
                    wakers: Vec::new(),
                }),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Wake all current waiters and increment the emit count.
    pub fn emit(&self) {
        let wakers = {
            let mut state = self.inner.state.lock();
            state.count += 1;
            self.inner.condvar.notify_all();
            std::mem::take(&mut state.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// The number of emits so far.
    pub fn emit_count(&self) -> u64 {
        self.inner.state.lock().count
    }

    /// Suspend until the next emit after this call.
    pub fn wait(&self) -> EventWait {
        self.wait_count(self.emit_count())
    }

    /// Suspend until the emit count exceeds `last_count`. Returns the
    /// observed count, or `Err(TaskError::Interrupted)` if the waiting task
    /// is interrupted.
    pub fn wait_count(&self, last_count: u64) -> EventWait {
        EventWait {
            inner: self.inner.clone(),
            last_count,
        }
    }

    /// Off-task variant of [`wait_count`](ManualEvent::wait_count): blocks
    /// the calling thread. Returns the observed count.
    pub fn wait_count_blocking(&self, last_count: u64) -> u64 {
        let mut state = self.inner.state.lock();
        while state.count <= last_count {
            self.inner.condvar.wait(&mut state);
        }
        state.count
    }
}

impl Default for ManualEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`ManualEvent::wait`] and [`ManualEvent::wait_count`].
pub struct EventWait {
    inner: Arc<EventInner>,
    last_count: u64,
}

impl Future for EventWait {
    type Output = std::result::Result<u64, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(err) = crate::scheduler::take_injected_error() {
            return Poll::Ready(Err(err));
        }
        let mut state = self.inner.state.lock();
        if state.count > self.last_count {
            return Poll::Ready(Ok(state.count));
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
