//! POSIX signal integration.
//!
//! `SIGINT` and `SIGTERM` request a graceful event-loop exit, observed by
//! the scheduler on its next idle tick. A second termination signal while
//! shutdown is in progress terminates the process with status 1. `SIGPIPE`
//! is ignored so broken pipes surface as write errors instead of killing the
//! process.

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Once;
use tracing::trace;

static EXIT_REQUESTED: AtomicBool = AtomicBool::new(false);
static TERM_SIGNALS: AtomicUsize = AtomicUsize::new(0);
static INSTALL: Once = Once::new();

extern "C" fn on_terminate(_signal: i32) {
    if TERM_SIGNALS.fetch_add(1, Ordering::SeqCst) > 0 {
        // Shutdown already in progress; only async-signal-safe calls here.
        unsafe { nix::libc::_exit(1) };
    }
    EXIT_REQUESTED.store(true, Ordering::SeqCst);
}

/// Install the process signal handlers. Idempotent; called on the first
/// `run_event_loop` of any thread.
pub(crate) fn install() {
    INSTALL.call_once(|| {
        let action = SigAction::new(
            SigHandler::Handler(on_terminate),
            SaFlags::empty(),
            SigSet::empty(),
        );
        unsafe {
            let _ = signal::sigaction(Signal::SIGINT, &action);
            let _ = signal::sigaction(Signal::SIGTERM, &action);
            let _ = signal::signal(Signal::SIGPIPE, SigHandler::SigIgn);
        }
        trace!("signal handlers installed, SIGPIPE ignored");
    });
}

/// Consume a pending termination request.
pub(crate) fn take_exit_request() -> bool {
    EXIT_REQUESTED.swap(false, Ordering::SeqCst)
}
