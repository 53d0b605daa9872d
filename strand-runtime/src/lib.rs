//! Cooperative task runtime.
//!
//! A single-process, many-thread runtime that multiplexes lightweight
//! cooperative tasks onto OS threads. Tasks are pooled and cheap to start,
//! suspend only at explicit await points, and never migrate between
//! threads. Each thread owns a scheduler and an event driver; worker threads
//! pull submitted bodies from a shared queue and per-thread queues.
//!
//! # Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use strand_runtime as runtime;
//!
//! runtime::run_task(async {
//!     runtime::sleep(Duration::from_millis(100)).await?;
//!     println!("tick");
//!     runtime::exit_event_loop(false);
//!     Ok(())
//! });
//! runtime::run_event_loop();
//! ```
//!
//! # Suspension points
//!
//! Exactly these await points suspend a task: [`yield_now`], [`raw_yield`],
//! [`sleep`], [`Timer::wait`], [`ManualEvent::wait`], and [`join`]. Every
//! one of them resolves to `Err(TaskError::Interrupted)` when the task was
//! [`interrupt`]ed while suspended.

pub mod driver;
mod error;
mod options;
mod scheduler;
#[cfg(unix)]
mod signals;
mod sync;
mod task;
mod task_local;
mod timer;
mod worker;

pub use driver::{event_driver, set_driver_factory, EventDriver, LoopStatus, Timer};
pub use error::{DriverError, PrivilegeError, TaskError, TaskResult};
pub use options::RuntimeOptions;
pub use scheduler::{
    clear_idle_handler, clear_task_event_handler, drive_event_loop_once, exit_event_loop,
    interrupt, join, raw_yield, run_event_loop, run_task, set_idle_handler, set_reclaim_interval,
    set_task_event_handler, yield_now, Join, RawYield, YieldNow,
};
pub use sync::{EventWait, ManualEvent};
pub use task::{TaskEvent, TaskHandle};
pub use task_local::{get_task_local, is_task_local_set, set_task_local, TaskLocal};
pub use timer::{create_timer, set_timer, sleep};
pub use worker::{
    enable_worker_threads, enable_worker_threads_with, run_worker_task, run_worker_task_dist,
    worker_thread_count, WorkerPoolConfig,
};

/// Convenient single-line import for applications.
pub mod prelude {
    pub use crate::{
        exit_event_loop, interrupt, join, run_event_loop, run_task, sleep, yield_now,
        ManualEvent, TaskError, TaskHandle, TaskResult,
    };
}
