//! Timers and `sleep`, thin wrappers over the driver's timers.

use crate::driver::{event_driver, Timer, TimerCallback};
use crate::error::TaskResult;

use std::time::Duration;

/// Create an unarmed timer on the calling thread's driver.
pub fn create_timer(callback: Option<TimerCallback>) -> Timer {
    event_driver().create_timer(callback)
}

/// Create and arm a timer that invokes `callback` after `timeout`, and every
/// `timeout` thereafter when `periodic`.
pub fn set_timer(timeout: Duration, callback: TimerCallback, periodic: bool) -> Timer {
    let timer = event_driver().create_timer(Some(callback));
    timer.rearm(timeout, periodic);
    timer
}

/// Suspend the calling task for `duration`.
///
/// Resolves to `Err(TaskError::Interrupted)` if the task is interrupted
/// while sleeping.
pub async fn sleep(duration: Duration) -> TaskResult {
    let timer = event_driver().create_timer(None);
    timer.rearm(duration, false);
    timer.wait().await
}
