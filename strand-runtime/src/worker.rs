//! Worker thread pool.
//!
//! Workers are additional OS threads, each running its own driver and
//! scheduler. Work is submitted as `Send` closures that are evaluated on the
//! executing worker into an ordinary (thread-local) task future, so a
//! submitted body shares nothing with the submitter beyond what it captures
//! by value.
//!
//! A single process-wide mutex guards the registry (per-worker queues plus
//! the shared FIFO); a manual-reset event signals workers after every
//! enqueue and is re-used to make shutdown hand-shakes lossless.

use crate::error::TaskResult;
use crate::sync::ManualEvent;

use futures::future::LocalBoxFuture;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::thread::{self, ThreadId};
use tracing::{debug, trace, warn};

type WorkerBody = Box<dyn FnOnce() -> LocalBoxFuture<'static, TaskResult> + Send>;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads to spawn.
    pub threads: usize,
    /// Thread name prefix, for diagnostics.
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            threads: thread::available_parallelism().map_or(1, usize::from),
            thread_name: "strand-worker".to_string(),
        }
    }
}

struct WorkerContext {
    queue: VecDeque<WorkerBody>,
    exit: bool,
}

struct Registry {
    contexts: HashMap<ThreadId, WorkerContext>,
    shared: VecDeque<WorkerBody>,
    signal: ManualEvent,
    shutting_down: bool,
}

static REGISTRY: Mutex<Option<Registry>> = Mutex::new(None);

/// Spawn the default worker pool (one thread per logical CPU).
///
/// Idempotent; must be called before tasks start using the pool. Returns
/// once every worker is registered and able to receive distributed work.
pub fn enable_worker_threads() {
    enable_worker_threads_with(WorkerPoolConfig::default());
}

/// Spawn a worker pool with an explicit configuration. See
/// [`enable_worker_threads`].
pub fn enable_worker_threads_with(config: WorkerPoolConfig) {
    let signal = {
        let mut guard = REGISTRY.lock();
        if guard.is_some() {
            return;
        }
        let signal = ManualEvent::new();
        *guard = Some(Registry {
            contexts: HashMap::new(),
            shared: VecDeque::new(),
            signal: signal.clone(),
            shutting_down: false,
        });
        signal
    };
    debug!(threads = config.threads, "starting worker threads");
    for index in 0..config.threads {
        thread::Builder::new()
            .name(format!("{}-{index}", config.thread_name))
            .spawn(worker_main)
            .expect("failed to spawn worker thread");
    }
    // Wait until every worker has registered so that distributed submissions
    // reach the full pool.
    loop {
        let last = signal.emit_count();
        {
            let guard = REGISTRY.lock();
            match guard.as_ref() {
                Some(registry) if registry.contexts.len() >= config.threads => return,
                Some(_) => {}
                None => return,
            }
        }
        signal.wait_count_blocking(last);
    }
}

/// Number of live worker threads.
pub fn worker_thread_count() -> usize {
    REGISTRY
        .lock()
        .as_ref()
        .map_or(0, |registry| registry.contexts.len())
}

/// Submit a body to be run as a task on any one worker.
///
/// Falls back to [`run_task`](crate::run_task) on the current thread when
/// workers are not enabled.
pub fn run_worker_task<F, Fut>(body: F)
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = TaskResult> + 'static,
{
    let boxed: WorkerBody =
        Box::new(move || -> LocalBoxFuture<'static, TaskResult> { Box::pin(body()) });
    match enqueue_shared(boxed) {
        Ok(signal) => signal.emit(),
        Err(body) => {
            crate::run_task(body());
        }
    }
}

/// Push onto the shared queue, or hand the body back when no workers exist.
fn enqueue_shared(body: WorkerBody) -> Result<ManualEvent, WorkerBody> {
    let mut guard = REGISTRY.lock();
    match guard.as_mut() {
        Some(registry) if !registry.contexts.is_empty() => {
            registry.shared.push_back(body);
            Ok(registry.signal.clone())
        }
        _ => Err(body),
    }
}

/// Submit a body to every worker, each of which runs it exactly once.
///
/// Falls back to a single local task when workers are not enabled.
pub fn run_worker_task_dist<F, Fut>(body: F)
where
    F: Fn() -> Fut + Clone + Send + 'static,
    Fut: Future<Output = TaskResult> + 'static,
{
    let signal = {
        let mut guard = REGISTRY.lock();
        match guard.as_mut() {
            Some(registry) if !registry.contexts.is_empty() => {
                for context in registry.contexts.values_mut() {
                    let body = body.clone();
                    context
                        .queue
                        .push_back(Box::new(move || -> LocalBoxFuture<'static, TaskResult> {
                            Box::pin(body())
                        }));
                }
                Some(registry.signal.clone())
            }
            _ => None,
        }
    };
    match signal {
        Some(signal) => signal.emit(),
        None => {
            crate::run_task(body());
        }
    }
}

/// Flag every worker to exit, wake them, and wait until the registry is
/// empty. Called by [`exit_event_loop`](crate::exit_event_loop).
pub(crate) fn shutdown_worker_threads() {
    let signal = {
        let mut guard = REGISTRY.lock();
        let Some(registry) = guard.as_mut() else {
            return;
        };
        registry.shutting_down = true;
        for context in registry.contexts.values_mut() {
            context.exit = true;
        }
        registry.signal.clone()
    };
    signal.emit();
    loop {
        let last = signal.emit_count();
        {
            let mut guard = REGISTRY.lock();
            let drained = match guard.as_ref() {
                Some(registry) => registry.contexts.is_empty(),
                None => return,
            };
            if drained {
                *guard = None;
                return;
            }
        }
        signal.wait_count_blocking(last);
    }
}

fn worker_main() {
    let signal = {
        let mut guard = REGISTRY.lock();
        let Some(registry) = guard.as_mut() else {
            return;
        };
        if registry.shutting_down {
            return;
        }
        registry.contexts.insert(
            thread::current().id(),
            WorkerContext {
                queue: VecDeque::new(),
                exit: false,
            },
        );
        registry.signal.clone()
    };
    signal.emit();
    trace!("worker thread started");
    crate::run_task(worker_dispatch(signal));
    let code = crate::run_event_loop();
    trace!(code, "worker thread finished");
}

/// The single dispatch task every worker runs: drain the per-thread queue,
/// then the shared queue, then sleep on the signal.
async fn worker_dispatch(signal: ManualEvent) -> TaskResult {
    loop {
        let observed = signal.emit_count();
        while let Some(body) = next_work() {
            crate::run_task(body());
        }
        if should_exit() {
            finish_worker();
            return Ok(());
        }
        signal.wait_count(observed).await?;
    }
}

fn next_work() -> Option<WorkerBody> {
    let mut guard = REGISTRY.lock();
    let registry = guard.as_mut()?;
    if let Some(context) = registry.contexts.get_mut(&thread::current().id()) {
        if let Some(body) = context.queue.pop_front() {
            return Some(body);
        }
    }
    registry.shared.pop_front()
}

fn should_exit() -> bool {
    REGISTRY.lock().as_ref().map_or(true, |registry| {
        registry
            .contexts
            .get(&thread::current().id())
            .map_or(true, |context| context.exit)
    })
}

fn finish_worker() {
    let signal = {
        let mut guard = REGISTRY.lock();
        let Some(registry) = guard.as_mut() else {
            return;
        };
        if let Some(context) = registry.contexts.remove(&thread::current().id()) {
            if !context.queue.is_empty() {
                warn!(
                    pending = context.queue.len(),
                    "worker exiting with queued tasks"
                );
            }
        }
        if registry.contexts.is_empty() && !registry.shared.is_empty() {
            warn!(
                pending = registry.shared.len(),
                "shared queue not empty at worker shutdown"
            );
        }
        registry.signal.clone()
    };
    crate::driver::event_driver().exit_event_loop();
    // Unblock the shutdown waiter.
    signal.emit();
}
