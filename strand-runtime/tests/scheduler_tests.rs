//! Scheduler behavior: dispatch, yielding, interrupts, joins, handle reuse.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use strand_runtime::{self as runtime, DriverError, TaskError, TaskEvent, TaskLocal};

mod common;

#[test]
fn run_task_dispatches_synchronously() {
    common::init_tracing();
    let hit = Rc::new(Cell::new(false));
    let flag = hit.clone();
    let handle = runtime::run_task(async move {
        flag.set(true);
        Ok(())
    });
    // The body ran to completion before run_task returned.
    assert!(hit.get());
    assert!(handle.is_finished());
}

#[test]
fn run_task_returns_at_first_suspension() {
    common::init_tracing();
    let stage = Rc::new(Cell::new(0));
    let inner = stage.clone();
    let handle = runtime::run_task(async move {
        inner.set(1);
        runtime::yield_now().await?;
        inner.set(2);
        Ok(())
    });
    assert_eq!(stage.get(), 1);
    assert!(!handle.is_finished());
    runtime::run_event_loop();
    assert_eq!(stage.get(), 2);
    assert!(handle.is_finished());
}

#[test]
fn yielding_tasks_all_complete() {
    common::init_tracing();
    let done = Rc::new(Cell::new(0u32));
    for _ in 0..10 {
        let done = done.clone();
        runtime::run_task(async move {
            for _ in 0..5 {
                runtime::yield_now().await?;
            }
            done.set(done.get() + 1);
            Ok(())
        });
    }
    assert_eq!(runtime::run_event_loop(), 0);
    assert_eq!(done.get(), 10);
}

#[test]
fn yield_order_is_fifo() {
    common::init_tracing();
    let order = Rc::new(RefCell::new(Vec::new()));
    for i in 0..3 {
        let order = order.clone();
        runtime::run_task(async move {
            runtime::yield_now().await?;
            order.borrow_mut().push(i);
            Ok(())
        });
    }
    runtime::run_event_loop();
    assert_eq!(*order.borrow(), vec![0, 1, 2]);
}

#[test]
fn interrupt_delivers_exactly_once() {
    common::init_tracing();
    let observed = Rc::new(Cell::new(0u32));
    let counter = observed.clone();
    let handle = runtime::run_task(async move {
        loop {
            match runtime::raw_yield().await {
                Ok(()) => {}
                Err(err) => {
                    assert!(err.is_interrupted());
                    counter.set(counter.get() + 1);
                    return Ok(());
                }
            }
        }
    });
    runtime::interrupt(&handle);
    runtime::run_event_loop();
    assert_eq!(observed.get(), 1);
}

#[test]
fn interrupt_wakes_a_sleeping_task() {
    common::init_tracing();
    let woke = Rc::new(Cell::new(false));
    let flag = woke.clone();
    let handle = runtime::run_task(async move {
        let err = runtime::sleep(std::time::Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(err.is_interrupted());
        flag.set(true);
        Ok(())
    });
    runtime::interrupt(&handle);
    let started = std::time::Instant::now();
    runtime::run_event_loop();
    assert!(woke.get());
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
}

#[test]
fn stale_handles_are_inert() {
    common::init_tracing();
    let first = runtime::run_task(async { Ok(()) });
    assert!(first.is_finished());

    // The next task reuses the pooled slot; the stale handle must not be
    // able to reach it.
    let touched = Rc::new(Cell::new(false));
    let flag = touched.clone();
    let _second = runtime::run_task(async move {
        runtime::raw_yield().await?;
        flag.set(true);
        Ok(())
    });
    runtime::interrupt(&first);

    let joined = Rc::new(Cell::new(false));
    let joined_flag = joined.clone();
    runtime::run_task(async move {
        runtime::join(&first).await?;
        joined_flag.set(true);
        runtime::exit_event_loop(false);
        Ok(())
    });
    runtime::run_event_loop();
    assert!(joined.get());
    assert!(!touched.get());
}

#[test]
fn join_blocks_until_target_completes() {
    common::init_tracing();
    let order = Rc::new(RefCell::new(Vec::new()));
    let target_order = order.clone();
    let target = runtime::run_task(async move {
        for _ in 0..3 {
            runtime::yield_now().await?;
        }
        target_order.borrow_mut().push("target");
        Ok(())
    });
    let joiner_order = order.clone();
    runtime::run_task(async move {
        runtime::join(&target).await?;
        joiner_order.borrow_mut().push("joiner");
        Ok(())
    });
    runtime::run_event_loop();
    assert_eq!(*order.borrow(), vec!["target", "joiner"]);
}

#[test]
fn task_events_cover_the_lifecycle() {
    common::init_tracing();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    runtime::set_task_event_handler(move |event, _| sink.borrow_mut().push(event));
    runtime::run_task(async {
        runtime::yield_now().await?;
        Ok(())
    });
    runtime::run_task(async { Err(TaskError::custom(std::io::Error::other("boom"))) });
    runtime::run_event_loop();
    runtime::clear_task_event_handler();

    let events = events.borrow();
    assert_eq!(events.first(), Some(&TaskEvent::Start));
    assert!(events.contains(&TaskEvent::Yield));
    assert!(events.contains(&TaskEvent::End));
    assert!(events.contains(&TaskEvent::Fail));
}

#[test]
fn failing_tasks_do_not_stop_the_loop() {
    common::init_tracing();
    let after = Rc::new(Cell::new(false));
    runtime::run_task(async { Err(TaskError::custom(std::io::Error::other("expected"))) });
    let flag = after.clone();
    runtime::run_task(async move {
        runtime::yield_now().await?;
        flag.set(true);
        Ok(())
    });
    assert_eq!(runtime::run_event_loop(), 0);
    assert!(after.get());
}

#[test]
fn idle_handler_runs_between_ticks() {
    common::init_tracing();
    let calls = Rc::new(Cell::new(0u32));
    let counter = calls.clone();
    runtime::set_idle_handler(move || {
        counter.set(counter.get() + 1);
        false
    });
    runtime::run_task(async {
        runtime::yield_now().await?;
        Ok(())
    });
    runtime::run_event_loop();
    runtime::clear_idle_handler();
    assert!(calls.get() >= 1);
}

#[test]
fn task_locals_are_isolated_per_task() {
    common::init_tracing();
    static DEPTH: TaskLocal<u32> = TaskLocal::new();
    let checks = Rc::new(Cell::new(0u32));

    let first = checks.clone();
    runtime::run_task(async move {
        DEPTH.set(5);
        runtime::yield_now().await?;
        assert_eq!(DEPTH.get(), 5);
        first.set(first.get() + 1);
        Ok(())
    });
    let second = checks.clone();
    runtime::run_task(async move {
        // A fresh body sees the default even on a reused slot.
        assert_eq!(DEPTH.get(), 0);
        DEPTH.set(9);
        runtime::yield_now().await?;
        assert_eq!(DEPTH.get(), 9);
        second.set(second.get() + 1);
        Ok(())
    });
    runtime::run_event_loop();
    assert_eq!(checks.get(), 2);
}

#[test]
fn keyed_locals_reset_between_bodies() {
    common::init_tracing();
    runtime::run_task(async {
        runtime::set_task_local("request", 1u8);
        assert!(runtime::is_task_local_set("request"));
        Ok(())
    });
    runtime::run_task(async {
        assert!(!runtime::is_task_local_set("request"));
        Ok(())
    });
    runtime::run_event_loop();
}

#[test]
fn driving_an_empty_loop_is_an_error() {
    common::init_tracing();
    assert_eq!(
        runtime::drive_event_loop_once().unwrap_err(),
        DriverError::NoEvents
    );
}
