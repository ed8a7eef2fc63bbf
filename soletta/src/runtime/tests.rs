use super::*;
use crate as soletta;
use crate::sync::{Condvar, Queue};
use crate::test_utils::mock_time_loop;
use anyhow::Result;
use static_assertions::{assert_impl_all, assert_not_impl_any};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

// One loop per thread, nothing crosses threads: every handle is bound to
// its thread by construction.
assert_not_impl_any!(EventLoop: Send, Sync);
assert_not_impl_any!(crate::TaskHandle<u32>: Send, Sync);
assert_not_impl_any!(crate::CancelHandle: Send, Sync);
assert_not_impl_any!(crate::sync::Lock: Send, Sync);
assert_impl_all!(crate::TaskError: Send, Sync);

#[test]
fn test_two_tasks_alternate_on_yield() {
    let event_loop = EventLoop::new();
    let counter = Rc::new(Cell::new(0i32));

    let incrementer = {
        let counter = counter.clone();
        event_loop.call_soon(async move {
            for _ in 0..5 {
                assert_eq!(counter.get(), 0);
                counter.set(counter.get() + 1);
                soletta::yield_now().await;
            }
        })
    };

    let decrementer = {
        let counter = counter.clone();
        event_loop.call_soon(async move {
            for _ in 0..5 {
                assert_eq!(counter.get(), 1);
                counter.set(counter.get() - 1);
                soletta::yield_now().await;
            }
        })
    };

    event_loop.run_until_complete(&decrementer);

    assert_eq!(counter.get(), 0);
    assert!(incrementer.is_complete());
    incrementer.get_result().unwrap();
    decrementer.get_result().unwrap();
}

#[test]
fn test_nested_yield_to_chain() {
    let event_loop = EventLoop::new();
    let counter = Rc::new(Cell::new(0u32));

    let task = {
        let c0 = counter.clone();
        event_loop.call_soon(async move {
            assert_eq!(c0.get(), 0);
            let c1 = c0.clone();
            soletta::yield_to(async move {
                assert_eq!(c1.get(), 0);
                c1.set(1);

                let c2 = c1.clone();
                soletta::yield_to(async move {
                    assert_eq!(c2.get(), 1);
                    c2.set(2);

                    let c3 = c2.clone();
                    soletta::yield_to(async move {
                        assert_eq!(c3.get(), 2);
                        c3.set(3);
                        soletta::yield_now().await;
                    })
                    .await
                    .unwrap();
                })
                .await
                .unwrap();
            })
            .await
            .unwrap();
        })
    };

    event_loop.run_until_complete(&task);
    assert_eq!(counter.get(), 3);
}

#[test]
fn test_sleep_blocks_until_deadline() {
    let (event_loop, clock) = mock_time_loop();

    let task = {
        let clock = clock.clone();
        event_loop.call_soon(async move {
            let start = clock.now();
            soletta::sleep(Duration::from_millis(4000)).await;
            clock.now() - start
        })
    };

    event_loop.run_until_complete(&task);

    let slept = task.get_result().unwrap();
    assert!(slept >= Duration::from_millis(4000), "slept {slept:?}");
}

#[test]
fn test_concurrent_sleeps_overlap() {
    let (event_loop, clock) = mock_time_loop();

    let sleeper = |ms: u64| async move { soletta::sleep(Duration::from_millis(ms)).await };

    let _t1 = event_loop.call_soon(sleeper(1000));
    let _t2 = event_loop.call_soon(sleeper(2000));
    let t3 = event_loop.call_soon(sleeper(3000));

    event_loop.run_until_complete(&t3);

    // Three sleeps side by side take as long as the longest one, not the
    // sum of all three.
    let elapsed = clock.elapsed();
    assert!(elapsed >= Duration::from_millis(3000), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(4000), "elapsed {elapsed:?}");
}

#[test]
fn test_pop_waits_for_delayed_pusher() {
    let (event_loop, clock) = mock_time_loop();
    let queue = Rc::new(Queue::new());

    let _pusher = {
        let queue = queue.clone();
        event_loop.call_soon(async move {
            soletta::sleep(Duration::from_millis(2500)).await;
            queue.push(42).await;
            queue.push(21).await;
        })
    };

    let popper = {
        let queue = queue.clone();
        let clock = clock.clone();
        event_loop.call_soon(async move {
            let start = clock.now();

            let first = queue.pop().await;
            assert_eq!(first, 42);
            let first_pop_at = clock.now();
            assert!(first_pop_at - start >= Duration::from_millis(2500));

            // The second item is already there; this pop is instant.
            let second = queue.pop().await;
            assert_eq!(second, 21);
            assert!(clock.now() - first_pop_at <= Duration::from_millis(5));

            first
        })
    };

    event_loop.run_until_complete(&popper);
    assert_eq!(popper.get_result().unwrap(), 42);
}

#[test]
fn test_cancel_wakes_a_sleeping_task() {
    let (event_loop, clock) = mock_time_loop();

    let victim = event_loop.call_soon(async {
        soletta::sleep(Duration::from_millis(5000)).await;
    });

    let cancel = victim.cancel_handle();
    let _sibling = event_loop.call_soon(async move {
        soletta::sleep(Duration::from_millis(1000)).await;
        cancel.cancel();
    });

    event_loop.run_until_complete(&victim);

    let err = victim.get_result().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.id(), victim.id());

    // The victim is torn down right after the cancel, not at its deadline.
    let elapsed = clock.elapsed();
    assert!(elapsed <= Duration::from_millis(1200), "elapsed {elapsed:?}");
}

#[test]
fn test_wait_for_joins_slowest_task() {
    let (event_loop, clock) = mock_time_loop();

    let parent = event_loop.call_soon(async {
        let t1 = soletta::call_soon(async {
            soletta::sleep(Duration::from_millis(750)).await;
            1u32
        });
        let t2 = soletta::call_soon(async {
            soletta::sleep(Duration::from_millis(1500)).await;
            2u32
        });

        soletta::wait_for!(t1, t2).await;

        assert!(t1.is_complete() && t2.is_complete());
        t1.get_result().unwrap() + t2.get_result().unwrap()
    });

    event_loop.run_until_complete(&parent);
    assert_eq!(parent.get_result().unwrap(), 3);

    let elapsed = clock.elapsed();
    assert!(elapsed >= Duration::from_millis(1500), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(2000), "elapsed {elapsed:?}");
}

#[test]
fn test_round_runs_tasks_in_submission_order() {
    let event_loop = EventLoop::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let mut tasks = Vec::new();
    for i in 0..5u32 {
        let log = log.clone();
        tasks.push(event_loop.call_soon(async move {
            log.borrow_mut().push(i);
            soletta::yield_now().await;
            log.borrow_mut().push(100 + i);
        }));
    }

    let last = tasks.pop().unwrap();
    event_loop.run_until_complete(&last);

    // Each round visits the active set in submission order, and a yield
    // defers to the next iteration, never to later in the same round.
    let expected: Vec<u32> = (0..5).chain((0..5).map(|i| 100 + i)).collect();
    assert_eq!(*log.borrow(), expected);
}

#[test]
fn test_scheduler_sets_settle_after_run() {
    let (event_loop, _clock) = mock_time_loop();
    let queue = Rc::new(Queue::with_capacity(1));

    let pusher = {
        let queue = queue.clone();
        event_loop.call_soon(async move {
            for i in 0..10 {
                queue.push(i).await;
            }
        })
    };
    let popper = {
        let queue = queue.clone();
        event_loop.call_soon(async move {
            let mut total = 0;
            for _ in 0..10 {
                soletta::sleep(Duration::from_millis(1)).await;
                total += queue.pop().await;
            }
            total
        })
    };

    event_loop.run_until_complete(&popper);
    assert_eq!(popper.get_result().unwrap(), 45);
    pusher.get_result().unwrap();

    // Once everything has completed, the wait-count bookkeeping has fully
    // unwound: no task left blocked, no live task counted.
    event_loop.scheduler().assert_sets_consistent();
    assert_eq!(event_loop.scheduler().live_task_count(), 0);
}

#[test]
fn test_cancel_of_completed_task_is_noop() {
    let event_loop = EventLoop::new();

    let task = event_loop.call_soon(async { 7u32 });
    event_loop.run_until_complete(&task);

    task.cancel();
    event_loop.cancel(&task);
    assert_eq!(task.get_result().unwrap(), 7);
}

#[test]
fn test_cancel_before_first_run_takes_effect_at_first_suspension() {
    let (event_loop, clock) = mock_time_loop();

    let victim = event_loop.call_soon(async {
        soletta::sleep(Duration::from_millis(10_000)).await;
    });
    event_loop.cancel(&victim);

    event_loop.run_until_complete(&victim);
    assert!(victim.get_result().unwrap_err().is_cancelled());
    assert!(clock.elapsed() < Duration::from_millis(10_000));
}

#[test]
fn test_task_without_suspension_points_cannot_be_cancelled() {
    let event_loop = EventLoop::new();

    let task = event_loop.call_soon(async { "ran to completion" });
    task.cancel();

    event_loop.run_until_complete(&task);
    assert_eq!(task.get_result().unwrap(), "ran to completion");
}

#[test]
fn test_panic_in_task_is_captured_and_surfaced() {
    let event_loop = EventLoop::new();

    let result = event_loop.block_on(async {
        soletta::yield_to(async { panic!("boom") }).await
    });

    let err = result.unwrap_err();
    assert!(err.is_panic());
    let payload = err.into_panic();
    assert_eq!(*payload.downcast_ref::<&str>().unwrap(), "boom");
}

#[test]
fn test_task_limit_is_enforced_synchronously() -> Result<()> {
    let event_loop = Builder::new().max_tasks(2).try_build()?;

    let t1 = event_loop.try_call_soon(async { 1 })?;
    let t2 = event_loop.try_call_soon(async { 2 })?;
    assert!(event_loop.try_call_soon(async { 3 }).is_err());

    event_loop.run_until_complete(&t2);
    assert_eq!(t1.get_result()?, 1);
    assert_eq!(t2.get_result()?, 2);

    // Completion releases capacity.
    let t3 = event_loop.try_call_soon(async { 3 })?;
    event_loop.run_until_complete(&t3);
    assert_eq!(t3.get_result()?, 3);
    Ok(())
}

#[test]
fn test_run_until_complete_rejects_reentrancy() {
    let outer = EventLoop::new();
    let inner = Rc::new(EventLoop::new());

    let task = outer.call_soon(async move {
        // One loop per thread at a time: driving a second loop from inside
        // a task is refused. The panic is captured as this task's failure.
        inner.block_on(async {});
    });

    outer.run_until_complete(&task);

    let err = task.get_result().unwrap_err();
    assert!(err.is_panic());
    assert!(format!("{err}").contains("re-entrantly"));
}

#[test]
#[should_panic(expected = "deadlock")]
fn test_deadlock_is_detected() {
    let event_loop = EventLoop::new();
    let cond = Rc::new(Condvar::new());

    let task = {
        let cond = cond.clone();
        event_loop.call_soon(async move {
            // Nobody will ever notify.
            cond.wait().await;
        })
    };

    event_loop.run_until_complete(&task);
}

#[test]
#[should_panic(expected = "result read before completion")]
fn test_get_result_before_completion_is_fatal() {
    let event_loop = EventLoop::new();
    let task = event_loop.call_soon(async {});
    let _ = task.get_result();
}

#[test]
fn test_current_task_id_helpers() {
    assert!(soletta::task::try_id().is_none());

    let event_loop = EventLoop::new();
    let task = event_loop.call_soon(async {
        let id = soletta::task::id();
        assert_eq!(soletta::task::try_id(), Some(id));
        id
    });

    event_loop.run_until_complete(&task);
    assert_eq!(task.get_result().unwrap(), task.id());
}

#[test]
fn test_loop_is_reusable_across_runs() {
    let event_loop = EventLoop::new();

    let first = event_loop.block_on(async { 1 });
    let second = event_loop.block_on(async { 2 });
    assert_eq!((first, second), (1, 2));
}

#[test]
fn test_ambient_helpers_require_a_running_loop() {
    // No loop is running on this thread, so ambient submission must refuse.
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        soletta::call_soon(async {});
    }));
    assert!(result.is_err());
}

#[test]
fn test_timeout_pattern_with_wait_for_and_cancel() {
    // Timeouts are not a primitive; they compose from wait_for + cancel.
    let (event_loop, clock) = mock_time_loop();

    let root = event_loop.call_soon(async {
        let slow = soletta::call_soon(async {
            soletta::sleep(Duration::from_millis(60_000)).await;
            "finished"
        });

        let cancel_slow = slow.cancel_handle();
        let timer = soletta::call_soon(async move {
            soletta::sleep(Duration::from_millis(1_000)).await;
            cancel_slow.cancel();
        });

        soletta::wait_for!(slow, timer).await;

        slow.get_result().unwrap_err().is_cancelled()
    });

    event_loop.run_until_complete(&root);
    assert!(root.get_result().unwrap());

    let elapsed = clock.elapsed();
    assert!(elapsed >= Duration::from_millis(1_000), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(60_000), "elapsed {elapsed:?}");
}
