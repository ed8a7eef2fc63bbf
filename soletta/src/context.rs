//! Thread-local access to the running event loop.
//!
//! One event loop runs per thread at a time. When `run_until_complete` is
//! entered, the loop installs its scheduler here and tears it down on exit;
//! this is what lets the ambient helpers (`yield_now`, `sleep`, `call_soon`,
//! the synchronization primitives) find their scheduler without being passed
//! one explicitly.

use crate::runtime::Scheduler;
use crate::task::{Id, TaskCore};
use std::cell::RefCell;
use std::rc::Rc;
use std::thread_local;

thread_local! {
    static CURRENT_LOOP: RefCell<Option<Rc<Scheduler>>> = const { RefCell::new(None) };
}

/// Mark `scheduler` as the thread's running loop.
pub(crate) fn install_loop(scheduler: Rc<Scheduler>) {
    CURRENT_LOOP.with(|current| {
        let mut current = current.borrow_mut();
        debug_assert!(current.is_none(), "an event loop is already installed");
        *current = Some(scheduler);
    });
}

/// Tear down the thread's running loop.
pub(crate) fn clear_loop() {
    CURRENT_LOOP.with(|current| current.borrow_mut().take());
}

/// Run `f` against the thread's running scheduler.
///
/// # Panics
///
/// Panics if no event loop is running on this thread.
#[track_caller]
pub(crate) fn with_scheduler<F, R>(f: F) -> R
where
    F: FnOnce(&Rc<Scheduler>) -> R,
{
    try_with_scheduler(f).expect("no event loop is running on this thread")
}

pub(crate) fn try_with_scheduler<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&Rc<Scheduler>) -> R,
{
    // The scheduler is cloned out so no thread-local borrow is held while
    // `f` runs; primitives re-enter this module freely.
    let scheduler = CURRENT_LOOP.with(|current| current.borrow().clone());
    scheduler.as_ref().map(f)
}

/// The task whose body is currently executing.
///
/// # Panics
///
/// Panics if called outside of a task's poll.
#[track_caller]
pub(crate) fn current_task() -> Rc<TaskCore> {
    with_scheduler(|scheduler| scheduler.current_task())
        .expect("not inside a task")
}

pub(crate) fn current_task_id() -> Option<Id> {
    try_with_scheduler(|scheduler| scheduler.current_task().map(|t| t.id()))
        .flatten()
}
