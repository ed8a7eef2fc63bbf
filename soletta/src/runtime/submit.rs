//! Ambient task submission: free functions that resolve the thread's
//! running event loop, so tasks can spawn sub-tasks without carrying a loop
//! reference around.

use crate::context;
use crate::task::{TaskError, TaskHandle};
use anyhow::Result;

/// Submit `future` as a new task on the thread's running event loop. The
/// task is staged now and first runs at the loop's next iteration.
///
/// ```no_run
/// # async fn doc() {
/// let task = soletta::call_soon(async { 5 + 3 });
/// assert_eq!(task.await.unwrap(), 8);
/// # }
/// ```
///
/// # Panics
///
/// Panics if no event loop is running on this thread, or if the loop's task
/// limit is reached. To submit before the loop runs, use
/// [`EventLoop::call_soon`](crate::EventLoop::call_soon).
#[track_caller]
pub fn call_soon<F>(future: F) -> TaskHandle<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    try_call_soon(future).expect("failed to submit task")
}

/// Fallible [`call_soon`]: reports synchronously when the loop's `max_tasks`
/// bound is exhausted.
///
/// # Panics
///
/// Panics if no event loop is running on this thread.
#[track_caller]
pub fn try_call_soon<F>(future: F) -> Result<TaskHandle<F::Output>>
where
    F: Future + 'static,
    F::Output: 'static,
{
    context::with_scheduler(|scheduler| scheduler.submit(future))
}

/// Yield to `future`: run it as a sub-task, suspending the current task
/// until the sub-task completes, then hand back its result. A panic or
/// cancellation inside the sub-task surfaces as `Err`.
///
/// ```no_run
/// # async fn doc() {
/// let three = soletta::yield_to(async {
///     soletta::yield_to(async { 3 }).await.unwrap()
/// })
/// .await
/// .unwrap();
/// assert_eq!(three, 3);
/// # }
/// ```
pub async fn yield_to<F>(future: F) -> Result<F::Output, TaskError>
where
    F: Future + 'static,
    F::Output: 'static,
{
    call_soon(future).await
}
