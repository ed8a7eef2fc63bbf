use crate::context;
use crate::task::{CancelHandle, Id, TaskCore, TaskError};
use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// An owned, typed permission to observe a task: retrieve its outcome, wait
/// for it, or request cancellation.
///
/// Returned by [`call_soon`]. The task starts running when the event loop
/// does, whether or not the handle is ever used; dropping the handle
/// *detaches* the task, which keeps running but whose result is lost.
///
/// A handle can be consumed in two ways:
///
/// - synchronously, after the loop has driven the task to completion:
///
/// ```no_run
/// let event_loop = soletta::EventLoop::new();
/// let task = event_loop.call_soon(async { 5 + 3 });
/// event_loop.run_until_complete(&task);
/// assert_eq!(task.get_result().unwrap(), 8);
/// ```
///
/// - by awaiting it from another task, which suspends the awaiting task on
///   the target's completion rendezvous:
///
/// ```no_run
/// # async fn doc() {
/// let eight = soletta::call_soon(async { 5 + 3 }).await.unwrap();
/// # }
/// ```
///
/// Both forms yield `Result<T, TaskError>`: a task that panicked or was
/// cancelled surfaces as `Err`.
///
/// [`call_soon`]: crate::call_soon
pub struct TaskHandle<T> {
    core: Rc<TaskCore>,
    _p: PhantomData<T>,
}

impl<T: 'static> TaskHandle<T> {
    pub(crate) fn new(core: Rc<TaskCore>) -> TaskHandle<T> {
        TaskHandle {
            core,
            _p: PhantomData,
        }
    }

    pub(crate) fn core(&self) -> &Rc<TaskCore> {
        &self.core
    }

    /// Returns the id that uniquely identifies this task.
    pub fn id(&self) -> Id {
        self.core.id()
    }

    /// True once the task's body has returned, panicked, or been dropped by
    /// cancellation.
    pub fn is_complete(&self) -> bool {
        self.core.is_complete()
    }

    /// Consume the task's outcome.
    ///
    /// A panic or cancellation captured by the task is surfaced as `Err`.
    /// The outcome can be taken exactly once.
    ///
    /// # Panics
    ///
    /// Panics if the task has not completed yet, or if the outcome was
    /// already taken (including by awaiting the handle).
    pub fn get_result(&self) -> Result<T, TaskError> {
        assert!(
            self.core.is_complete(),
            "task {} result read before completion",
            self.core.id()
        );
        self.core.slot().take::<T>()
    }

    /// Request cancellation of the task.
    ///
    /// If the task is blocked, it is woken; its next suspension point turns
    /// into a `Cancelled` failure. A task that is already complete, or that
    /// never suspends, is unaffected.
    pub fn cancel(&self) {
        match self.core.scheduler() {
            Some(scheduler) => scheduler.cancel(&self.core),
            // The loop is gone, the task can never run again; recording the
            // request is all there is to do.
            None => self.core.request_cancel(),
        }
    }

    /// Returns a clonable [`CancelHandle`] for cancelling this task from
    /// elsewhere, without giving up the ability to read its result here.
    #[must_use = "cancel handles do nothing unless `.cancel` is called"]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(self.core.clone())
    }
}

impl<T: 'static> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.core.is_complete() {
            return Poll::Ready(self.core.slot().take::<T>());
        }

        // Block the awaiting task on this task's completion rendezvous. The
        // wake-up arrives when the target completes and its completion
        // handle is detached.
        context::with_scheduler(|scheduler| {
            let current = context::current_task();
            scheduler.attach(self.core.completion(), &current);
        });

        Poll::Pending
    }
}

impl<T> Unpin for TaskHandle<T> {}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.core.id())
            .finish()
    }
}
