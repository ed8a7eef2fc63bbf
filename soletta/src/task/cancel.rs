use crate::task::{Id, TaskCore};
use std::fmt;
use std::rc::Rc;

/// A clonable handle for requesting cancellation of a task.
///
/// Unlike [`TaskHandle`](crate::task::TaskHandle), a `CancelHandle` cannot
/// read the task's result, so it can be handed to the task's siblings while
/// the owner keeps the typed handle:
///
/// ```no_run
/// use std::time::Duration;
///
/// # async fn doc() {
/// let victim = soletta::call_soon(async {
///     soletta::sleep(Duration::from_secs(5)).await;
/// });
///
/// let cancel = victim.cancel_handle();
/// soletta::call_soon(async move {
///     soletta::sleep(Duration::from_millis(10)).await;
///     cancel.cancel();
/// });
///
/// assert!(victim.await.unwrap_err().is_cancelled());
/// # }
/// ```
#[derive(Clone)]
pub struct CancelHandle {
    core: Rc<TaskCore>,
}

impl CancelHandle {
    pub(crate) fn new(core: Rc<TaskCore>) -> CancelHandle {
        CancelHandle { core }
    }

    /// Request cancellation of the task. See
    /// [`TaskHandle::cancel`](crate::task::TaskHandle::cancel).
    pub fn cancel(&self) {
        match self.core.scheduler() {
            Some(scheduler) => scheduler.cancel(&self.core),
            None => self.core.request_cancel(),
        }
    }

    /// True once the task has completed.
    ///
    /// Note that this can stay `false` for a while after [`cancel`] has been
    /// called: cancellation is observed at the task's next suspension point,
    /// not at the moment of the request.
    ///
    /// [`cancel`]: CancelHandle::cancel
    pub fn is_complete(&self) -> bool {
        self.core.is_complete()
    }

    /// Returns the id of the task this handle refers to.
    pub fn id(&self) -> Id {
        self.core.id()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("id", &self.core.id())
            .finish()
    }
}
