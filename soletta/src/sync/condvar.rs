use crate::context;
use crate::future::WaitOn;
use crate::runtime::wait::WaitHandle;
use std::fmt;

/// A condition variable for tasks on the same event loop.
///
/// [`wait`](Condvar::wait) suspends the current task until some other task
/// calls [`notify_all`](Condvar::notify_all). There is no built-in
/// predicate and no notify-one: callers loop around `wait` re-checking
/// their condition, exactly as with an OS condition variable.
///
/// ```no_run
/// use soletta::sync::Condvar;
/// use std::cell::Cell;
///
/// # async fn doc(ready: Cell<bool>, cond: Condvar) {
/// while !ready.get() {
///     cond.wait().await;
/// }
/// # }
/// ```
pub struct Condvar {
    wait: WaitHandle,
}

impl Condvar {
    pub fn new() -> Condvar {
        Condvar {
            wait: WaitHandle::new(),
        }
    }

    /// Suspend the current task until the next
    /// [`notify_all`](Condvar::notify_all).
    pub async fn wait(&self) {
        WaitOn::new(&self.wait).await;
    }

    /// Wake every task blocked in [`wait`](Condvar::wait). Waiters resume at
    /// the next loop iteration; a task that starts waiting after this call
    /// is not woken by it.
    pub fn notify_all(&self) {
        if self.wait.waiter_count() == 0 {
            return;
        }
        context::with_scheduler(|scheduler| scheduler.detach(&self.wait));
    }

    /// Number of tasks currently blocked in [`wait`](Condvar::wait).
    pub fn waiter_count(&self) -> usize {
        self.wait.waiter_count()
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Condvar {
    fn drop(&mut self) {
        self.wait.reset();
    }
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condvar")
            .field("waiters", &self.wait.waiter_count())
            .finish()
    }
}
