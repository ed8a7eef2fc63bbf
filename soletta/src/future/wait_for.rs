use crate::context;
use crate::task::{TaskCore, TaskHandle};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Future that blocks the current task until a set of tasks has completed.
///
/// Unlike awaiting the handles one after another, the waiting task suspends
/// exactly once, attached to every incomplete target's completion
/// rendezvous; each completion brings its wait count one step closer to
/// runnable. Results (and failures) stay with the individual handles.
///
/// Usually built through the [`wait_for!`](crate::wait_for!) macro:
///
/// ```no_run
/// use std::time::Duration;
///
/// # async fn doc() {
/// let t1 = soletta::call_soon(async { soletta::sleep(Duration::from_millis(750)).await });
/// let t2 = soletta::call_soon(async { soletta::sleep(Duration::from_millis(1500)).await });
///
/// soletta::wait_for!(t1, t2).await;
/// assert!(t1.is_complete() && t2.is_complete());
/// # }
/// ```
#[derive(Debug, Default)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct WaitFor {
    targets: Vec<Rc<TaskCore>>,
}

impl WaitFor {
    pub fn new() -> WaitFor {
        WaitFor {
            targets: Vec::new(),
        }
    }

    /// Add a task to wait for. Accepts handles of heterogeneous output
    /// types; the handle stays usable for result retrieval afterwards.
    pub fn with<T: 'static>(mut self, task: &TaskHandle<T>) -> WaitFor {
        self.targets.push(task.core().clone());
        self
    }
}

impl Future for WaitFor {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let pending: Vec<&Rc<TaskCore>> = self
            .targets
            .iter()
            .filter(|t| !t.is_complete())
            .collect();

        if pending.is_empty() {
            return Poll::Ready(());
        }

        // Re-polled only once the wait count is back to zero, i.e. every
        // attach below has been released; attaching to the still-incomplete
        // targets never double-books an entry.
        context::with_scheduler(|scheduler| {
            let current = context::current_task();
            for target in pending {
                scheduler.attach(target.completion(), &current);
            }
        });

        Poll::Pending
    }
}

/// Suspend the current task until every given task has completed.
///
/// Expands to a [`WaitFor`](crate::future::WaitFor) over the handles; pass
/// the handles themselves (they are borrowed, not consumed).
///
/// ```no_run
/// # async fn doc() {
/// let t1 = soletta::call_soon(async { 1 });
/// let t2 = soletta::call_soon(async { "two" });
///
/// soletta::wait_for!(t1, t2).await;
/// # }
/// ```
#[macro_export]
macro_rules! wait_for {
    ($($task:expr),+ $(,)?) => {
        $crate::future::WaitFor::new()$(.with(&$task))+
    };
}
