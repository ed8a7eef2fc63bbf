use crate::context;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Put the current task to sleep for at least `duration`.
///
/// The loop wakes the task at its next iteration after the deadline passes;
/// with a busy loop the wake-up can land later than the deadline, never
/// earlier. A zero duration behaves like [`yield_now`](crate::yield_now).
///
/// ```no_run
/// use std::time::Duration;
///
/// # async fn doc() {
/// soletta::sleep(Duration::from_millis(100)).await;
/// # }
/// ```
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        duration,
        registered: false,
    }
}

/// Future returned by [`sleep`].
///
/// The first poll hands the scheduler a sleep entry (deadline plus a fresh
/// wait handle) and blocks the task on it; the next poll can only happen
/// once the timer fired and detached the handle, so it completes.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Sleep {
    duration: Duration,
    registered: bool,
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.registered {
            return Poll::Ready(());
        }

        self.registered = true;
        context::with_scheduler(|scheduler| scheduler.sleep_current_task(self.duration));

        Poll::Pending
    }
}
