use crate::context;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Suspend the current task until the next loop iteration, giving every
/// other runnable task a chance to run.
///
/// ```no_run
/// # async fn doc() {
/// for _ in 0..5 {
///     // do a slice of work, then be nice
///     soletta::yield_now().await;
/// }
/// # }
/// ```
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now`].
///
/// Suspension goes through the loop's shared "next tick" wait handle, which
/// the scheduler detaches at the top of every iteration; that is what pins
/// the wake-up to exactly one iteration later.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.yielded {
            return Poll::Ready(());
        }

        self.yielded = true;
        context::with_scheduler(|scheduler| {
            let current = context::current_task();
            scheduler.attach(scheduler.tick_handle(), &current);
        });

        Poll::Pending
    }
}
