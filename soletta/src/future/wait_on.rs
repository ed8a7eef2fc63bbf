use crate::context;
use crate::runtime::wait::WaitHandle;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Block the current task on a wait handle until the handle is detached.
///
/// This is the bare rendezvous the synchronization primitives are built
/// from: attach once, suspend, complete on the wake-up. Wake-ups are
/// wake-all and may be spurious (another waiter's cancellation detaches
/// shared handles), so callers re-check their condition in a loop.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub(crate) struct WaitOn<'a> {
    handle: &'a WaitHandle,
    attached: bool,
}

impl<'a> WaitOn<'a> {
    pub(crate) fn new(handle: &'a WaitHandle) -> Self {
        Self {
            handle,
            attached: false,
        }
    }
}

impl Future for WaitOn<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.attached {
            return Poll::Ready(());
        }

        self.attached = true;
        context::with_scheduler(|scheduler| {
            let current = context::current_task();
            scheduler.attach(self.handle, &current);
        });

        Poll::Pending
    }
}
