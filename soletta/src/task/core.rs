use crate::runtime::Scheduler;
use crate::runtime::wait::WaitHandle;
use crate::task::slot::ResultSlot;
use crate::task::{Id, TaskError};
use pin_project::pin_project;
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

/// The type-erased side of a task's body.
///
/// The user's future is generic over its output type; the scheduler is not.
/// Erasure happens here instead of in the result path: polling to completion
/// stores the output straight into the task's result slot, so the scheduler
/// only ever sees `Poll<()>`.
pub(crate) trait ErasedTask {
    fn poll_task(self: Pin<&mut Self>, cx: &mut Context<'_>, slot: &ResultSlot) -> Poll<()>;
}

#[pin_project]
struct TaskFuture<F: Future> {
    #[pin]
    future: F,
}

impl<F> ErasedTask for TaskFuture<F>
where
    F: Future,
    F::Output: 'static,
{
    fn poll_task(self: Pin<&mut Self>, cx: &mut Context<'_>, slot: &ResultSlot) -> Poll<()> {
        let this = self.project();
        match this.future.poll(cx) {
            Poll::Ready(output) => {
                slot.store_value(output);
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// One unit of cooperatively scheduled user work.
///
/// This is the record the scheduler's queues hold, shared with the user's
/// typed [`TaskHandle`](crate::task::TaskHandle). The future stored here is
/// the task's "stack": a stackless state machine that is advanced one poll
/// at a time and dropped when the task completes or is cancelled.
///
/// The blocking invariant is `wait_count == 0` iff the task is logically
/// runnable. The `active` flag caches which scheduler set the task currently
/// sits in, so reclassifying a dirty task is a constant-time decision.
pub(crate) struct TaskCore {
    id: Id,

    /// Back-reference to the owning scheduler. Dead once the loop is gone,
    /// at which point the task can no longer run but a completed result can
    /// still be read through the user handle.
    scheduler: Weak<Scheduler>,

    /// The task body. `None` once the task has completed (or was cancelled
    /// and the body dropped).
    future: RefCell<Option<Pin<Box<dyn ErasedTask>>>>,

    /// Outcome storage, empty until the body returns or fails.
    slot: ResultSlot,

    /// Rendezvous owned by this task; dependents attach here to be woken on
    /// completion.
    completion: WaitHandle,

    /// Number of attaches this task currently has outstanding.
    wait_count: Cell<u32>,

    /// Cached set membership (active vs inactive), maintained by the
    /// scheduler.
    active: Cell<bool>,

    complete: Cell<bool>,

    cancel_requested: Cell<bool>,

    /// Whether the body has reached a suspension point at least once. A
    /// cancelled task is torn down when resumed *from* a suspension point;
    /// a body that never suspends runs to completion regardless.
    suspended: Cell<bool>,

    /// The handles this task is attached to, one entry per attach. Mirrors
    /// the handle-side waiter entries; backs cancellation wake-up.
    waiting_on: RefCell<SmallVec<[WaitHandle; 2]>>,
}

impl TaskCore {
    pub(crate) fn new<F>(future: F, scheduler: Weak<Scheduler>) -> Rc<TaskCore>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        Rc::new(TaskCore {
            id: Id::next(),
            scheduler,
            future: RefCell::new(Some(Box::pin(TaskFuture { future }))),
            slot: ResultSlot::new(),
            completion: WaitHandle::new(),
            wait_count: Cell::new(0),
            active: Cell::new(false),
            complete: Cell::new(false),
            cancel_requested: Cell::new(false),
            suspended: Cell::new(false),
            waiting_on: RefCell::new(SmallVec::new()),
        })
    }

    pub(crate) fn id(&self) -> Id {
        self.id
    }

    pub(crate) fn scheduler(&self) -> Option<Rc<Scheduler>> {
        self.scheduler.upgrade()
    }

    pub(crate) fn completion(&self) -> &WaitHandle {
        &self.completion
    }

    pub(crate) fn slot(&self) -> &ResultSlot {
        &self.slot
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.complete.get()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.set(active);
    }

    pub(crate) fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.get()
    }

    pub(crate) fn request_cancel(&self) {
        self.cancel_requested.set(true);
    }

    pub(crate) fn wait_count(&self) -> u32 {
        self.wait_count.get()
    }

    pub(crate) fn incr_wait_count(&self) {
        self.wait_count.set(self.wait_count.get() + 1);
    }

    pub(crate) fn decr_wait_count(&self) {
        let count = self
            .wait_count
            .get()
            .checked_sub(1)
            .unwrap_or_else(|| panic!("wait count underflow on task {}", self.id));
        self.wait_count.set(count);
    }

    /// Record an attach on the task side. One entry per attach, mirroring
    /// the handle's waiter entry.
    pub(crate) fn push_waiting_on(&self, handle: WaitHandle) {
        self.waiting_on.borrow_mut().push(handle);
    }

    /// Drop one task-side entry for `handle`, as part of a detach.
    pub(crate) fn remove_waiting_on(&self, handle: &WaitHandle) {
        let mut waiting_on = self.waiting_on.borrow_mut();
        if let Some(pos) = waiting_on.iter().position(|h| h == handle) {
            waiting_on.swap_remove(pos);
        }
    }

    /// The distinct handles this task is currently attached to.
    pub(crate) fn attached_handles(&self) -> SmallVec<[WaitHandle; 2]> {
        let mut handles: SmallVec<[WaitHandle; 2]> = SmallVec::new();
        for handle in self.waiting_on.borrow().iter() {
            if !handles.contains(handle) {
                handles.push(handle.clone());
            }
        }
        handles
    }

    /// Transfer control into the task's body until it next suspends or
    /// completes.
    ///
    /// This is where task outcomes are decided:
    /// - the body runs to completion: its output is already in the slot;
    /// - the body panics: the payload is captured as the task's failure;
    /// - the body suspends while cancellation is requested: a poll about to
    ///   return `Pending` is exactly a suspension point, so the body is
    ///   dropped (running destructors, the stackless analogue of unwinding
    ///   the coroutine stack) and a `Cancelled` failure is stored.
    pub(crate) fn resume(self: &Rc<Self>, scheduler: &Scheduler) {
        debug_assert!(!self.is_complete(), "resumed a completed task");

        // A resume that returns *from* a suspension point is where a pending
        // cancellation takes effect; the body is not re-entered. (A wake-up
        // may have raced with the cancel; a detached sleep handle would
        // otherwise let the body run on as if the timer fired.)
        if self.is_cancel_requested() && self.suspended.get() {
            tracing::debug!(task.id = %self.id, "task observed cancellation");
            self.future.borrow_mut().take();
            self.slot.store_failure(TaskError::cancelled(self.id));
            self.finish(scheduler);
            return;
        }

        let waker = futures::task::noop_waker_ref();
        let mut cx = Context::from_waker(waker);

        let polled = {
            let mut future = self.future.borrow_mut();
            let future = future
                .as_mut()
                .expect("resumed a task whose body is gone");
            panic::catch_unwind(AssertUnwindSafe(|| {
                future.as_mut().poll_task(&mut cx, &self.slot)
            }))
        };

        match polled {
            Ok(Poll::Ready(())) => {
                self.future.borrow_mut().take();
                self.finish(scheduler);
            }
            Ok(Poll::Pending) => {
                self.suspended.set(true);
                if self.is_cancel_requested() {
                    tracing::debug!(task.id = %self.id, "task observed cancellation");
                    self.future.borrow_mut().take();
                    self.slot.store_failure(TaskError::cancelled(self.id));
                    self.finish(scheduler);
                }
            }
            Err(payload) => {
                tracing::debug!(task.id = %self.id, "task panicked");
                self.future.borrow_mut().take();
                self.slot.store_failure(TaskError::panicked(self.id, payload));
                self.finish(scheduler);
            }
        }
    }

    fn finish(self: &Rc<Self>, scheduler: &Scheduler) {
        // Dropping the body (or an unusual construct like polling a
        // rendezvous future outside an await) can leave attachments behind;
        // release them so no handle keeps a stale entry for this task.
        scheduler.purge_attachments(self);

        debug_assert!(self.slot.is_valid(), "task finished without an outcome");
        self.complete.set(true);
        scheduler.task_completed(self);
    }
}

impl fmt::Debug for TaskCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCore")
            .field("id", &self.id)
            .field("wait_count", &self.wait_count.get())
            .field("active", &self.active.get())
            .field("complete", &self.complete.get())
            .field("cancel_requested", &self.cancel_requested.get())
            .finish()
    }
}
