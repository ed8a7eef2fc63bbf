use crate::runtime::RuntimeConfig;
use crate::runtime::timer::SleepEntry;
use crate::runtime::wait::WaitHandle;
use crate::task::{Id, TaskCore, TaskHandle, new_task};
use anyhow::{Result, anyhow};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

/// The driver: picks runnable tasks, resumes them, reacts to wait-handle
/// changes and idle-sleeps until the next timer deadline.
///
/// Tasks live in exactly one of four places: `active` (runnable), `inactive`
/// (blocked), `new_tasks` (submitted during an iteration, promoted at the
/// next one) or, transiently, the `completed` staging that removes them from
/// `active`. Membership is never changed in the middle of a round; instead,
/// every task whose wait count changes is recorded in `dirty` and
/// reclassified between rounds. The `active` flag cached on each task
/// mirrors set membership so that reclassification is a constant-time
/// decision per dirty entry.
#[derive(Debug)]
pub struct Scheduler {
    pub(crate) cfg: RuntimeConfig,

    /// Runnable tasks, in submission order.
    active: RefCell<Vec<Rc<TaskCore>>>,

    /// Blocked tasks (wait count above zero).
    inactive: RefCell<Vec<Rc<TaskCore>>>,

    /// Staging for submissions made while a round is running.
    new_tasks: RefCell<VecDeque<Rc<TaskCore>>>,

    /// Staging for tasks that completed during the current iteration.
    completed: RefCell<Vec<Id>>,

    /// Tasks whose wait count changed during the current iteration and whose
    /// set membership must be refreshed before the next round.
    dirty: RefCell<Vec<Rc<TaskCore>>>,

    /// Pending timer wake-ups.
    sleepers: RefCell<Vec<SleepEntry>>,

    /// The "next tick" rendezvous behind `yield_now`: detached at the top of
    /// every iteration, so a yielded task resumes exactly one iteration
    /// later.
    tick: WaitHandle,

    /// The task whose body is currently executing, if any.
    current: RefCell<Option<Rc<TaskCore>>>,

    /// Number of live (submitted, not yet completed) tasks; bounded by
    /// `cfg.max_tasks`.
    live_tasks: Cell<usize>,
}

impl Scheduler {
    pub(crate) fn new(cfg: RuntimeConfig) -> Self {
        Self {
            cfg,
            active: RefCell::new(Vec::new()),
            inactive: RefCell::new(Vec::new()),
            new_tasks: RefCell::new(VecDeque::new()),
            completed: RefCell::new(Vec::new()),
            dirty: RefCell::new(Vec::new()),
            sleepers: RefCell::new(Vec::new()),
            tick: WaitHandle::new(),
            current: RefCell::new(None),
            live_tasks: Cell::new(0),
        }
    }

    /// Build a task around `future` and stage it for the next iteration.
    /// Does not run it.
    pub(crate) fn submit<F>(self: &Rc<Self>, future: F) -> Result<TaskHandle<F::Output>>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        if let Some(max_tasks) = self.cfg.max_tasks
            && self.live_tasks.get() >= max_tasks
        {
            return Err(anyhow!(
                "cannot submit task: the task limit ({max_tasks}) is reached"
            ));
        }

        let (core, handle) = new_task(future, Rc::downgrade(self));
        tracing::trace!(task.id = %core.id(), "task submitted");

        self.live_tasks.set(self.live_tasks.get() + 1);
        self.new_tasks.borrow_mut().push_back(core);

        Ok(handle)
    }

    pub(crate) fn current_task(&self) -> Option<Rc<TaskCore>> {
        self.current.borrow().clone()
    }

    pub(crate) fn tick_handle(&self) -> &WaitHandle {
        &self.tick
    }

    /// Block `task` on `handle`. Every suspension in the runtime goes
    /// through here: the wait count goes up, the task is recorded as a
    /// waiter, and if it just stopped being runnable it is marked dirty so
    /// the next reclassification moves it out of `active`.
    ///
    /// A task may be attached to the same handle more than once; each attach
    /// adds one waiter entry and one wait count.
    pub(crate) fn attach(&self, handle: &WaitHandle, task: &Rc<TaskCore>) {
        tracing::trace!(task.id = %task.id(), wait.id = %handle.id(), "attach");

        if task.wait_count() == 0 {
            self.dirty.borrow_mut().push(task.clone());
        }
        task.incr_wait_count();
        task.push_waiting_on(handle.clone());
        handle.push_waiter(Rc::downgrade(task));
    }

    /// Wake every task blocked on `handle`. There is no wake-one at this
    /// layer; primitives that need it give each waiter its own handle.
    pub(crate) fn detach(&self, handle: &WaitHandle) {
        let waiters = handle.take_waiters();
        if waiters.is_empty() {
            return;
        }
        tracing::trace!(wait.id = %handle.id(), waiters = waiters.len(), "detach");

        for waiter in waiters {
            let Some(task) = waiter.upgrade() else {
                continue;
            };
            // Completion purges a task's attachments, so no live entry
            // should refer to a completed task; tolerate one anyway.
            if task.is_complete() {
                continue;
            }

            task.decr_wait_count();
            task.remove_waiting_on(handle);
            if task.wait_count() == 0 {
                self.dirty.borrow_mut().push(task);
            }
        }
    }

    /// Detach every handle `task` is attached to, restoring its wait count
    /// to zero. Co-waiters of those handles receive a spurious wake, which
    /// every primitive tolerates by re-checking its condition.
    pub(crate) fn purge_attachments(&self, task: &Rc<TaskCore>) {
        for handle in task.attached_handles() {
            self.detach(&handle);
        }
    }

    /// Request cancellation of `task`; safe to call from any task on the
    /// same loop. A blocked target is woken so that its next resume observes
    /// the request; a target that is already complete is left alone.
    pub(crate) fn cancel(&self, task: &Rc<TaskCore>) {
        if task.is_complete() {
            return;
        }

        tracing::debug!(task.id = %task.id(), "cancellation requested");
        task.request_cancel();

        if task.wait_count() > 0 {
            self.purge_attachments(task);
        }
    }

    /// Create a sleep entry waking the current task at `now + duration` and
    /// block the task on it.
    pub(crate) fn sleep_current_task(&self, duration: Duration) {
        let current = self.current_task().expect("sleep outside of a task");
        let handle = WaitHandle::new();
        let deadline = self.cfg.clock.now() + duration;

        tracing::trace!(task.id = %current.id(), ?duration, "task sleeping");
        self.attach(&handle, &current);
        self.sleepers.borrow_mut().push(SleepEntry { deadline, handle });
    }

    /// Called by the resume harness once a task's outcome is stored. Wakes
    /// everything blocked on the task's completion and stages its removal
    /// from `active`.
    pub(crate) fn task_completed(&self, task: &Rc<TaskCore>) {
        tracing::debug!(task.id = %task.id(), "task completed");

        self.live_tasks.set(self.live_tasks.get() - 1);
        self.completed.borrow_mut().push(task.id());
        self.detach(task.completion());
    }

    /// One full scheduler cycle: wake yielded tasks, reclassify dirty tasks,
    /// merge staging, wake timers, idle-sleep, then run one round over the
    /// active snapshot.
    ///
    /// Returns `false` when the loop is fully idle (nothing runnable,
    /// nothing staged and no pending timer), in which case iterating further
    /// can never make progress.
    pub(crate) fn iteration(&self) -> bool {
        self.wake_yielded();
        self.reclassify_dirty();
        self.merge_staging();
        self.wake_timers();

        // Idle-sleep. Timer wakes from this iteration are only promoted to
        // `active` at the next reclassification, so a non-empty dirty list
        // counts as "someone is ready" and skips the blocking sleep.
        if self.active.borrow().is_empty() && self.dirty.borrow().is_empty() {
            let next_deadline = self.sleepers.borrow().iter().map(|e| e.deadline).min();
            match next_deadline {
                Some(deadline) => {
                    tracing::trace!("no runnable task, blocking until next deadline");
                    self.cfg.clock.sleep_until(deadline);
                }
                None => return false,
            }
        }

        self.run_round();
        true
    }

    /// Step 0: wake every task that yielded during the previous round. Their
    /// wait counts return to zero before reclassification runs, so they stay
    /// in `active` and run again this iteration, one iteration after they
    /// yielded.
    fn wake_yielded(&self) {
        if self.tick.waiter_count() > 0 {
            self.detach(&self.tick);
        }
    }

    /// Step 1: refresh set membership for every task whose wait count
    /// changed since the last round.
    fn reclassify_dirty(&self) {
        debug_assert!(
            self.current.borrow().is_none(),
            "reclassification while a task is executing"
        );

        let dirty: Vec<Rc<TaskCore>> = self.dirty.borrow_mut().drain(..).collect();
        for task in dirty {
            // Completed tasks are handled by the `completed` staging.
            if task.is_complete() {
                continue;
            }

            let runnable = task.wait_count() == 0;
            if runnable && !task.is_active() {
                self.inactive.borrow_mut().retain(|t| t.id() != task.id());
                task.set_active(true);
                tracing::trace!(task.id = %task.id(), "task runnable");
                self.active.borrow_mut().push(task);
            } else if !runnable && task.is_active() {
                self.active.borrow_mut().retain(|t| t.id() != task.id());
                task.set_active(false);
                tracing::trace!(task.id = %task.id(), "task blocked");
                self.inactive.borrow_mut().push(task);
            }
        }
    }

    /// Step 2: promote tasks submitted during the previous round, in
    /// submission order, and drop tasks that completed.
    fn merge_staging(&self) {
        let mut new_tasks = self.new_tasks.borrow_mut();
        if !new_tasks.is_empty() {
            let mut active = self.active.borrow_mut();
            for task in new_tasks.drain(..) {
                task.set_active(true);
                active.push(task);
            }
        }
        drop(new_tasks);

        let mut completed = self.completed.borrow_mut();
        if !completed.is_empty() {
            let done: Vec<Id> = completed.drain(..).collect();
            self.active.borrow_mut().retain(|t| !done.contains(&t.id()));
        }
    }

    /// Step 3: fire every sleep entry whose deadline has passed, and drop
    /// entries whose sleeper is gone (cancelled before the deadline).
    fn wake_timers(&self) {
        let mut sleepers = self.sleepers.borrow_mut();
        if sleepers.is_empty() {
            return;
        }

        let now = self.cfg.clock.now();
        sleepers.retain(|entry| {
            if entry.handle.waiter_count() == 0 {
                return false;
            }
            if now >= entry.deadline {
                tracing::trace!(wait.id = %entry.handle.id(), "timer fired");
                self.detach(&entry.handle);
                return false;
            }
            true
        });
    }

    /// Step 5: resume each task in a snapshot of `active` exactly once.
    ///
    /// The snapshot matters: a task that suspends mid-round stays in
    /// `active` until the next reclassification, and tasks made runnable
    /// during the round run no earlier than the next iteration.
    fn run_round(&self) {
        let snapshot: Vec<Rc<TaskCore>> = self.active.borrow().clone();
        for task in snapshot {
            if task.is_complete() {
                continue;
            }

            *self.current.borrow_mut() = Some(task.clone());
            task.resume(self);
        }
        self.current.borrow_mut().take();
    }
}

// Test-only introspection.
#[cfg(test)]
impl Scheduler {
    pub(crate) fn live_task_count(&self) -> usize {
        self.live_tasks.get()
    }

    pub(crate) fn assert_sets_consistent(&self) {
        for task in self.active.borrow().iter() {
            assert!(task.is_active());
            assert_eq!(task.wait_count(), 0, "active task {} has waits", task.id());
        }
        for task in self.inactive.borrow().iter() {
            assert!(!task.is_active());
            assert!(
                task.wait_count() > 0,
                "blocked task {} is not waiting",
                task.id()
            );
        }
    }
}
