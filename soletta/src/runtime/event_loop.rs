use crate::context;
use crate::runtime::Scheduler;
use crate::runtime::timer::{Clock, MonotonicClock};
use crate::task::TaskHandle;
use crate::utils::ScopeGuard;
use anyhow::{Result, anyhow};
use std::cell::Cell;
use std::rc::Rc;

/// Builds an [`EventLoop`] with custom configuration.
///
/// ```
/// let event_loop = soletta::runtime::Builder::new()
///     .max_tasks(256)
///     .try_build()
///     .unwrap();
///
/// let answer = event_loop.block_on(async { 42 });
/// assert_eq!(answer, 42);
/// ```
#[derive(Debug)]
pub struct Builder {
    /// Upper bound on concurrently live tasks. Submitting past the bound
    /// fails synchronously.
    max_tasks: Option<usize>,

    /// Time source for sleep deadlines and idle blocking.
    clock: Rc<dyn Clock>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            max_tasks: None,
            clock: Rc::new(MonotonicClock),
        }
    }

    /// Bound the number of concurrently live tasks.
    ///
    /// # Panics
    ///
    /// Panics if 0 is passed as an argument.
    #[track_caller]
    pub fn max_tasks(mut self, val: usize) -> Self {
        assert!(val > 0, "max_tasks must be greater than 0");
        self.max_tasks = Some(val);
        self
    }

    /// Replace the loop's time source. The default is the monotonic system
    /// clock; tests inject a manually advanced clock to make timing
    /// deterministic.
    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Creates the configured [`EventLoop`], ready to accept tasks.
    pub fn try_build(self) -> Result<EventLoop> {
        let cfg: RuntimeConfig = self.try_into()?;
        Ok(EventLoop {
            scheduler: Rc::new(Scheduler::new(cfg)),
        })
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

// Export the builder as a RuntimeConfig object consumed by the scheduler.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) max_tasks: Option<usize>,
    pub(crate) clock: Rc<dyn Clock>,
}

impl RuntimeConfig {
    fn validate(&self) -> Result<()> {
        if self.max_tasks == Some(0) {
            return Err(anyhow!("max_tasks must be greater than 0"));
        }

        Ok(())
    }
}

impl TryFrom<Builder> for RuntimeConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let cfg = RuntimeConfig {
            max_tasks: builder.max_tasks,
            clock: builder.clock,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}

// Tracks whether an event loop is currently driving this thread, to reject
// re-entrant `run_until_complete` calls.
thread_local! {
    static IS_LOOP_RUNNING: Cell<bool> = const { Cell::new(false) };
}

/// A scheduler bound to the calling thread.
///
/// The loop multiplexes cooperatively yielding tasks over the one thread it
/// was built on: [`call_soon`](EventLoop::call_soon) stages work,
/// [`run_until_complete`](EventLoop::run_until_complete) drives every staged
/// task until the given one finishes. Nothing runs until the loop does.
///
/// The loop (and every handle derived from it) is deliberately `!Send`: a
/// task submitted here cannot be resumed, awaited or cancelled from another
/// thread, which turns the single-thread affinity rule into a compile-time
/// guarantee.
///
/// ```
/// let event_loop = soletta::EventLoop::new();
///
/// let task = event_loop.call_soon(async {
///     soletta::yield_now().await;
///     "done"
/// });
///
/// event_loop.run_until_complete(&task);
/// assert_eq!(task.get_result().unwrap(), "done");
/// ```
#[derive(Debug)]
pub struct EventLoop {
    scheduler: Rc<Scheduler>,
}

impl EventLoop {
    /// Construct an event loop with default configuration. Use
    /// [`Builder`] for anything fancier.
    pub fn new() -> EventLoop {
        Builder::new()
            .try_build()
            .expect("default event loop configuration is valid")
    }

    /// Arrange for `future` to run as a task as soon as possible: the task
    /// is staged now and promoted at the loop's next iteration. Returns the
    /// typed handle used to await, cancel, or read the outcome.
    ///
    /// Submitting is allowed before the loop runs; the task simply waits for
    /// [`run_until_complete`](EventLoop::run_until_complete).
    ///
    /// # Panics
    ///
    /// Panics if the task limit is reached; see
    /// [`try_call_soon`](EventLoop::try_call_soon).
    #[track_caller]
    pub fn call_soon<F>(&self, future: F) -> TaskHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.try_call_soon(future).expect("failed to submit task")
    }

    /// Fallible [`call_soon`](EventLoop::call_soon): reports synchronously
    /// when the configured `max_tasks` bound is exhausted.
    pub fn try_call_soon<F>(&self, future: F) -> Result<TaskHandle<F::Output>>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.scheduler.submit(future)
    }

    /// Drive the loop until `task` has completed.
    ///
    /// While running, this loop is the thread's current loop: the ambient
    /// helpers ([`call_soon`](crate::call_soon), [`sleep`](crate::sleep),
    /// [`yield_now`](crate::yield_now), ...) resolve to it. The binding is
    /// torn down on exit, normal or panicking.
    ///
    /// # Panics
    ///
    /// Panics if called re-entrantly on the same thread, and when `task`
    /// deadlocks: no task is runnable, no timer is pending, and `task` has
    /// not completed.
    pub fn run_until_complete<T: 'static>(&self, task: &TaskHandle<T>) {
        IS_LOOP_RUNNING.with(|running| {
            assert!(
                !running.get(),
                "run_until_complete called re-entrantly on this thread"
            );
            running.set(true);
        });
        context::install_loop(self.scheduler.clone());

        let _guard = ScopeGuard::new(|| {
            context::clear_loop();
            IS_LOOP_RUNNING.with(|running| running.set(false));
        });

        while !task.is_complete() {
            let progressed = self.scheduler.iteration();
            if !progressed && !task.is_complete() {
                panic!(
                    "deadlock: task {} cannot complete (no runnable task, no pending timer)",
                    task.id()
                );
            }
        }
    }

    /// Submit `future`, drive the loop until it completes and return its
    /// output. A panicking root task resumes its panic on the calling
    /// thread.
    ///
    /// This is the entry point generated by `#[soletta::main]` and
    /// `#[soletta::test]`.
    #[track_caller]
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let task = self.call_soon(future);
        self.run_until_complete(&task);

        match task.get_result() {
            Ok(value) => value,
            Err(err) => match err.try_into_panic() {
                Ok(payload) => std::panic::resume_unwind(payload),
                Err(err) => panic!("root task failed: {err}"),
            },
        }
    }

    /// Request cancellation of `task`. Equivalent to
    /// [`TaskHandle::cancel`](crate::task::TaskHandle::cancel).
    pub fn cancel<T: 'static>(&self, task: &TaskHandle<T>) {
        self.scheduler.cancel(task.core());
    }

    #[cfg(test)]
    pub(crate) fn scheduler(&self) -> &Rc<Scheduler> {
        &self.scheduler
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}
