use crate::runtime::Scheduler;
use std::rc::{Rc, Weak};

// Public API
mod cancel;
pub use self::cancel::CancelHandle;

mod error;
pub use self::error::TaskError;

mod handle;
pub use self::handle::TaskHandle;

pub mod id;
pub use self::id::{Id, id, try_id};

// Internals
mod core;
pub(crate) use self::core::TaskCore;

pub(crate) mod slot;

/// Constructor for a new task. Two references to the task record are
/// created: one goes into the scheduler's staging queue, the other backs the
/// typed handle the submitter keeps for result retrieval.
pub(crate) fn new_task<F>(future: F, scheduler: Weak<Scheduler>) -> (Rc<TaskCore>, TaskHandle<F::Output>)
where
    F: Future + 'static,
    F::Output: 'static,
{
    let core = TaskCore::new(future, scheduler);
    let handle = TaskHandle::new(core.clone());
    (core, handle)
}
