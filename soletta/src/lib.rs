//! A single-threaded cooperative task runtime.
//!
//! Concurrent activities are expressed as ordinary `async` blocks that
//! voluntarily yield control; an [`EventLoop`] multiplexes them over the one
//! OS thread it was built on. There is no preemption, no work stealing and
//! no I/O reactor. Anything between two suspension points runs atomically
//! with respect to every other task.
//!
//! ```
//! let event_loop = soletta::EventLoop::new();
//!
//! let task = event_loop.call_soon(async {
//!     let sub = soletta::call_soon(async { 21 });
//!     sub.await.unwrap() * 2
//! });
//!
//! event_loop.run_until_complete(&task);
//! assert_eq!(task.get_result().unwrap(), 42);
//! ```

#[doc(inline)]
pub use soletta_macros::main;

#[doc(inline)]
pub use soletta_macros::test;

pub mod future;
pub use future::{sleep, yield_now};

pub mod runtime;
pub use runtime::{Builder, EventLoop, call_soon, try_call_soon, yield_to};

pub mod sync;

pub mod task;
pub use task::{CancelHandle, TaskError, TaskHandle};

mod context;

mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
