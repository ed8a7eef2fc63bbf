// Public API
mod sleep;
pub use self::sleep::{Sleep, sleep};

mod wait_for;
pub use self::wait_for::WaitFor;

mod yield_now;
pub use self::yield_now::{YieldNow, yield_now};

// Internals
mod wait_on;
pub(crate) use self::wait_on::WaitOn;
