use crate::runtime::{Builder, Clock, EventLoop};
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A manually advanced [`Clock`].
///
/// Time only moves when the loop idle-sleeps: `sleep_until` jumps straight
/// to the deadline. Timing scenarios run instantly and deterministically,
/// with `elapsed()` standing in for a stopwatch.
#[derive(Debug)]
pub(crate) struct MockClock {
    origin: Instant,
    advanced: Cell<Duration>,
}

impl MockClock {
    pub(crate) fn new() -> Rc<MockClock> {
        Rc::new(MockClock {
            origin: Instant::now(),
            advanced: Cell::new(Duration::ZERO),
        })
    }

    /// Time passed since the clock was created.
    pub(crate) fn elapsed(&self) -> Duration {
        self.advanced.get()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.origin + self.advanced.get()
    }

    fn sleep_until(&self, deadline: Instant) {
        if deadline > self.now() {
            self.advanced.set(deadline - self.origin);
        }
    }
}

/// An event loop on mock time, plus the clock that drives it.
pub(crate) fn mock_time_loop() -> (EventLoop, Rc<MockClock>) {
    let clock = MockClock::new();
    let event_loop = Builder::new()
        .clock(clock.clone())
        .try_build()
        .expect("failed to build mock-time event loop");

    (event_loop, clock)
}
