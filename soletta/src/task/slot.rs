use crate::task::TaskError;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;

/// One-shot, type-erased storage for the outcome of a task.
///
/// A task has exactly one outcome: either the value its body returned, or a
/// captured failure (panic payload or cancellation). The slot enforces this
/// at runtime: at most one store, at most one take, and `take` must not run
/// against an empty slot. Violations are programming errors and abort with a
/// panic rather than being reported.
///
/// The erased value is boxed. The original stackful implementation kept a
/// small inline buffer to dodge an allocation per short-lived task; that was
/// an optimization of its allocator, not part of the contract, and boxing is
/// the natural erasure here.
pub(crate) struct ResultSlot {
    state: RefCell<State>,
}

enum State {
    /// Nothing stored yet.
    Empty,
    /// The task's body returned this value.
    Value(Box<dyn Any>),
    /// The task failed; the error carries kind and message.
    Failure(TaskError),
    /// The outcome has been consumed.
    Taken,
}

impl ResultSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: RefCell::new(State::Empty),
        }
    }

    /// Store the task's return value.
    ///
    /// # Panics
    ///
    /// Panics if an outcome has already been stored.
    pub(crate) fn store_value<T: 'static>(&self, value: T) {
        let mut state = self.state.borrow_mut();
        assert!(
            matches!(*state, State::Empty),
            "a task result has already been stored"
        );
        *state = State::Value(Box::new(value));
    }

    /// Store a failure instead of a value.
    ///
    /// # Panics
    ///
    /// Panics if an outcome has already been stored.
    pub(crate) fn store_failure(&self, err: TaskError) {
        let mut state = self.state.borrow_mut();
        assert!(
            matches!(*state, State::Empty),
            "a task result has already been stored"
        );
        *state = State::Failure(err);
    }

    /// Consume the stored outcome.
    ///
    /// A stored value is returned as `Ok`; a stored failure is surfaced as
    /// `Err`, which is how a captured panic or cancellation propagates to the
    /// caller.
    ///
    /// # Panics
    ///
    /// Panics if the slot is empty or was already taken, or if `T` does not
    /// match the stored type.
    pub(crate) fn take<T: 'static>(&self) -> Result<T, TaskError> {
        let state = std::mem::replace(&mut *self.state.borrow_mut(), State::Taken);
        match state {
            State::Value(value) => {
                let value = value
                    .downcast::<T>()
                    .expect("task result taken with mismatched type");
                Ok(*value)
            }
            State::Failure(err) => Err(err),
            State::Empty | State::Taken => panic!("no task result stored"),
        }
    }

    /// True iff an outcome is stored and has not been taken.
    pub(crate) fn is_valid(&self) -> bool {
        matches!(*self.state.borrow(), State::Value(_) | State::Failure(_))
    }
}

impl fmt::Debug for ResultSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match *self.state.borrow() {
            State::Empty => "Empty",
            State::Value(_) => "Value",
            State::Failure(_) => "Failure",
            State::Taken => "Taken",
        };
        f.debug_tuple("ResultSlot").field(&state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Id;

    #[test]
    fn test_store_then_take() {
        let slot = ResultSlot::new();
        assert!(!slot.is_valid());

        slot.store_value(42u32);
        assert!(slot.is_valid());

        assert_eq!(slot.take::<u32>().unwrap(), 42);
        assert!(!slot.is_valid());
    }

    #[test]
    fn test_store_unit_value() {
        let slot = ResultSlot::new();
        slot.store_value(());
        assert!(slot.take::<()>().is_ok());
    }

    #[test]
    fn test_failure_surfaces_on_take() {
        let slot = ResultSlot::new();
        slot.store_failure(TaskError::cancelled(Id::next()));
        assert!(slot.is_valid());

        let err = slot.take::<u32>().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_large_payloads_are_supported() {
        let slot = ResultSlot::new();
        let big = vec![7u8; 4096];
        slot.store_value(big.clone());
        assert_eq!(slot.take::<Vec<u8>>().unwrap(), big);
    }

    #[test]
    #[should_panic(expected = "already been stored")]
    fn test_double_store_is_fatal() {
        let slot = ResultSlot::new();
        slot.store_value(1u8);
        slot.store_value(2u8);
    }

    #[test]
    #[should_panic(expected = "already been stored")]
    fn test_store_after_failure_is_fatal() {
        let slot = ResultSlot::new();
        slot.store_failure(TaskError::cancelled(Id::next()));
        slot.store_value(1u8);
    }

    #[test]
    #[should_panic(expected = "no task result stored")]
    fn test_take_empty_is_fatal() {
        let slot = ResultSlot::new();
        let _ = slot.take::<u32>();
    }

    #[test]
    #[should_panic(expected = "no task result stored")]
    fn test_take_twice_is_fatal() {
        let slot = ResultSlot::new();
        slot.store_value(1u8);
        let _ = slot.take::<u8>();
        let _ = slot.take::<u8>();
    }
}
