use crate::task::Id;
use std::any::Any;
use std::fmt;

/// The failed outcome of a task, returned by
/// [`TaskHandle::get_result`](crate::task::TaskHandle::get_result) and by
/// awaiting a [`TaskHandle`](crate::task::TaskHandle).
///
/// A task fails in one of two ways: it is cancelled through
/// [`cancel`](crate::task::TaskHandle::cancel), or its body panics. In the
/// panic case the original payload is preserved and can be resurfaced with
/// [`into_panic`](TaskError::into_panic).
pub struct TaskError {
    repr: Repr,
    id: Id,
}

enum Repr {
    Cancelled,
    Panic {
        payload: SyncWrapper<Box<dyn Any + Send + 'static>>,
        /// Extracted eagerly so `Display` never needs to look inside the
        /// wrapped payload.
        message: Option<String>,
    },
}

impl TaskError {
    pub(crate) fn cancelled(id: Id) -> TaskError {
        TaskError {
            repr: Repr::Cancelled,
            id,
        }
    }

    pub(crate) fn panicked(id: Id, payload: Box<dyn Any + Send + 'static>) -> TaskError {
        let message = panic_payload_as_str(payload.as_ref()).map(str::to_owned);
        TaskError {
            repr: Repr::Panic {
                payload: SyncWrapper::new(payload),
                message,
            },
            id,
        }
    }

    /// Returns true if the error was caused by the task being cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.repr, Repr::Cancelled)
    }

    /// Returns true if the error was caused by the task panicking.
    pub fn is_panic(&self) -> bool {
        matches!(self.repr, Repr::Panic { .. })
    }

    /// Consumes the error, returning the panic payload.
    ///
    /// # Panics
    ///
    /// Panics if the error was not caused by a panic; check with
    /// [`is_panic`](TaskError::is_panic) first, or use
    /// [`try_into_panic`](TaskError::try_into_panic).
    pub fn into_panic(self) -> Box<dyn Any + Send + 'static> {
        self.try_into_panic()
            .expect("`TaskError` is not a panic error")
    }

    /// Consumes the error, returning the panic payload if the task panicked,
    /// or `Err(self)` otherwise.
    pub fn try_into_panic(self) -> Result<Box<dyn Any + Send + 'static>, TaskError> {
        match self.repr {
            Repr::Panic { payload, .. } => Ok(payload.into_inner()),
            _ => Err(self),
        }
    }

    /// The id of the task that produced this error.
    pub fn id(&self) -> Id {
        self.id
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Cancelled => write!(fmt, "task {} was cancelled", self.id),
            Repr::Panic { message, .. } => match message {
                Some(msg) => write!(fmt, "task {} panicked with message {:?}", self.id, msg),
                None => write!(fmt, "task {} panicked", self.id),
            },
        }
    }
}

impl fmt::Debug for TaskError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Cancelled => write!(fmt, "TaskError::Cancelled({})", self.id),
            Repr::Panic { message, .. } => match message {
                Some(msg) => write!(fmt, "TaskError::Panic({}, {:?})", self.id, msg),
                None => write!(fmt, "TaskError::Panic({}, ...)", self.id),
            },
        }
    }
}

impl std::error::Error for TaskError {}

fn panic_payload_as_str(payload: &(dyn Any + Send)) -> Option<&str> {
    // Panic payloads are almost always `String` (formatted message) or
    // `&'static str` (literal message).
    if let Some(s) = payload.downcast_ref::<String>() {
        return Some(s);
    }

    payload.downcast_ref::<&'static str>().copied()
}

/// Hides a `Send`-only panic payload behind an ownership-only API, which is
/// what lets `TaskError` be `Sync` (and therefore compose with error
/// libraries that demand it).
struct SyncWrapper<T> {
    value: T,
}

// Safety: the inner value is only reachable by consuming the wrapper, never
// through a shared reference, so sharing `&SyncWrapper<T>` across threads
// exposes nothing.
unsafe impl<T: Send> Sync for SyncWrapper<T> {}

impl<T> SyncWrapper<T> {
    fn new(value: T) -> Self {
        Self { value }
    }

    fn into_inner(self) -> T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_error() {
        let err = TaskError::cancelled(Id::next());
        assert!(err.is_cancelled());
        assert!(!err.is_panic());
        assert!(format!("{err}").contains("cancelled"));
        assert!(err.try_into_panic().is_err());
    }

    #[test]
    fn test_panic_error_preserves_payload() {
        let err = TaskError::panicked(Id::next(), Box::new("boom"));
        assert!(err.is_panic());
        assert!(format!("{err}").contains("boom"));

        let payload = err.into_panic();
        assert_eq!(*payload.downcast_ref::<&str>().unwrap(), "boom");
    }

    #[test]
    fn test_formatted_panic_message_is_shown() {
        let err = TaskError::panicked(Id::next(), Box::new(format!("bad value {}", 7)));
        assert!(format!("{err}").contains("bad value 7"));
    }
}
