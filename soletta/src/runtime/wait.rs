use crate::task::TaskCore;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::num::NonZeroU64;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a [`WaitHandle`], unique per process.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub(crate) struct WaitId(NonZeroU64);

impl WaitId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let Some(id) = NonZeroU64::new(id) else {
            panic!("failed to generate unique wait handle ID: bitspace exhausted");
        };

        Self(id)
    }
}

impl fmt::Display for WaitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A rendezvous point: anything a task can be blocked on.
///
/// Every suspension in the runtime goes through one of these: a task's own
/// completion, a timer deadline, a lock, a condition variable. Producers
/// (whatever owns the handle) wake every waiter at once by asking the
/// scheduler to detach the handle; there is no wake-one at this layer.
///
/// A handle is identified by its id alone: two handles compare equal iff
/// their ids are equal, and cloning shares the identity (the clone refers to
/// the same rendezvous). Waiter entries are weak back-references resolved
/// through the scheduler's ownership of tasks, so a handle never keeps a
/// dead task alive.
#[derive(Clone)]
pub(crate) struct WaitHandle {
    inner: Rc<Inner>,
}

struct Inner {
    id: WaitId,
    // One entry per attach. A task attached twice has two entries here and a
    // wait count of two; detaching decrements once per entry.
    waiters: RefCell<SmallVec<[Weak<TaskCore>; 4]>>,
}

impl WaitHandle {
    pub(crate) fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                id: WaitId::next(),
                waiters: RefCell::new(SmallVec::new()),
            }),
        }
    }

    pub(crate) fn id(&self) -> WaitId {
        self.inner.id
    }

    /// Number of live waiter entries, counted with multiplicity.
    pub(crate) fn waiter_count(&self) -> usize {
        self.inner
            .waiters
            .borrow()
            .iter()
            .filter(|w| w.upgrade().is_some_and(|t| !t.is_complete()))
            .count()
    }

    /// Record one waiter entry. Called by the scheduler's attach protocol,
    /// which also maintains the task-side wait count.
    pub(crate) fn push_waiter(&self, task: Weak<TaskCore>) {
        self.inner.waiters.borrow_mut().push(task);
    }

    /// Remove and return every waiter entry. Called by the scheduler's
    /// detach protocol, which decrements each waiter's wait count.
    pub(crate) fn take_waiters(&self) -> SmallVec<[Weak<TaskCore>; 4]> {
        std::mem::take(&mut *self.inner.waiters.borrow_mut())
    }

    /// Clear the waiter list without touching waiter counts.
    ///
    /// Only valid when no live waiter remains; a synchronization primitive
    /// dropped while tasks are still blocked on it is a programming error.
    pub(crate) fn reset(&self) {
        debug_assert_eq!(
            self.waiter_count(),
            0,
            "wait handle {} reset while tasks are still attached",
            self.id()
        );
        self.inner.waiters.borrow_mut().clear();
    }
}

impl PartialEq for WaitHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for WaitHandle {}

impl Hash for WaitHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for WaitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitHandle")
            .field("id", &self.inner.id)
            .field("waiters", &self.inner.waiters.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_is_by_id() {
        let a = WaitHandle::new();
        let b = WaitHandle::new();
        assert_ne!(a, b);
        assert!(a.id() < b.id());

        // A clone is the same rendezvous.
        let a2 = a.clone();
        assert_eq!(a, a2);

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&a2));
        assert!(!set.contains(&b));
    }

    #[test]
    fn test_identity_survives_moves() {
        let a = WaitHandle::new();
        let id = a.id();

        let moved = a;
        assert_eq!(moved.id(), id);
    }

    #[test]
    fn test_dead_waiters_are_not_counted() {
        let handle = WaitHandle::new();
        handle.push_waiter(Weak::new());
        assert_eq!(handle.waiter_count(), 0);

        // reset() is allowed: no live waiter remains.
        handle.reset();
        assert_eq!(handle.take_waiters().len(), 0);
    }
}
