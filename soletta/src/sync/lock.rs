use crate::context;
use crate::future::WaitOn;
use crate::runtime::wait::WaitHandle;
use std::cell::Cell;
use std::fmt;

/// A primitive lock for tasks on the same event loop.
///
/// A primitive lock is not owned by a particular task when locked: it is in
/// one of two states, locked or unlocked, and any task may release it. When
/// unlocked, [`lock`](Lock::lock) takes it and returns immediately; when
/// locked, `lock` suspends until some task calls [`unlock`](Lock::unlock).
/// Unlocking wakes every contender at once, and each re-checks the state,
/// so exactly one of them reacquires.
///
/// Everything between acquiring and the next suspension point runs without
/// interleaving from other tasks, so the lock is only needed to protect
/// state across `.await`s.
///
/// Not thread-safe, deliberately: the type is `!Send` like the rest of the
/// runtime.
pub struct Lock {
    locked: Cell<bool>,
    wait: WaitHandle,
}

impl Lock {
    /// Creates a lock in the unlocked state.
    pub fn new() -> Lock {
        Lock {
            locked: Cell::new(false),
            wait: WaitHandle::new(),
        }
    }

    /// Acquire the lock, suspending the current task while it is held
    /// elsewhere.
    pub async fn lock(&self) {
        while self.locked.get() {
            // Wake-ups are wake-all; someone else may grab the lock before
            // this task runs again, hence the loop.
            WaitOn::new(&self.wait).await;
        }
        self.locked.set(true);
    }

    /// Acquire the lock only if it is free right now; never suspends.
    pub fn try_lock(&self) -> bool {
        if self.locked.get() {
            return false;
        }
        self.locked.set(true);
        true
    }

    /// Release the lock, waking every task blocked in
    /// [`lock`](Lock::lock).
    ///
    /// # Panics
    ///
    /// Panics if the lock is not currently locked.
    #[track_caller]
    pub fn unlock(&self) {
        assert!(self.locked.get(), "unlock of an unlocked lock");
        self.locked.set(false);

        if self.wait.waiter_count() > 0 {
            context::with_scheduler(|scheduler| scheduler.detach(&self.wait));
        }
    }

    /// True while some task holds the lock.
    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        // Dropping a lock while tasks are blocked on it is a bug in the
        // caller; reset asserts that none are.
        self.wait.reset();
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("locked", &self.locked.get())
            .field("waiters", &self.wait.waiter_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as soletta;
    use anyhow::Result;
    use std::cell::Cell;
    use std::rc::Rc;

    #[soletta::test]
    async fn test_uncontended_lock_does_not_suspend() -> Result<()> {
        let lock = Lock::new();
        assert!(!lock.is_locked());

        lock.lock().await;
        assert!(lock.is_locked());

        lock.unlock();
        assert!(!lock.is_locked());
        Ok(())
    }

    #[soletta::test]
    async fn test_try_lock() -> Result<()> {
        let lock = Lock::new();
        assert!(lock.try_lock());
        assert!(!lock.try_lock());

        lock.unlock();
        assert!(lock.try_lock());
        lock.unlock();
        Ok(())
    }

    #[soletta::test]
    async fn test_contended_lock_is_mutually_exclusive() -> Result<()> {
        let lock = Rc::new(Lock::new());
        let in_critical = Rc::new(Cell::new(false));

        let mut tasks = Vec::new();
        for _ in 0..3 {
            let lock = lock.clone();
            let in_critical = in_critical.clone();
            tasks.push(soletta::call_soon(async move {
                lock.lock().await;

                assert!(!in_critical.get(), "two tasks inside the critical section");
                in_critical.set(true);
                soletta::yield_now().await;
                in_critical.set(false);

                lock.unlock();
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        assert!(!lock.is_locked());
        Ok(())
    }

    #[soletta::test]
    async fn test_each_wake_admits_at_most_one_holder() -> Result<()> {
        let lock = Rc::new(Lock::new());
        let holders = Rc::new(Cell::new(0u32));

        lock.lock().await;

        let mut contenders = Vec::new();
        for _ in 0..2 {
            let lock = lock.clone();
            let holders = holders.clone();
            contenders.push(soletta::call_soon(async move {
                lock.lock().await;
                holders.set(holders.get() + 1);
            }));
        }

        // Let both contenders block, then release: the wake-all lets exactly
        // one of them in, the other re-blocks.
        soletta::yield_now().await;
        soletta::yield_now().await;
        lock.unlock();
        soletta::yield_now().await;
        soletta::yield_now().await;
        assert_eq!(holders.get(), 1);

        lock.unlock();
        soletta::yield_now().await;
        soletta::yield_now().await;
        assert_eq!(holders.get(), 2);

        for contender in contenders {
            contender.await.unwrap();
        }
        lock.unlock();
        Ok(())
    }

    #[soletta::test]
    #[should_panic(expected = "unlock of an unlocked lock")]
    async fn test_unlock_of_unlocked_lock_is_fatal() {
        let lock = Lock::new();
        lock.unlock();
    }
}
