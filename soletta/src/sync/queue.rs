use crate::sync::Condvar;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

/// A task-aware FIFO queue, optionally bounded.
///
/// [`pop`](Queue::pop) suspends the current task while the queue is empty;
/// with a capacity set, [`push`](Queue::push) suspends while it is full.
/// The non-suspending variants [`try_push`](Queue::try_push) and
/// [`try_pop`](Queue::try_pop) report the full/empty case to the caller
/// instead.
///
/// ```no_run
/// use soletta::sync::Queue;
/// use std::rc::Rc;
///
/// # async fn doc() {
/// let queue = Rc::new(Queue::new());
///
/// let popper = {
///     let queue = queue.clone();
///     soletta::call_soon(async move { queue.pop().await })
/// };
///
/// queue.push(42).await;
/// assert_eq!(popper.await.unwrap(), 42);
/// # }
/// ```
pub struct Queue<T> {
    storage: RefCell<VecDeque<T>>,
    capacity: Option<usize>,
    cond: Condvar,
}

impl<T> Queue<T> {
    /// Creates an unbounded queue: `push` never suspends.
    pub fn new() -> Queue<T> {
        Queue {
            storage: RefCell::new(VecDeque::new()),
            capacity: None,
            cond: Condvar::new(),
        }
    }

    /// Creates a queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[track_caller]
    pub fn with_capacity(capacity: usize) -> Queue<T> {
        assert!(capacity > 0, "queue capacity must be greater than 0");
        Queue {
            storage: RefCell::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
            cond: Condvar::new(),
        }
    }

    /// Add an item at the back of the queue, suspending the current task
    /// while the queue is full.
    pub async fn push(&self, value: T) {
        while self.is_full() {
            self.cond.wait().await;
        }

        self.storage.borrow_mut().push_back(value);
        self.cond.notify_all();
    }

    /// Remove and return the item at the front of the queue, suspending the
    /// current task while the queue is empty.
    pub async fn pop(&self) -> T {
        loop {
            // Wake-all plus multiple poppers means the item may be gone by
            // the time this task runs; re-check rather than assume.
            let popped = self.storage.borrow_mut().pop_front();
            if let Some(value) = popped {
                self.cond.notify_all();
                return value;
            }

            self.cond.wait().await;
        }
    }

    /// Add an item if the queue has room right now; never suspends. A full
    /// queue hands the value back.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }

        self.storage.borrow_mut().push_back(value);
        self.cond.notify_all();
        Ok(())
    }

    /// Remove and return an item if one is available right now; never
    /// suspends.
    pub fn try_pop(&self) -> Option<T> {
        let popped = self.storage.borrow_mut().pop_front();
        if popped.is_some() {
            self.cond.notify_all();
        }
        popped
    }

    /// Number of items in the queue.
    pub fn len(&self) -> usize {
        self.storage.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.borrow().is_empty()
    }

    pub fn is_full(&self) -> bool {
        match self.capacity {
            Some(capacity) => self.storage.borrow().len() >= capacity,
            None => false,
        }
    }

    /// The configured capacity, if the queue is bounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
