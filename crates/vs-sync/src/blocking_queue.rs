//! Thread-safe FIFO queue with wait/notify.
//!
//! | Property | Description |
//! |----------|-------------|
//! | FIFO | Elements are popped in the order their pushes completed |
//! | NoLostWakeup | A consumer waiting on an empty queue is woken by a later push |
//! | NoLostMessages | Every pushed element is popped or still queued |
//! | NoDuplicates | No element is returned by two pops |
//!
//! # Wait protocol
//!
//! `wait_and_pop` checks for emptiness while holding the mutex and waits on
//! a condition variable bound to that mutex, re-checking in a loop. `push`
//! releases the mutex before `notify_one`; a woken consumer that loses the
//! race for the element simply waits again.
//!
//! Exactly one waiter is woken per push. There is no fairness among waiters.

use std::collections::VecDeque;
use std::fmt;
use std::ptr;

use crate::sync::{self, Condvar, Mutex};

/// A FIFO queue guarded by a mutex, with a condition variable for waiting
/// consumers.
pub struct BlockingQueue<T> {
    data: Mutex<VecDeque<T>>,
    data_cond: Condvar,
}

impl<T> BlockingQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::with_data(VecDeque::new())
    }

    fn with_data(data: VecDeque<T>) -> Self {
        Self {
            data: Mutex::new(data),
            data_cond: Condvar::new(),
        }
    }

    /// Append `value` and wake one waiting consumer.
    pub fn push(&self, value: T) {
        {
            let mut data = sync::lock(&self.data);
            data.push_back(value);
        }
        self.data_cond.notify_one();
    }

    /// Remove and return the front element, waiting until one is available.
    ///
    /// Waits indefinitely if nothing is ever pushed.
    pub fn wait_and_pop(&self) -> T {
        let mut data = sync::lock(&self.data);
        // Explicit loop: spurious wakeups and lost races both land here.
        loop {
            if let Some(value) = data.pop_front() {
                return value;
            }
            data = sync::wait(&self.data_cond, data);
        }
    }

    /// Move the front element into `target`, waiting until one is available.
    pub fn wait_and_pop_into(&self, target: &mut T) {
        *target = self.wait_and_pop();
    }

    /// Remove and return the front element, or `None` if the queue is empty.
    pub fn try_pop(&self) -> Option<T> {
        sync::lock(&self.data).pop_front()
    }

    /// Move the front element into `target`.
    ///
    /// Returns `false` and leaves `target` untouched when empty.
    pub fn try_pop_into(&self, target: &mut T) -> bool {
        match self.try_pop() {
            Some(value) => {
                *target = value;
                true
            }
            None => false,
        }
    }

    /// Whether the queue was empty at the time of the call.
    pub fn empty(&self) -> bool {
        sync::lock(&self.data).is_empty()
    }

    /// Same as `empty`; may be stale as soon as it returns.
    pub fn is_empty(&self) -> bool {
        self.empty()
    }

    /// Number of elements at the time of the call; may be stale as soon as it returns.
    pub fn len(&self) -> usize {
        sync::lock(&self.data).len()
    }

    /// Exchange contents with `other`, locking both in address order.
    ///
    /// Waiters on both queues are woken afterwards since either may have
    /// gained elements.
    pub fn swap(&self, other: &Self) {
        if ptr::eq(self, other) {
            return;
        }
        let (first, second) = if (self as *const Self) < (other as *const Self) {
            (self, other)
        } else {
            (other, self)
        };
        {
            let mut a = sync::lock(&first.data);
            let mut b = sync::lock(&second.data);
            std::mem::swap(&mut *a, &mut *b);
        }
        self.data_cond.notify_all();
        other.data_cond.notify_all();
    }

    /// Take the elements out, front first.
    pub fn into_inner(self) -> VecDeque<T> {
        sync::into_inner(self.data)
    }
}

impl<T: PartialEq> BlockingQueue<T> {
    /// Whether `value` is currently queued.
    pub fn contains(&self, value: &T) -> bool {
        sync::lock(&self.data).contains(value)
    }
}

impl<T: Clone> BlockingQueue<T> {
    /// Copy of the contents, front first.
    pub fn snapshot(&self) -> Vec<T> {
        sync::lock(&self.data).iter().cloned().collect()
    }
}

impl<T: Clone> Clone for BlockingQueue<T> {
    /// Copies under the source's lock. The copy has its own condition
    /// variable and no waiters.
    fn clone(&self) -> Self {
        let data = sync::lock(&self.data).clone();
        Self::with_data(data)
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = sync::lock(&self.data);
        f.debug_struct("BlockingQueue")
            .field("data", &*data)
            .finish_non_exhaustive()
    }
}

/// The first element of `values` is the front.
impl<T> From<Vec<T>> for BlockingQueue<T> {
    fn from(values: Vec<T>) -> Self {
        Self::with_data(values.into())
    }
}

impl<T> FromIterator<T> for BlockingQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::with_data(iter.into_iter().collect())
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_round_trip() {
        let queue = BlockingQueue::new();
        for i in 1..=5 {
            queue.push(i);
        }
        assert_eq!(queue.len(), 5);
        for i in 1..=5 {
            assert_eq!(queue.wait_and_pop(), i);
        }
        assert!(queue.empty());
    }

    #[test]
    fn test_try_pop_on_empty_does_not_block() {
        let queue: BlockingQueue<u32> = BlockingQueue::new();
        let mut slot = 7;

        assert_eq!(queue.try_pop(), None);
        assert!(!queue.try_pop_into(&mut slot));
        assert_eq!(slot, 7);

        queue.push(3);
        assert!(queue.try_pop_into(&mut slot));
        assert_eq!(slot, 3);
    }

    #[test]
    fn test_wait_and_pop_into() {
        let queue = BlockingQueue::from(vec![String::from("a")]);
        let mut slot = String::new();
        queue.wait_and_pop_into(&mut slot);
        assert_eq!(slot, "a");
    }

    #[test]
    fn test_waiter_woken_by_push() {
        let queue = Arc::new(BlockingQueue::new());
        let (tx, rx) = mpsc::channel();

        let q = Arc::clone(&queue);
        let consumer = thread::spawn(move || {
            let value = q.wait_and_pop();
            tx.send(value).unwrap();
        });

        // Give the consumer a chance to block first
        thread::sleep(Duration::from_millis(20));
        queue.push(99);

        assert_eq!(rx.recv_timeout(Duration::from_millis(500)), Ok(99));
        consumer.join().unwrap();
    }

    #[test]
    fn test_clone_while_pushing_is_consistent() {
        const PUSHES: u64 = 2_000;
        let queue = Arc::new(BlockingQueue::new());

        let producers: Vec<_> = (0..2u64)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..PUSHES {
                        queue.push((p, i));
                    }
                })
            })
            .collect();

        let mut last_len = 0;
        loop {
            let done = producers.iter().all(|h| h.is_finished());
            let copy = BlockingQueue::clone(&queue).into_inner();
            assert!(copy.len() >= last_len, "copies never go backwards");
            last_len = copy.len();
            for p in 0..2u64 {
                let seen: Vec<u64> = copy.iter().filter(|(q, _)| *q == p).map(|(_, i)| *i).collect();
                let expected: Vec<u64> = (0..seen.len() as u64).collect();
                assert_eq!(seen, expected);
            }
            if done {
                break;
            }
        }
        for h in producers {
            h.join().unwrap();
        }
        assert_eq!(last_len as u64, 2 * PUSHES);
    }

    #[test]
    fn test_clone_snapshot_contains() {
        let queue: BlockingQueue<u64> = (1..=3).collect();
        let copy = queue.clone();

        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(copy.snapshot(), vec![1, 2, 3]);
        assert!(queue.contains(&3));
        assert!(!queue.contains(&1));
        assert_eq!(queue.into_inner(), VecDeque::from(vec![2, 3]));
    }

    #[test]
    fn test_swap_wakes_waiter() {
        let a = Arc::new(BlockingQueue::new());
        let b = Arc::new(BlockingQueue::from(vec![5]));
        let (tx, rx) = mpsc::channel();

        let q = Arc::clone(&a);
        let consumer = thread::spawn(move || tx.send(q.wait_and_pop()).unwrap());

        thread::sleep(Duration::from_millis(20));
        b.swap(&a);

        assert_eq!(rx.recv_timeout(Duration::from_millis(500)), Ok(5));
        assert!(b.empty());
        consumer.join().unwrap();
    }

    #[test]
    fn test_debug() {
        let queue = BlockingQueue::from(vec![1, 2]);
        assert_eq!(format!("{:?}", queue), "BlockingQueue { data: [1, 2], .. }");
    }
}

/// Loom tests - these exhaustively check all interleavings
#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn test_push_wakes_waiter() {
        // A lost wakeup shows up as a loom deadlock.
        loom::model(|| {
            let queue = Arc::new(BlockingQueue::new());

            let q = Arc::clone(&queue);
            let consumer = thread::spawn(move || q.wait_and_pop());

            queue.push(1);

            assert_eq!(consumer.join().unwrap(), 1);
            assert!(queue.empty());
        });
    }

    #[test]
    fn test_two_consumers_two_pushes() {
        loom::model(|| {
            let queue = Arc::new(BlockingQueue::new());

            let q1 = Arc::clone(&queue);
            let q2 = Arc::clone(&queue);
            let c1 = thread::spawn(move || q1.wait_and_pop());
            let c2 = thread::spawn(move || q2.wait_and_pop());

            queue.push(1);
            queue.push(2);

            let mut values = vec![c1.join().unwrap(), c2.join().unwrap()];
            values.sort();
            assert_eq!(values, vec![1, 2]);
        });
    }

    #[test]
    fn test_fifo_single_producer() {
        loom::model(|| {
            let queue = Arc::new(BlockingQueue::new());

            let q = Arc::clone(&queue);
            let producer = thread::spawn(move || {
                q.push(1);
                q.push(2);
            });

            let first = queue.wait_and_pop();
            let second = queue.wait_and_pop();
            producer.join().unwrap();

            assert_eq!((first, second), (1, 2));
        });
    }
}
