//! Thread-safe stack with mutually exclusive access.
//!
//! | Property | Description |
//! |----------|-------------|
//! | Exclusive | The sequence is only read or written while its mutex is held |
//! | LIFO | A pop returns the most recently pushed element still present |
//! | NoLostElements | Every pushed element is popped or still present |
//! | NoDuplicates | No element is returned by two pops |
//!
//! `pop` never blocks waiting for data: on an empty stack it returns
//! `EmptyError`. Callers that need to wait poll `empty()` or use
//! `BlockingQueue` instead. `empty()` and `len()` are snapshots that may be
//! stale as soon as they return.

use std::fmt;
use std::ptr;

use crate::error::EmptyError;
use crate::sync::{self, Mutex};

/// A LIFO stack guarded by a single mutex.
pub struct BlockingStack<T> {
    data: Mutex<Vec<T>>,
}

impl<T> BlockingStack<T> {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self {
            data: Mutex::new(Vec::new()),
        }
    }

    /// Push `value` on top. Never blocks on data, never fails.
    pub fn push(&self, value: T) {
        sync::lock(&self.data).push(value);
    }

    /// Remove and return the top element.
    pub fn pop(&self) -> Result<T, EmptyError> {
        sync::lock(&self.data).pop().ok_or(EmptyError)
    }

    /// Move the top element into `target`.
    ///
    /// On `EmptyError`, `target` is left untouched.
    pub fn pop_into(&self, target: &mut T) -> Result<(), EmptyError> {
        *target = self.pop()?;
        Ok(())
    }

    /// Whether the stack was empty at the time of the call.
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

    /// Exchange contents with `other`.
    ///
    /// Both mutexes are taken in address order, so two threads swapping the
    /// same pair in opposite directions cannot deadlock.
    pub fn swap(&self, other: &Self) {
        if ptr::eq(self, other) {
            return;
        }
        let (first, second) = if (self as *const Self) < (other as *const Self) {
            (self, other)
        } else {
            (other, self)
        };
        let mut a = sync::lock(&first.data);
        let mut b = sync::lock(&second.data);
        std::mem::swap(&mut *a, &mut *b);
    }

    /// Take the elements out, bottom first.
    pub fn into_inner(self) -> Vec<T> {
        sync::into_inner(self.data)
    }
}

impl<T: PartialEq> BlockingStack<T> {
    /// Whether `value` is currently on the stack.
    pub fn contains(&self, value: &T) -> bool {
        sync::lock(&self.data).contains(value)
    }
}

impl<T: Clone> BlockingStack<T> {
    /// Copy of the contents, top first.
    pub fn snapshot(&self) -> Vec<T> {
        sync::lock(&self.data).iter().rev().cloned().collect()
    }
}

impl<T: Clone> Clone for BlockingStack<T> {
    /// Copies under the source's lock.
    fn clone(&self) -> Self {
        let data = sync::lock(&self.data).clone();
        Self {
            data: Mutex::new(data),
        }
    }
}

impl<T> Default for BlockingStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for BlockingStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = sync::lock(&self.data);
        f.debug_struct("BlockingStack")
            .field("data", &*data)
            .finish()
    }
}

/// The last element of `values` becomes the top.
impl<T> From<Vec<T>> for BlockingStack<T> {
    fn from(values: Vec<T>) -> Self {
        Self {
            data: Mutex::new(values),
        }
    }
}

impl<T> FromIterator<T> for BlockingStack<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<T>>())
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_basic_operations() {
        let stack = BlockingStack::new();

        assert!(stack.empty());
        assert_eq!(stack.pop(), Err(EmptyError));

        stack.push(1);
        stack.push(2);
        stack.push(3);

        assert!(!stack.is_empty());
        assert_eq!(stack.len(), 3);

        assert_eq!(stack.pop(), Ok(3));
        assert_eq!(stack.pop(), Ok(2));
        assert_eq!(stack.pop(), Ok(1));
        assert_eq!(stack.pop(), Err(EmptyError));
        assert!(stack.empty());
    }

    #[test]
    fn test_pop_into() {
        let stack = BlockingStack::new();
        let mut slot = 0;

        assert_eq!(stack.pop_into(&mut slot), Err(EmptyError));
        assert_eq!(slot, 0, "target untouched on empty");

        stack.push(42);
        assert_eq!(stack.pop_into(&mut slot), Ok(()));
        assert_eq!(slot, 42);
    }

    #[test]
    fn test_clone_while_pushing_is_consistent() {
        const PUSHES: u64 = 2_000;
        let stack = Arc::new(BlockingStack::new());

        let producers: Vec<_> = (0..2u64)
            .map(|p| {
                let stack = Arc::clone(&stack);
                thread::spawn(move || {
                    for i in 0..PUSHES {
                        stack.push((p, i));
                    }
                })
            })
            .collect();

        let mut last_len = 0;
        loop {
            let done = producers.iter().all(|h| h.is_finished());
            let copy = BlockingStack::clone(&stack).into_inner();
            assert!(copy.len() >= last_len, "copies never go backwards");
            last_len = copy.len();
            // Each producer's pushes appear as an unbroken prefix, in order.
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
    fn test_clone_is_independent() {
        let stack: BlockingStack<u64> = (1..=3).collect();
        let copy = stack.clone();

        assert_eq!(stack.pop(), Ok(3));
        assert_eq!(copy.snapshot(), vec![3, 2, 1]);
        assert_eq!(stack.snapshot(), vec![2, 1]);
    }

    #[test]
    fn test_contains_and_into_inner() {
        let stack = BlockingStack::from(vec!["a", "b"]);
        assert!(stack.contains(&"a"));
        assert!(!stack.contains(&"z"));
        assert_eq!(stack.pop(), Ok("b"));
        assert_eq!(stack.into_inner(), vec!["a"]);
    }

    #[test]
    fn test_swap() {
        let a = BlockingStack::from(vec![1, 2]);
        let b = BlockingStack::from(vec![9]);

        a.swap(&b);
        assert_eq!(a.snapshot(), vec![9]);
        assert_eq!(b.snapshot(), vec![2, 1]);

        a.swap(&a);
        assert_eq!(a.snapshot(), vec![9]);
    }

    #[test]
    fn test_opposite_swaps_do_not_deadlock() {
        let a = Arc::new(BlockingStack::from(vec![1]));
        let b = Arc::new(BlockingStack::from(vec![2]));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let (x, y) = if i % 2 == 0 {
                    (Arc::clone(&a), Arc::clone(&b))
                } else {
                    (Arc::clone(&b), Arc::clone(&a))
                };
                thread::spawn(move || {
                    for _ in 0..1000 {
                        x.swap(&y);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let mut all = Arc::try_unwrap(a).ok().unwrap().into_inner();
        all.extend(Arc::try_unwrap(b).ok().unwrap().into_inner());
        all.sort();
        assert_eq!(all, vec![1, 2]);
    }

    #[test]
    fn test_poisoned_stack_still_usable() {
        let stack = Arc::new(BlockingStack::from(vec![1]));
        let s = Arc::clone(&stack);
        let _ = thread::spawn(move || {
            let _guard = s.data.lock().unwrap();
            panic!("poison the mutex");
        })
        .join();

        stack.push(2);
        assert_eq!(stack.pop(), Ok(2));
        assert_eq!(stack.pop(), Ok(1));
    }

    #[test]
    fn test_debug() {
        let stack = BlockingStack::from(vec![1, 2]);
        assert_eq!(format!("{:?}", stack), "BlockingStack { data: [1, 2] }");
    }
}

/// Loom tests - these exhaustively check all interleavings
#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn test_push_push() {
        loom::model(|| {
            let stack = Arc::new(BlockingStack::new());

            let s1 = Arc::clone(&stack);
            let s2 = Arc::clone(&stack);

            let h1 = thread::spawn(move || s1.push(1));
            let h2 = thread::spawn(move || s2.push(2));

            h1.join().unwrap();
            h2.join().unwrap();

            // Both values should be in the stack
            let mut values = vec![];
            while let Ok(v) = stack.pop() {
                values.push(v);
            }
            values.sort();
            assert_eq!(values, vec![1, 2]);
        });
    }

    #[test]
    fn test_push_pop_race() {
        loom::model(|| {
            let stack = Arc::new(BlockingStack::new());
            stack.push(1);

            let s1 = Arc::clone(&stack);
            let s2 = Arc::clone(&stack);

            let pusher = thread::spawn(move || s1.push(2));
            let popper = thread::spawn(move || s2.pop());

            pusher.join().unwrap();
            let popped = popper.join().unwrap();

            // Exactly one element was taken; the rest is still there
            let mut remaining = vec![];
            while let Ok(v) = stack.pop() {
                remaining.push(v);
            }
            let popped = popped.expect("stack never empty during pop");
            assert!(!remaining.contains(&popped));
            assert_eq!(remaining.len(), 1);
        });
    }

    #[test]
    fn test_concurrent_pops_no_duplicates() {
        loom::model(|| {
            let stack = Arc::new(BlockingStack::from(vec![1, 2]));

            let s1 = Arc::clone(&stack);
            let s2 = Arc::clone(&stack);

            let h1 = thread::spawn(move || s1.pop());
            let h2 = thread::spawn(move || s2.pop());

            let mut values = vec![h1.join().unwrap().unwrap(), h2.join().unwrap().unwrap()];
            values.sort();
            assert_eq!(values, vec![1, 2]);
            assert!(stack.empty());
        });
    }
}
