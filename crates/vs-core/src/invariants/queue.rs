//! Blocking queue invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | NoLostMessages | Every produced message is in the queue or was consumed |
//! | NoDuplicates | No message is consumed twice or consumed and still queued |
//! | FIFO_Order | Consumption order is a prefix of production order |
//! | ContentsMatchRemainder | Queued messages are exactly the unconsumed suffix |
//!
//! Ordering is only meaningful for a linearized history (single OS thread
//! under DST, or a quiescent queue after joining all threads). Concurrent
//! producers racing to push have no relative order.

use std::collections::HashSet;

use crate::counterexample::{ConcurrencyIssue, Counterexample, StateSnapshot};
use crate::property::{PropertyChecker, PropertyResult};

/// Properties that any FIFO queue implementation must satisfy.
pub trait QueueProperties {
    /// All messages that have been produced (in push order).
    fn produced_messages(&self) -> Vec<u64>;

    /// All messages that have been consumed (in pop order).
    fn consumed_messages(&self) -> Vec<u64>;

    /// Current messages in the queue (front to back).
    fn current_contents(&self) -> Vec<u64>;
}

/// Property checker for queue implementations.
pub struct QueuePropertyChecker<'a, T: QueueProperties> {
    queue: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: QueueProperties> QueuePropertyChecker<'a, T> {
    #[must_use]
    pub fn new(queue: &'a T) -> Self {
        Self {
            queue,
            dst_seed: None,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        self.dst_seed = Some(seed);
        self
    }

    /// NoLostMessages
    fn check_no_lost_messages(&self) -> PropertyResult {
        let produced = self.queue.produced_messages();
        let consumed: HashSet<u64> = self.queue.consumed_messages().into_iter().collect();
        let contents: HashSet<u64> = self.queue.current_contents().into_iter().collect();

        for (index, msg) in produced.iter().enumerate() {
            if !consumed.contains(msg) && !contents.contains(msg) {
                let mut ce = match self.dst_seed {
                    Some(seed) => Counterexample::with_seed(seed),
                    None => Counterexample::new(),
                };
                ce.add_state(StateSnapshot {
                    step: 1,
                    description: format!("Message {} lost", msg),
                    variables: vec![
                        ("produced".to_string(), format!("{:?}", produced)),
                        ("consumed".to_string(), format!("{:?}", consumed)),
                        ("contents".to_string(), format!("{:?}", contents)),
                    ],
                });
                ce.add_issue(ConcurrencyIssue::LostElement {
                    element: *msg,
                    pushed_at_step: index as u64 + 1,
                });
                return PropertyResult::fail(
                    "NoLostMessages",
                    format!(
                        "Message {} was produced but is neither in queue nor consumed",
                        msg
                    ),
                    Some(ce),
                );
            }
        }

        PropertyResult::pass("NoLostMessages")
    }

    /// NoDuplicates
    fn check_no_duplicates(&self) -> PropertyResult {
        let mut seen = HashSet::new();
        let consumed = self.queue.consumed_messages();
        let contents = self.queue.current_contents();

        for (step, msg) in consumed.iter().chain(contents.iter()).enumerate() {
            if !seen.insert(*msg) {
                let mut ce = Counterexample::new();
                ce.add_issue(ConcurrencyIssue::DuplicateElement {
                    element: *msg,
                    step: step as u64 + 1,
                });
                return PropertyResult::fail(
                    "NoDuplicates",
                    format!("Message {} delivered more than once", msg),
                    Some(ce),
                );
            }
        }

        PropertyResult::pass("NoDuplicates")
    }

    /// FIFO_Order
    fn check_fifo_order(&self) -> PropertyResult {
        let produced = self.queue.produced_messages();
        let consumed = self.queue.consumed_messages();

        for (i, msg) in consumed.iter().enumerate() {
            if i < produced.len() && *msg != produced[i] {
                return PropertyResult::fail(
                    "FIFO_Order",
                    format!(
                        "Consumed message at index {} is {} but produced was {}",
                        i, msg, produced[i]
                    ),
                    None,
                );
            }
        }

        PropertyResult::pass("FIFO_Order")
    }

    /// ContentsMatchRemainder
    fn check_contents_match_remainder(&self) -> PropertyResult {
        let produced = self.queue.produced_messages();
        let consumed_count = self.queue.consumed_messages().len().min(produced.len());
        let contents = self.queue.current_contents();
        let remainder = &produced[consumed_count..];

        if contents.as_slice() != remainder {
            return PropertyResult::fail(
                "ContentsMatchRemainder",
                format!(
                    "Queue holds {:?} but unconsumed messages are {:?}",
                    contents, remainder
                ),
                None,
            );
        }

        PropertyResult::pass("ContentsMatchRemainder")
    }
}

impl<T: QueueProperties> PropertyChecker for QueuePropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_no_lost_messages(),
            self.check_no_duplicates(),
            self.check_fifo_order(),
            self.check_contents_match_remainder(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestQueue {
        produced: Vec<u64>,
        consumed: Vec<u64>,
        contents: Vec<u64>,
    }

    impl QueueProperties for TestQueue {
        fn produced_messages(&self) -> Vec<u64> {
            self.produced.clone()
        }

        fn consumed_messages(&self) -> Vec<u64> {
            self.consumed.clone()
        }

        fn current_contents(&self) -> Vec<u64> {
            self.contents.clone()
        }
    }

    #[test]
    fn test_correct_queue_passes_all() {
        let queue = TestQueue {
            produced: vec![1, 2, 3, 4],
            consumed: vec![1, 2],
            contents: vec![3, 4],
        };

        let checker = QueuePropertyChecker::new(&queue);
        assert!(checker.all_hold(), "{:?}", checker.violations());
    }

    #[test]
    fn test_lost_message_detected() {
        let queue = TestQueue {
            produced: vec![1, 2, 3],
            consumed: vec![1],
            contents: vec![3],
        };

        let checker = QueuePropertyChecker::new(&queue);
        let lost = checker
            .check_all()
            .into_iter()
            .find(|r| r.name == "NoLostMessages")
            .unwrap();
        assert!(!lost.holds);
        assert!(lost.violation.unwrap().contains("Message 2"));
    }

    #[test]
    fn test_duplicate_delivery_detected() {
        let queue = TestQueue {
            produced: vec![1, 2],
            consumed: vec![1, 1],
            contents: vec![2],
        };

        let checker = QueuePropertyChecker::new(&queue);
        let dup = checker
            .check_all()
            .into_iter()
            .find(|r| r.name == "NoDuplicates")
            .unwrap();
        assert!(!dup.holds);
    }

    #[test]
    fn test_lifo_consumption_violates_fifo() {
        let queue = TestQueue {
            produced: vec![1, 2, 3],
            consumed: vec![3, 2],
            contents: vec![1],
        };

        let checker = QueuePropertyChecker::new(&queue);
        let violations: Vec<&str> = checker.violations().iter().map(|r| r.name).collect();
        assert!(violations.contains(&"FIFO_Order"));
        assert!(violations.contains(&"ContentsMatchRemainder"));
    }
}
