//! Wait/notify protocol of the blocking queue.
//!
//! One producer pushes `items` elements, each push followed (after the lock
//! is released) by `notify_one`. Consumers each pop one element, waiting on
//! the condition variable while the queue is empty.
//!
//! Two consumer protocols are modelled:
//!
//! | Protocol | Emptiness check | Lost wakeup |
//! |----------|-----------------|-------------|
//! | `CheckUnderLock` | under the mutex, wait releases it atomically | impossible |
//! | `CheckOutsideLock` | before taking the mutex | reachable |
//!
//! A notify with no waiter is dropped, as with a real condition variable.
//!
//! # Invariants
//!
//! 1. `NoLostWakeup`: never are all remaining consumers asleep while the
//!    producer is finished and elements are queued

use std::hash::Hash;

use stateright::{Model, Property};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    CheckUnderLock,
    CheckOutsideLock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Holder {
    Producer,
    Consumer(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProducerPc {
    /// About to lock and push.
    Idle,
    /// Holds the lock.
    Locked,
    /// Pushed and unlocked; notify pending.
    Notify,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsumerPc {
    /// Not yet checked, or woken by a notify.
    Ready,
    /// Holds the lock, about to check.
    Locked,
    /// Saw the queue empty without the lock; about to lock and wait.
    SawEmpty,
    /// Saw an element without the lock; about to lock and pop.
    SawItem,
    /// Blocked on the condition variable.
    Waiting,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueState {
    pub queue_len: u8,
    pub pushed: u8,
    pub lock: Option<Holder>,
    pub producer: ProducerPc,
    pub consumers: Vec<ConsumerPc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueAction {
    ProducerLock,
    ProducerPush,
    /// `notify_one`; wakes the given waiter, or nobody.
    ProducerNotify(Option<u8>),
    ConsumerLock(u8),
    /// Check under the lock: pop or start waiting.
    ConsumerCheck(u8),
    /// Peek without the lock.
    ConsumerPeek(u8),
}

/// Model of the producer/consumer wait protocol.
#[derive(Debug, Clone)]
pub struct QueueWakeupModel {
    pub items: u8,
    pub consumers: u8,
    pub protocol: Protocol,
}

impl QueueWakeupModel {
    pub fn new(items: u8, consumers: u8, protocol: Protocol) -> Self {
        debug_assert!(consumers <= items, "every consumer must be able to finish");
        Self {
            items,
            consumers,
            protocol,
        }
    }

    /// Some consumer sleeps forever next to a queued element.
    pub fn has_lost_wakeup(state: &QueueState) -> bool {
        let live: Vec<ConsumerPc> = state
            .consumers
            .iter()
            .copied()
            .filter(|c| *c != ConsumerPc::Done)
            .collect();
        state.producer == ProducerPc::Done
            && state.queue_len > 0
            && !live.is_empty()
            && live.iter().all(|c| *c == ConsumerPc::Waiting)
    }
}

impl Model for QueueWakeupModel {
    type State = QueueState;
    type Action = QueueAction;

    fn init_states(&self) -> Vec<Self::State> {
        vec![QueueState {
            queue_len: 0,
            pushed: 0,
            lock: None,
            producer: if self.items == 0 {
                ProducerPc::Done
            } else {
                ProducerPc::Idle
            },
            consumers: vec![ConsumerPc::Ready; self.consumers as usize],
        }]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        let lock_free = state.lock.is_none();

        match state.producer {
            ProducerPc::Idle if lock_free => actions.push(QueueAction::ProducerLock),
            ProducerPc::Locked => actions.push(QueueAction::ProducerPush),
            ProducerPc::Notify => {
                let mut any_waiter = false;
                for (c, pc) in state.consumers.iter().enumerate() {
                    if *pc == ConsumerPc::Waiting {
                        any_waiter = true;
                        actions.push(QueueAction::ProducerNotify(Some(c as u8)));
                    }
                }
                if !any_waiter {
                    actions.push(QueueAction::ProducerNotify(None));
                }
            }
            _ => {}
        }

        for (c, pc) in state.consumers.iter().enumerate() {
            let id = c as u8;
            match (self.protocol, pc) {
                (Protocol::CheckUnderLock, ConsumerPc::Ready) if lock_free => {
                    actions.push(QueueAction::ConsumerLock(id));
                }
                (Protocol::CheckOutsideLock, ConsumerPc::Ready) => {
                    actions.push(QueueAction::ConsumerPeek(id));
                }
                (Protocol::CheckOutsideLock, ConsumerPc::SawEmpty | ConsumerPc::SawItem)
                    if lock_free =>
                {
                    actions.push(QueueAction::ConsumerLock(id));
                }
                (_, ConsumerPc::Locked) => actions.push(QueueAction::ConsumerCheck(id)),
                _ => {}
            }
        }
    }

    fn next_state(&self, last_state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut state = last_state.clone();
        match action {
            QueueAction::ProducerLock => {
                state.lock = Some(Holder::Producer);
                state.producer = ProducerPc::Locked;
            }
            QueueAction::ProducerPush => {
                state.queue_len += 1;
                state.pushed += 1;
                state.lock = None;
                state.producer = ProducerPc::Notify;
            }
            QueueAction::ProducerNotify(waiter) => {
                if let Some(c) = waiter {
                    state.consumers[c as usize] = ConsumerPc::Ready;
                }
                state.producer = if state.pushed == self.items {
                    ProducerPc::Done
                } else {
                    ProducerPc::Idle
                };
            }
            QueueAction::ConsumerPeek(c) => {
                state.consumers[c as usize] = if state.queue_len > 0 {
                    ConsumerPc::SawItem
                } else {
                    ConsumerPc::SawEmpty
                };
            }
            QueueAction::ConsumerLock(c) => {
                let pc = state.consumers[c as usize];
                state.lock = Some(Holder::Consumer(c));
                state.consumers[c as usize] = ConsumerPc::Locked;
                if pc == ConsumerPc::SawEmpty {
                    // Acting on the stale observation: wait without re-checking.
                    state.lock = None;
                    state.consumers[c as usize] = ConsumerPc::Waiting;
                }
            }
            QueueAction::ConsumerCheck(c) => {
                state.lock = None;
                if state.queue_len > 0 {
                    state.queue_len -= 1;
                    state.consumers[c as usize] = ConsumerPc::Done;
                } else {
                    // wait() releases the lock atomically
                    state.consumers[c as usize] = ConsumerPc::Waiting;
                }
            }
        }
        Some(state)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            Property::always("NoLostWakeup", |_: &Self, state: &QueueState| {
                !Self::has_lost_wakeup(state)
            }),
            Property::sometimes("AllConsumed", |_: &Self, state: &QueueState| {
                state.consumers.iter().all(|c| *c == ConsumerPc::Done)
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stateright::Checker;

    #[test]
    fn test_check_under_lock_has_no_lost_wakeup() {
        let checker = QueueWakeupModel::new(2, 2, Protocol::CheckUnderLock)
            .checker()
            .spawn_bfs()
            .join();
        checker.assert_properties();
    }

    #[test]
    fn test_check_outside_lock_loses_wakeup() {
        let checker = QueueWakeupModel::new(1, 1, Protocol::CheckOutsideLock)
            .checker()
            .spawn_bfs()
            .join();
        assert!(checker.discovery("NoLostWakeup").is_some());
    }

    #[test]
    fn test_lost_wakeup_trace() {
        let model = QueueWakeupModel::new(1, 1, Protocol::CheckOutsideLock);
        let mut state = model.init_states().remove(0);
        for action in [
            QueueAction::ConsumerPeek(0),
            QueueAction::ProducerLock,
            QueueAction::ProducerPush,
            QueueAction::ProducerNotify(None),
            QueueAction::ConsumerLock(0),
        ] {
            state = model.next_state(&state, action).unwrap();
        }
        assert!(QueueWakeupModel::has_lost_wakeup(&state));
    }
}
