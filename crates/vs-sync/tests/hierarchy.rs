//! Lock-order enforcement across threads.

use std::sync::{mpsc, Barrier};
use std::thread;
use std::time::Duration;

use vs_sync::{
    current_hierarchy_value, HierarchicalMutex, LockOrderViolation, SyncError,
    HIERARCHY_UNBOUNDED,
};

#[test]
fn test_a_then_b_succeeds() {
    let a = HierarchicalMutex::new(10_000, ());
    let b = HierarchicalMutex::new(5_000, ());

    let ga = a.lock().unwrap();
    let gb = b.lock().unwrap();
    gb.unlock().unwrap();
    ga.unlock().unwrap();
    assert_eq!(current_hierarchy_value(), HIERARCHY_UNBOUNDED);
}

#[test]
fn test_b_then_a_violates_without_blocking() {
    let a = HierarchicalMutex::new(10_000, ());
    let b = HierarchicalMutex::new(5_000, ());
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    thread::scope(|s| {
        // Another thread holds A. A blocking attempt would hang.
        let a = &a;
        s.spawn(move || {
            let guard = a.lock().unwrap();
            locked_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            guard.unlock().unwrap();
        });
        locked_rx.recv().unwrap();

        let gb = b.lock().unwrap();
        let err = a.lock().unwrap_err();
        assert_eq!(
            err,
            LockOrderViolation::Acquire {
                held: 5_000,
                requested: 10_000
            }
        );
        gb.unlock().unwrap();
        release_tx.send(()).unwrap();
    });
}

#[test]
fn test_releasing_a_while_b_held_violates() {
    let a = HierarchicalMutex::new(10_000, ());
    let b = HierarchicalMutex::new(5_000, ());

    let ga = a.lock().unwrap();
    let gb = b.lock().unwrap();

    let err = ga.unlock().unwrap_err();
    assert!(matches!(err.violation(), LockOrderViolation::Release { .. }));

    let ga = err.into_guard();
    gb.unlock().unwrap();
    ga.unlock().unwrap();
}

static HIGH_LEVEL_MUTEX: HierarchicalMutex = HierarchicalMutex::new(10_000, ());
static LOW_LEVEL_MUTEX: HierarchicalMutex<u32> = HierarchicalMutex::new(5_000, 0);
static OTHER_MUTEX: HierarchicalMutex = HierarchicalMutex::new(6_000, ());

fn low_level_func() -> Result<u32, LockOrderViolation> {
    LOW_LEVEL_MUTEX.with_lock(|calls| {
        *calls += 1;
        1
    })
}

fn high_level_func() -> Result<u32, LockOrderViolation> {
    let _lk = HIGH_LEVEL_MUTEX.lock()?;
    low_level_func()
}

fn other_func() -> Result<u32, LockOrderViolation> {
    let _lk = OTHER_MUTEX.lock()?;
    high_level_func()
}

#[test]
fn test_layered_calls() {
    let t1 = thread::spawn(high_level_func);
    let t2 = thread::spawn(other_func);

    assert_eq!(t1.join().unwrap(), Ok(1));
    assert_eq!(
        t2.join().unwrap(),
        Err(LockOrderViolation::Acquire {
            held: 6_000,
            requested: 10_000
        })
    );
}

#[test]
fn test_violation_propagates_as_sync_error() {
    fn run() -> Result<u32, SyncError> {
        let outer = HierarchicalMutex::new(1, ());
        let inner = HierarchicalMutex::new(2, 7u32);
        let _g = outer.lock()?;
        Ok(inner.with_lock(|v| *v)?)
    }

    assert!(matches!(run(), Err(SyncError::LockOrder(_))));
}

#[test]
fn test_levels_are_independent_across_threads() {
    let high = HierarchicalMutex::new(10_000, ());
    let low = HierarchicalMutex::new(5_000, ());
    let barrier = Barrier::new(2);

    thread::scope(|s| {
        // Thread 1 sits at level 5000 (holding `low`) ...
        s.spawn(|| {
            let guard = low.lock().unwrap();
            barrier.wait();
            barrier.wait();
            guard.unlock().unwrap();
        });

        // ... which must not stop thread 2 from taking `high`.
        s.spawn(|| {
            barrier.wait();
            assert_eq!(current_hierarchy_value(), HIERARCHY_UNBOUNDED);
            high.lock().unwrap().unlock().unwrap();
            barrier.wait();
        });
    });
}

#[test]
fn test_consistent_order_makes_progress() {
    // Two threads repeatedly take the same pair in hierarchy order; with
    // the rule enforced there is no deadlock, so both finish.
    let outer = HierarchicalMutex::new(200, 0u64);
    let inner = HierarchicalMutex::new(100, 0u64);
    let (tx, rx) = mpsc::channel();

    thread::scope(|s| {
        for _ in 0..2 {
            let tx = tx.clone();
            let (outer, inner) = (&outer, &inner);
            s.spawn(move || {
                for _ in 0..1000 {
                    let mut o = outer.lock().unwrap();
                    let mut i = inner.lock().unwrap();
                    *o += 1;
                    *i += 1;
                    i.unlock().unwrap();
                    o.unlock().unwrap();
                }
                tx.send(()).unwrap();
            });
        }
        for _ in 0..2 {
            rx.recv_timeout(Duration::from_secs(10)).unwrap();
        }
    });

    assert_eq!(outer.into_inner(), 2000);
    assert_eq!(inner.into_inner(), 2000);
}
