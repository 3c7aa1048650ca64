#![cfg(feature = "std")]

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use word_spinlock::{
    CheckedSpinLock, ContextId, ExecutionContext, Harness, InterruptMask, IrqSource, LockError,
    RawSpinLock, SharedCounter, SimulatedInterrupts, SpinLock,
};

fn contexts(n: u32, k: u32) -> Vec<ExecutionContext> {
    (1..=n)
        .map(|i| ExecutionContext::new(ContextId::new(i).unwrap(), k))
        .collect()
}

#[test]
fn two_contexts_five_increments_each() {
    let lock = RawSpinLock::new();
    let mut counter = SharedCounter::new(&lock);
    let ctx = contexts(2, 5);

    // Pseudo-threads: one after the other on a single control flow.
    ctx[0].run(&counter);
    ctx[1].run(&counter);

    assert_eq!(*counter.get_mut(), 10);
    assert!(!lock.is_locked());
}

#[test]
fn oracle_holds_for_every_schedule() {
    for (n, k) in [(1, 1), (2, 5), (3, 17), (8, 250)] {
        let ctx = contexts(n, k);
        let harness = Harness::new(&ctx);
        let expected = u64::from(n * k);

        let counter = SpinLock::new(0u64);
        assert_eq!(harness.run_sequential(&counter).verify(), Ok(expected));

        let counter = SpinLock::new(0u64);
        assert_eq!(harness.run_interleaved(&counter).verify(), Ok(expected));

        let lock = RawSpinLock::new();
        let counter = SharedCounter::new(&lock);
        assert_eq!(harness.run_threaded(&counter).verify(), Ok(expected));
    }
}

#[test]
fn try_acquire_never_succeeds_spuriously() {
    let lock = RawSpinLock::new();
    lock.acquire();

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..10_000 {
                    assert!(!lock.try_acquire());
                }
            });
        }
    });

    assert!(lock.is_locked());
    unsafe { lock.release() };
}

#[test]
fn fresh_lock_first_acquire_does_not_spin() {
    let lock = SpinLock::new(0u8);
    assert!(!lock.is_locked());
    assert!(lock.try_lock().is_some());
}

#[test]
fn writes_before_release_are_seen_after_acquire() {
    // Each round a writer publishes a value under the lock and a reader
    // that acquires afterwards must see it, never an older one.
    let lock = RawSpinLock::new();
    let data = AtomicU64::new(0);
    let published = AtomicU64::new(0);

    thread::scope(|s| {
        s.spawn(|| {
            for round in 1..=5_000u64 {
                lock.acquire();
                data.store(round, Ordering::Relaxed);
                published.store(round, Ordering::Relaxed);
                unsafe { lock.release() };
            }
        });

        s.spawn(|| {
            let mut last = 0;
            while last < 5_000 {
                lock.acquire();
                let seen = data.load(Ordering::Relaxed);
                let marker = published.load(Ordering::Relaxed);
                unsafe { lock.release() };

                assert_eq!(seen, marker, "critical section observed a torn update");
                assert!(seen >= last, "value went backwards across acquire");
                last = seen;
            }
        });
    });
}

#[test]
fn reentrancy_deadlocks_plain_and_is_rejected_checked() {
    // Plain lock: the holder's own try_acquire is refused, so a blocking
    // re-acquire would spin forever.
    let plain = SpinLock::new(());
    let _held = plain.lock();
    assert!(plain.try_lock().is_none());

    let checked = CheckedSpinLock::new();
    let me = ContextId::new(1).unwrap();
    checked.acquire(me).unwrap();
    assert_eq!(checked.acquire(me), Err(LockError::Reentrant { holder: me }));
    checked.release(me).unwrap();
}

#[test]
fn unmasked_handler_finds_ghost_holder() {
    // The hazard: the timer preempts a holder that did not mask it. The
    // handler can only try_acquire (a blocking acquire would never return).
    let counter = SpinLock::new(0u64);
    let saw_held = Cell::new(false);
    let handler = |_: IrqSource| match counter.try_lock() {
        Some(mut g) => *g += 1,
        None => saw_held.set(true),
    };
    let irq = SimulatedInterrupts::new();
    irq.set_handler(IrqSource::MachineTimer, &handler);

    {
        let mut guard = counter.lock();
        irq.raise(IrqSource::MachineTimer);
        *guard += 1;
    }

    assert!(saw_held.get(), "handler should have preempted the holder");
    assert_eq!(*counter.lock(), 1, "the handler's update was lost");
}

#[test]
fn masked_section_defers_handler_until_release() {
    let counter = SpinLock::new(0u64);
    let saw_held = Cell::new(false);
    let handler = |_: IrqSource| match counter.try_lock() {
        Some(mut g) => *g += 1,
        None => saw_held.set(true),
    };
    let irq = SimulatedInterrupts::new();
    irq.set_handler(IrqSource::MachineTimer, &handler);

    for _ in 0..5 {
        let mut guard = counter.lock_masked(&irq, IrqSource::MachineTimer);
        let before = irq.delivered();
        irq.raise(IrqSource::MachineTimer);
        assert_eq!(irq.delivered(), before, "no delivery while held");
        assert!(irq.is_masked(IrqSource::MachineTimer));
        *guard += 1;
    }

    assert!(!saw_held.get(), "handler ran while the lock was held");
    assert_eq!(irq.delivered(), 5);
    assert!(irq.pending().is_empty());
    assert!(!irq.is_masked(IrqSource::MachineTimer));
    assert_eq!(*counter.lock(), 10);
}

#[test]
fn nested_masked_sections_restore_outer_state() {
    let a = SpinLock::new(0u32);
    let b = SpinLock::new(0u32);
    let fired = Cell::new(0);
    let handler = |_: IrqSource| fired.set(fired.get() + 1);
    let irq = SimulatedInterrupts::new();
    irq.set_handler(IrqSource::MachineTimer, &handler);

    {
        let _outer = a.lock_masked(&irq, IrqSource::MachineTimer);
        {
            let _inner = b.lock_masked(&irq, IrqSource::MachineTimer);
            irq.raise(IrqSource::MachineTimer);
        }
        // Inner section ended but the outer one still masks the timer.
        assert_eq!(fired.get(), 0);
        assert!(a.is_locked());
    }

    assert_eq!(fired.get(), 1);
}
