use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use warden::{Error, HazardPointer, MAX_SLOTS, Registry, registry, thread_identity};

fn leaked(capacity: usize) -> &'static Registry {
    Box::leak(Box::new(Registry::new(capacity)))
}

#[test]
fn test_acquire_first_free_slot() {
    let registry = Registry::new(3);
    assert_eq!(registry.acquire(), Ok(0));
    assert_eq!(registry.acquire(), Ok(1));
    assert_eq!(registry.owner_of(0), Some(thread_identity()));
    assert_eq!(registry.owner_of(2), None);
    assert_eq!(registry.in_use(), 2);
}

#[test]
fn test_release_makes_slot_reusable() {
    let registry = Registry::new(2);
    let a = registry.acquire().unwrap();
    let b = registry.acquire().unwrap();
    registry.release(a);
    assert_eq!(registry.acquire(), Ok(a));
    registry.release(b);
    assert_eq!(registry.in_use(), 1);
}

#[test]
fn test_exhaustion_reports_capacity() {
    let registry = Registry::new(2);
    registry.acquire().unwrap();
    registry.acquire().unwrap();

    let err = registry.acquire().unwrap_err();
    assert_eq!(err, Error::ResourceExhausted { capacity: 2 });
    assert_eq!(
        err.to_string(),
        "no available hazard pointer (all 2 slots in use)"
    );
}

#[test]
fn test_release_clears_protection() {
    let registry = Registry::new(1);
    let value = Box::into_raw(Box::new(5u64));
    let slot = registry.acquire().unwrap();

    registry.protect(slot, value);
    assert!(registry.is_protected(value));
    registry.release(slot);
    assert!(!registry.is_protected(value));
    assert!(registry.protected(slot).is_null());

    unsafe { drop(Box::from_raw(value)) };
}

#[test]
fn test_is_protected_scans_every_slot() {
    let registry = Registry::new(8);
    let values: Vec<*mut u32> = (0..8).map(|i| Box::into_raw(Box::new(i))).collect();

    for (slot, value) in values.iter().enumerate() {
        assert_eq!(registry.acquire(), Ok(slot));
        registry.protect(slot, *value);
    }
    for value in &values {
        assert!(registry.is_protected(*value));
    }

    registry.clear(3);
    assert!(!registry.is_protected(values[3]));
    assert!(registry.is_protected(values[7]));

    for value in values {
        unsafe { drop(Box::from_raw(value)) };
    }
}

#[test]
fn test_global_registry_capacity() {
    struct Sized64;
    assert_eq!(registry::<Sized64>().capacity(), MAX_SLOTS);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_acquire_distinct_slots() {
    let threads = 16;
    let registry = leaked(threads);
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let slot = registry.acquire().unwrap();
                assert_eq!(registry.owner_of(slot), Some(thread_identity()));
                slot
            })
        })
        .collect();

    let slots: HashSet<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(slots.len(), threads);
    assert_eq!(registry.in_use(), threads);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_acquire_over_capacity() {
    let capacity = 4;
    let threads = 12;
    let registry = leaked(capacity);
    let start = Arc::new(Barrier::new(threads));
    let finish = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let start = start.clone();
            let finish = finish.clone();
            thread::spawn(move || {
                start.wait();
                // Keep the claim alive until every thread has tried.
                let claimed = HazardPointer::current(registry).is_ok();
                finish.wait();
                claimed
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|claimed| *claimed)
        .count();

    assert_eq!(winners, capacity);
    assert_eq!(registry.in_use(), 0, "slots must be released on thread exit");
}
