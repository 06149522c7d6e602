//! Hazard-pointer slot tables and the per-type directory.
//!
//! A [`Registry`] is a fixed array of slots. Each slot records which thread
//! owns it and which address that thread currently protects from reclamation.
//! Slot ownership is claimed with a CAS on the owner word, so acquiring a slot
//! is lock-free; the table never grows.
//!
//! One registry exists per element type, created on first use by
//! [`registry`] and leaked for the lifetime of the process. The directory of
//! registries is an insert-only lock-free list.

use crate::error::Error;
use crate::trace::{debug, trace, warn};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::any::TypeId;
use core::cell::Cell;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

/// Number of hazard-pointer slots in every per-type registry.
///
/// This is the maximum number of threads that may concurrently take part in
/// operations on a given element type.
pub const MAX_SLOTS: usize = 100;

/// Owner identity of a free slot. Thread identities start at 1.
const UNOWNED: u64 = 0;

/// Protected address of a slot that protects nothing.
const NO_ADDRESS: usize = 0;

/// Source of process-unique thread identities.
static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

std::thread_local! {
    static IDENTITY: Cell<u64> = const { Cell::new(UNOWNED) };
}

/// Identity of the calling thread as recorded in slot owner words.
///
/// Assigned lazily, never zero, and never reused within a process.
#[inline]
pub fn thread_identity() -> u64 {
    IDENTITY.with(|identity| match identity.get() {
        UNOWNED => {
            let fresh = NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed);
            identity.set(fresh);
            fresh
        }
        known => known,
    })
}

/// One hazard pointer: owner identity plus protected address.
///
/// Aligned to its own cache line pair; owners write `address` on every
/// operation while other threads scan it.
#[repr(align(128))]
struct Slot {
    owner: AtomicU64,
    address: AtomicUsize,
}

impl Slot {
    const fn new() -> Self {
        Self {
            owner: AtomicU64::new(UNOWNED),
            address: AtomicUsize::new(NO_ADDRESS),
        }
    }
}

/// A fixed-capacity table of hazard-pointer slots.
///
/// Slots are identified by their index, as returned from [`Registry::acquire`].
/// Passing an index that was not obtained from `acquire` on the same registry
/// is a logic error and panics when out of range.
pub struct Registry {
    slots: Box<[Slot]>,
}

impl Registry {
    /// Creates a registry with `capacity` free slots.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::new);
        Self {
            slots: slots.into_boxed_slice(),
        }
    }

    /// Total number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently owned by some thread.
    pub fn in_use(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.owner.load(Ordering::Acquire) != UNOWNED)
            .count()
    }

    /// Identity of the thread owning `slot`, if any.
    pub fn owner_of(&self, slot: usize) -> Option<u64> {
        match self.slots[slot].owner.load(Ordering::Acquire) {
            UNOWNED => None,
            owner => Some(owner),
        }
    }

    /// Claims the first free slot for the calling thread.
    ///
    /// Scans the table once. Fails with [`Error::ResourceExhausted`] when
    /// every slot is owned; the scan is not repeated.
    pub fn acquire(&self) -> Result<usize, Error> {
        let me = thread_identity();

        for (index, slot) in self.slots.iter().enumerate() {
            // Test before CAS: owned slots are the common case once warm.
            if slot.owner.load(Ordering::Relaxed) != UNOWNED {
                continue;
            }
            if slot
                .owner
                .compare_exchange(UNOWNED, me, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                trace!(slot = index, thread = me, "hazard slot claimed");
                return Ok(index);
            }
        }

        warn!(
            capacity = self.capacity(),
            thread = me,
            "no available hazard pointer"
        );
        Err(Error::ResourceExhausted {
            capacity: self.capacity(),
        })
    }

    /// Returns `slot` to the pool.
    ///
    /// The protected address is cleared before the owner word so the next
    /// owner never starts out protecting a stale node.
    pub fn release(&self, slot: usize) {
        let entry = &self.slots[slot];
        entry.address.store(NO_ADDRESS, Ordering::Release);
        entry.owner.store(UNOWNED, Ordering::Release);
        trace!(slot, "hazard slot released");
    }

    /// Publishes `ptr` as protected by `slot`.
    ///
    /// `SeqCst` orders the publication before the caller's validating re-load
    /// of the shared pointer, which is what lets a reclaimer that misses the
    /// publication be sure the caller will see the pointer change.
    #[inline]
    pub fn protect<T>(&self, slot: usize, ptr: *const T) {
        self.slots[slot]
            .address
            .store(ptr as usize, Ordering::SeqCst);
    }

    /// Stops `slot` from protecting anything.
    #[inline]
    pub fn clear(&self, slot: usize) {
        self.slots[slot]
            .address
            .store(NO_ADDRESS, Ordering::Release);
    }

    /// Address currently protected by `slot`, or null.
    #[inline]
    pub fn protected(&self, slot: usize) -> *const () {
        self.slots[slot].address.load(Ordering::Acquire) as *const ()
    }

    /// Whether any slot currently protects `ptr`.
    ///
    /// Gates reclamation: a node may only be freed after this returns
    /// `false` for it while it is no longer reachable from the structure.
    /// Null is never protected.
    pub fn is_protected<T>(&self, ptr: *const T) -> bool {
        let address = ptr as usize;
        if address == NO_ADDRESS {
            return false;
        }
        self.slots
            .iter()
            .any(|slot| slot.address.load(Ordering::SeqCst) == address)
    }
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .finish()
    }
}

/// One directory entry. Entries are leaked once published and never unlinked.
struct Entry {
    id: TypeId,
    registry: Registry,
    next: *mut Entry,
}

/// Registries created so far, keyed by element type. Newest first.
static DIRECTORY: AtomicPtr<Entry> = AtomicPtr::new(ptr::null_mut());

/// Scans the directory from `from` up to, not including, `until`.
fn lookup(from: *mut Entry, until: *mut Entry, key: TypeId) -> Option<&'static Registry> {
    let mut current = from;
    while current != until {
        // SAFETY: published entries are leaked and immutable.
        let entry: &'static Entry = unsafe { &*current };
        if entry.id == key {
            return Some(&entry.registry);
        }
        current = entry.next;
    }
    None
}

/// The process-wide registry for element type `T`.
///
/// Created with [`MAX_SLOTS`] slots on first call and never freed. Threads
/// racing to create the same registry agree on a single winner; the losers
/// discard their unpublished copy.
pub fn registry<T: ?Sized + 'static>() -> &'static Registry {
    let key = TypeId::of::<T>();
    let mut head = DIRECTORY.load(Ordering::Acquire);
    if let Some(found) = lookup(head, ptr::null_mut(), key) {
        return found;
    }

    let entry = Box::into_raw(Box::new(Entry {
        id: key,
        registry: Registry::new(MAX_SLOTS),
        next: head,
    }));

    loop {
        match DIRECTORY.compare_exchange_weak(head, entry, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                debug!(
                    element = core::any::type_name::<T>(),
                    capacity = MAX_SLOTS,
                    "hazard registry created"
                );
                // SAFETY: published, so leaked for the rest of the process.
                return unsafe { &(*entry).registry };
            }
            Err(actual) => {
                // Only entries pushed since our last look can be new.
                if let Some(found) = lookup(actual, head, key) {
                    // SAFETY: never published, still exclusively ours.
                    unsafe { drop(Box::from_raw(entry)) };
                    return found;
                }
                head = actual;
                // SAFETY: unpublished until the CAS succeeds.
                unsafe { (*entry).next = head };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_thread_identity_stable_and_distinct() {
        let mine = thread_identity();
        assert_ne!(mine, UNOWNED);
        assert_eq!(mine, thread_identity());

        let other = thread::spawn(thread_identity).join().unwrap();
        assert_ne!(mine, other);
    }

    #[test]
    fn test_null_never_protected() {
        let registry = Registry::new(4);
        let slot = registry.acquire().unwrap();
        registry.protect(slot, core::ptr::null::<u8>());
        assert!(!registry.is_protected(core::ptr::null::<u8>()));
        registry.release(slot);
    }

    #[test]
    fn test_directory_one_registry_per_type() {
        struct A;
        struct B;

        let a1 = registry::<A>();
        let a2 = thread::spawn(|| registry::<A>() as *const Registry as usize)
            .join()
            .unwrap();
        let b = registry::<B>();

        assert_eq!(a1 as *const Registry as usize, a2);
        assert!(!core::ptr::eq(a1, b));
        assert_eq!(a1.capacity(), MAX_SLOTS);
    }

    #[test]
    fn test_directory_racing_creators_agree() {
        use std::sync::{Arc, Barrier};

        struct Raced;

        let start = Arc::new(Barrier::new(8));
        let seen: Vec<usize> = (0..8)
            .map(|_| {
                let start = start.clone();
                thread::spawn(move || {
                    start.wait();
                    registry::<Raced>() as *const Registry as usize
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();

        assert!(seen.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(seen[0], registry::<Raced>() as *const Registry as usize);
    }

    #[test]
    fn test_zero_capacity_is_always_exhausted() {
        let registry = Registry::new(0);
        assert_eq!(
            registry.acquire(),
            Err(Error::ResourceExhausted { capacity: 0 })
        );
    }
}
