//! Thread-scoped ownership of hazard-pointer slots.
//!
//! Each thread claims at most one slot per registry, lazily, the first time it
//! needs a hazard pointer for that registry's element type. The claim is held
//! by a [`HazardOwner`] stored in a thread-local list; when the thread exits,
//! the list is dropped and every slot it held goes back to its registry.

use crate::error::Error;
use crate::registry::{Registry, registry};
use crate::trace::debug;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Exclusive claim on one slot of a registry.
///
/// Releases the slot when dropped. A failed [`HazardOwner::acquire`] produces
/// no owner, so there is never anything to release on that path.
pub struct HazardOwner {
    registry: &'static Registry,
    slot: usize,
}

impl HazardOwner {
    /// Claims a free slot of `registry` for the calling thread.
    pub fn acquire(registry: &'static Registry) -> Result<Self, Error> {
        let slot = registry.acquire()?;
        Ok(Self { registry, slot })
    }

    /// Index of the owned slot.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Registry the slot belongs to.
    #[inline]
    pub fn registry(&self) -> &'static Registry {
        self.registry
    }

    #[inline]
    fn hazard_pointer(&self) -> HazardPointer {
        HazardPointer {
            registry: self.registry,
            slot: self.slot,
            _marker: PhantomData,
        }
    }
}

impl Drop for HazardOwner {
    fn drop(&mut self) {
        self.registry.release(self.slot);
    }
}

std::thread_local! {
    static OWNERS: RefCell<Vec<HazardOwner>> = const { RefCell::new(Vec::new()) };
}

/// The calling thread's hazard pointer for one registry.
///
/// A lightweight view of a slot owned by this thread. It is neither `Send`
/// nor `Sync`: only the owning thread may publish through its slot. The slot
/// itself stays claimed until the thread exits, independently of this value.
#[derive(Clone, Copy)]
pub struct HazardPointer {
    registry: &'static Registry,
    slot: usize,
    _marker: PhantomData<*mut ()>,
}

impl HazardPointer {
    /// Returns this thread's hazard pointer for `registry`, claiming a slot
    /// on first use.
    ///
    /// Fails with [`Error::ResourceExhausted`] only on first use, when the
    /// registry has no free slot left. Fails with [`Error::ThreadExiting`]
    /// when called after this thread's owner list was destroyed, for example
    /// from another thread-local's destructor; the slots are gone by then and
    /// no new one can be held.
    pub fn current(registry: &'static Registry) -> Result<Self, Error> {
        OWNERS.try_with(|owners| {
            let known = owners
                .borrow()
                .iter()
                .find(|owner| core::ptr::eq(owner.registry, registry))
                .map(HazardOwner::hazard_pointer);
            if let Some(hazard) = known {
                return Ok(hazard);
            }

            let owner = HazardOwner::acquire(registry)?;
            let hazard = owner.hazard_pointer();
            let mut owners = owners.borrow_mut();
            owners.push(owner);
            debug!(
                slot = hazard.slot,
                owned = owners.len(),
                "thread joined hazard registry"
            );
            Ok(hazard)
        })
        .unwrap_or(Err(Error::ThreadExiting))
    }

    /// Index of the underlying slot.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Registry the slot belongs to.
    #[inline]
    pub fn registry(&self) -> &'static Registry {
        self.registry
    }

    /// Publishes `ptr` as protected.
    #[inline]
    pub fn set<T>(&self, ptr: *const T) {
        self.registry.protect(self.slot, ptr);
    }

    /// Withdraws protection.
    #[inline]
    pub fn clear(&self) {
        self.registry.clear(self.slot);
    }

    /// Loads `src` and protects the result.
    ///
    /// Repeats load, publish, re-load until two consecutive loads agree. The
    /// returned pointer was the value of `src` at a point after it became
    /// protected, so a node reached through it cannot have been judged
    /// unreferenced by a reclaimer.
    #[inline]
    pub fn protect<T>(&self, src: &AtomicPtr<T>) -> *mut T {
        let mut ptr = src.load(Ordering::Acquire);
        loop {
            self.set(ptr);
            let current = src.load(Ordering::SeqCst);
            if current == ptr {
                return ptr;
            }
            ptr = current;
        }
    }
}

impl core::fmt::Debug for HazardPointer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HazardPointer")
            .field("slot", &self.slot)
            .field("protected", &self.registry.protected(self.slot))
            .finish()
    }
}

/// The calling thread's hazard pointer for element type `T`.
///
/// Shorthand for `HazardPointer::current(registry::<T>())`. The returned
/// value is a view of this thread's one slot for `T`: every call hands back
/// the same slot, so a later `set` or `clear` through any copy replaces what
/// an earlier one published. Structures that need their own slots should key
/// the registry on a private type, as `warden_queue::Queue` does with its
/// node type.
#[inline]
pub fn hazard_pointer<T: ?Sized + 'static>() -> Result<HazardPointer, Error> {
    HazardPointer::current(registry::<T>())
}
