//! Deferred reclamation of unlinked nodes.
//!
//! A [`RetiredList`] collects nodes that were removed from a structure while
//! some hazard pointer may still reference them. Pushing is a Treiber-style
//! CAS loop; sweeping detaches the whole list at once and re-pushes whatever
//! is still protected.

use crate::registry::Registry;
use crate::trace::trace;
use alloc::boxed::Box;
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

/// Wrapper linking one retired node into the list. Owns the node.
struct RetiredNode<N> {
    node: *mut N,
    next: *mut RetiredNode<N>,
}

impl<N> Drop for RetiredNode<N> {
    fn drop(&mut self) {
        // SAFETY: `node` came from `Box::into_raw` and was handed over in
        // `retire`; the wrapper is its sole owner.
        unsafe { drop(Box::from_raw(self.node)) };
    }
}

/// Lock-free list of nodes awaiting reclamation.
///
/// Nodes are boxed `N` values; freeing one drops the `Box<N>`, which also
/// drops anything the node still owns.
pub struct RetiredList<N> {
    head: AtomicPtr<RetiredNode<N>>,
    pending: AtomicUsize,
    _marker: PhantomData<Box<N>>,
}

// SAFETY: retired nodes are only reachable through the list's atomics and
// are freed by whichever thread sweeps them.
unsafe impl<N: Send> Send for RetiredList<N> {}
unsafe impl<N: Send> Sync for RetiredList<N> {}

impl<N> Default for RetiredList<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> RetiredList<N> {
    /// Creates an empty list.
    pub const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            pending: AtomicUsize::new(0),
            _marker: PhantomData,
        }
    }

    /// Defers freeing `node` until a sweep finds it unprotected.
    ///
    /// # Safety
    ///
    /// `node` must come from `Box::into_raw`, must already be unreachable
    /// from the shared structure, and must not be retired or freed again.
    pub unsafe fn retire(&self, node: *mut N) {
        let entry = Box::into_raw(Box::new(RetiredNode {
            node,
            next: ptr::null_mut(),
        }));
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.push(entry);
        trace!(node = ?node, "node retired");
    }

    fn push(&self, entry: *mut RetiredNode<N>) {
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: `entry` is exclusively ours until the CAS publishes it.
            unsafe { (*entry).next = head };
            match self
                .head
                .compare_exchange_weak(head, entry, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => head = actual,
            }
        }
    }

    /// Frees every retired node that no slot of `registry` protects.
    ///
    /// Protected nodes are put back for a later sweep. Returns the number of
    /// nodes freed; an empty list yields zero and touches nothing.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables, unused_assignments))]
    pub fn sweep(&self, registry: &Registry) -> usize {
        let mut current = self.head.swap(ptr::null_mut(), Ordering::Acquire);
        if current.is_null() {
            return 0;
        }

        let mut freed = 0;
        let mut deferred = 0;
        while !current.is_null() {
            // SAFETY: the swap detached this chain; this thread owns it.
            let (node, next) = unsafe { ((*current).node, (*current).next) };
            if registry.is_protected(node) {
                self.push(current);
                deferred += 1;
            } else {
                // SAFETY: unlinked, owned by us, and no hazard pointer covers it.
                unsafe { drop(Box::from_raw(current)) };
                freed += 1;
            }
            current = next;
        }

        self.pending.fetch_sub(freed, Ordering::Relaxed);
        trace!(freed, deferred, "retired list swept");
        freed
    }

    /// Number of nodes retired and not yet freed. Advisory under concurrency.
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Whether no node is waiting for reclamation. Advisory under concurrency.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }
}

impl<N> Drop for RetiredList<N> {
    fn drop(&mut self) {
        let mut current = *self.head.get_mut();
        while !current.is_null() {
            // SAFETY: `&mut self` means no concurrent sweeper or retirer.
            let entry = unsafe { Box::from_raw(current) };
            current = entry.next;
        }
    }
}

impl<N> core::fmt::Debug for RetiredList<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RetiredList")
            .field("pending", &self.pending())
            .finish()
    }
}
