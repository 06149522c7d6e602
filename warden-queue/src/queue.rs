//! Unbounded MPMC queue over a linked list of placeholder nodes.
//!
//! The list always ends in an empty placeholder. Enqueueing is split in two
//! independent CAS steps that different threads may complete:
//!
//! 1. *fill*: set the tail placeholder's `data` from null to the element;
//! 2. *extend*: set the tail's `next` from null to a fresh placeholder, then
//!    publish that placeholder as the new tail.
//!
//! A thread that loses the fill race still tries to extend, so on every
//! contended round some thread either records a value or grows the chain.
//!
//! Dequeue advances `head` past the oldest filled node and takes its element.
//! The displaced node is freed at once unless a hazard pointer still covers
//! it, in which case it is parked on the queue's [`RetiredList`].

use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicIsize, AtomicPtr, Ordering};

use crossbeam_utils::Backoff;
use warden::{Error, HazardPointer, Registry, RetiredList, registry};

use crate::trace::{debug, warn};
use crate::utils::CacheAligned;

/// Target of `data` once a dequeue has moved the element out.
///
/// Non-null, so a late enqueuer still holding this node as a stale tail can
/// never fill it again.
static TAKEN: u8 = 0;

#[inline]
fn taken<T>() -> *mut T {
    &TAKEN as *const u8 as *mut T
}

struct Node<T> {
    data: AtomicPtr<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn placeholder() -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            data: AtomicPtr::new(ptr::null_mut()),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    fn holds_value(&mut self) -> bool {
        let data = *self.data.get_mut();
        !data.is_null() && data != taken()
    }
}

impl<T> Drop for Node<T> {
    fn drop(&mut self) {
        if self.holds_value() {
            // SAFETY: filled from `Box::into_raw` and never taken.
            unsafe { drop(Box::from_raw(*self.data.get_mut())) };
        }
    }
}

/// Outcome of one attempt to unlink the front node.
enum Advance<T> {
    /// The head moved past this node; the caller owns its element.
    Took(*mut Node<T>),
    Empty,
    Retry,
}

/// An unbounded lock-free multi-producer multi-consumer FIFO queue.
///
/// Every thread that calls [`enqueue`](Queue::enqueue) or
/// [`dequeue`](Queue::dequeue) claims one hazard-pointer slot for `T` on its
/// first call and keeps it until it exits. At most [`warden::MAX_SLOTS`]
/// threads may do so concurrently for a given `T`; the next one gets
/// [`Error::ResourceExhausted`].
///
/// The slots come from a registry keyed on the queue's private node type, so
/// they never alias a hazard pointer user code obtains through
/// [`warden::hazard_pointer::<T>()`](warden::hazard_pointer).
///
/// # Examples
///
/// ```
/// use warden_queue::Queue;
///
/// let q = Queue::new();
/// q.enqueue(1).unwrap();
/// q.enqueue(2).unwrap();
/// assert_eq!(q.dequeue().unwrap(), Some(1));
/// assert_eq!(q.dequeue().unwrap(), Some(2));
/// assert_eq!(q.dequeue().unwrap(), None);
/// ```
pub struct Queue<T> {
    head: CacheAligned<AtomicPtr<Node<T>>>,
    tail: CacheAligned<AtomicPtr<Node<T>>>,
    /// Signed: a dequeue may land before the racing extender's increment.
    size: CacheAligned<AtomicIsize>,
    retired: RetiredList<Node<T>>,
    registry: &'static Registry,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T: 'static> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Queue<T> {
    /// Creates an empty queue holding a single sentinel placeholder.
    pub fn new() -> Queue<T> {
        let sentinel = Node::placeholder();
        let registry = registry::<Node<T>>();
        debug!(element = std::any::type_name::<T>(), "queue created");

        Queue {
            head: CacheAligned::new(AtomicPtr::new(sentinel)),
            tail: CacheAligned::new(AtomicPtr::new(sentinel)),
            size: CacheAligned::new(AtomicIsize::new(0)),
            retired: RetiredList::new(),
            registry,
            _marker: PhantomData,
        }
    }

    #[inline]
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn hazard(&self) -> Result<HazardPointer, Error> {
        HazardPointer::current(self.registry).inspect_err(|err| {
            warn!(error = %err, "queue operation refused");
        })
    }

    /// Appends `value` to the back of the queue.
    ///
    /// Never blocks. Fails only when this thread cannot hold a hazard
    /// pointer for `T`: the pool is exhausted on first use, or the thread is
    /// already exiting. `value` is dropped in that case.
    pub fn enqueue(&self, value: T) -> Result<(), Error> {
        let hazard = self.hazard()?;
        let data = Box::into_raw(Box::new(value));
        let mut placeholder = Node::placeholder();
        let backoff = Backoff::new();

        loop {
            let tail = hazard.protect(&self.tail);
            // SAFETY: `tail` was the queue's tail after we protected it, so it
            // has not been handed to the reclaimer.
            let node = unsafe { &*tail };

            if node
                .data
                .compare_exchange(ptr::null_mut(), data, Ordering::Release, Ordering::Acquire)
                .is_ok()
            {
                if !self.try_extend(node, placeholder) {
                    // Another thread grew the chain from our node first.
                    // SAFETY: the placeholder was never published.
                    unsafe { drop(Box::from_raw(placeholder)) };
                }
                break;
            }

            // Someone else filled this node; help grow the chain so the next
            // round has an empty tail to fill.
            if self.try_extend(node, placeholder) {
                placeholder = Node::placeholder();
            }
            backoff.snooze();
        }

        hazard.clear();
        Ok(())
    }

    /// Links `placeholder` after `node` and publishes it as the new tail.
    ///
    /// Only the thread whose link succeeds moves `tail` and counts the
    /// element, so `tail` only ever moves forward.
    fn try_extend(&self, node: &Node<T>, placeholder: *mut Node<T>) -> bool {
        if node
            .next
            .compare_exchange(
                ptr::null_mut(),
                placeholder,
                Ordering::Release,
                Ordering::Relaxed,
            )
            .is_err()
        {
            return false;
        }
        self.tail.store(placeholder, Ordering::SeqCst);
        self.size.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Removes the element at the front of the queue.
    ///
    /// Returns `Ok(None)` at once when the queue is empty. Fails under the
    /// same conditions as [`enqueue`](Queue::enqueue).
    pub fn dequeue(&self) -> Result<Option<T>, Error> {
        let hazard = self.hazard()?;
        let backoff = Backoff::new();

        let head = loop {
            let head = self.head.load(Ordering::SeqCst);
            if self.tail.load(Ordering::SeqCst) == head {
                hazard.clear();
                return Ok(None);
            }

            match self.advance_head(hazard, head) {
                Advance::Took(head) => break head,
                Advance::Empty => {
                    hazard.clear();
                    return Ok(None);
                }
                Advance::Retry => {
                    hazard.clear();
                    backoff.spin();
                }
            }
        };

        // SAFETY: winning the head CAS makes this thread the only one that
        // consumes `head`'s element, and our hazard keeps the node alive.
        let data = unsafe { (*head).data.swap(taken(), Ordering::Acquire) };
        hazard.clear();
        self.size.fetch_sub(1, Ordering::Relaxed);

        debug_assert!(!data.is_null() && data != taken());
        // SAFETY: filled from `Box::into_raw` by exactly one enqueuer.
        let value = unsafe { *Box::from_raw(data) };

        if self.registry.is_protected(head) {
            // SAFETY: unlinked by our CAS and retired exactly once.
            unsafe { self.retired.retire(head) };
        } else {
            // SAFETY: unlinked, and no hazard pointer can still reach it.
            unsafe { drop(Box::from_raw(head)) };
        }
        self.retired.sweep(self.registry);

        Ok(Some(value))
    }
}

impl<T> Queue<T> {
    /// Protects `head`, a snapshot that may already be stale, and tries to
    /// move the queue's head past it.
    ///
    /// The snapshot's address can have been freed and handed out again as a
    /// fresh placeholder since it was loaded, so the address re-check alone
    /// says nothing about `next`. A null `next` on the validated head means
    /// the queue drained in the meantime.
    fn advance_head(&self, hazard: HazardPointer, head: *mut Node<T>) -> Advance<T> {
        hazard.set(head);
        if self.head.load(Ordering::SeqCst) != head {
            return Advance::Retry;
        }

        // SAFETY: protected and re-validated as the current head.
        let next = unsafe { (*head).next.load(Ordering::Acquire) };
        if next.is_null() {
            return Advance::Empty;
        }

        match self
            .head
            .compare_exchange(head, next, Ordering::SeqCst, Ordering::Relaxed)
        {
            Ok(_) => Advance::Took(head),
            Err(_) => Advance::Retry,
        }
    }

    /// Number of elements, as a relaxed snapshot.
    ///
    /// Advisory only: under concurrent use the value may already be stale.
    #[inline]
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed).max(0) as usize
    }

    /// Whether the queue looked empty at the moment of the call.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Displaced nodes still waiting for readers to release them.
    #[inline]
    pub fn pending_reclamation(&self) -> usize {
        self.retired.pending()
    }
}

impl<T> Drop for Queue<T> {
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables, unused_assignments))]
    fn drop(&mut self) {
        let mut current = *self.head.get_mut();
        let mut remaining = 0usize;

        while !current.is_null() {
            // SAFETY: `&mut self` excludes every other accessor; each node in
            // the live chain is owned by the queue.
            let mut node = unsafe { Box::from_raw(current) };
            if node.holds_value() {
                remaining += 1;
            }
            current = *node.next.get_mut();
        }

        debug!(remaining, "queue dropped");
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("size", &self.size())
            .field("pending_reclamation", &self.pending_reclamation())
            .finish()
    }
}
