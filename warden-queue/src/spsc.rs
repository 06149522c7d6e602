//! Bounded single-producer single-consumer ring buffer.
//!
//! The capacity parameter `N` must be a power of two so that index wrapping is
//! a mask. One slot always stays empty to tell "full" from "empty", so the
//! ring holds at most `N - 1` elements.
//!
//! The producer and consumer halves are separate, non-cloneable handles; the
//! single-producer single-consumer contract is enforced by ownership.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::utils::CacheAligned;

struct Ring<T, const N: usize> {
    /// Next slot to write. Written by the producer only.
    head: CacheAligned<AtomicUsize>,
    /// Next slot to read. Written by the consumer only.
    tail: CacheAligned<AtomicUsize>,
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: a slot is touched by the producer before `head` publishes it and by
// the consumer before `tail` hands it back, never by both at once.
unsafe impl<T: Send, const N: usize> Sync for Ring<T, N> {}

impl<T, const N: usize> Ring<T, N> {
    const MASK: usize = N - 1;

    fn new() -> Self {
        Self {
            head: CacheAligned::new(AtomicUsize::new(0)),
            tail: CacheAligned::new(AtomicUsize::new(0)),
            buffer: (0..N)
                .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
                .collect(),
        }
    }

    #[inline]
    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) & Self::MASK
    }
}

impl<T, const N: usize> Drop for Ring<T, N> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let mut tail = *self.tail.get_mut();
        while tail != head {
            // SAFETY: slots in `tail..head` were written and not yet read.
            unsafe { self.buffer[tail].get_mut().assume_init_drop() };
            tail = (tail + 1) & Self::MASK;
        }
    }
}

/// Creates a ring of `N` slots and returns its two halves.
///
/// `N` must be a power of two no smaller than 2; this is checked at compile
/// time.
///
/// # Examples
///
/// ```
/// let (mut tx, mut rx) = warden_queue::spsc::channel::<u32, 4>();
/// assert!(tx.push(1).is_ok());
/// assert_eq!(rx.pop(), Some(1));
/// assert_eq!(rx.pop(), None);
/// ```
pub fn channel<T, const N: usize>() -> (Producer<T, N>, Consumer<T, N>) {
    const {
        assert!(
            N >= 2 && N.is_power_of_two(),
            "ring capacity must be a power of two"
        )
    };

    let ring = Arc::new(Ring::new());
    (
        Producer { ring: ring.clone() },
        Consumer { ring },
    )
}

/// Writing half of a ring.
pub struct Producer<T, const N: usize> {
    ring: Arc<Ring<T, N>>,
}

impl<T, const N: usize> Producer<T, N> {
    /// Appends `value`, or hands it back as `Err` when the ring is full.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        let ring = &*self.ring;
        let head = ring.head.load(Ordering::Relaxed);
        let next = (head + 1) & Ring::<T, N>::MASK;

        if next == ring.tail.load(Ordering::Acquire) {
            return Err(value);
        }

        // SAFETY: `head` is outside `tail..head`, so the consumer is not
        // reading it, and only this producer writes.
        unsafe { (*ring.buffer[head].get()).write(value) };
        ring.head.store(next, Ordering::Release);
        Ok(())
    }

    /// Whether a push would currently fail.
    pub fn is_full(&self) -> bool {
        self.ring.len() == Self::capacity()
    }

    /// Elements currently buffered. Exact for the producer up to concurrent pops.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the ring is currently empty.
    pub fn is_empty(&self) -> bool {
        self.ring.len() == 0
    }

    /// Maximum number of buffered elements, `N - 1`.
    pub const fn capacity() -> usize {
        N - 1
    }
}

/// Reading half of a ring.
pub struct Consumer<T, const N: usize> {
    ring: Arc<Ring<T, N>>,
}

impl<T, const N: usize> Consumer<T, N> {
    /// Removes the oldest element, or returns `None` when the ring is empty.
    pub fn pop(&mut self) -> Option<T> {
        let ring = &*self.ring;
        let tail = ring.tail.load(Ordering::Relaxed);

        if tail == ring.head.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: `tail` lies in `tail..head`, published by the producer's
        // release store and not yet handed back.
        let value = unsafe { (*ring.buffer[tail].get()).assume_init_read() };
        ring.tail
            .store((tail + 1) & Ring::<T, N>::MASK, Ordering::Release);
        Some(value)
    }

    /// Elements currently buffered.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether a pop would currently return `None`.
    pub fn is_empty(&self) -> bool {
        self.ring.len() == 0
    }
}

impl<T, const N: usize> fmt::Debug for Producer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("len", &self.len())
            .field("capacity", &Self::capacity())
            .finish()
    }
}

impl<T, const N: usize> fmt::Debug for Consumer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer").field("len", &self.len()).finish()
    }
}
