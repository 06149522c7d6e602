//! Cache-line alignment for contended atomics.

use std::ops::{Deref, DerefMut};

// Destructive interference size per architecture:
// s390x 256B, aarch64 128B (Apple M-series, Neoverse prefetch pairs),
// everything else 64B.

/// Pads and aligns `T` to a full cache line so that two hot fields written by
/// different threads never share one.
#[cfg(target_arch = "s390x")]
#[repr(align(256))]
#[derive(Copy, Clone, Default, Debug)]
pub struct CacheAligned<T> {
    data: T,
}

/// Pads and aligns `T` to a full cache line so that two hot fields written by
/// different threads never share one.
#[cfg(target_arch = "aarch64")]
#[repr(align(128))]
#[derive(Copy, Clone, Default, Debug)]
pub struct CacheAligned<T> {
    data: T,
}

/// Pads and aligns `T` to a full cache line so that two hot fields written by
/// different threads never share one.
#[cfg(not(any(target_arch = "s390x", target_arch = "aarch64")))]
#[repr(align(64))]
#[derive(Copy, Clone, Default, Debug)]
pub struct CacheAligned<T> {
    data: T,
}

impl<T> CacheAligned<T> {
    /// Wraps `data`.
    pub const fn new(data: T) -> Self {
        Self { data }
    }

    /// Unwraps the value.
    pub fn into_inner(self) -> T {
        self.data
    }
}

impl<T> Deref for CacheAligned<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for CacheAligned<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_fields_do_not_share_a_line() {
        struct Pair {
            a: CacheAligned<AtomicUsize>,
            b: CacheAligned<AtomicUsize>,
        }

        let pair = Pair {
            a: CacheAligned::new(AtomicUsize::new(0)),
            b: CacheAligned::new(AtomicUsize::new(0)),
        };
        let a = &*pair.a as *const AtomicUsize as usize;
        let b = &*pair.b as *const AtomicUsize as usize;
        assert!(a.abs_diff(b) >= 64);
        assert_eq!(std::mem::align_of::<CacheAligned<u8>>() % 64, 0);
    }
}
