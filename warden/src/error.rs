//! Error type shared by the registry and everything built on it.

use thiserror::Error;

/// Failure to obtain reclamation resources.
///
/// Losing a compare-and-swap race is never reported here; callers retry those
/// internally. Only structural limits surface as an `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Every slot of the hazard-pointer registry for this element type is
    /// owned by a live thread.
    ///
    /// The pool does not grow. The caller has too many threads touching the
    /// same element type at once and must reduce that number; retrying from
    /// the same thread will not help until another participant exits.
    #[error("no available hazard pointer (all {capacity} slots in use)")]
    ResourceExhausted {
        /// Capacity of the exhausted registry.
        capacity: usize,
    },

    /// The calling thread has already torn down its hazard-pointer owners,
    /// which happens when a queue is used from another thread-local's
    /// destructor late in thread exit.
    #[error("hazard pointers unavailable: thread is exiting")]
    ThreadExiting,
}
