//! Warden: hazard-pointer reclamation for lock-free data structures.
//!
//! Warden tracks which addresses each thread is about to dereference, so that
//! a structure removing a node can tell whether it is safe to free it now or
//! whether it has to be parked until the readers move on.
//!
//! # Pieces
//!
//! - [`Registry`]: a fixed table of [`MAX_SLOTS`] hazard-pointer slots per
//!   element type, with the [`Registry::is_protected`] predicate that gates
//!   every free.
//! - [`HazardPointer`]: the calling thread's slot for one registry. Claimed on
//!   first use and held until the thread exits.
//! - [`RetiredList`]: a lock-free list of unlinked nodes, swept against a
//!   registry.
//!
//! The pool is a hard ceiling. Once [`MAX_SLOTS`] live threads have touched a
//! given element type, the next new thread gets
//! [`Error::ResourceExhausted`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicPtr, Ordering};
//! use warden::{RetiredList, hazard_pointer, registry};
//!
//! struct Node(u64);
//!
//! let shared = AtomicPtr::new(Box::into_raw(Box::new(Node(7))));
//! let retired = RetiredList::new();
//!
//! // Protect before dereferencing.
//! let hazard = hazard_pointer::<Node>().unwrap();
//! let node = hazard.protect(&shared);
//! assert_eq!(unsafe { (*node).0 }, 7);
//!
//! // Unlink and retire; the sweep keeps it while we still hold it.
//! let old = shared.swap(std::ptr::null_mut(), Ordering::AcqRel);
//! unsafe { retired.retire(old) };
//! assert_eq!(retired.sweep(registry::<Node>()), 0);
//!
//! hazard.clear();
//! assert_eq!(retired.sweep(registry::<Node>()), 1);
//! ```

#![warn(missing_docs)]

extern crate alloc;

mod error;
mod owner;
mod registry;
mod retired;
mod trace;

pub use error::Error;
pub use owner::{HazardOwner, HazardPointer, hazard_pointer};
pub use registry::{MAX_SLOTS, Registry, registry, thread_identity};
pub use retired::RetiredList;
pub use trace::init_tracing;
