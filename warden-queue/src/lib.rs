//! Lock-free queues for Warden.
//!
//! ## Features
//!
//! - [`Queue`]: unbounded MPMC FIFO. Nodes unlinked by a dequeue are freed
//!   immediately when no hazard pointer covers them, otherwise parked and
//!   swept later.
//! - [`spsc`]: bounded SPSC ring with a power-of-two capacity.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//! use warden_queue::Queue;
//!
//! let q = Arc::new(Queue::new());
//!
//! let producers: Vec<_> = (0..4)
//!     .map(|p| {
//!         let q = q.clone();
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 q.enqueue(p * 100 + i).unwrap();
//!             }
//!         })
//!     })
//!     .collect();
//! for p in producers {
//!     p.join().unwrap();
//! }
//!
//! let mut seen = 0;
//! while let Some(_) = q.dequeue().unwrap() {
//!     seen += 1;
//! }
//! assert_eq!(seen, 400);
//! assert_eq!(q.size(), 0);
//! ```

#![warn(missing_docs)]

mod queue;
pub mod spsc;
mod trace;
pub mod utils;

pub use queue::Queue;
pub use warden::{Error, MAX_SLOTS};
