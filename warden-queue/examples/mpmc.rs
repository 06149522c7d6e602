//! Four producers and four consumers sharing one queue.
//!
//! Run with `cargo run --example mpmc --features tracing` and set
//! `RUST_LOG=warden=debug,warden_queue=debug` to watch threads join the
//! hazard-pointer registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use warden_queue::Queue;

const PRODUCERS: usize = 4;
const CONSUMERS: usize = 4;
const ITEMS_PER_PRODUCER: usize = 10_000;

fn main() {
    warden::init_tracing();

    let q = Arc::new(Queue::new());
    let total = PRODUCERS * ITEMS_PER_PRODUCER;
    let dequeued = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..ITEMS_PER_PRODUCER {
                    q.enqueue(p * ITEMS_PER_PRODUCER + i)
                        .expect("hazard pointer available");
                }
                println!("producer {p}: {ITEMS_PER_PRODUCER} enqueued");
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let (q, dequeued) = (q.clone(), dequeued.clone());
            thread::spawn(move || {
                let mut mine = 0usize;
                while dequeued.load(Ordering::Relaxed) < total {
                    if q.dequeue().expect("hazard pointer available").is_some() {
                        dequeued.fetch_add(1, Ordering::Relaxed);
                        mine += 1;
                    }
                }
                mine
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    let per_consumer: Vec<usize> = consumers.into_iter().map(|c| c.join().unwrap()).collect();

    println!("per consumer: {per_consumer:?}");
    println!("total dequeued: {}", dequeued.load(Ordering::Relaxed));
    println!("left in queue: {}", q.size());
}
