//! Writers count down a shared counter and readers mark every value they see.
//!
//! Each test uses its own element type so that concurrently running tests do
//! not compete for the same hazard-pointer pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::thread;
use warden_queue::Queue;

const TOTAL: usize = 100;

fn writer<T>(q: &Queue<T>, left: &AtomicIsize, wrap: fn(usize) -> T)
where
    T: Send + 'static,
{
    loop {
        let value = left.fetch_sub(1, Ordering::AcqRel);
        if value <= 0 {
            break;
        }
        q.enqueue(wrap(value as usize - 1)).unwrap();
    }
}

fn reader<T>(q: &Queue<T>, done: &AtomicBool, unwrap: fn(T) -> usize) -> Vec<usize>
where
    T: Send + 'static,
{
    let mut seen = Vec::new();
    loop {
        match q.dequeue().unwrap() {
            Some(value) => seen.push(unwrap(value)),
            None if done.load(Ordering::Acquire) && q.size() == 0 => break,
            None => thread::yield_now(),
        }
    }
    seen
}

fn run<T>(writers: usize, readers: usize, wrap: fn(usize) -> T, unwrap: fn(T) -> usize)
where
    T: Send + 'static,
{
    let q = Arc::new(Queue::new());
    let left = Arc::new(AtomicIsize::new(TOTAL as isize));
    let done = Arc::new(AtomicBool::new(false));

    let reading: Vec<_> = (0..readers)
        .map(|_| {
            let (q, done) = (q.clone(), done.clone());
            thread::spawn(move || reader(&q, &done, unwrap))
        })
        .collect();

    let writing: Vec<_> = (0..writers)
        .map(|_| {
            let (q, left) = (q.clone(), left.clone());
            thread::spawn(move || writer(&q, &left, wrap))
        })
        .collect();

    for w in writing {
        w.join().unwrap();
    }
    done.store(true, Ordering::Release);

    let mut result = vec![false; TOTAL];
    for r in reading {
        for value in r.join().unwrap() {
            assert!(!result[value], "value {value} dequeued twice");
            result[value] = true;
        }
    }

    assert_eq!(q.size(), 0);
    assert!(result.iter().all(|&seen| seen), "some values were lost");
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_writers() {
    run::<u32>(10, 1, |v| v as u32, |v| v as usize);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_readers() {
    run::<u64>(1, 10, |v| v as u64, |v| v as usize);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_writers_readers() {
    run::<usize>(10, 10, |v| v, |v| v);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_boxed_values() {
    run::<Box<usize>>(4, 4, Box::new, |v| *v);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_per_producer_order_preserved() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 2_000;

    let q: Arc<Queue<(usize, usize)>> = Arc::new(Queue::new());

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    q.enqueue((p, i)).unwrap();
                }
            })
        })
        .collect();

    // A single consumer observes each producer's sequence in order.
    let mut next = [0usize; PRODUCERS];
    let mut received = 0;
    while received < PRODUCERS * PER_PRODUCER {
        if let Some((p, i)) = q.dequeue().unwrap() {
            assert_eq!(i, next[p], "producer {p} out of order");
            next[p] += 1;
            received += 1;
        } else {
            thread::yield_now();
        }
    }

    for p in producers {
        p.join().unwrap();
    }
    assert_eq!(q.dequeue().unwrap(), None);
}
