//! Tests for the ingest queue.

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::bounded;
use rstest::rstest;

use super::*;

fn drain(queue: &IngestQueue) -> Vec<String> {
    std::iter::from_fn(|| queue.try_pop()).collect()
}

#[rstest]
fn preserves_insertion_order() {
    let queue = IngestQueue::new(8);
    for i in 0..5 {
        queue.enqueue(&format!("record-{i}")).expect("queue has room");
    }
    assert_eq!(
        drain(&queue),
        ["record-0", "record-1", "record-2", "record-3", "record-4"]
    );
}

#[rstest]
fn saturated_queue_drops_exactly_the_oldest_record() {
    let capacity = 4;
    let queue = IngestQueue::new(capacity);
    for i in 0..=capacity {
        queue.enqueue(&i.to_string()).expect("drop-oldest makes room");
    }
    assert_eq!(queue.len(), capacity);
    assert_eq!(queue.dropped(), 1);
    assert_eq!(drain(&queue), ["1", "2", "3", "4"]);
}

#[rstest]
fn queue_without_free_slots_reports_overflow() {
    // A rendezvous queue has no slot to free, so it stays saturated.
    let queue = IngestQueue::new(0);
    assert_eq!(queue.enqueue("lost"), Err(OverflowError));
}

#[rstest]
fn oversized_records_are_enqueued_as_ordered_chunks() {
    let queue = IngestQueue::new(8);
    let record = "a".repeat(MAX_RECORD_LEN) + &"b".repeat(MAX_RECORD_LEN) + "c";
    queue.enqueue(&record).expect("chunks fit");
    let chunks = drain(&queue);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks.concat(), record);
}

#[rstest]
fn concurrent_producers_never_exceed_capacity() {
    let queue = Arc::new(IngestQueue::new(16));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..500 {
                    // Overflow is tolerated under contention; capacity is not.
                    let _ = queue.enqueue(&format!("{t}-{i}"));
                    assert!(queue.len() <= queue.capacity());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("producer thread");
    }
    assert!(queue.len() <= 16);
}

#[rstest]
fn poll_returns_idle_after_timeout() {
    let queue = IngestQueue::new(4);
    let (_stop_tx, stop_rx) = bounded::<()>(1);
    let started = Instant::now();
    assert_eq!(queue.poll(&stop_rx, Duration::from_millis(30)), Poll::Idle);
    assert!(started.elapsed() >= Duration::from_millis(25));
}

#[rstest]
fn poll_returns_queued_record() {
    let queue = IngestQueue::new(4);
    let (_stop_tx, stop_rx) = bounded::<()>(1);
    queue.enqueue("ready").expect("room");
    assert_eq!(
        queue.poll(&stop_rx, Duration::from_secs(1)),
        Poll::Record("ready".into())
    );
}

#[rstest]
fn stop_signal_unblocks_poll() {
    let queue = Arc::new(IngestQueue::new(4));
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let waiter = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.poll(&stop_rx, Duration::from_secs(30)))
    };
    thread::sleep(Duration::from_millis(20));
    drop(stop_tx);
    let outcome = waiter.join().expect("poll thread");
    assert_eq!(outcome, Poll::Stopped);
}

#[rstest]
fn drain_wait_wakes_when_consumer_empties_queue() {
    let queue = Arc::new(IngestQueue::new(4));
    queue.enqueue("pending").expect("room");
    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            let (_stop_tx, stop_rx) = bounded::<()>(1);
            queue.poll(&stop_rx, Duration::from_millis(10))
        })
    };
    assert!(queue.wait_until_drained(Some(Duration::from_secs(2)), || false));
    consumer.join().expect("consumer thread");
}

#[rstest]
fn drain_wait_honours_timeout() {
    let queue = IngestQueue::new(4);
    queue.enqueue("stuck").expect("room");
    let started = Instant::now();
    assert!(!queue.wait_until_drained(Some(Duration::from_millis(50)), || false));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[rstest]
fn drain_wait_gives_up_without_consumer() {
    let queue = IngestQueue::new(4);
    queue.enqueue("orphaned").expect("room");
    assert!(!queue.wait_until_drained(None, || true));
}
