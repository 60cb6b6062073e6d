// End-to-end ring tests: one owner side (memory + writer) and one peer side
// attached through the QueueMeta handshake record.
// Run with: cargo test --test ring -- --nocapture

#![cfg(target_os = "linux")]

use memcall::{Payload, PayloadKind, PushResult, Queue, RingBuilder, WaiterKind};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn full_ring_overflows_then_drains() {
    init_tracing();
    let owner = Queue::<Payload>::new(4).unwrap();
    let peer = unsafe { Queue::<Payload>::from_meta(&owner.meta()) }.unwrap();
    assert!(owner.is_memory_owner());
    assert!(!peer.is_memory_owner());

    let mut reader = peer.read();
    let writer = owner.write().unwrap();

    let records: Vec<Payload> = (1..=5).map(|i| Payload::new_call(1, i, 0)).collect();
    for r in &records[..4] {
        assert!(writer.push(*r), "A..D fit in the ring");
    }
    assert!(!writer.push(records[4]), "E goes to overflow");
    assert!(writer.is_stuck());
    assert_eq!(writer.pending_len(), 1);
    assert_eq!(reader.len(), 4);

    assert_eq!(reader.pop(), Some(records[0]));
    assert!(
        wait_until(|| writer.pending_len() == 0 && !writer.is_stuck()),
        "drain thread should move E into the freed slot"
    );
    assert_eq!(reader.len(), 4);

    for r in &records[1..] {
        assert_eq!(reader.pop(), Some(*r));
    }
    assert!(reader.is_empty());
    assert_eq!(reader.pop(), None);

    drop(reader);
    drop(writer);
}

#[test]
fn concurrent_producers_single_consumer() {
    init_tracing();
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 500;

    let owner = RingBuilder::new()
        .with_capacity(8)
        .build_queue::<Payload>()
        .unwrap();
    let peer = unsafe { Queue::<Payload>::from_meta(&owner.meta()) }.unwrap();
    let writer = owner.write().unwrap();

    let seen = Arc::new(Mutex::new(Vec::with_capacity(PRODUCERS * PER_PRODUCER)));
    let sink = seen.clone();
    let guard = peer
        .read()
        .run_handler(move |p: Payload| sink.lock().push(p))
        .unwrap();

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|pid| {
            let writer = writer.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    writer.push(Payload::new_call(pid as u32, seq, 0));
                    if fastrand::u8(..) < 8 {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert!(wait_until(|| seen.lock().len() == PRODUCERS * PER_PRODUCER));
    assert!(guard.is_running());

    let seen = seen.lock();
    let unique: HashSet<(u32, usize)> = seen.iter().map(|p| (p.call_id, p.user_data)).collect();
    assert_eq!(unique.len(), PRODUCERS * PER_PRODUCER, "no duplicates, no loss");

    // each producer's records arrive in push order
    for pid in 0..PRODUCERS as u32 {
        let order: Vec<usize> = seen
            .iter()
            .filter(|p| p.call_id == pid)
            .map(|p| p.user_data)
            .collect();
        assert_eq!(order, (0..PER_PRODUCER).collect::<Vec<_>>());
    }
    assert!(seen.iter().all(|p| p.kind() == Some(PayloadKind::Call)));

    drop(guard);
    drop(writer);
}

#[test]
fn overflow_keeps_fifo_under_slow_consumer() {
    init_tracing();
    let owner = Queue::<u64>::new(2).unwrap();
    let peer = unsafe { Queue::<u64>::from_meta(&owner.meta()) }.unwrap();
    let writer = owner.write().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let waiter = WaiterKind::Sleep {
        interval: Duration::from_micros(200),
        max: Duration::from_millis(2),
    };
    let guard = peer
        .read()
        .run_handler_with_waiter(
            move |v: u64| {
                thread::sleep(Duration::from_micros(50));
                sink.lock().push(v);
            },
            waiter.build(),
        )
        .unwrap();

    let mut direct = 0;
    for v in 0..200u64 {
        if writer.push(v) {
            direct += 1;
        }
    }
    println!("direct pushes: {direct}/200");

    assert!(wait_until(|| seen.lock().len() == 200));
    assert_eq!(*seen.lock(), (0..200).collect::<Vec<_>>());
    assert!(wait_until(|| !writer.is_stuck() && writer.pending_len() == 0));

    drop(guard);
    drop(writer);
}

#[test]
fn idle_consumer_is_woken_by_push() {
    init_tracing();
    let owner = Queue::<u64>::new(16).unwrap();
    let peer = unsafe { Queue::<u64>::from_meta(&owner.meta()) }.unwrap();
    let writer = owner.write().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let guard = peer
        .read()
        .run_handler_with_waiter(
            move |v: u64| sink.lock().push(v),
            WaiterKind::Spin { rounds: 16 }.build(),
        )
        .unwrap();

    // give the consumer time to park on the working descriptor
    thread::sleep(Duration::from_millis(50));
    assert!(writer.push(7));
    assert!(wait_until(|| seen.lock().as_slice() == [7]));

    thread::sleep(Duration::from_millis(50));
    assert!(writer.push_without_notify(8));
    writer.notify_manually();
    assert!(wait_until(|| seen.lock().as_slice() == [7, 8]));

    drop(guard);
    drop(writer);
}

#[test]
fn parked_producer_waits_until_its_record_lands() {
    init_tracing();
    let owner = Queue::<u64>::new(1).unwrap();
    let peer = unsafe { Queue::<u64>::from_meta(&owner.meta()) }.unwrap();
    let writer = owner.write().unwrap();

    assert!(matches!(writer.push_with_awaiter(1), PushResult::Ok));
    let handle = match writer.push_with_awaiter(2) {
        PushResult::Pending(handle) => handle,
        PushResult::Ok => panic!("a ring of one should be full"),
    };
    assert!(!handle.is_done());
    assert_eq!(writer.pending_len(), 1);

    let consumer = thread::spawn(move || {
        let mut reader = peer.read();
        thread::sleep(Duration::from_millis(20));
        let mut seen = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        while seen.len() < 2 && Instant::now() < deadline {
            match reader.pop() {
                Some(v) => seen.push(v),
                None => thread::yield_now(),
            }
        }
        seen
    });

    handle.wait().unwrap();
    assert_eq!(writer.pending_len(), 0);
    assert_eq!(consumer.join().unwrap(), vec![1, 2]);
    drop(writer);
}
