// Allocation tracking tests for the ring and slab hot paths
//
// Note: Tests using dhat are marked with #[serial_test::serial] because
// dhat only allows one profiler to run at a time. They will run sequentially.
//
// # Run all allocation tracking tests
// cargo test --test allocation_tracking -- --nocapture

#![cfg(target_os = "linux")]

use memcall::Slab::MultiSlab;
use memcall::{Payload, Queue};

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

#[test]
#[serial_test::serial]
fn ring_push_pop_does_not_allocate() {
    let owner = Queue::<Payload>::new(64).unwrap();
    let peer = unsafe { Queue::<Payload>::from_meta(&owner.meta()) }.unwrap();
    let mut reader = peer.read();
    let writer = owner.write().unwrap();

    let _profiler = dhat::Profiler::builder().testing().build();
    let before = dhat::HeapStats::get();

    for i in 0..1000 {
        assert!(writer.push(Payload::new_call(1, i, 0)));
        let got = reader.pop();
        dhat::assert_eq!(got.map(|p| p.user_data), Some(i));
    }

    let after = dhat::HeapStats::get();
    println!("blocks before: {}, after: {}", before.total_blocks, after.total_blocks);
    dhat::assert_eq!(after.total_blocks, before.total_blocks);
}

#[test]
#[serial_test::serial]
fn warm_slab_reuses_slots_without_allocating() {
    let slab = MultiSlab::new(4).unwrap();
    // grow every shard once
    let warm: Vec<usize> = (0..64u64).map(|v| slab.push(v)).collect();
    for h in warm {
        slab.pop(h);
    }

    let _profiler = dhat::Profiler::builder().testing().build();
    let before = dhat::HeapStats::get();

    for round in 0..100u64 {
        let a = slab.push(round);
        let b = slab.push(round + 1);
        dhat::assert_eq!(slab.pop(a), Some(round));
        dhat::assert_eq!(slab.pop(b), Some(round + 1));
    }

    let after = dhat::HeapStats::get();
    dhat::assert_eq!(after.total_blocks, before.total_blocks);
}
