use crate::Core::alloc::RingPartition;
use crate::Ring::Queue;
use std::fmt;

/// Debug function for RingPartition
///
/// Shows:
/// - Header and first slot addresses
/// - Capacity and record size
/// - Backing memfd
pub fn debug_ring_partition(partition: &RingPartition, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RingPartition")
        .field("header", &format_args!("{:p}", partition.header_ptr()))
        .field("buffer", &format_args!("{:p}", partition.buffer_ptr()))
        .field("capacity", &partition.capacity())
        .field("record_size", &partition.record_size())
        .field("handle", &partition.raw_handle())
        .finish()
}

/// Debug function for Queue
///
/// Reads the shared counters and flags once; the values may be stale by the
/// time they are printed.
pub fn debug_queue<T>(queue: &Queue<T>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Queue")
        .field("buffer", &format_args!("0x{:x}", queue.buffer_ptr as usize))
        .field("capacity", &queue.capacity())
        .field("len", &queue.len())
        .field("working", &queue.working())
        .field("stuck", &queue.stuck())
        .field("owner", &queue.is_memory_owner())
        .finish_non_exhaustive()
}
