// The shared-memory ring of fixed-size records exchanged between the two runtimes

use crate::Core::alloc::RingPartition;
use crate::Core::eventfd::EventFd;

use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicU32, AtomicU64};
use std::sync::Arc;

/// Handshake record describing one ring.
///
/// Negotiated once per session and immutable afterwards. Every field is a
/// plain address or descriptor so the struct can cross a C ABI by value.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueMeta {
    pub buffer_ptr: usize,
    /// Capacity in records, not bytes.
    pub buffer_len: usize,
    pub head_ptr: usize,
    pub tail_ptr: usize,
    pub working_ptr: usize,
    pub stuck_ptr: usize,
    pub working_fd: i32,
    pub unstuck_fd: i32,
}

/// Memory and descriptors owned by the side that created the ring.
pub(crate) struct QueueStorage {
    pub(crate) partition: RingPartition,
    pub(crate) working: EventFd,
    pub(crate) unstuck: EventFd,
}

/// A view over one ring.
///
/// ### Concurrency Design:
/// - **Producers** only advance `tail`, and only while holding the write-side
///   lock (see `WriteQueue`), so a plain load/store pair is enough.
/// - **The consumer** is a single dedicated loop and is the only writer of
///   `head`.
/// - Both counters grow monotonically; the slot is `counter % capacity`.
pub struct Queue<T> {
    pub(crate) buffer_ptr: *mut MaybeUninit<T>,
    pub(crate) buffer_len: usize,

    pub(crate) head_ptr: *const AtomicU64,
    pub(crate) tail_ptr: *const AtomicU64,
    pub(crate) working_ptr: *const AtomicU32,
    pub(crate) stuck_ptr: *const AtomicU32,

    pub(crate) working_fd: RawFd,
    pub(crate) unstuck_fd: RawFd,

    /// `Some` when this process created the ring. Shared views keep it alive.
    pub(crate) storage: Option<Arc<QueueStorage>>,
    pub(crate) _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

// Debug proxy implementation that calls the standalone debug function
impl<T> std::fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_queue(self, f)
    }
}
