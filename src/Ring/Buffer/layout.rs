use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU32, AtomicU64};

/// Control block placed at the start of every ring region.
///
/// The record buffer follows at [`RingHeader::buffer_offset`]. Head and tail
/// sit on their own cache lines since they are written by different sides.
#[repr(C, align(128))]
pub struct RingHeader {
    /// Read cursor. Only the single consumer advances it.
    pub head: CachePadded<AtomicU64>,

    /// Write cursor. Only advanced under the producer-side lock.
    pub tail: CachePadded<AtomicU64>,

    /// 1 while the consumer is draining (or is about to be woken).
    pub working: AtomicU32,

    /// 1 while the producer holds records that did not fit.
    pub stuck: AtomicU32,
}

impl RingHeader {
    pub const fn new() -> Self {
        Self {
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            working: AtomicU32::new(0),
            stuck: AtomicU32::new(0),
        }
    }

    /// Byte offset of the record buffer from the start of the region.
    #[inline]
    pub const fn buffer_offset() -> usize {
        crate::Core::SharedMemory::align_region(std::mem::size_of::<Self>())
    }

    /// Total region size for `capacity` records of `record_size` bytes.
    #[inline]
    pub const fn region_size(capacity: usize, record_size: usize) -> usize {
        Self::buffer_offset() + capacity * record_size
    }
}

impl Default for RingHeader {
    fn default() -> Self {
        Self::new()
    }
}
