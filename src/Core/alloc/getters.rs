use super::*;
use crate::Core::SharedMemory::RawHandle;

/// Getter methods for RingPartition
///
/// These expose the raw addresses that end up in a `QueueMeta` handshake
/// record, plus a few sizes for debugging and monitoring.
impl RingPartition {
    /// Get the raw pointer to the RingHeader
    pub fn header_ptr(&self) -> *mut RingHeader {
        self.header
    }

    /// Get the raw pointer to the first record slot
    pub fn buffer_ptr(&self) -> *mut u8 {
        self.buffer
    }

    /// Size of one record slot in bytes
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Size of the whole mapping (header, slots and alignment tail)
    pub fn region_size(&self) -> usize {
        self.shm.size()
    }

    /// The memfd backing this partition
    pub fn raw_handle(&self) -> RawHandle {
        self.shm.raw_handle()
    }
}
