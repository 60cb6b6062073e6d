use crate::Core::SharedMemory::SharedMemoryBackend;
use crate::Ring::Buffer::layout::RingHeader;
use std::io;
use std::mem::{align_of, size_of};
mod debug;
mod getters;

/// One ring's backing memory: a [`RingHeader`] followed by `capacity`
/// fixed-size record slots, all inside a single shared mapping.
pub struct RingPartition {
    shm: Box<dyn SharedMemoryBackend>,
    header: *mut RingHeader,
    buffer: *mut u8,
    capacity: usize,
    record_size: usize,
}

/// Carves shared memory regions into ring partitions.
#[derive(Debug, Clone, Default)]
pub struct RingAllocator {
    name: Option<String>,
}

impl RingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name given to every memfd this allocator creates.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Allocate and initialize a ring region for `capacity` records of `T`.
    pub fn allocate<T: Copy>(&self, capacity: usize) -> io::Result<RingPartition> {
        if capacity == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "ring capacity must be at least 1",
            ));
        }
        if align_of::<T>() > 128 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("record alignment {} exceeds 128", align_of::<T>()),
            ));
        }

        let record_size = size_of::<T>();
        let region_size = capacity
            .checked_mul(record_size)
            .and_then(|bytes| bytes.checked_add(RingHeader::buffer_offset()))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("ring of {capacity} records of {record_size} bytes overflows"),
                )
            })?;

        let shm = crate::Core::SharedMemory::create_shared_memory(region_size, self.name.as_deref())
            .map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create ring memory:\n\
                    ├─ Capacity:    {capacity}\n\
                    ├─ Record size: {record_size}\n\
                    ╰─ Error: {e}"
                    ),
                )
            })?;

        let header = shm.as_ptr() as *mut RingHeader;
        if (header as usize) % 128 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Shared memory not properly aligned",
            ));
        }

        // Initialize the control block; the record slots need no init since
        // they are only read after a producer has written them.
        unsafe {
            std::ptr::write(header, RingHeader::new());
        }
        let buffer = unsafe { shm.as_ptr().add(RingHeader::buffer_offset()) };

        tracing::debug!(capacity, record_size, region_size, "allocated ring partition");
        Ok(RingPartition {
            shm,
            header,
            buffer,
            capacity,
            record_size,
        })
    }
}

impl RingPartition {
    /// Reference to the control block.
    #[inline]
    pub fn header(&self) -> &RingHeader {
        // Safety: header points into our own live mapping
        unsafe { &*self.header }
    }

    /// Number of record slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// The mapping is only reached through atomics and the queue protocol.
unsafe impl Send for RingPartition {}
unsafe impl Sync for RingPartition {}
