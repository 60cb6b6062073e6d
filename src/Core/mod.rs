pub mod SharedMemory;
pub mod alloc;
pub mod eventfd;

pub use alloc::{RingAllocator, RingPartition};
pub use eventfd::{BlockingAwaiter, EventFd, Notifier, PollAwaiter};
pub use SharedMemory::{
    attach_shared_memory, create_shared_memory, RawHandle, SharedMemoryBackend,
};
