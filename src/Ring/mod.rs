mod builder;
mod read;
mod waiter;
mod write;

pub use builder::{RingBuilder, WaiterKind};
pub use read::{Guard, ReadQueue};
pub use waiter::{SleepWaiter, SpinWaiter, TinyWaiter, YieldWaiter};
pub use write::{PushHandle, PushResult, WriteQueue};

pub mod Buffer {
    pub mod Buffer;
    pub mod Buffer_impl;
    pub mod layout;
    pub use Buffer::{Queue, QueueMeta}; // re-export for stable path
    pub(crate) use Buffer::QueueStorage;
}

pub mod Structs {
    pub mod Ring_Structs;
    pub use Ring_Structs::{Payload, PayloadKind}; // re-export for stable path
}

pub use Buffer::{Queue, QueueMeta};
pub use Structs::{Payload, PayloadKind};
