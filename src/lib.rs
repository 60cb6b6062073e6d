//! Cross-runtime call substrate.
//!
//! Two runtimes sharing one address space (or one memfd mapping) call each
//! other either synchronously through the [`Gate`] trampolines or
//! asynchronously through a pair of shared-memory rings carrying
//! CALL/REPLY/DROP records (see [`Ring`] and [`Dispatch`]).

// Module naming follows project convention (capitalized subsystem modules)
#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub mod Ring;
#[allow(non_snake_case)]
pub mod Slab;
#[allow(non_snake_case)]
pub mod Gate;
#[allow(non_snake_case)]
pub mod Dispatch;
#[allow(non_snake_case)]
mod Debug {
    pub mod StructDebug;
}

pub mod error;
pub mod ffi;

pub use error::{Error, Result};
pub use Dispatch::{Endpoint, EndpointBuilder, ReplyView, Session, StoredReply};
pub use Ring::{
    Payload, PayloadKind, PushHandle, PushResult, Queue, QueueMeta, ReadQueue, RingBuilder,
    WaiterKind, WriteQueue,
};
pub use Slab::{LockedSlab, MultiSlab};
