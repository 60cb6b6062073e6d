mod endpoint;
pub mod marshal;
mod pool;
mod session;

pub use endpoint::{Endpoint, EndpointBuilder, ReplyView, StoredReply};
pub use pool::WorkerPool;
pub use session::Session;
