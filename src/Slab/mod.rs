mod multi;
mod slab;

pub use multi::{LockedSlab, MultiSlab};
pub use slab::Slab;
