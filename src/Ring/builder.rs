use std::time::Duration;

use super::waiter::{SleepWaiter, SpinWaiter, TinyWaiter, YieldWaiter};
use super::Buffer::Queue;
use crate::error::{Error, Result};
use crate::Core::alloc::RingAllocator;

/// Idle policy selected for a ring consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterKind {
    Yield,
    Sleep { interval: Duration, max: Duration },
    Spin { rounds: u32 },
}

impl Default for WaiterKind {
    fn default() -> Self {
        WaiterKind::Yield
    }
}

impl WaiterKind {
    pub fn build(&self) -> Box<dyn TinyWaiter> {
        match *self {
            WaiterKind::Yield => Box::new(YieldWaiter),
            WaiterKind::Sleep { interval, max } => Box::new(SleepWaiter::new(interval, max)),
            WaiterKind::Spin { rounds } => Box::new(SpinWaiter::new(rounds)),
        }
    }
}

/// Session configuration: ring sizing, dispatch pool and idle policy.
#[derive(Debug, Clone)]
pub struct RingBuilder {
    capacity: usize,
    workers: usize,
    queue_depth: usize,
    slab_shards: usize,
    waiter: WaiterKind,
    name: Option<String>,
}

impl Default for RingBuilder {
    fn default() -> Self {
        Self {
            capacity: 1024, // records per ring
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            queue_depth: 4096,
            slab_shards: 8,
            waiter: WaiterKind::default(),
            name: None,
        }
    }
}

impl RingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `MEMCALL_RING_CAPACITY`, `MEMCALL_WORKERS` and
    /// `MEMCALL_SLAB_SHARDS`. Unparsable or zero values are ignored.
    pub fn from_env() -> Self {
        let mut builder = Self::default();
        if let Some(v) = env_usize("MEMCALL_RING_CAPACITY") {
            builder.capacity = v;
        }
        if let Some(v) = env_usize("MEMCALL_WORKERS") {
            builder.workers = v;
        }
        if let Some(v) = env_usize("MEMCALL_SLAB_SHARDS") {
            builder.slab_shards = v;
        }
        builder
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    pub fn with_slab_shards(mut self, shards: usize) -> Self {
        self.slab_shards = shards;
        self
    }

    pub fn with_waiter(mut self, waiter: WaiterKind) -> Self {
        self.waiter = waiter;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    pub fn slab_shards(&self) -> usize {
        self.slab_shards
    }

    pub fn waiter(&self) -> WaiterKind {
        self.waiter
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidCapacity(self.capacity));
        }
        if self.slab_shards == 0 || !self.slab_shards.is_power_of_two() {
            return Err(Error::InvalidShardCount(self.slab_shards));
        }
        Ok(())
    }

    /// Create one owned ring with the configured capacity.
    pub fn build_queue<T: Copy>(&self) -> Result<Queue<T>> {
        self.validate()?;
        let allocator = match &self.name {
            Some(name) => RingAllocator::new().with_name(name.clone()),
            None => RingAllocator::new(),
        };
        Ok(Queue::with_allocator(&allocator, self.capacity)?)
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_bad_sizes() {
        assert!(matches!(
            RingBuilder::new().with_capacity(0).validate(),
            Err(Error::InvalidCapacity(0))
        ));
        assert!(matches!(
            RingBuilder::new().with_slab_shards(6).validate(),
            Err(Error::InvalidShardCount(6))
        ));
        assert!(RingBuilder::new().with_slab_shards(4).validate().is_ok());
    }

    #[test]
    fn workers_never_drop_to_zero() {
        assert_eq!(RingBuilder::new().with_workers(0).workers(), 1);
    }
}
