use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::slab::Slab;
use crate::error::{Error, Result};

/// A [`Slab`] behind one mutex.
#[derive(Debug, Default)]
pub struct LockedSlab<T> {
    inner: Mutex<Slab<T>>,
}

impl<T> LockedSlab<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Slab::new()),
        }
    }

    pub fn push(&self, value: T) -> usize {
        self.inner.lock().push(value)
    }

    pub fn pop(&self, index: usize) -> Option<T> {
        self.inner.lock().pop(index)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Slab sharded across independently locked segments.
///
/// Handles are `(inner << shard_bits) | shard`. Since inner indices start at
/// 1, a handle is never 0.
#[derive(Debug)]
pub struct MultiSlab<T> {
    shards: Box<[LockedSlab<T>]>,
    shard_bits: u32,
    cursor: AtomicUsize,
}

impl<T> MultiSlab<T> {
    /// `shards` must be a non-zero power of two.
    pub fn new(shards: usize) -> Result<Self> {
        if shards == 0 || !shards.is_power_of_two() {
            return Err(Error::InvalidShardCount(shards));
        }
        Ok(Self {
            shards: (0..shards).map(|_| LockedSlab::new()).collect(),
            shard_bits: shards.trailing_zeros(),
            cursor: AtomicUsize::new(0),
        })
    }

    #[inline]
    fn mask(&self) -> usize {
        self.shards.len() - 1
    }

    /// Store `value` in the next shard in round-robin order.
    pub fn push(&self, value: T) -> usize {
        let shard = self.cursor.fetch_add(1, Ordering::Relaxed) & self.mask();
        let inner = self.shards[shard].push(value);
        (inner << self.shard_bits) | shard
    }

    /// Route to the shard encoded in `handle` and remove the value.
    pub fn pop(&self, handle: usize) -> Option<T> {
        let shard = handle & self.mask();
        self.shards[shard].pop(handle >> self.shard_bits)
    }

    /// Shard a handle was issued from.
    #[inline]
    pub fn shard_of(&self, handle: usize) -> usize {
        handle & self.mask()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(LockedSlab::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(LockedSlab::is_empty)
    }

    /// Live entries per shard.
    pub fn shard_lens(&self) -> Vec<usize> {
        self.shards.iter().map(LockedSlab::len).collect()
    }
}
