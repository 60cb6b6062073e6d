use std::marker::PhantomData;
use std::mem::{size_of, MaybeUninit};
use std::os::fd::AsRawFd;
use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::{io, ptr};

use super::layout::RingHeader;
use super::Buffer::{Queue, QueueMeta, QueueStorage};
use crate::Core::alloc::RingAllocator;
use crate::Core::eventfd::EventFd;

impl<T: Copy> Queue<T> {
    /// Create a ring with room for `capacity` records. This side owns the
    /// memory and both event descriptors.
    pub fn new(capacity: usize) -> io::Result<Self> {
        Self::with_allocator(&RingAllocator::new(), capacity)
    }

    pub fn with_allocator(allocator: &RingAllocator, capacity: usize) -> io::Result<Self> {
        let partition = allocator.allocate::<T>(capacity)?;
        let working = EventFd::new()?;
        let unstuck = EventFd::new()?;

        let header = partition.header();
        let queue = Self {
            buffer_ptr: partition.buffer_ptr() as *mut MaybeUninit<T>,
            buffer_len: capacity,
            head_ptr: &*header.head as *const AtomicU64,
            tail_ptr: &*header.tail as *const AtomicU64,
            working_ptr: &header.working as *const AtomicU32,
            stuck_ptr: &header.stuck as *const AtomicU32,
            working_fd: working.as_raw_fd(),
            unstuck_fd: unstuck.as_raw_fd(),
            storage: None,
            _marker: PhantomData,
        };
        tracing::debug!(
            capacity,
            record_size = size_of::<T>(),
            working_fd = queue.working_fd,
            unstuck_fd = queue.unstuck_fd,
            "created ring"
        );
        Ok(Self {
            storage: Some(Arc::new(QueueStorage {
                partition,
                working,
                unstuck,
            })),
            ..queue
        })
    }

    /// Attach to a ring created by the peer.
    ///
    /// # Safety
    /// Every address in `meta` must point to live, correctly aligned ring
    /// memory of this record type, and the descriptors must stay open, for
    /// as long as the returned queue (or anything built from it) is used.
    pub unsafe fn from_meta(meta: &QueueMeta) -> io::Result<Self> {
        if meta.buffer_len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "ring capacity must be at least 1",
            ));
        }
        let addrs = [
            meta.buffer_ptr,
            meta.head_ptr,
            meta.tail_ptr,
            meta.working_ptr,
            meta.stuck_ptr,
        ];
        if addrs.contains(&0) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "queue meta carries a null address",
            ));
        }
        tracing::debug!(capacity = meta.buffer_len, "attached ring from meta");
        Ok(Self {
            buffer_ptr: meta.buffer_ptr as *mut MaybeUninit<T>,
            buffer_len: meta.buffer_len,
            head_ptr: meta.head_ptr as *const AtomicU64,
            tail_ptr: meta.tail_ptr as *const AtomicU64,
            working_ptr: meta.working_ptr as *const AtomicU32,
            stuck_ptr: meta.stuck_ptr as *const AtomicU32,
            working_fd: meta.working_fd,
            unstuck_fd: meta.unstuck_fd,
            storage: None,
            _marker: PhantomData,
        })
    }
}

impl<T> Queue<T> {
    /// A second view of the same ring that keeps the owner's memory alive.
    /// Used to hand the opposite end to an in-process peer.
    pub(crate) fn share(&self) -> Self {
        Self {
            buffer_ptr: self.buffer_ptr,
            buffer_len: self.buffer_len,
            head_ptr: self.head_ptr,
            tail_ptr: self.tail_ptr,
            working_ptr: self.working_ptr,
            stuck_ptr: self.stuck_ptr,
            working_fd: self.working_fd,
            unstuck_fd: self.unstuck_fd,
            storage: self.storage.clone(),
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn is_memory_owner(&self) -> bool {
        self.storage.is_some()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer_len
    }

    #[inline]
    pub fn meta(&self) -> QueueMeta {
        QueueMeta {
            buffer_ptr: self.buffer_ptr as usize,
            buffer_len: self.buffer_len,
            head_ptr: self.head_ptr as usize,
            tail_ptr: self.tail_ptr as usize,
            working_ptr: self.working_ptr as usize,
            stuck_ptr: self.stuck_ptr as usize,
            working_fd: self.working_fd,
            unstuck_fd: self.unstuck_fd,
        }
    }

    /// Region size a peer must map to hold this ring.
    pub fn region_size(&self) -> usize {
        RingHeader::region_size(self.buffer_len, size_of::<T>())
    }

    #[inline]
    fn head(&self) -> &AtomicU64 {
        unsafe { &*self.head_ptr }
    }

    #[inline]
    fn tail(&self) -> &AtomicU64 {
        unsafe { &*self.tail_ptr }
    }

    pub fn len(&self) -> usize {
        let tail = self.tail().load(Ordering::Acquire);
        let head = self.head().load(Ordering::Acquire);
        tail.wrapping_sub(head) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.tail().load(Ordering::Acquire) == self.head().load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        let tail = self.tail().load(Ordering::Acquire);
        let head = self.head().load(Ordering::Acquire);
        tail.wrapping_sub(head) == self.buffer_len as u64
    }

    /// Insert at `tail`. Hands the item back when the ring is full.
    /// Callers must serialize pushes (the write-side lock does).
    pub(crate) fn push(&mut self, item: T) -> Result<(), T> {
        let tail = self.tail().load(Ordering::Relaxed);
        if tail.wrapping_sub(self.head().load(Ordering::Acquire)) == self.buffer_len as u64 {
            return Err(item);
        }

        unsafe {
            let slot = self.buffer_ptr.add((tail % self.buffer_len as u64) as usize);
            ptr::write(slot, MaybeUninit::new(item));
        }
        self.tail().store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Take the record at `head`. Single consumer only.
    pub(crate) fn pop(&mut self) -> Option<T> {
        let head = self.head().load(Ordering::Relaxed);
        if head == self.tail().load(Ordering::Acquire) {
            return None;
        }

        let item = unsafe {
            let slot = self.buffer_ptr.add((head % self.buffer_len as u64) as usize);
            ptr::read(slot).assume_init()
        };
        self.head().store(head.wrapping_add(1), Ordering::Release);
        Some(item)
    }

    /// Clear `working`, then re-check for records that raced in. Returns
    /// true if the ring is really idle; otherwise `working` is set again.
    #[inline]
    pub(crate) fn mark_unworking(&self) -> bool {
        unsafe { &*self.working_ptr }.store(0, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        if self.is_empty() {
            return true;
        }
        self.mark_working();
        false
    }

    #[inline]
    pub(crate) fn mark_working(&self) {
        unsafe { &*self.working_ptr }.store(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn working(&self) -> bool {
        fence(Ordering::SeqCst);
        unsafe { &*self.working_ptr }.load(Ordering::SeqCst) == 1
    }

    #[inline]
    pub(crate) fn mark_unstuck(&self) -> bool {
        unsafe { &*self.stuck_ptr }.swap(0, Ordering::SeqCst) == 1
    }

    #[inline]
    pub(crate) fn mark_stuck(&self) {
        unsafe { &*self.stuck_ptr }.store(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);
    }

    #[inline]
    pub fn stuck(&self) -> bool {
        fence(Ordering::SeqCst);
        unsafe { &*self.stuck_ptr }.load(Ordering::SeqCst) == 1
    }
}
