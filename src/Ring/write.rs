// Producer side of a ring: direct insertion under a lock, with an unbounded
// overflow deque drained by a background thread when the ring is full.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use super::Buffer::Queue;
use crate::error::{Error, Result};
use crate::Core::eventfd::{BlockingAwaiter, Notifier};

pub struct WriteQueue<T> {
    shared: Arc<WriteShared<T>>,
    _drain: Arc<DrainHandle<T>>,
}

impl<T> Clone for WriteQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            _drain: self._drain.clone(),
        }
    }
}

struct WriteShared<T> {
    inner: Mutex<WriteQueueInner<T>>,
    working_notifier: Notifier,
    unstuck_notifier: Notifier,
    stop: AtomicBool,
}

struct WriteQueueInner<T> {
    queue: Queue<T>,
    // FIFO: always drained front-first before direct pushes resume
    pending_tasks: VecDeque<PendingTask<T>>,
}

struct PendingTask<T> {
    item: T,
    landed: Option<Sender<()>>,
}

/// Outcome of [`WriteQueue::push_with_awaiter`].
pub enum PushResult {
    /// The record is in the ring.
    Ok,
    /// The record was parked in the overflow queue.
    Pending(PushHandle),
}

/// Completes once a parked record has been moved into the ring.
pub struct PushHandle {
    rx: Receiver<()>,
}

impl PushHandle {
    /// Block until the record is in the ring. Fails with
    /// [`Error::Disconnected`] if the writer shut down first.
    pub fn wait(self) -> Result<()> {
        self.rx.recv().map_err(|_| Error::Disconnected)
    }

    /// True once the record is in the ring.
    pub fn is_done(&self) -> bool {
        !self.rx.is_empty()
    }
}

/// Owns the overflow-drain thread. Dropped with the last `WriteQueue`.
struct DrainHandle<T> {
    shared: Arc<WriteShared<T>>,
    thread: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Queue<T> {
    pub fn write(self) -> io::Result<WriteQueue<T>> {
        let working_notifier = unsafe { Notifier::from_raw_fd(self.working_fd) };
        let unstuck_notifier = unsafe { Notifier::from_raw_fd(self.unstuck_fd) };
        let unstuck_awaiter = unsafe { BlockingAwaiter::from_raw_fd(self.unstuck_fd) };

        let shared = Arc::new(WriteShared {
            inner: Mutex::new(WriteQueueInner {
                queue: self,
                pending_tasks: VecDeque::new(),
            }),
            working_notifier,
            unstuck_notifier,
            stop: AtomicBool::new(false),
        });

        let drain_shared = shared.clone();
        let thread = thread::Builder::new()
            .name("memcall-ring-drain".into())
            .spawn(move || unstuck_handler(drain_shared, unstuck_awaiter))?;

        Ok(WriteQueue {
            _drain: Arc::new(DrainHandle {
                shared: shared.clone(),
                thread: Some(thread),
            }),
            shared,
        })
    }
}

impl<T> WriteQueue<T> {
    /// Returns true if the item went straight into the ring, false if it was
    /// parked in the overflow queue. Parked items reach the ring in order as
    /// soon as the consumer makes room.
    pub fn push(&self, item: T) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.pending_tasks.is_empty() {
            match inner.queue.push(item) {
                Ok(()) => {
                    if !inner.queue.working() {
                        inner.queue.mark_working();
                        drop(inner);
                        self.notify_working();
                    }
                    return true;
                }
                Err(item) => self.park(&mut inner, item, None),
            }
        } else {
            self.park(&mut inner, item, None);
        }
        false
    }

    /// Like [`push`](Self::push) but never wakes the consumer; pair with
    /// [`notify_manually`](Self::notify_manually) to batch wakeups.
    pub fn push_without_notify(&self, item: T) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.pending_tasks.is_empty() {
            match inner.queue.push(item) {
                Ok(()) => return true,
                Err(item) => self.park(&mut inner, item, None),
            }
        } else {
            self.park(&mut inner, item, None);
        }
        false
    }

    /// Like [`push`](Self::push), but a parked record comes back with a
    /// [`PushHandle`] the producer can block on until the consumer has made
    /// room and the record is in the ring.
    pub fn push_with_awaiter(&self, item: T) -> PushResult {
        let mut inner = self.shared.inner.lock();
        let item = if inner.pending_tasks.is_empty() {
            match inner.queue.push(item) {
                Ok(()) => {
                    if !inner.queue.working() {
                        inner.queue.mark_working();
                        drop(inner);
                        self.notify_working();
                    }
                    return PushResult::Ok;
                }
                Err(item) => item,
            }
        } else {
            item
        };
        let (tx, rx) = bounded(1);
        self.park(&mut inner, item, Some(tx));
        PushResult::Pending(PushHandle { rx })
    }

    /// If the consumer is idle, mark it working and wake it.
    /// Returns whether a notification was sent.
    pub fn notify_manually(&self) -> bool {
        let inner = self.shared.inner.lock();
        if inner.queue.working() {
            return false;
        }
        inner.queue.mark_working();
        drop(inner);
        self.notify_working();
        true
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.inner.lock().queue.is_empty()
    }

    /// Records waiting in the overflow queue.
    pub fn pending_len(&self) -> usize {
        self.shared.inner.lock().pending_tasks.len()
    }

    pub fn is_stuck(&self) -> bool {
        self.shared.inner.lock().queue.stuck()
    }

    #[inline]
    pub fn meta(&self) -> super::QueueMeta {
        self.shared.inner.lock().queue.meta()
    }

    fn park(&self, inner: &mut WriteQueueInner<T>, item: T, landed: Option<Sender<()>>) {
        inner.queue.mark_stuck();
        inner.pending_tasks.push_back(PendingTask { item, landed });
        tracing::trace!(pending = inner.pending_tasks.len(), "ring full, parked record");
        // The consumer may have made room before `stuck` became visible and
        // so skipped the unstuck signal; wake the drain thread ourselves.
        if !inner.queue.is_full() {
            if let Err(e) = self.shared.unstuck_notifier.notify() {
                tracing::warn!(error = %e, "failed to wake ring drain thread");
            }
        }
    }

    fn notify_working(&self) {
        if let Err(e) = self.shared.working_notifier.notify() {
            tracing::warn!(error = %e, "failed to notify ring consumer");
        }
    }
}

fn unstuck_handler<T>(shared: Arc<WriteShared<T>>, mut unstuck_awaiter: BlockingAwaiter) {
    tracing::debug!("ring drain thread started");
    loop {
        if shared.stop.load(Ordering::Acquire) {
            break;
        }
        {
            let mut inner = shared.inner.lock();
            let mut moved = 0usize;
            while let Some(PendingTask { item, landed }) = inner.pending_tasks.pop_front() {
                if let Err(item) = inner.queue.push(item) {
                    inner.pending_tasks.push_front(PendingTask { item, landed });
                    break;
                }
                if let Some(landed) = landed {
                    // the producer may have dropped its handle
                    let _ = landed.send(());
                }
                moved += 1;
            }
            if moved > 0 {
                tracing::trace!(moved, left = inner.pending_tasks.len(), "flushed overflow");
                if !inner.queue.working() {
                    inner.queue.mark_working();
                    if let Err(e) = shared.working_notifier.notify() {
                        tracing::warn!(error = %e, "failed to notify ring consumer");
                    }
                }
            }
            if inner.pending_tasks.is_empty() {
                inner.queue.mark_unstuck();
            } else {
                inner.queue.mark_stuck();
                if !inner.queue.is_full() {
                    continue;
                }
            }
        }

        if let Err(e) = unstuck_awaiter.wait() {
            tracing::error!(error = %e, "ring drain thread failed to wait");
            break;
        }
    }
    tracing::debug!("ring drain thread stopped");
}

impl<T> Drop for DrainHandle<T> {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Err(e) = self.shared.unstuck_notifier.notify() {
            tracing::warn!(error = %e, "failed to wake ring drain thread for shutdown");
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("ring drain thread panicked");
            }
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn overflow_drains_in_order_after_pops() {
        let q = Queue::<u32>::new(2).unwrap();
        let mut reader = q.share().read();
        let writer = q.write().unwrap();

        assert!(writer.push(1));
        assert!(writer.push(2));
        assert!(!writer.push(3));
        assert!(!writer.push(4));
        assert!(writer.is_stuck());

        let mut seen = Vec::new();
        assert!(wait_until(|| {
            if let Some(v) = reader.pop() {
                seen.push(v);
            }
            seen.len() == 4
        }));
        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert!(wait_until(|| writer.pending_len() == 0 && !writer.is_stuck()));
    }

    #[test]
    fn pending_items_block_direct_pushes() {
        let q = Queue::<u32>::new(1).unwrap();
        let mut reader = q.share().read();
        let writer = q.write().unwrap();

        assert!(writer.push(1));
        assert!(!writer.push(2));
        assert_eq!(reader.pop(), Some(1));
        // ring has room now, but 2 is still queued ahead of 3
        writer.push(3);
        let mut seen = Vec::new();
        assert!(wait_until(|| {
            if let Some(v) = reader.pop() {
                seen.push(v);
            }
            seen.len() == 2
        }));
        assert_eq!(seen, vec![2, 3]);
    }

    #[test]
    fn parked_record_handle_fails_when_writer_goes_away() {
        let q = Queue::<u32>::new(1).unwrap();
        let _reader = q.share().read();
        let writer = q.write().unwrap();

        assert!(matches!(writer.push_with_awaiter(1), PushResult::Ok));
        let PushResult::Pending(handle) = writer.push_with_awaiter(2) else {
            panic!("second record should be parked");
        };
        drop(writer);
        assert!(matches!(handle.wait(), Err(Error::Disconnected)));
    }
}
