// Consumer side of a ring: one dedicated drain loop per ring.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::waiter::{TinyWaiter, YieldWaiter};
use super::Buffer::{Queue, QueueStorage};
use crate::Core::eventfd::{BlockingAwaiter, Notifier};

pub struct ReadQueue<T> {
    queue: Queue<T>,
    unstuck_notifier: Notifier,
}

/// Keeps the drain loop alive. Dropping it stops and joins the loop.
pub struct Guard {
    stop: Arc<AtomicBool>,
    wake: Notifier,
    thread: Option<JoinHandle<()>>,
    // keeps the descriptors behind `wake` open until the loop is gone
    _storage: Option<Arc<QueueStorage>>,
}

impl<T> Queue<T> {
    pub fn read(self) -> ReadQueue<T> {
        let unstuck_notifier = unsafe { Notifier::from_raw_fd(self.unstuck_fd) };
        ReadQueue {
            queue: self,
            unstuck_notifier,
        }
    }
}

impl<T> ReadQueue<T> {
    #[inline]
    pub fn meta(&self) -> super::QueueMeta {
        self.queue.meta()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Take one record. Making room releases a stuck producer.
    pub fn pop(&mut self) -> Option<T> {
        let maybe_item = self.queue.pop();
        if self.queue.stuck() && self.queue.mark_unstuck() {
            if let Err(e) = self.unstuck_notifier.notify() {
                tracing::warn!(error = %e, "failed to notify unstuck producer");
            }
        }
        maybe_item
    }

    /// Run `handler` for every record on a dedicated thread, idling with a
    /// [`YieldWaiter`].
    pub fn run_handler<F>(self, handler: F) -> io::Result<Guard>
    where
        F: FnMut(T) + Send + 'static,
        T: Send + 'static,
    {
        self.run_handler_with_waiter(handler, Box::new(YieldWaiter))
    }

    pub fn run_handler_with_waiter<F>(
        self,
        handler: F,
        waiter: Box<dyn TinyWaiter>,
    ) -> io::Result<Guard>
    where
        F: FnMut(T) + Send + 'static,
        T: Send + 'static,
    {
        let working_fd = self.queue.working_fd;
        let working_awaiter = unsafe { BlockingAwaiter::from_raw_fd(working_fd) };
        let stop = Arc::new(AtomicBool::new(false));
        let storage = self.queue.storage.clone();

        let loop_stop = stop.clone();
        let thread = thread::Builder::new()
            .name("memcall-ring-reader".into())
            .spawn(move || self.working_handler(working_awaiter, handler, waiter, loop_stop))?;

        Ok(Guard {
            stop,
            wake: unsafe { Notifier::from_raw_fd(working_fd) },
            thread: Some(thread),
            _storage: storage,
        })
    }

    fn working_handler(
        mut self,
        mut working_awaiter: BlockingAwaiter,
        mut handler: impl FnMut(T),
        mut waiter: Box<dyn TinyWaiter>,
        stop: Arc<AtomicBool>,
    ) {
        tracing::debug!(capacity = self.queue.capacity(), "ring reader started");
        self.queue.mark_working();
        let mut waited = false;

        'p: loop {
            if stop.load(Ordering::Acquire) {
                break;
            }

            let mut count = 0usize;
            while let Some(item) = self.pop() {
                handler(item);
                count += 1;
            }
            if count > 0 {
                tracing::trace!(count, "drained ring");
            }

            waiter.reset(count, waited);
            waited = false;
            loop {
                let done = waiter.wait();
                if !self.queue.is_empty() {
                    continue 'p;
                }
                if done || stop.load(Ordering::Acquire) {
                    break;
                }
            }

            if !self.queue.mark_unworking() {
                continue;
            }

            if let Err(e) = working_awaiter.wait() {
                tracing::error!(error = %e, "ring reader failed to wait for work");
                break;
            }
            self.queue.mark_working();
            waited = true;
        }

        self.queue.mark_unworking();
        tracing::debug!("ring reader stopped");
    }
}

impl Guard {
    /// True while the drain loop thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Err(e) = self.wake.notify() {
            tracing::warn!(error = %e, "failed to wake ring reader for shutdown");
        }
        if let Some(thread) = self.thread.take() {
            // a handler dropping its own guard cannot join itself
            if thread.thread().id() != thread::current().id() && thread.join().is_err() {
                tracing::error!("ring reader panicked");
            }
        }
    }
}
