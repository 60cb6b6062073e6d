use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;

use crate::error::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;
type Spill = Arc<Mutex<VecDeque<Job>>>;

/// Fixed set of threads fed by a bounded job queue.
///
/// `submit` never blocks: once the queue is full, jobs go to a spill deque
/// that workers empty after each queued job. The ring reader submits from
/// its drain loop and must keep delivering replies while handlers wait on
/// them.
pub struct WorkerPool {
    tx: Option<Sender<Job>>,
    spill: Spill,
    workers: Vec<JoinHandle<()>>,
}

fn run(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        tracing::error!("dispatch job panicked");
    }
}

// The lock is released before the job runs.
fn next_spilled(spill: &Spill) -> Option<Job> {
    spill.lock().pop_front()
}

impl WorkerPool {
    pub fn new(workers: usize, queue_depth: usize) -> io::Result<Self> {
        let (tx, rx) = bounded::<Job>(queue_depth.max(1));
        let spill: Spill = Arc::new(Mutex::new(VecDeque::new()));
        let workers = (0..workers.max(1))
            .map(|i| {
                let rx = rx.clone();
                let spill = spill.clone();
                thread::Builder::new()
                    .name(format!("memcall-worker-{i}"))
                    .spawn(move || {
                        for job in rx.iter() {
                            run(job);
                            while let Some(job) = next_spilled(&spill) {
                                run(job);
                            }
                        }
                        while let Some(job) = next_spilled(&spill) {
                            run(job);
                        }
                    })
            })
            .collect::<io::Result<Vec<_>>>()?;
        tracing::debug!(workers = workers.len(), queue_depth, "worker pool started");
        Ok(Self {
            tx: Some(tx),
            spill,
            workers,
        })
    }

    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let tx = self.tx.as_ref().ok_or(Error::Disconnected)?;
        // Spilled jobs were queued while the channel held work, so a worker
        // that takes that work checks the spill afterwards.
        let mut spill = self.spill.lock();
        if !spill.is_empty() {
            spill.push_back(Box::new(job));
            return Ok(());
        }
        match tx.try_send(Box::new(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                spill.push_back(job);
                tracing::trace!(spilled = spill.len(), "job queue full, spilling");
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(Error::Disconnected),
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Jobs accepted but not yet picked up, spilled ones included.
    pub fn queued(&self) -> usize {
        let spilled = self.spill.lock().len();
        spilled + self.tx.as_ref().map_or(0, Sender::len)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // closing the channel ends every worker loop once the queue drains
        self.tx.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}
