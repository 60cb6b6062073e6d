// Idle policies for the ring consumer.

use crossbeam_utils::Backoff;
use std::time::Duration;

/// Decides how a consumer idles after draining its ring.
///
/// `reset` starts an idle period; `wait` performs one step and returns true
/// once the policy is exhausted and the caller should park on the kernel
/// awaiter instead.
pub trait TinyWaiter: Send {
    fn reset(&mut self, recent_work: usize, waited: bool);

    fn wait(&mut self) -> bool;
}

/// Yield the thread once, then give up.
#[derive(Debug, Default, Clone, Copy)]
pub struct YieldWaiter;

impl TinyWaiter for YieldWaiter {
    fn reset(&mut self, _recent_work: usize, _waited: bool) {}

    fn wait(&mut self) -> bool {
        std::thread::yield_now();
        true
    }
}

/// Sleep `interval` per step until more than `max` has been spent.
#[derive(Debug, Clone, Copy)]
pub struct SleepWaiter {
    pub interval: Duration,
    pub max: Duration,
    current: Duration,
}

impl SleepWaiter {
    pub fn new(interval: Duration, max: Duration) -> Self {
        Self {
            interval,
            max,
            current: Duration::ZERO,
        }
    }
}

impl TinyWaiter for SleepWaiter {
    fn reset(&mut self, _recent_work: usize, _waited: bool) {
        self.current = Duration::ZERO;
    }

    fn wait(&mut self) -> bool {
        std::thread::sleep(self.interval);
        self.current += self.interval;
        self.current > self.max
    }
}

/// Spin with exponential backoff for a bounded number of steps.
///
/// After a busy round (`recent_work >= busy_threshold`) the budget doubles,
/// since more records are likely right behind. A round that ended in a
/// kernel park gets the plain budget.
#[derive(Debug)]
pub struct SpinWaiter {
    rounds: u32,
    busy_threshold: usize,
    budget: u32,
    step: u32,
    backoff: Backoff,
}

impl SpinWaiter {
    pub fn new(rounds: u32) -> Self {
        Self {
            rounds,
            busy_threshold: 32,
            budget: rounds,
            step: 0,
            backoff: Backoff::new(),
        }
    }
}

impl TinyWaiter for SpinWaiter {
    fn reset(&mut self, recent_work: usize, waited: bool) {
        self.step = 0;
        self.backoff.reset();
        self.budget = if !waited && recent_work >= self.busy_threshold {
            self.rounds.saturating_mul(2)
        } else {
            self.rounds
        };
    }

    fn wait(&mut self) -> bool {
        self.backoff.snooze();
        self.step += 1;
        self.step >= self.budget
    }
}
