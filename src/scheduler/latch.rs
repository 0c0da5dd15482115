// src/scheduler/latch.rs

//! A one-shot countdown latch over `Mutex` + `Condvar`.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Blocks waiters until `count_down` has been called `count` times.
///
/// A latch created with count 0 is immediately open.
pub struct CountdownLatch {
    remaining: Mutex<usize>,
    condvar: Condvar,
}

impl CountdownLatch {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            condvar: Condvar::new(),
        }
    }

    fn lock_remaining(&self) -> std::sync::MutexGuard<'_, usize> {
        self.remaining
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Decrement the count, waking waiters when it reaches zero.
    /// Counting down past zero is a no-op.
    pub fn count_down(&self) {
        let mut remaining = self.lock_remaining();
        if *remaining > 0 {
            *remaining -= 1;
            if *remaining == 0 {
                self.condvar.notify_all();
            }
        }
    }

    pub fn is_done(&self) -> bool {
        *self.lock_remaining() == 0
    }

    /// Block until the count reaches zero.
    pub fn wait(&self) {
        let mut remaining = self.lock_remaining();
        while *remaining > 0 {
            remaining = self
                .condvar
                .wait(remaining)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Block until the count reaches zero or `timeout` elapses.
    /// Returns `true` if the latch opened.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut remaining = self.lock_remaining();
        while *remaining > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = self
                .condvar
                .wait_timeout(remaining, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            remaining = guard;
            if result.timed_out() && *remaining > 0 {
                return false;
            }
        }
        true
    }
}
