//! Auto-reset "work available" event

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Wakes one waiter per `set`; the flag resets when a waiter consumes it
#[derive(Default)]
pub struct WorkSignal {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl WorkSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let mut flag = self.flag.lock();
        *flag = true;
        self.cond.notify_one();
    }

    /// Wake every waiter, used at shutdown
    pub fn set_all(&self) {
        let mut flag = self.flag.lock();
        *flag = true;
        self.cond.notify_all();
    }

    /// Block until signalled or `terminate` is raised; returns false on timeout
    pub fn wait(&self, terminate: &AtomicBool, timeout: Duration) -> bool {
        let mut flag = self.flag.lock();
        while !*flag && !terminate.load(Ordering::SeqCst) {
            if self.cond.wait_for(&mut flag, timeout).timed_out() {
                return false;
            }
        }
        *flag = false;
        true
    }
}
