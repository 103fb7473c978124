use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// One-shot stop request shared by both pumps of a session.
///
/// Once set it stays set. Waiters block on a condition variable rather
/// than spinning on the flag.
#[derive(Debug, Default)]
pub struct TerminationSignal {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl TerminationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns true if this call was the one that set it.
    pub fn set(&self) -> bool {
        let mut fired = self.lock();
        if *fired {
            return false;
        }
        *fired = true;
        self.cond.notify_all();
        true
    }

    pub fn is_set(&self) -> bool {
        *self.lock()
    }

    /// Block until the signal fires.
    pub fn wait(&self) {
        let mut fired = self.lock();
        while !*fired {
            fired = match self.cond.wait(fired) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Block until the signal fires or `timeout` elapses. Returns whether it fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let fired = self.lock();
        let (fired, _) = match self.cond.wait_timeout_while(fired, timeout, |fired| !*fired) {
            Ok(result) => result,
            Err(poisoned) => poisoned.into_inner(),
        };
        *fired
    }

    // A panicking pump must not wedge the other one.
    fn lock(&self) -> MutexGuard<'_, bool> {
        match self.fired.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
