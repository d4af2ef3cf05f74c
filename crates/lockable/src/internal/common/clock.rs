use std::fmt::Debug;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::{Duration, Instant};

/// Source of "now" for queue ticket expiry.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ticket validity check bound to one read of the clock.
#[derive(Debug, Copy, Clone)]
pub struct Expiry {
    now: Instant,
    timeout: Duration,
}

impl Expiry {
    pub fn new(now: Instant, timeout: Duration) -> Self {
        Self { now, timeout }
    }

    #[inline]
    pub fn now(&self) -> Instant {
        self.now
    }

    /// A ticket is still valid while its age is at most the timeout.
    #[inline]
    pub fn is_expired(&self, since: Instant) -> bool {
        self.now.saturating_duration_since(since) > self.timeout
    }
}
