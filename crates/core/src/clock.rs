use std::thread;
use std::time::{Duration, Instant};

/// Time source for the polling loops. Engines never call
/// `Instant::now()` or `thread::sleep` directly.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, dur: Duration);
}

/// Wall clock backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, dur: Duration) {
        thread::sleep(dur);
    }
}
