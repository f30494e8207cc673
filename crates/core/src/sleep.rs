use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Source of time for every delay the engine takes.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock was created.
    fn elapsed(&self) -> Duration;
    fn sleep(&self, d: Duration);
}

/// Wall clock backed by `thread::sleep`.
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, d: Duration) {
        thread::sleep(d);
    }
}

/// Virtual clock: sleeping advances time instantly.
#[derive(Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.now_ms.fetch_add(d.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        Duration::from_millis(self.now_ms.load(Ordering::SeqCst))
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

/// Cooperative stop flag shared between the orchestrator and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

const CANCEL_SLICE: Duration = Duration::from_millis(100);

/// Sleep for `d`, waking early if `cancel` is set. Returns false if cancelled.
pub fn sleep_cancellable(clock: &dyn Clock, d: Duration, cancel: &CancelToken) -> bool {
    let mut left = d;
    while !left.is_zero() {
        if cancel.is_cancelled() {
            return false;
        }
        let step = left.min(CANCEL_SLICE);
        clock.sleep(step);
        left -= step;
    }
    !cancel.is_cancelled()
}

/// `base` with +/-30% random jitter.
pub fn jittered(base: Duration) -> Duration {
    let secs = base.as_secs_f64();
    if secs <= 0.0 {
        return base;
    }
    let jitter = secs * 0.3;
    let actual = secs + rand::thread_rng().gen_range(-jitter..jitter);
    Duration::from_secs_f64(actual.max(0.01))
}

/// Sleep for exact milliseconds (no jitter).
pub fn sleep_ms(clock: &dyn Clock, ms: u64) {
    clock.sleep(Duration::from_millis(ms));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        clock.sleep(Duration::from_millis(1500));
        sleep_ms(&clock, 500);
        assert_eq!(clock.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn test_cancelled_sleep_returns_early() {
        let clock = ManualClock::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(!sleep_cancellable(&clock, Duration::from_secs(3), &cancel));
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        for _ in 0..50 {
            let d = jittered(Duration::from_millis(1000));
            assert!(d >= Duration::from_millis(700) && d <= Duration::from_millis(1300));
        }
    }
}
