//! Clock abstraction for retry waits and queue timestamps.
//!
//! Routers never call `tokio::time::sleep` or `Utc::now` directly. They go
//! through a [`Clock`] so tests can run a full retry cycle with a minute-long
//! wait in microseconds and still assert which waits were requested.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant, SystemTime},
};

use chrono::{DateTime, Utc};

/// Source of time for routers and their workers.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic instant for measuring attempt durations.
    fn now(&self) -> Instant;

    /// Wall-clock time used when stamping queued entries.
    fn now_system(&self) -> SystemTime;

    /// Waits for `duration` before the next delivery attempt.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Wall-clock time as a UTC timestamp.
    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.now_system())
    }
}

/// Production clock backed by the system and the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_system(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Virtual clock for deterministic tests.
///
/// Sleeping advances virtual time by the requested amount and yields once to
/// the scheduler instead of waiting. Every requested sleep is recorded so
/// tests can check the wait a router actually used between attempts.
/// Clones share the same time and sleep log.
#[derive(Debug, Clone)]
pub struct TestClock {
    elapsed_ns: Arc<AtomicU64>,
    start_system: SystemTime,
    base_instant: Instant,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl TestClock {
    /// Creates a test clock starting at the current system time.
    pub fn new() -> Self {
        Self::starting_at(SystemTime::now())
    }

    /// Creates a test clock whose wall clock starts at `start`.
    pub fn starting_at(start: SystemTime) -> Self {
        Self {
            elapsed_ns: Arc::new(AtomicU64::new(0)),
            start_system: start,
            base_instant: Instant::now(),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Advances virtual time without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        self.elapsed_ns.fetch_add(saturating_nanos(duration), Ordering::AcqRel);
    }

    /// Total virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::Acquire))
    }

    /// Every duration passed to [`Clock::sleep`], in call order.
    pub fn recorded_sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|sleeps| sleeps.clone()).unwrap_or_default()
    }

    /// Number of sleeps requested so far.
    pub fn sleep_count(&self) -> usize {
        self.sleeps.lock().map(|sleeps| sleeps.len()).unwrap_or_default()
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.base_instant + self.elapsed()
    }

    fn now_system(&self) -> SystemTime {
        self.start_system + self.elapsed()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        self.advance(duration);
        Box::pin(tokio::task::yield_now())
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::UNIX_EPOCH;

    use super::*;

    #[test]
    fn advance_moves_monotonic_and_system_time_together() {
        let start = UNIX_EPOCH + Duration::from_secs(1_000);
        let clock = TestClock::starting_at(start);
        let before = clock.now();

        clock.advance(Duration::from_secs(60));

        assert_eq!(clock.now().duration_since(before), Duration::from_secs(60));
        assert_eq!(clock.now_system(), start + Duration::from_secs(60));
        assert_eq!(clock.now_utc().timestamp(), 1_060);
    }

    #[tokio::test]
    async fn sleep_is_recorded_and_advances_virtual_time() {
        let clock = TestClock::new();

        clock.sleep(Duration::from_millis(60_000)).await;
        clock.sleep(Duration::from_millis(5)).await;

        assert_eq!(clock.elapsed(), Duration::from_millis(60_005));
        assert_eq!(
            clock.recorded_sleeps(),
            vec![Duration::from_millis(60_000), Duration::from_millis(5)]
        );
    }

    #[tokio::test]
    async fn clones_share_the_sleep_log() {
        let clock = TestClock::new();
        let shared = clock.clone();

        shared.sleep(Duration::from_secs(1)).await;

        assert_eq!(clock.sleep_count(), 1);
        assert_eq!(clock.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn now_utc_follows_system_time() {
        let start = UNIX_EPOCH + Duration::from_secs(86_400);
        let clock = TestClock::starting_at(start);

        assert_eq!(clock.now_utc().timestamp(), 86_400);
    }
}
