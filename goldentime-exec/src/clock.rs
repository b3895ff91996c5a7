//! Time source for poll loops.
//!
//! Runs never read the wall clock or sleep directly. `SystemClock` is used in
//! production; `ManualClock` lets tests step time deterministically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// Current time and sleep, as seen by a trade run.
#[async_trait]
pub trait SupervisorClock: Send + Sync + fmt::Debug {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;

    /// Suspend for `duration`
    async fn sleep(&self, duration: Duration);
}

// =============================================================================
// System Clock
// =============================================================================

/// Wall clock backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl SupervisorClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// =============================================================================
// Manual Clock
// =============================================================================

type Alarm = (DateTime<Utc>, Box<dyn FnOnce() + Send>);

/// Clock that only moves when something sleeps on it.
///
/// `sleep(d)` advances the current instant by `d`, fires any alarm whose
/// instant has been reached, then yields to the runtime.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    alarms: Mutex<Vec<Alarm>>,
}

impl ManualClock {
    /// Start at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            alarms: Mutex::new(Vec::new()),
        }
    }

    /// Move time forward without sleeping.
    pub fn advance(&self, duration: Duration) {
        let now = {
            let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
            *now += to_chrono(duration);
            *now
        };
        self.fire_due(now);
    }

    /// Run `action` the first time the clock reaches `at`.
    pub fn on_reach(&self, at: DateTime<Utc>, action: impl FnOnce() + Send + 'static) {
        self.alarms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((at, Box::new(action)));
    }

    fn fire_due(&self, now: DateTime<Utc>) {
        let due: Vec<Alarm> = {
            let mut alarms = self.alarms.lock().unwrap_or_else(|e| e.into_inner());
            let (due, pending): (Vec<Alarm>, Vec<Alarm>) =
                alarms.drain(..).partition(|(at, _)| *at <= now);
            *alarms = pending;
            due
        };
        for (_, action) in due {
            action();
        }
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock").field("now", &self.now()).finish()
    }
}

#[async_trait]
impl SupervisorClock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_manual_clock_advances_on_sleep() {
        let start = Utc::now();
        let clock = ManualClock::new(start);

        clock.sleep(Duration::from_secs(2)).await;
        clock.sleep(Duration::from_secs(2)).await;

        assert_eq!(clock.now() - start, chrono::Duration::seconds(4));
    }

    #[tokio::test]
    async fn test_alarm_fires_once_when_reached() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let fired = Arc::new(AtomicBool::new(false));

        let flag = fired.clone();
        clock.on_reach(start + chrono::Duration::seconds(3), move || {
            flag.store(true, Ordering::SeqCst);
        });

        clock.sleep(Duration::from_secs(2)).await;
        assert!(!fired.load(Ordering::SeqCst));

        clock.sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_system_clock_sleeps() {
        let before = SystemClock.now();
        SystemClock.sleep(Duration::from_millis(5)).await;
        assert!(SystemClock.now() >= before);
    }
}
