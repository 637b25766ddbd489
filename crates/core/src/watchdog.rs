//! Resettable single-shot silence timer.
//!
//! Each `arm`/`reset` opens a new cycle. A cycle fires at most once, and only
//! if nothing reset or disarmed the watchdog before its deadline.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tokio::time::Duration;

type FireCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Cycle value meaning "nothing pending".
const IDLE: u64 = 0;

pub struct SilenceWatchdog {
    duration: Option<Duration>,
    on_fire: Option<FireCallback>,
    pending: Option<JoinHandle<()>>,
    // Cycle allowed to fire, or IDLE. Shared with the timer task so a fire and
    // a disarm racing each other resolve to exactly one winner.
    live: Arc<AtomicU64>,
    last_cycle: u64,
    disarmed: bool,
}

impl Default for SilenceWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl SilenceWatchdog {
    pub fn new() -> Self {
        Self {
            duration: None,
            on_fire: None,
            pending: None,
            live: Arc::new(AtomicU64::new(IDLE)),
            last_cycle: IDLE,
            disarmed: true,
        }
    }

    /// Starts a new cycle. `on_fire` receives the cycle number and is kept for
    /// later `reset` calls.
    pub fn arm<F>(&mut self, duration: Duration, on_fire: F) -> u64
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.duration = Some(duration);
        self.on_fire = Some(Arc::new(on_fire));
        self.schedule()
    }

    /// Cancels the pending fire and starts over with the armed duration.
    /// Returns the new cycle, or `None` when the watchdog was never armed.
    pub fn reset(&mut self) -> Option<u64> {
        if self.duration.is_none() || self.on_fire.is_none() {
            tracing::debug!("Silence watchdog reset before it was ever armed; ignoring.");
            return None;
        }
        Some(self.schedule())
    }

    /// Cancels any pending fire. Safe to call repeatedly.
    pub fn disarm(&mut self) {
        self.live.store(IDLE, Ordering::SeqCst);
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        self.disarmed = true;
    }

    /// True while a fire is pending.
    pub fn is_armed(&self) -> bool {
        self.live.load(Ordering::SeqCst) != IDLE
    }

    /// True when `cycle` is the latest cycle and nothing disarmed it since.
    /// Used to reject fires that were already queued when the watchdog moved on.
    pub fn is_current(&self, cycle: u64) -> bool {
        !self.disarmed && cycle == self.last_cycle
    }

    fn schedule(&mut self) -> u64 {
        self.disarm();

        let (Some(duration), Some(on_fire)) = (self.duration, self.on_fire.clone()) else {
            return IDLE;
        };

        self.last_cycle += 1;
        let cycle = self.last_cycle;
        self.disarmed = false;
        self.live.store(cycle, Ordering::SeqCst);

        let live = self.live.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if live
                .compare_exchange(cycle, IDLE, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                on_fire(cycle);
            }
        }));
        tracing::trace!("Silence watchdog armed for {:?} (cycle {}).", duration, cycle);
        cycle
    }
}

impl Drop for SilenceWatchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::Instant;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(u64) + Send + Sync + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let hook = fired.clone();
        (fired, move |_| {
            hook.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_duration() {
        let (fired, on_fire) = counter();
        let mut watchdog = SilenceWatchdog::new();
        watchdog.arm(Duration::from_secs(5), on_fire);
        assert!(watchdog.is_armed());

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!watchdog.is_armed());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1, "a cycle fires at most once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_many_times_fires_once_from_last_reset() {
        let fire_times = Arc::new(Mutex::new(Vec::new()));
        let log = fire_times.clone();
        let mut watchdog = SilenceWatchdog::new();
        let armed_at = Instant::now();
        watchdog.arm(Duration::from_secs(5), move |_| {
            log.lock().unwrap().push(Instant::now());
        });

        let mut last_reset = armed_at;
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(3)).await;
            watchdog.reset();
            last_reset = Instant::now();
        }

        // Well past the first arm's deadline, but not the last reset's.
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert!(fire_times.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let fire_times = fire_times.lock().unwrap();
        assert_eq!(fire_times.len(), 1);
        let since_reset = fire_times[0] - last_reset;
        assert!(since_reset >= Duration::from_secs(5));
        assert!(since_reset < Duration::from_millis(5_010));
        assert!(fire_times[0] - armed_at > Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_cancels_and_is_repeatable() {
        let (fired, on_fire) = counter();
        let mut watchdog = SilenceWatchdog::new();
        let cycle = watchdog.arm(Duration::from_secs(1), on_fire);

        watchdog.disarm();
        watchdog.disarm();
        assert!(!watchdog.is_armed());
        assert!(!watchdog.is_current(cycle));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_after_fire_rearms_with_same_duration() {
        let (fired, on_fire) = counter();
        let mut watchdog = SilenceWatchdog::new();
        let first = watchdog.arm(Duration::from_secs(2), on_fire);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(watchdog.is_current(first));

        let second = watchdog.reset().expect("watchdog was armed before");
        assert!(second > first);
        assert!(!watchdog.is_current(first));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reset_without_arm_is_noop() {
        let mut watchdog = SilenceWatchdog::new();
        assert_eq!(watchdog.reset(), None);
        assert!(!watchdog.is_armed());
        watchdog.disarm();
    }
}
