//! Session timers and the clock they read.
//!
//! Timers here never spawn anything. They hold a deadline relative to a
//! [`Clock`] and the owner polls them from its sequencing context, which keeps
//! cancellation synchronous: once `cancel()` returns, the timer cannot fire.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// ── Clocks ───────────────────────────────────────────────────────────────────

/// Monotonic time source, measured from an arbitrary origin.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Wall clock backed by `Instant`.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock for tests and simulations. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    elapsed_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.elapsed_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, at: Duration) {
        self.elapsed_ms.store(at.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
    }
}

// ── Timer ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    OneShot,
    Periodic(Duration),
}

/// Snapshot of a timer's scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerHandle {
    pub is_scheduled: bool,
    /// Deadline for one-shot timers, cadence for periodic ones.
    pub fire_at_or_interval_millis: u64,
}

/// A cancellable, re-armable deadline.
#[derive(Debug, Clone)]
pub struct Timer {
    name: &'static str,
    kind: TimerKind,
    fire_at: Option<Duration>,
}

impl Timer {
    pub fn one_shot(name: &'static str) -> Self {
        Timer {
            name,
            kind: TimerKind::OneShot,
            fire_at: None,
        }
    }

    /// Periodic timer. A zero interval is bumped to one millisecond.
    pub fn periodic(name: &'static str, interval: Duration) -> Self {
        Timer {
            name,
            kind: TimerKind::Periodic(interval.max(Duration::from_millis(1))),
            fire_at: None,
        }
    }

    /// Arm the timer to fire `delay` after `now`, replacing any pending firing.
    pub fn schedule(&mut self, now: Duration, delay: Duration) {
        if self.fire_at.is_some() {
            log::debug!("{} timer re-armed, previous firing dropped", self.name);
        }
        self.fire_at = Some(now + delay);
    }

    /// Arm a periodic timer one interval from `now` unless it is already running.
    pub fn start_if_idle(&mut self, now: Duration) {
        if self.fire_at.is_some() {
            return;
        }
        let delay = match self.kind {
            TimerKind::Periodic(interval) => interval,
            TimerKind::OneShot => Duration::ZERO,
        };
        self.fire_at = Some(now + delay);
    }

    /// Disarm. Returns whether a firing was pending; cancelling twice is a no-op.
    pub fn cancel(&mut self) -> bool {
        self.fire_at.take().is_some()
    }

    pub fn is_scheduled(&self) -> bool {
        self.fire_at.is_some()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.fire_at
    }

    /// Consume a due firing. Periodic timers reschedule themselves before
    /// returning so the tick handler never has to re-arm them.
    pub fn poll(&mut self, now: Duration) -> bool {
        let Some(fire_at) = self.fire_at else {
            return false;
        };
        if fire_at > now {
            return false;
        }
        self.fire_at = match self.kind {
            TimerKind::OneShot => None,
            TimerKind::Periodic(interval) => {
                let next = fire_at + interval;
                // Skip missed ticks instead of bursting to catch up.
                Some(if next <= now { now + interval } else { next })
            }
        };
        true
    }

    pub fn handle(&self) -> TimerHandle {
        let fire_at_or_interval_millis = match self.kind {
            TimerKind::OneShot => self.fire_at.map_or(0, |at| at.as_millis() as u64),
            TimerKind::Periodic(interval) => interval.as_millis() as u64,
        };
        TimerHandle {
            is_scheduled: self.is_scheduled(),
            fire_at_or_interval_millis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn one_shot_fires_once() {
        let mut t = Timer::one_shot("ad-timeout");
        t.schedule(ms(0), ms(100));
        assert!(!t.poll(ms(99)));
        assert!(t.poll(ms(100)));
        assert!(!t.is_scheduled());
        assert!(!t.poll(ms(500)));
    }

    #[test]
    fn rescheduling_replaces_pending_firing() {
        let mut t = Timer::one_shot("ad-timeout");
        t.schedule(ms(0), ms(100));
        t.schedule(ms(50), ms(100));
        assert!(!t.poll(ms(100)));
        assert!(t.poll(ms(150)));
        assert!(!t.poll(ms(200)));
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut t = Timer::one_shot("ad-timeout");
        t.schedule(ms(0), ms(10));
        assert!(t.cancel());
        assert!(!t.cancel());
        assert!(!t.poll(ms(1000)));
    }

    #[test]
    fn periodic_reschedules_itself() {
        let mut t = Timer::periodic("progress", ms(200));
        t.start_if_idle(ms(0));
        assert!(t.poll(ms(200)));
        assert_eq!(t.deadline(), Some(ms(400)));
        assert!(!t.poll(ms(399)));
        assert!(t.poll(ms(400)));
    }

    #[test]
    fn periodic_skips_missed_ticks() {
        let mut t = Timer::periodic("progress", ms(200));
        t.start_if_idle(ms(0));
        assert!(t.poll(ms(1000)));
        assert_eq!(t.deadline(), Some(ms(1200)));
    }

    #[test]
    fn start_if_idle_keeps_running_cadence() {
        let mut t = Timer::periodic("progress", ms(200));
        t.start_if_idle(ms(0));
        t.start_if_idle(ms(150));
        assert_eq!(t.deadline(), Some(ms(200)));
    }

    #[test]
    fn handle_reports_deadline_or_interval() {
        let mut shot = Timer::one_shot("ad-timeout");
        assert_eq!(
            shot.handle(),
            TimerHandle {
                is_scheduled: false,
                fire_at_or_interval_millis: 0
            }
        );
        shot.schedule(ms(1000), ms(10_000));
        assert_eq!(shot.handle().fire_at_or_interval_millis, 11_000);

        let periodic = Timer::periodic("progress", ms(200));
        assert_eq!(periodic.handle().fire_at_or_interval_millis, 200);
        assert!(!periodic.handle().is_scheduled);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(ms(250));
        assert_eq!(other.now(), ms(250));
        other.set(ms(10));
        assert_eq!(clock.now(), ms(10));
    }
}
