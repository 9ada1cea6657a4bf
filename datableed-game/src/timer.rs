//! Countdown timers polled against a [`Clock`].
//!
//! Timers do not schedule themselves. The owner calls [`TimerManager::poll`]
//! at a fixed cadence (see `PlaySession::run_timers` behind the `async`
//! feature) and each poll compares elapsed clock time with the
//! timer's duration, so a throttled or delayed tick never drifts the deadline.

use crate::clock::SharedClock;
use crate::numbers::ceil_f64_to_u32;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Callback fired once when a timer expires.
pub type ExpireCallback = Box<dyn FnOnce(&str)>;

struct Countdown {
    started_at: Duration,
    duration: Duration,
    on_expire: Option<ExpireCallback>,
}

impl fmt::Debug for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Countdown")
            .field("started_at", &self.started_at)
            .field("duration", &self.duration)
            .field("has_callback", &self.on_expire.is_some())
            .finish()
    }
}

impl Countdown {
    fn deadline(&self) -> Duration {
        self.started_at.saturating_add(self.duration)
    }
}

#[derive(Debug)]
pub struct TimerManager {
    clock: SharedClock,
    timers: BTreeMap<String, Countdown>,
}

impl TimerManager {
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            timers: BTreeMap::new(),
        }
    }

    /// Start (or restart) a countdown without an expiry callback.
    pub fn start(&mut self, id: impl Into<String>, duration_secs: f64) {
        self.insert(id.into(), duration_secs, None);
    }

    /// Start (or restart) a countdown that invokes `on_expire` when it runs out.
    pub fn start_timer(
        &mut self,
        id: impl Into<String>,
        duration_secs: f64,
        on_expire: impl FnOnce(&str) + 'static,
    ) {
        self.insert(id.into(), duration_secs, Some(Box::new(on_expire)));
    }

    fn insert(&mut self, id: String, duration_secs: f64, on_expire: Option<ExpireCallback>) {
        let duration = secs_to_duration(duration_secs);
        let started_at = self.clock.now();
        if self.timers.contains_key(&id) {
            log::debug!("timer {id} restarted with {duration_secs:.1}s");
        }
        self.timers.insert(
            id,
            Countdown {
                started_at,
                duration,
                on_expire,
            },
        );
    }

    /// Cancel a countdown. Unknown ids are ignored.
    pub fn stop_timer(&mut self, id: &str) {
        self.timers.remove(id);
    }

    /// Rewrite the remaining time of a running countdown. Unknown ids are ignored.
    pub fn update_timer(&mut self, id: &str, remaining_secs: f64) {
        let now = self.clock.now();
        if let Some(timer) = self.timers.get_mut(id) {
            timer.started_at = now;
            timer.duration = secs_to_duration(remaining_secs);
        }
    }

    /// Whole seconds remaining, rounded up; 0 when the id is unknown.
    #[must_use]
    pub fn get_time_remaining(&self, id: &str) -> u32 {
        ceil_f64_to_u32(self.exact_remaining(id))
    }

    /// Fractional seconds remaining; 0.0 when the id is unknown.
    #[must_use]
    pub fn exact_remaining(&self, id: &str) -> f64 {
        let now = self.clock.now();
        self.timers
            .get(id)
            .map_or(0.0, |timer| timer.deadline().saturating_sub(now).as_secs_f64())
    }

    #[must_use]
    pub fn is_running(&self, id: &str) -> bool {
        self.timers.contains_key(id)
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    /// Expire every countdown whose deadline has passed.
    ///
    /// Callbacks run in id order; the expired ids are returned in the same order.
    pub fn poll(&mut self) -> Vec<String> {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.deadline() <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(timer) = self.timers.remove(id) {
                log::debug!("timer {id} expired");
                if let Some(callback) = timer.on_expire {
                    callback(id);
                }
            }
        }
        expired
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn manager() -> (TimerManager, ManualClock) {
        let clock = ManualClock::new();
        (TimerManager::new(Rc::new(clock.clone())), clock)
    }

    #[test]
    fn remaining_rounds_up_and_unknown_is_zero() {
        let (mut timers, clock) = manager();
        timers.start("scenario", 15.0);
        clock.advance(Duration::from_millis(4_200));
        assert_eq!(timers.get_time_remaining("scenario"), 11);
        assert_eq!(timers.get_time_remaining("missing"), 0);
    }

    #[test]
    fn poll_fires_callback_once() {
        let (mut timers, clock) = manager();
        let fired = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&fired);
        timers.start_timer("t1", 1.0, move |id| sink.borrow_mut().push(id.to_string()));

        clock.advance(Duration::from_millis(900));
        assert!(timers.poll().is_empty());
        clock.advance(Duration::from_millis(100));
        assert_eq!(timers.poll(), vec!["t1".to_string()]);
        assert!(timers.poll().is_empty());
        assert_eq!(fired.borrow().as_slice(), ["t1".to_string()]);
    }

    #[test]
    fn restart_overwrites_previous_timer() {
        let (mut timers, clock) = manager();
        timers.start("t", 2.0);
        clock.advance(Duration::from_secs(1));
        timers.start("t", 5.0);
        clock.advance(Duration::from_secs(2));
        assert!(timers.poll().is_empty());
        assert_eq!(timers.get_time_remaining("t"), 3);
    }

    #[test]
    fn stop_and_update_ignore_unknown_ids() {
        let (mut timers, clock) = manager();
        timers.stop_timer("nope");
        timers.update_timer("nope", 3.0);
        timers.start("t", 10.0);
        clock.advance(Duration::from_secs(8));
        timers.update_timer("t", 6.0);
        assert_eq!(timers.get_time_remaining("t"), 6);
        timers.stop_timer("t");
        assert!(!timers.is_running("t"));
        assert_eq!(timers.active_count(), 0);
    }

    #[test]
    fn huge_durations_saturate() {
        let (mut timers, clock) = manager();
        timers.start("t", 1e20);
        timers.start_timer("cb", f64::MAX, |_| {});
        clock.advance(Duration::from_secs(3_600));
        assert!(timers.poll().is_empty());
        assert_eq!(timers.get_time_remaining("t"), u32::MAX);

        timers.update_timer("t", 1e20);
        assert!(timers.is_running("t"));
        assert_eq!(timers.get_time_remaining("cb"), u32::MAX);
    }
}
