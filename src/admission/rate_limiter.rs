//! Per-provider sliding-window rate limiting.
//!
//! Three sliding windows (minute, hour, day) plus a concurrent in-flight
//! counter per provider. A denial starts a cooldown during which further
//! requests are rejected pre-emptively without consuming window slots, so
//! a saturated provider is not hammered the moment a slot frees up.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::RateLimitConfig;
use crate::types::ProviderId;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Outcome of a rate-limit admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The request may proceed; an in-flight slot has been taken.
    Allowed,
    /// The request is denied. `retry_after` is the earliest point at
    /// which a retry could plausibly succeed.
    Denied { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// A bounded sliding window of request timestamps.
#[derive(Debug, Clone)]
struct SlidingWindow {
    limit: u32,
    span: Duration,
    entries: VecDeque<Instant>,
}

impl SlidingWindow {
    fn new(limit: u32, span: Duration) -> Self {
        Self {
            limit,
            span,
            entries: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.entries.front() {
            if now.duration_since(*oldest) >= self.span {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether the window has room, after expiring stale entries.
    fn has_room(&mut self, now: Instant) -> bool {
        self.prune(now);
        (self.entries.len() as u32) < self.limit
    }

    /// Time until the oldest entry leaves the window. Zero if empty.
    fn until_next_slot(&self, now: Instant) -> Duration {
        self.entries
            .front()
            .map(|oldest| self.span.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(Duration::ZERO)
    }

    fn record(&mut self, now: Instant) {
        self.entries.push_back(now);
    }

    /// Entries currently inside the window, without mutating.
    fn occupancy(&self, now: Instant) -> u32 {
        self.entries
            .iter()
            .filter(|t| now.duration_since(**t) < self.span)
            .count() as u32
    }
}

/// Rate state for one provider.
#[derive(Debug)]
struct RateState {
    minute: SlidingWindow,
    hour: SlidingWindow,
    day: SlidingWindow,
    in_flight: u32,
    cooldown_until: Option<Instant>,
}

impl RateState {
    fn new(config: &RateLimitConfig) -> Self {
        Self {
            minute: SlidingWindow::new(config.per_minute, MINUTE),
            hour: SlidingWindow::new(config.per_hour, HOUR),
            day: SlidingWindow::new(config.per_day, DAY),
            in_flight: 0,
            cooldown_until: None,
        }
    }
}

/// Point-in-time rate snapshot for the administrative interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub minute_used: u32,
    pub hour_used: u32,
    pub day_used: u32,
    pub in_flight: u32,
    /// Milliseconds of cooldown remaining, when cooling down.
    pub cooldown_remaining_ms: Option<u64>,
}

/// Sliding-window rate limiter tracking every provider independently.
#[derive(Debug, Default)]
pub struct RateLimiter {
    configs: HashMap<ProviderId, RateLimitConfig>,
    providers: HashMap<ProviderId, RateState>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set per-provider limits. Window history is rebuilt on the next
    /// acquire if the provider has not been seen yet; existing state
    /// keeps its windows.
    pub fn configure(&mut self, provider: ProviderId, config: RateLimitConfig) {
        self.configs.insert(provider, config);
    }

    fn config_for(&self, provider: &ProviderId) -> RateLimitConfig {
        self.configs.get(provider).cloned().unwrap_or_default()
    }

    /// Try to take one request slot for the provider.
    ///
    /// Checks cooldown, concurrency, then all three windows; only when
    /// every check passes is the request recorded and an in-flight slot
    /// taken. A denial starts the provider's cooldown.
    pub fn try_acquire(&mut self, provider: &ProviderId) -> RateDecision {
        let config = self.config_for(provider);
        let now = Instant::now();
        let state = self
            .providers
            .entry(provider.clone())
            .or_insert_with(|| RateState::new(&config));

        if let Some(until) = state.cooldown_until {
            if until > now {
                return RateDecision::Denied {
                    retry_after: until.duration_since(now),
                };
            }
            state.cooldown_until = None;
        }

        let cooldown = Duration::from_secs(config.cooldown_secs);

        if state.in_flight >= config.max_concurrent {
            state.cooldown_until = Some(now + cooldown);
            tracing::debug!(%provider, in_flight = state.in_flight, "concurrency limit reached");
            return RateDecision::Denied {
                retry_after: cooldown.max(Duration::from_millis(100)),
            };
        }

        // All windows must have room before anything is recorded, so a
        // denial never consumes a slot.
        let windows_ok =
            state.minute.has_room(now) && state.hour.has_room(now) && state.day.has_room(now);
        if !windows_ok {
            let until_slot = state
                .minute
                .until_next_slot(now)
                .max(state.hour.until_next_slot(now))
                .max(state.day.until_next_slot(now));
            let retry_after = until_slot.max(cooldown);
            state.cooldown_until = Some(now + retry_after);
            tracing::debug!(%provider, "rate window full, cooling down");
            return RateDecision::Denied { retry_after };
        }

        state.minute.record(now);
        state.hour.record(now);
        state.day.record(now);
        state.in_flight += 1;
        RateDecision::Allowed
    }

    /// Release the in-flight slot taken by a successful
    /// [`RateLimiter::try_acquire`]. Must be called exactly once per
    /// allowed acquire, after the dispatch completes or fails.
    pub fn release(&mut self, provider: &ProviderId) {
        if let Some(state) = self.providers.get_mut(provider) {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }

    /// Snapshot for the administrative interface.
    pub fn snapshot(&self, provider: &ProviderId) -> RateSnapshot {
        let now = Instant::now();
        match self.providers.get(provider) {
            Some(state) => RateSnapshot {
                minute_used: state.minute.occupancy(now),
                hour_used: state.hour.occupancy(now),
                day_used: state.day.occupancy(now),
                in_flight: state.in_flight,
                cooldown_remaining_ms: state
                    .cooldown_until
                    .filter(|until| *until > now)
                    .map(|until| until.duration_since(now).as_millis() as u64),
            },
            None => RateSnapshot {
                minute_used: 0,
                hour_used: 0,
                day_used: 0,
                in_flight: 0,
                cooldown_remaining_ms: None,
            },
        }
    }

    /// Clear all rate state.
    pub fn reset(&mut self) {
        self.providers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_minute: u32, max_concurrent: u32, cooldown_secs: u64) -> (RateLimiter, ProviderId) {
        let mut rl = RateLimiter::new();
        let id = ProviderId::new("brave");
        rl.configure(
            id.clone(),
            RateLimitConfig {
                per_minute,
                per_hour: 10_000,
                per_day: 100_000,
                max_concurrent,
                cooldown_secs,
            },
        );
        (rl, id)
    }

    #[test]
    fn allows_up_to_minute_limit() {
        let (mut rl, id) = limiter(3, 100, 0);
        for _ in 0..3 {
            assert!(rl.try_acquire(&id).is_allowed());
        }
        assert!(!rl.try_acquire(&id).is_allowed());
    }

    #[test]
    fn denial_reports_positive_retry_after() {
        let (mut rl, id) = limiter(1, 100, 30);
        assert!(rl.try_acquire(&id).is_allowed());
        match rl.try_acquire(&id) {
            RateDecision::Denied { retry_after } => {
                assert!(retry_after > Duration::ZERO);
            }
            RateDecision::Allowed => panic!("second acquire should be denied"),
        }
    }

    #[test]
    fn denial_does_not_consume_window_slots() {
        let (mut rl, id) = limiter(2, 100, 0);
        assert!(rl.try_acquire(&id).is_allowed());
        assert!(rl.try_acquire(&id).is_allowed());
        let _ = rl.try_acquire(&id); // denied
        let _ = rl.try_acquire(&id); // denied
        assert_eq!(rl.snapshot(&id).minute_used, 2);
    }

    #[test]
    fn cooldown_rejects_preemptively() {
        let (mut rl, id) = limiter(1, 100, 3_600);
        assert!(rl.try_acquire(&id).is_allowed());
        assert!(!rl.try_acquire(&id).is_allowed());
        // Denied again by cooldown, without re-examining the windows.
        match rl.try_acquire(&id) {
            RateDecision::Denied { retry_after } => assert!(retry_after > Duration::ZERO),
            RateDecision::Allowed => panic!("cooldown should reject"),
        }
        assert!(rl.snapshot(&id).cooldown_remaining_ms.is_some());
    }

    #[test]
    fn concurrency_limit_enforced_and_released() {
        let (mut rl, id) = limiter(100, 1, 0);
        assert!(rl.try_acquire(&id).is_allowed());
        assert!(!rl.try_acquire(&id).is_allowed());
        rl.release(&id);
        assert!(rl.try_acquire(&id).is_allowed());
    }

    #[test]
    fn release_never_underflows() {
        let (mut rl, id) = limiter(10, 10, 0);
        rl.release(&id);
        rl.release(&id);
        assert_eq!(rl.snapshot(&id).in_flight, 0);
    }

    #[test]
    fn providers_tracked_independently() {
        let (mut rl, brave) = limiter(1, 100, 3_600);
        let exa = ProviderId::new("exa");
        rl.configure(
            exa.clone(),
            RateLimitConfig {
                per_minute: 1,
                ..RateLimitConfig::default()
            },
        );
        assert!(rl.try_acquire(&brave).is_allowed());
        assert!(!rl.try_acquire(&brave).is_allowed());
        assert!(rl.try_acquire(&exa).is_allowed());
    }

    #[test]
    fn snapshot_for_unseen_provider_is_zeroed() {
        let rl = RateLimiter::new();
        let snap = rl.snapshot(&ProviderId::new("fresh"));
        assert_eq!(snap.minute_used, 0);
        assert_eq!(snap.in_flight, 0);
        assert!(snap.cooldown_remaining_ms.is_none());
    }

    #[test]
    fn reset_clears_windows() {
        let (mut rl, id) = limiter(1, 100, 3_600);
        assert!(rl.try_acquire(&id).is_allowed());
        assert!(!rl.try_acquire(&id).is_allowed());
        rl.reset();
        assert!(rl.try_acquire(&id).is_allowed());
    }

    #[test]
    fn sliding_window_expires_entries() {
        let mut window = SlidingWindow::new(1, Duration::from_millis(40));
        let start = Instant::now();
        assert!(window.has_room(start));
        window.record(start);
        assert!(!window.has_room(Instant::now()));

        std::thread::sleep(Duration::from_millis(60));
        assert!(window.has_room(Instant::now()));
        assert_eq!(window.occupancy(Instant::now()), 0);
    }

    #[test]
    fn sliding_window_until_next_slot() {
        let mut window = SlidingWindow::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert_eq!(window.until_next_slot(now), Duration::ZERO);
        window.record(now);
        let wait = window.until_next_slot(now);
        assert!(wait > Duration::from_secs(59));
        assert!(wait <= Duration::from_secs(60));
    }
}
