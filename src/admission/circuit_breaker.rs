//! Per-provider circuit breaker.
//!
//! Tracks consecutive failures per provider and temporarily removes
//! providers that fail repeatedly from the candidate set. After a
//! recovery timeout, a tripped provider enters a half-open state where a
//! single probe dispatch decides whether to restore or re-trip the
//! circuit.
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐  N failures   ┌────────┐  recovery   ┌──────────┐
//! │ Closed ├──────────────►│  Open  ├────────────►│ HalfOpen │
//! └───▲────┘               └────────┘             └────┬─────┘
//!     │                         ▲                      │
//!     │  success                │  failure             │
//!     └─────────────────────────┴──────────────────────┘
//! ```

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::CircuitBreakerConfig;
use crate::types::ProviderId;

/// Circuit breaker state for a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Provider is healthy — dispatches are allowed through.
    Closed,
    /// Provider has failed too many times — dispatches are denied until
    /// the recovery timeout elapses.
    Open,
    /// Recovery timeout has elapsed — one probe dispatch is allowed.
    HalfOpen,
}

/// Health tracking for a single provider.
#[derive(Debug, Clone)]
struct ProviderHealth {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    last_success_at: Option<Instant>,
    /// A half-open probe has been admitted and has not resolved yet.
    probing: bool,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            last_success_at: None,
            probing: false,
        }
    }
}

/// Point-in-time circuit snapshot for the administrative interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Seconds since the last success, when one has been seen.
    pub secs_since_success: Option<u64>,
}

/// Circuit breaker tracking every provider independently.
///
/// Thresholds and recovery timeout come from per-provider configuration
/// registered via [`CircuitBreaker::configure`]; unconfigured providers
/// use [`CircuitBreakerConfig::default`].
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    configs: HashMap<ProviderId, CircuitBreakerConfig>,
    providers: HashMap<ProviderId, ProviderHealth>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set per-provider thresholds. Replaces any previous configuration
    /// for the same provider; existing health state is preserved.
    pub fn configure(&mut self, provider: ProviderId, config: CircuitBreakerConfig) {
        self.configs.insert(provider, config);
    }

    fn config_for(&self, provider: &ProviderId) -> CircuitBreakerConfig {
        self.configs.get(provider).cloned().unwrap_or_default()
    }

    /// Record a successful dispatch.
    ///
    /// Resets the consecutive failure count and closes the circuit
    /// regardless of previous state — a half-open probe that succeeds
    /// restores the provider.
    pub fn record_success(&mut self, provider: &ProviderId) {
        let health = self.providers.entry(provider.clone()).or_default();
        health.state = CircuitState::Closed;
        health.consecutive_failures = 0;
        health.probing = false;
        health.last_success_at = Some(Instant::now());
    }

    /// Record a failed dispatch (timeout or provider error).
    ///
    /// Trips the circuit to open when consecutive failures reach the
    /// provider's threshold. A failed half-open probe re-trips
    /// immediately.
    pub fn record_failure(&mut self, provider: &ProviderId) {
        let threshold = self.config_for(provider).failure_threshold;
        let health = self.providers.entry(provider.clone()).or_default();
        health.consecutive_failures += 1;
        health.last_failure_at = Some(Instant::now());

        if health.state == CircuitState::HalfOpen || health.consecutive_failures >= threshold {
            health.state = CircuitState::Open;
        }
        health.probing = false;
    }

    /// Whether a dispatch to the provider should be attempted.
    ///
    /// - `Closed`: always `true`
    /// - `Open`: `true` only once the recovery timeout has elapsed
    ///   (transitions to `HalfOpen` and takes the probe slot)
    /// - `HalfOpen`: `true` only if no probe is currently in flight —
    ///   exactly one attempt passes before the circuit resolves
    ///
    /// A caller whose probe never reaches dispatch (denied by a later
    /// gate) must hand the slot back via [`CircuitBreaker::abort_probe`].
    pub fn should_attempt(&mut self, provider: &ProviderId) -> bool {
        let recovery_secs = self.config_for(provider).recovery_secs;
        let health = self.providers.entry(provider.clone()).or_default();

        match health.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if health.probing {
                    false
                } else {
                    health.probing = true;
                    true
                }
            }
            CircuitState::Open => {
                let recovered = health
                    .last_failure_at
                    .is_none_or(|t| t.elapsed().as_secs() >= recovery_secs);
                if recovered {
                    health.state = CircuitState::HalfOpen;
                    health.probing = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Return an unused half-open probe slot. Called when admission
    /// passed the circuit gate but a later gate denied the dispatch.
    pub fn abort_probe(&mut self, provider: &ProviderId) {
        if let Some(health) = self.providers.get_mut(provider) {
            if health.state == CircuitState::HalfOpen {
                health.probing = false;
            }
        }
    }

    /// Current circuit state for one provider.
    pub fn state(&self, provider: &ProviderId) -> CircuitState {
        self.providers
            .get(provider)
            .map_or(CircuitState::Closed, |h| h.state)
    }

    /// Snapshot for the administrative interface. Providers never seen
    /// report a closed circuit with zero failures.
    pub fn snapshot(&self, provider: &ProviderId) -> CircuitSnapshot {
        match self.providers.get(provider) {
            Some(health) => CircuitSnapshot {
                state: health.state,
                consecutive_failures: health.consecutive_failures,
                secs_since_success: health.last_success_at.map(|t| t.elapsed().as_secs()),
            },
            None => CircuitSnapshot {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                secs_since_success: None,
            },
        }
    }

    /// Reset all providers to healthy.
    pub fn reset(&mut self) {
        self.providers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery_secs: u64) -> (CircuitBreaker, ProviderId) {
        let mut cb = CircuitBreaker::new();
        let id = ProviderId::new("brave");
        cb.configure(
            id.clone(),
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_secs,
            },
        );
        (cb, id)
    }

    #[test]
    fn initial_state_is_closed() {
        let (cb, id) = breaker(3, 60);
        assert_eq!(cb.state(&id), CircuitState::Closed);
        assert_eq!(cb.state(&ProviderId::new("never-seen")), CircuitState::Closed);
    }

    #[test]
    fn stays_closed_below_threshold() {
        let (mut cb, id) = breaker(3, 60);
        cb.record_failure(&id);
        cb.record_failure(&id);
        assert_eq!(cb.state(&id), CircuitState::Closed);
        assert!(cb.should_attempt(&id));
    }

    #[test]
    fn trips_open_at_exactly_threshold() {
        let (mut cb, id) = breaker(3, 600);
        for _ in 0..3 {
            cb.record_failure(&id);
        }
        assert_eq!(cb.state(&id), CircuitState::Open);
        assert!(!cb.should_attempt(&id));
    }

    #[test]
    fn open_transitions_to_half_open_after_recovery() {
        let (mut cb, id) = breaker(3, 0);
        for _ in 0..3 {
            cb.record_failure(&id);
        }
        assert_eq!(cb.state(&id), CircuitState::Open);

        // Zero recovery timeout: the next check is the half-open probe.
        assert!(cb.should_attempt(&id));
        assert_eq!(cb.state(&id), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_success_closes() {
        let (mut cb, id) = breaker(3, 0);
        for _ in 0..3 {
            cb.record_failure(&id);
        }
        let _ = cb.should_attempt(&id);
        cb.record_success(&id);
        assert_eq!(cb.state(&id), CircuitState::Closed);
        assert_eq!(cb.snapshot(&id).consecutive_failures, 0);
    }

    #[test]
    fn half_open_failure_retrips_immediately() {
        let (mut cb, id) = breaker(3, 0);
        for _ in 0..3 {
            cb.record_failure(&id);
        }
        let _ = cb.should_attempt(&id); // → HalfOpen
        cb.record_failure(&id); // probe fails
        assert_eq!(cb.state(&id), CircuitState::Open);
    }

    #[test]
    fn success_resets_failure_count() {
        let (mut cb, id) = breaker(5, 60);
        cb.record_failure(&id);
        cb.record_failure(&id);
        cb.record_success(&id);
        assert_eq!(cb.snapshot(&id).consecutive_failures, 0);

        // Alternating failure/success never trips.
        for _ in 0..10 {
            cb.record_failure(&id);
            cb.record_success(&id);
        }
        assert_eq!(cb.state(&id), CircuitState::Closed);
    }

    #[test]
    fn providers_are_independent() {
        let (mut cb, brave) = breaker(2, 60);
        let exa = ProviderId::new("exa");
        cb.record_failure(&brave);
        cb.record_failure(&brave);
        assert_eq!(cb.state(&brave), CircuitState::Open);
        assert_eq!(cb.state(&exa), CircuitState::Closed);
        assert!(cb.should_attempt(&exa));
    }

    #[test]
    fn unconfigured_provider_uses_defaults() {
        let mut cb = CircuitBreaker::new();
        let id = ProviderId::new("unconfigured");
        // Default threshold is 3.
        cb.record_failure(&id);
        cb.record_failure(&id);
        assert_eq!(cb.state(&id), CircuitState::Closed);
        cb.record_failure(&id);
        assert_eq!(cb.state(&id), CircuitState::Open);
    }

    #[test]
    fn reset_clears_all_state() {
        let (mut cb, id) = breaker(1, 600);
        cb.record_failure(&id);
        assert_eq!(cb.state(&id), CircuitState::Open);
        cb.reset();
        assert_eq!(cb.state(&id), CircuitState::Closed);
        assert!(cb.should_attempt(&id));
    }

    #[test]
    fn half_open_admits_exactly_one_probe() {
        let (mut cb, id) = breaker(1, 0);
        cb.record_failure(&id); // → Open
        assert!(cb.should_attempt(&id)); // the probe
        assert_eq!(cb.state(&id), CircuitState::HalfOpen);

        // Probe unresolved: nothing else gets through.
        assert!(!cb.should_attempt(&id));
        assert!(!cb.should_attempt(&id));

        cb.record_success(&id);
        assert_eq!(cb.state(&id), CircuitState::Closed);
        assert!(cb.should_attempt(&id));
    }

    #[test]
    fn aborted_probe_frees_the_slot() {
        let (mut cb, id) = breaker(1, 0);
        cb.record_failure(&id);
        assert!(cb.should_attempt(&id)); // probe taken
        assert!(!cb.should_attempt(&id));

        // The probe never dispatched (a later gate denied it).
        cb.abort_probe(&id);
        assert!(cb.should_attempt(&id));
    }

    #[test]
    fn snapshot_for_unseen_provider_is_closed() {
        let cb = CircuitBreaker::new();
        let snap = cb.snapshot(&ProviderId::new("fresh"));
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.consecutive_failures, 0);
        assert!(snap.secs_since_success.is_none());
    }
}
