//! Admission control: the combined rate-limit, budget, and circuit-breaker
//! gate a provider must pass before being dispatched.
//!
//! The three gatekeepers are independent; [`AdmissionControl`] composes
//! them in cheapest-first order (circuit, rate, budget) and owns all
//! mutable per-provider state. The router never touches that state
//! directly — it asks for admission, then reports the outcome through the
//! ticket it was given. Failing any gate removes the provider from the
//! candidate set for that query without aborting the overall search.

pub mod budget;
pub mod circuit_breaker;
pub mod rate_limiter;

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::config::SearchMuxConfig;
use crate::error::ExclusionReason;
use crate::types::{Cost, ProviderId};

pub use budget::{BudgetDecision, BudgetLimit, BudgetSnapshot, BudgetTracker};
pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use rate_limiter::{RateDecision, RateLimiter, RateSnapshot};

/// Proof that a dispatch was admitted, carrying what must be undone.
///
/// Exactly one of [`AdmissionControl::on_success`] or
/// [`AdmissionControl::on_failure`] must consume the ticket once the
/// dispatch finishes, so counters are updated exactly once per logical
/// attempt.
#[derive(Debug)]
pub struct AdmissionTicket {
    provider: ProviderId,
    reserved: Cost,
}

impl AdmissionTicket {
    /// The provider this ticket admits.
    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    /// The cost reserved against the provider's budget.
    pub fn reserved(&self) -> Cost {
        self.reserved
    }
}

/// Read-only per-provider status for external health reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub provider: ProviderId,
    pub circuit: CircuitSnapshot,
    pub rate: RateSnapshot,
    pub budget: BudgetSnapshot,
}

/// Owner of all mutable per-provider dispatch state.
///
/// Each gate sits behind its own mutex; locks are held only for the
/// in-memory check or update, never across an await point.
#[derive(Debug)]
pub struct AdmissionControl {
    circuit: Mutex<CircuitBreaker>,
    rate: Mutex<RateLimiter>,
    budget: Mutex<BudgetTracker>,
}

impl Default for AdmissionControl {
    fn default() -> Self {
        Self {
            circuit: Mutex::new(CircuitBreaker::new()),
            rate: Mutex::new(RateLimiter::new()),
            budget: Mutex::new(BudgetTracker::new()),
        }
    }
}

fn recover<T>(result: std::sync::LockResult<std::sync::MutexGuard<'_, T>>) -> std::sync::MutexGuard<'_, T> {
    // A poisoned gate only means a panic elsewhere mid-update; the
    // underlying counters are still usable.
    result.unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AdmissionControl {
    /// Admission control with default thresholds for every provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admission control configured from per-provider settings.
    pub fn from_config(config: &SearchMuxConfig) -> Self {
        let control = Self::new();
        {
            let mut circuit = recover(control.circuit.lock());
            let mut rate = recover(control.rate.lock());
            let mut budget = recover(control.budget.lock());
            for (id, provider) in &config.providers {
                circuit.configure(id.clone(), provider.circuit.clone());
                rate.configure(id.clone(), provider.rate.clone());
                budget.configure(id.clone(), provider.budget.clone());
            }
        }
        control
    }

    /// Run all three gates for one dispatch attempt.
    ///
    /// Order: circuit breaker (cheapest, fails fast while open), rate
    /// limiter (takes an in-flight slot), budget (reserves the
    /// estimate). If the budget gate denies after the rate gate allowed,
    /// the in-flight slot is released again so the attempt leaves no
    /// trace.
    pub fn admit(
        &self,
        provider: &ProviderId,
        estimated: Cost,
    ) -> Result<AdmissionTicket, ExclusionReason> {
        if !recover(self.circuit.lock()).should_attempt(provider) {
            return Err(ExclusionReason::CircuitOpen);
        }

        match recover(self.rate.lock()).try_acquire(provider) {
            RateDecision::Allowed => {}
            RateDecision::Denied { retry_after } => {
                recover(self.circuit.lock()).abort_probe(provider);
                tracing::debug!(%provider, retry_after_ms = retry_after.as_millis() as u64, "rate limited");
                return Err(ExclusionReason::RateLimited);
            }
        }

        match recover(self.budget.lock()).try_reserve(provider, estimated) {
            BudgetDecision::Allowed => {}
            BudgetDecision::Denied { exceeded } => {
                recover(self.rate.lock()).release(provider);
                recover(self.circuit.lock()).abort_probe(provider);
                tracing::debug!(%provider, limit = exceeded.label(), "over budget");
                return Err(ExclusionReason::OverBudget);
            }
        }

        Ok(AdmissionTicket {
            provider: provider.clone(),
            reserved: estimated,
        })
    }

    /// Record a successful dispatch: close the circuit, free the
    /// in-flight slot, settle the budget reservation at `actual`.
    pub fn on_success(&self, ticket: AdmissionTicket, actual: Cost) {
        recover(self.circuit.lock()).record_success(&ticket.provider);
        recover(self.rate.lock()).release(&ticket.provider);
        recover(self.budget.lock()).settle(&ticket.provider, ticket.reserved, actual);
    }

    /// Record a failed dispatch (timeout or provider error): count a
    /// circuit failure, free the in-flight slot, cancel the reservation.
    pub fn on_failure(&self, ticket: AdmissionTicket) {
        recover(self.circuit.lock()).record_failure(&ticket.provider);
        recover(self.rate.lock()).release(&ticket.provider);
        recover(self.budget.lock()).cancel(&ticket.provider, ticket.reserved);
    }

    /// Current circuit state without mutating it. Unlike the admission
    /// path this never starts a half-open probe.
    pub fn circuit_state(&self, provider: &ProviderId) -> CircuitState {
        recover(self.circuit.lock()).state(provider)
    }

    /// Read-only status for one provider.
    pub fn status(&self, provider: &ProviderId) -> ProviderStatus {
        ProviderStatus {
            provider: provider.clone(),
            circuit: recover(self.circuit.lock()).snapshot(provider),
            rate: recover(self.rate.lock()).snapshot(provider),
            budget: recover(self.budget.lock()).snapshot(provider),
        }
    }

    /// Read-only status for a set of providers, in the given order.
    pub fn status_all(&self, providers: &[ProviderId]) -> Vec<ProviderStatus> {
        providers.iter().map(|id| self.status(id)).collect()
    }

    /// Clear all gates back to their initial state.
    pub fn reset(&self) {
        recover(self.circuit.lock()).reset();
        recover(self.rate.lock()).reset();
        recover(self.budget.lock()).reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BudgetConfig, CircuitBreakerConfig, ProviderConfig, RateLimitConfig};

    fn config_with(id: &str, provider: ProviderConfig) -> SearchMuxConfig {
        let mut config = SearchMuxConfig::default();
        config.providers.insert(ProviderId::new(id), provider);
        config
    }

    #[test]
    fn admit_happy_path_issues_ticket() {
        let control = AdmissionControl::new();
        let id = ProviderId::new("brave");
        let ticket = control.admit(&id, Cost::from_cents(1)).expect("admitted");
        assert_eq!(ticket.provider(), &id);
        assert_eq!(ticket.reserved(), Cost::from_cents(1));
        assert_eq!(control.status(&id).rate.in_flight, 1);
        control.on_success(ticket, Cost::from_cents(1));
        assert_eq!(control.status(&id).rate.in_flight, 0);
    }

    #[test]
    fn circuit_open_denies_without_dispatch() {
        let provider = ProviderConfig {
            circuit: CircuitBreakerConfig {
                failure_threshold: 1,
                recovery_secs: 600,
            },
            ..ProviderConfig::default()
        };
        let control = AdmissionControl::from_config(&config_with("brave", provider));
        let id = ProviderId::new("brave");

        let ticket = control.admit(&id, Cost::ZERO).expect("first admitted");
        control.on_failure(ticket);

        assert_eq!(control.circuit_state(&id), CircuitState::Open);
        assert_eq!(
            control.admit(&id, Cost::ZERO).unwrap_err(),
            ExclusionReason::CircuitOpen
        );
    }

    #[test]
    fn rate_denial_maps_to_rate_limited() {
        let provider = ProviderConfig {
            rate: RateLimitConfig {
                per_minute: 1,
                cooldown_secs: 600,
                ..RateLimitConfig::default()
            },
            ..ProviderConfig::default()
        };
        let control = AdmissionControl::from_config(&config_with("exa", provider));
        let id = ProviderId::new("exa");

        let ticket = control.admit(&id, Cost::ZERO).expect("first admitted");
        control.on_success(ticket, Cost::ZERO);
        assert_eq!(
            control.admit(&id, Cost::ZERO).unwrap_err(),
            ExclusionReason::RateLimited
        );
    }

    #[test]
    fn budget_denial_releases_rate_slot() {
        let provider = ProviderConfig {
            budget: BudgetConfig {
                per_query: Cost::from_cents(1),
                ..BudgetConfig::default()
            },
            ..ProviderConfig::default()
        };
        let control = AdmissionControl::from_config(&config_with("kagi", provider));
        let id = ProviderId::new("kagi");

        assert_eq!(
            control.admit(&id, Cost::from_cents(5)).unwrap_err(),
            ExclusionReason::OverBudget
        );
        // The in-flight slot taken by the rate gate was handed back.
        assert_eq!(control.status(&id).rate.in_flight, 0);
    }

    #[test]
    fn failure_cancels_reservation() {
        let control = AdmissionControl::new();
        let id = ProviderId::new("brave");
        let ticket = control.admit(&id, Cost::from_cents(3)).expect("admitted");
        assert_eq!(control.status(&id).budget.reserved, Cost::from_cents(3));
        control.on_failure(ticket);
        let status = control.status(&id);
        assert_eq!(status.budget.reserved, Cost::ZERO);
        assert_eq!(status.budget.spent_today, Cost::ZERO);
        assert_eq!(status.circuit.consecutive_failures, 1);
    }

    #[test]
    fn success_settles_at_actual_cost() {
        let control = AdmissionControl::new();
        let id = ProviderId::new("brave");
        let ticket = control.admit(&id, Cost::from_cents(5)).expect("admitted");
        control.on_success(ticket, Cost::from_cents(2));
        let status = control.status(&id);
        assert_eq!(status.budget.spent_today, Cost::from_cents(2));
        assert_eq!(status.budget.reserved, Cost::ZERO);
    }

    #[test]
    fn exactly_threshold_failures_deny_then_half_open_probe() {
        let provider = ProviderConfig {
            circuit: CircuitBreakerConfig {
                failure_threshold: 2,
                recovery_secs: 0,
            },
            ..ProviderConfig::default()
        };
        let control = AdmissionControl::from_config(&config_with("brave", provider));
        let id = ProviderId::new("brave");

        for _ in 0..2 {
            let ticket = control.admit(&id, Cost::ZERO).expect("admitted");
            control.on_failure(ticket);
        }
        assert_eq!(control.circuit_state(&id), CircuitState::Open);

        // Zero recovery: next admission is the single half-open probe.
        let probe = control.admit(&id, Cost::ZERO).expect("probe admitted");
        assert_eq!(control.circuit_state(&id), CircuitState::HalfOpen);
        control.on_success(probe, Cost::ZERO);
        assert_eq!(control.circuit_state(&id), CircuitState::Closed);
    }

    #[test]
    fn status_all_preserves_order() {
        let control = AdmissionControl::new();
        let ids = vec![ProviderId::new("z"), ProviderId::new("a")];
        let statuses = control.status_all(&ids);
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].provider, ProviderId::new("z"));
    }

    #[test]
    fn reset_restores_all_gates() {
        let provider = ProviderConfig {
            circuit: CircuitBreakerConfig {
                failure_threshold: 1,
                recovery_secs: 600,
            },
            ..ProviderConfig::default()
        };
        let control = AdmissionControl::from_config(&config_with("brave", provider));
        let id = ProviderId::new("brave");
        let ticket = control.admit(&id, Cost::ZERO).expect("admitted");
        control.on_failure(ticket);
        assert!(control.admit(&id, Cost::ZERO).is_err());

        control.reset();
        assert!(control.admit(&id, Cost::ZERO).is_ok());
    }
}
