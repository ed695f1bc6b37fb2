//! Per-provider spend tracking and budget enforcement.
//!
//! Estimated costs are reserved before dispatch and settled to the actual
//! figure afterwards, so concurrent queries cannot collectively overshoot
//! a ceiling between check and spend. Daily and monthly counters roll
//! over on civil-date boundaries (UTC). Enforcement is optional per
//! provider: with `enforce` off, over-budget dispatches proceed and are
//! logged at warn.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BudgetConfig;
use crate::types::{Cost, ProviderId};

/// Which configured ceiling a reservation ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetLimit {
    PerQuery,
    Daily,
    Monthly,
}

impl BudgetLimit {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PerQuery => "per-query",
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }
}

/// Outcome of a budget admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    /// The estimate has been reserved against the provider's ceilings.
    Allowed,
    /// A ceiling would be exceeded and enforcement is on.
    Denied { exceeded: BudgetLimit },
}

impl BudgetDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, BudgetDecision::Allowed)
    }
}

/// Spend state for one provider.
#[derive(Debug, Clone)]
struct BudgetState {
    day: NaiveDate,
    month: (i32, u32),
    spent_today: Cost,
    spent_month: Cost,
    reserved: Cost,
}

impl BudgetState {
    fn new(today: NaiveDate) -> Self {
        Self {
            day: today,
            month: (today.year(), today.month()),
            spent_today: Cost::ZERO,
            spent_month: Cost::ZERO,
            reserved: Cost::ZERO,
        }
    }

    fn roll_over(&mut self, today: NaiveDate) {
        if self.day != today {
            self.day = today;
            self.spent_today = Cost::ZERO;
        }
        let month = (today.year(), today.month());
        if self.month != month {
            self.month = month;
            self.spent_month = Cost::ZERO;
        }
    }
}

/// Point-in-time budget snapshot for the administrative interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub spent_today: Cost,
    pub spent_month: Cost,
    pub reserved: Cost,
}

/// Budget tracker covering every provider independently.
#[derive(Debug, Default)]
pub struct BudgetTracker {
    configs: HashMap<ProviderId, BudgetConfig>,
    providers: HashMap<ProviderId, BudgetState>,
}

impl BudgetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set per-provider ceilings. Spend history is preserved.
    pub fn configure(&mut self, provider: ProviderId, config: BudgetConfig) {
        self.configs.insert(provider, config);
    }

    fn config_for(&self, provider: &ProviderId) -> BudgetConfig {
        self.configs.get(provider).cloned().unwrap_or_default()
    }

    /// Reserve an estimated cost against the provider's ceilings.
    ///
    /// On [`BudgetDecision::Allowed`] the caller must later call exactly
    /// one of [`BudgetTracker::settle`] (dispatch completed, actual cost
    /// known) or [`BudgetTracker::cancel`] (dispatch failed, nothing
    /// spent) with the same reserved amount.
    pub fn try_reserve(&mut self, provider: &ProviderId, estimated: Cost) -> BudgetDecision {
        self.try_reserve_on(provider, estimated, Utc::now().date_naive())
    }

    fn try_reserve_on(
        &mut self,
        provider: &ProviderId,
        estimated: Cost,
        today: NaiveDate,
    ) -> BudgetDecision {
        let config = self.config_for(provider);
        let state = self
            .providers
            .entry(provider.clone())
            .or_insert_with(|| BudgetState::new(today));
        state.roll_over(today);

        let committed_today = state.spent_today.saturating_add(state.reserved);
        let committed_month = state.spent_month.saturating_add(state.reserved);

        let exceeded = if estimated > config.per_query {
            Some(BudgetLimit::PerQuery)
        } else if committed_today.saturating_add(estimated) > config.daily {
            Some(BudgetLimit::Daily)
        } else if committed_month.saturating_add(estimated) > config.monthly {
            Some(BudgetLimit::Monthly)
        } else {
            None
        };

        if let Some(limit) = exceeded {
            if config.enforce {
                tracing::debug!(%provider, limit = limit.label(), %estimated, "budget reservation denied");
                return BudgetDecision::Denied { exceeded: limit };
            }
            tracing::warn!(
                %provider,
                limit = limit.label(),
                %estimated,
                "budget limit exceeded but enforcement is off"
            );
        }

        state.reserved = state.reserved.saturating_add(estimated);
        BudgetDecision::Allowed
    }

    /// Settle a reservation: the dispatch completed and cost `actual`.
    pub fn settle(&mut self, provider: &ProviderId, reserved: Cost, actual: Cost) {
        if let Some(state) = self.providers.get_mut(provider) {
            state.reserved = state.reserved.saturating_sub(reserved);
            state.spent_today = state.spent_today.saturating_add(actual);
            state.spent_month = state.spent_month.saturating_add(actual);
        }
    }

    /// Cancel a reservation: the dispatch failed before costing anything.
    pub fn cancel(&mut self, provider: &ProviderId, reserved: Cost) {
        if let Some(state) = self.providers.get_mut(provider) {
            state.reserved = state.reserved.saturating_sub(reserved);
        }
    }

    /// Snapshot for the administrative interface.
    pub fn snapshot(&self, provider: &ProviderId) -> BudgetSnapshot {
        match self.providers.get(provider) {
            Some(state) => BudgetSnapshot {
                spent_today: state.spent_today,
                spent_month: state.spent_month,
                reserved: state.reserved,
            },
            None => BudgetSnapshot {
                spent_today: Cost::ZERO,
                spent_month: Cost::ZERO,
                reserved: Cost::ZERO,
            },
        }
    }

    /// Clear all spend state.
    pub fn reset(&mut self) {
        self.providers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(per_query: Cost, daily: Cost, monthly: Cost, enforce: bool) -> (BudgetTracker, ProviderId) {
        let mut bt = BudgetTracker::new();
        let id = ProviderId::new("exa");
        bt.configure(
            id.clone(),
            BudgetConfig {
                per_query,
                daily,
                monthly,
                enforce,
            },
        );
        (bt, id)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn reserve_within_limits_allowed() {
        let (mut bt, id) = tracker(
            Cost::from_cents(10),
            Cost::from_dollars(1),
            Cost::from_dollars(10),
            true,
        );
        assert!(bt.try_reserve(&id, Cost::from_cents(5)).is_allowed());
        assert_eq!(bt.snapshot(&id).reserved, Cost::from_cents(5));
    }

    #[test]
    fn per_query_ceiling_denies() {
        let (mut bt, id) = tracker(
            Cost::from_cents(1),
            Cost::from_dollars(1),
            Cost::from_dollars(10),
            true,
        );
        match bt.try_reserve(&id, Cost::from_cents(2)) {
            BudgetDecision::Denied { exceeded } => assert_eq!(exceeded, BudgetLimit::PerQuery),
            BudgetDecision::Allowed => panic!("should be denied"),
        }
        assert_eq!(bt.snapshot(&id).reserved, Cost::ZERO);
    }

    #[test]
    fn daily_ceiling_counts_reservations() {
        let (mut bt, id) = tracker(
            Cost::from_cents(60),
            Cost::from_cents(100),
            Cost::from_dollars(10),
            true,
        );
        assert!(bt.try_reserve(&id, Cost::from_cents(60)).is_allowed());
        // 60 reserved + 60 estimated > 100 daily.
        match bt.try_reserve(&id, Cost::from_cents(60)) {
            BudgetDecision::Denied { exceeded } => assert_eq!(exceeded, BudgetLimit::Daily),
            BudgetDecision::Allowed => panic!("should be denied"),
        }
    }

    #[test]
    fn settle_moves_reservation_into_spend() {
        let (mut bt, id) = tracker(
            Cost::from_cents(60),
            Cost::from_cents(100),
            Cost::from_dollars(10),
            true,
        );
        assert!(bt.try_reserve(&id, Cost::from_cents(60)).is_allowed());
        bt.settle(&id, Cost::from_cents(60), Cost::from_cents(40));

        let snap = bt.snapshot(&id);
        assert_eq!(snap.reserved, Cost::ZERO);
        assert_eq!(snap.spent_today, Cost::from_cents(40));
        assert_eq!(snap.spent_month, Cost::from_cents(40));

        // The 20 cents not actually spent are available again.
        assert!(bt.try_reserve(&id, Cost::from_cents(60)).is_allowed());
    }

    #[test]
    fn cancel_releases_reservation_without_spend() {
        let (mut bt, id) = tracker(
            Cost::from_cents(60),
            Cost::from_cents(60),
            Cost::from_dollars(10),
            true,
        );
        assert!(bt.try_reserve(&id, Cost::from_cents(60)).is_allowed());
        assert!(!bt.try_reserve(&id, Cost::from_cents(1)).is_allowed());
        bt.cancel(&id, Cost::from_cents(60));
        assert_eq!(bt.snapshot(&id).spent_today, Cost::ZERO);
        assert!(bt.try_reserve(&id, Cost::from_cents(60)).is_allowed());
    }

    #[test]
    fn enforcement_off_allows_and_records() {
        let (mut bt, id) = tracker(
            Cost::from_cents(1),
            Cost::from_cents(1),
            Cost::from_cents(1),
            false,
        );
        assert!(bt.try_reserve(&id, Cost::from_dollars(1)).is_allowed());
        assert_eq!(bt.snapshot(&id).reserved, Cost::from_dollars(1));
    }

    #[test]
    fn daily_counter_rolls_over() {
        let (mut bt, id) = tracker(
            Cost::from_cents(60),
            Cost::from_cents(100),
            Cost::from_dollars(10),
            true,
        );
        let monday = day(2026, 3, 2);
        assert!(bt.try_reserve_on(&id, Cost::from_cents(60), monday).is_allowed());
        bt.settle(&id, Cost::from_cents(60), Cost::from_cents(60));
        // Saturated for Monday.
        assert!(!bt.try_reserve_on(&id, Cost::from_cents(60), monday).is_allowed());

        // Tuesday: daily resets, monthly carries.
        let tuesday = day(2026, 3, 3);
        assert!(bt.try_reserve_on(&id, Cost::from_cents(60), tuesday).is_allowed());
        let snap = bt.snapshot(&id);
        assert_eq!(snap.spent_today, Cost::ZERO);
        assert_eq!(snap.spent_month, Cost::from_cents(60));
    }

    #[test]
    fn monthly_counter_rolls_over() {
        let (mut bt, id) = tracker(
            Cost::from_dollars(1),
            Cost::from_dollars(1),
            Cost::from_dollars(1),
            true,
        );
        let march = day(2026, 3, 31);
        assert!(bt.try_reserve_on(&id, Cost::from_dollars(1), march).is_allowed());
        bt.settle(&id, Cost::from_dollars(1), Cost::from_dollars(1));
        assert!(!bt.try_reserve_on(&id, Cost::from_dollars(1), march).is_allowed());

        let april = day(2026, 4, 1);
        assert!(bt.try_reserve_on(&id, Cost::from_dollars(1), april).is_allowed());
    }

    #[test]
    fn monthly_ceiling_denies_across_days() {
        let (mut bt, id) = tracker(
            Cost::from_dollars(1),
            Cost::from_dollars(1),
            Cost::from_dollars(1),
            true,
        );
        let first = day(2026, 5, 1);
        assert!(bt.try_reserve_on(&id, Cost::from_dollars(1), first).is_allowed());
        bt.settle(&id, Cost::from_dollars(1), Cost::from_dollars(1));

        let second = day(2026, 5, 2);
        match bt.try_reserve_on(&id, Cost::from_cents(1), second) {
            BudgetDecision::Denied { exceeded } => assert_eq!(exceeded, BudgetLimit::Monthly),
            BudgetDecision::Allowed => panic!("monthly ceiling should deny"),
        }
    }

    #[test]
    fn unknown_provider_snapshot_is_zeroed() {
        let bt = BudgetTracker::new();
        let snap = bt.snapshot(&ProviderId::new("fresh"));
        assert_eq!(snap.spent_today, Cost::ZERO);
        assert_eq!(snap.reserved, Cost::ZERO);
    }

    #[test]
    fn reset_clears_spend() {
        let (mut bt, id) = tracker(
            Cost::from_cents(60),
            Cost::from_cents(60),
            Cost::from_dollars(10),
            true,
        );
        assert!(bt.try_reserve(&id, Cost::from_cents(60)).is_allowed());
        bt.reset();
        assert_eq!(bt.snapshot(&id).reserved, Cost::ZERO);
    }
}
