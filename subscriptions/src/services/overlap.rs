//! Temporal overlap arithmetic for windowed cost sums.
//!
//! Everything here is pure: callers fetch the candidate subscriptions first and
//! hand them in, so the rules can be exercised without a store.

use serde::Serialize;
use uuid::Uuid;

use crate::models::{ActiveInterval, Month, Period, Subscription};

/// Cost one subscription contributes to a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contribution {
    pub subscription_id: Uuid,
    pub service_name: String,
    pub months: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CostBreakdown {
    pub total: i64,
    pub contributions: Vec<Contribution>,
}

/// Clip an active interval to `period`.
///
/// Returns `None` when they do not intersect. An open-ended interval is
/// clipped at `period.end`.
pub fn clip(interval: &ActiveInterval, period: &Period) -> Option<(Month, Month)> {
    let effective_start = interval.start().max(period.start);
    let effective_end = match interval.end() {
        Some(end) => end.min(period.end),
        None => period.end,
    };

    if effective_start > effective_end {
        return None;
    }
    Some((effective_start, effective_end))
}

/// Inclusive number of months of `interval` that fall inside `period`.
pub fn overlap_months(interval: &ActiveInterval, period: &Period) -> i64 {
    clip(interval, period)
        .map(|(start, end)| start.months_through(end))
        .unwrap_or(0)
}

pub fn contribution(subscription: &Subscription, period: &Period) -> Option<Contribution> {
    let months = overlap_months(&subscription.interval, period);
    if months == 0 {
        return None;
    }

    Some(Contribution {
        subscription_id: subscription.id,
        service_name: subscription.service_name.clone(),
        months,
        amount: subscription.price.saturating_mul(months),
    })
}

/// Per-subscription contributions and their total. Non-overlapping
/// candidates are left out entirely.
pub fn breakdown(candidates: &[Subscription], period: &Period) -> CostBreakdown {
    let contributions: Vec<Contribution> = candidates
        .iter()
        .filter_map(|s| contribution(s, period))
        .collect();
    let total = contributions
        .iter()
        .fold(0i64, |acc, c| acc.saturating_add(c.amount));

    CostBreakdown { total, contributions }
}

pub fn total_cost(candidates: &[Subscription], period: &Period) -> i64 {
    breakdown(candidates, period).total
}
