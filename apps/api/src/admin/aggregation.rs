//! Client-side reductions over whole tables for the admin console.
//!
//! Inputs are the complete `profiles`, `quotes` and `tiers` tables as
//! downloaded; nothing is paginated or cached between calls.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::models::profile::{Profile, Tier};
use crate::models::quote::{Quote, QuoteStatus};
use crate::models::tier::TierPlan;

/// Number of calendar months shown in trend charts, ending with the current one.
pub const MONTH_WINDOW: usize = 12;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthBucket {
    /// `YYYY-MM`
    pub month: String,
    pub count: usize,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QuoteSummary {
    pub total: usize,
    pub by_status: BTreeMap<QuoteStatus, usize>,
    pub total_value: f64,
    pub completed_value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_users: usize,
    pub admin_users: usize,
    pub users_by_tier: BTreeMap<Tier, usize>,
    pub users_over_quota: usize,
    pub quotes: QuoteSummary,
    pub monthly_recurring_revenue: f64,
    pub signups_by_month: Vec<MonthBucket>,
    pub quotes_by_month: Vec<MonthBucket>,
}

pub fn month_key<T: Datelike>(date: &T) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// The last `n` month keys ending at `now`, oldest first.
fn month_window(now: DateTime<Utc>, n: usize) -> Vec<String> {
    let current = now.year() * 12 + now.month0() as i32;
    (0..n as i32)
        .rev()
        .map(|back| {
            let index = current - back;
            format!("{:04}-{:02}", index.div_euclid(12), index.rem_euclid(12) + 1)
        })
        .collect()
}

/// Zero-filled monthly buckets; items outside the window are ignored.
pub fn bucket_by_month<T>(
    items: &[T],
    now: DateTime<Utc>,
    date_of: impl Fn(&T) -> DateTime<Utc>,
    amount_of: impl Fn(&T) -> f64,
) -> Vec<MonthBucket> {
    let mut buckets: Vec<MonthBucket> = month_window(now, MONTH_WINDOW)
        .into_iter()
        .map(|month| MonthBucket {
            month,
            count: 0,
            amount: 0.0,
        })
        .collect();

    for item in items {
        let key = month_key(&date_of(item));
        if let Some(bucket) = buckets.iter_mut().find(|b| b.month == key) {
            bucket.count += 1;
            bucket.amount += amount_of(item);
        }
    }
    buckets
}

pub fn summarize_quotes(quotes: &[Quote]) -> QuoteSummary {
    let mut by_status: BTreeMap<QuoteStatus, usize> =
        QuoteStatus::ALL.iter().map(|s| (*s, 0)).collect();
    for quote in quotes {
        *by_status.entry(quote.status).or_default() += 1;
    }

    QuoteSummary {
        total: quotes.len(),
        by_status,
        total_value: quotes.iter().map(|q| q.amount).sum(),
        completed_value: quotes
            .iter()
            .filter(|q| q.status == QuoteStatus::Completed)
            .map(|q| q.amount)
            .sum(),
    }
}

pub fn compute_dashboard(
    profiles: &[Profile],
    quotes: &[Quote],
    tiers: &[TierPlan],
    now: DateTime<Utc>,
) -> DashboardStats {
    let mut users_by_tier: BTreeMap<Tier, usize> = Tier::ALL.iter().map(|t| (*t, 0)).collect();
    for profile in profiles {
        *users_by_tier.entry(profile.tier).or_default() += 1;
    }

    let price_of = |tier: Tier| {
        tiers
            .iter()
            .find(|plan| plan.name == tier)
            .map(|plan| plan.price_kes)
            .unwrap_or(0.0)
    };
    let monthly_recurring_revenue = profiles.iter().map(|p| price_of(p.tier)).sum();

    DashboardStats {
        total_users: profiles.len(),
        admin_users: profiles.iter().filter(|p| p.is_admin).count(),
        users_by_tier,
        users_over_quota: profiles.iter().filter(|p| p.is_over_quota()).count(),
        quotes: summarize_quotes(quotes),
        monthly_recurring_revenue,
        signups_by_month: bucket_by_month(profiles, now, |p| p.created_at, |_| 0.0),
        quotes_by_month: bucket_by_month(quotes, now, |q| q.created_at, |q| q.amount),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn profile(tier: Tier, is_admin: bool, created: DateTime<Utc>) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            email: "p@x.ke".into(),
            full_name: None,
            phone: None,
            tier,
            quotes_used: 3,
            quote_limit: Some(3),
            is_admin,
            created_at: created,
            updated_at: None,
        }
    }

    fn quote(status: QuoteStatus, amount: f64, created: DateTime<Utc>) -> Quote {
        Quote {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            client_name: "Client".into(),
            location: "Nakuru".into(),
            amount,
            status,
            created_at: created,
            updated_at: None,
        }
    }

    fn plan(name: Tier, price: f64) -> TierPlan {
        TierPlan {
            id: Uuid::new_v4(),
            name,
            price_kes: price,
            quote_limit: None,
            features: vec![],
            updated_at: None,
        }
    }

    #[test]
    fn test_month_window_crosses_year_boundary() {
        let window = month_window(at(2026, 2, 15), 4);
        assert_eq!(window, vec!["2025-11", "2025-12", "2026-01", "2026-02"]);
    }

    #[test]
    fn test_buckets_are_zero_filled_and_ignore_old_items() {
        let now = at(2026, 6, 1);
        let quotes = vec![
            quote(QuoteStatus::Draft, 100.0, at(2026, 6, 1)),
            quote(QuoteStatus::Draft, 50.0, at(2026, 6, 20)),
            quote(QuoteStatus::Draft, 75.0, at(2026, 4, 3)),
            quote(QuoteStatus::Draft, 999.0, at(2024, 1, 1)),
        ];
        let buckets = bucket_by_month(&quotes, now, |q| q.created_at, |q| q.amount);
        assert_eq!(buckets.len(), MONTH_WINDOW);
        let last = buckets.last().unwrap();
        assert_eq!(last.month, "2026-06");
        assert_eq!(last.count, 2);
        assert_eq!(last.amount, 150.0);
        let april = buckets.iter().find(|b| b.month == "2026-04").unwrap();
        assert_eq!(april.count, 1);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<usize>(), 3);
    }

    #[test]
    fn test_dashboard_counts_and_revenue() {
        let now = at(2026, 6, 10);
        let profiles = vec![
            profile(Tier::Free, false, at(2026, 5, 1)),
            profile(Tier::Professional, true, at(2026, 6, 2)),
            profile(Tier::Intermediate, false, at(2026, 6, 3)),
            profile(Tier::Intermediate, false, at(2026, 6, 4)),
        ];
        let quotes = vec![
            quote(QuoteStatus::Completed, 200_000.0, at(2026, 6, 1)),
            quote(QuoteStatus::InProgress, 50_000.0, at(2026, 6, 1)),
            quote(QuoteStatus::OnHold, 10_000.0, at(2026, 5, 1)),
        ];
        let tiers = vec![
            plan(Tier::Free, 0.0),
            plan(Tier::Intermediate, 1_500.0),
            plan(Tier::Professional, 4_000.0),
        ];

        let stats = compute_dashboard(&profiles, &quotes, &tiers, now);

        assert_eq!(stats.total_users, 4);
        assert_eq!(stats.admin_users, 1);
        assert_eq!(stats.users_by_tier[&Tier::Intermediate], 2);
        assert_eq!(stats.users_over_quota, 4);
        assert_eq!(stats.quotes.total, 3);
        assert_eq!(stats.quotes.by_status[&QuoteStatus::Started], 0);
        assert_eq!(stats.quotes.completed_value, 200_000.0);
        assert_eq!(stats.quotes.total_value, 260_000.0);
        assert_eq!(stats.monthly_recurring_revenue, 7_000.0);
        assert_eq!(stats.signups_by_month.last().unwrap().count, 3);
    }

    #[test]
    fn test_missing_tier_plan_contributes_nothing() {
        let profiles = vec![profile(Tier::Professional, false, at(2026, 6, 2))];
        let stats = compute_dashboard(&profiles, &[], &[], at(2026, 6, 10));
        assert_eq!(stats.monthly_recurring_revenue, 0.0);
        assert_eq!(stats.quotes.total, 0);
    }
}
