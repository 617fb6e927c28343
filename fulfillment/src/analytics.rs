//! Read-only rollups over returns and payouts.
//!
//! Every report is filtered to a trailing [`Period`] ending at `now` and,
//! where it makes sense, to a single vendor. Nothing here mutates the
//! ledger, so reports are safe to run alongside live commands.

use crate::config::RiskPolicy;
use crate::ledger::Ledger;
use marketplace_core::returns::{ReturnReason, ReturnRequest};
use marketplace_core::{
    DateTime, Duration, FulfillmentStatus, Money, PayoutStatus, ReturnStatus, UserId, Utc,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Trailing reporting window
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    /// `7d`
    Week,
    /// `30d`
    Month,
    /// `90d`
    Quarter,
    /// `1y`
    Year,
}

impl Period {
    /// Wire form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Week => "7d",
            Self::Month => "30d",
            Self::Quarter => "90d",
            Self::Year => "1y",
        }
    }

    /// Length of the window
    #[must_use]
    pub fn duration(self) -> Duration {
        match self {
            Self::Week => Duration::days(7),
            Self::Month => Duration::days(30),
            Self::Quarter => Duration::days(90),
            Self::Year => Duration::days(365),
        }
    }

    /// Start of the window ending at `now`
    #[must_use]
    pub fn since(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown period string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown period `{0}`, expected 7d, 30d, 90d or 1y")]
pub struct ParsePeriodError(pub String);

impl FromStr for Period {
    type Err = ParsePeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "7d" => Ok(Self::Week),
            "30d" => Ok(Self::Month),
            "90d" => Ok(Self::Quarter),
            "1y" => Ok(Self::Year),
            other => Err(ParsePeriodError(other.to_string())),
        }
    }
}

/// Requests and amounts for one reason code
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonStats {
    /// Reason
    pub reason: ReturnReason,
    /// Requests filed with this reason
    pub count: usize,
    /// Sum of requested amounts
    pub requested: Money,
}

/// Return/refund rollup for a period
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefundAnalytics {
    /// Window
    pub period: Period,
    /// Vendor filter, if any
    pub vendor_id: Option<UserId>,
    /// Requests filed in the window
    pub total: usize,
    /// Still pending
    pub pending: usize,
    /// Approved, not yet completed
    pub approved: usize,
    /// Rejected
    pub rejected: usize,
    /// Completed
    pub completed: usize,
    /// `(approved + completed) / decided`, zero when nothing was decided
    pub approval_rate: f64,
    /// Mean time from request to decision
    pub average_processing_time: Option<Duration>,
    /// Sum of approved and completed refunds
    pub refunded: Money,
    /// Breakdown by reason, in [`ReturnReason::ALL`] order, reasons with no
    /// requests omitted
    pub by_reason: Vec<ReasonStats>,
}

/// Risk bucket
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Score at or below the medium threshold
    Low,
    /// Score above the medium threshold
    Medium,
    /// Score above the high threshold
    High,
}

impl RiskLevel {
    /// Buckets a score under `policy`
    #[must_use]
    pub fn classify(score: f64, policy: &RiskPolicy) -> Self {
        if score > policy.high_threshold {
            Self::High
        } else if score > policy.medium_threshold {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Upper-case tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One vendor's risk for a period
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VendorRisk {
    /// Vendor
    pub vendor_id: UserId,
    /// Items delivered in the window
    pub delivered_items: usize,
    /// Return requests filed in the window
    pub returns: usize,
    /// `returns / max(delivered_items, returns)`
    pub refund_rate: f64,
    /// Mean response time; pending requests count with their current age
    pub average_response: Option<Duration>,
    /// Blended score in `[0, 1]`
    pub score: f64,
    /// Bucket
    pub level: RiskLevel,
}

/// Payout rollup for a period
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutSummary {
    /// Window
    pub period: Period,
    /// Vendor filter, if any
    pub vendor_id: Option<UserId>,
    /// Completed payouts
    pub completed_count: usize,
    /// Completed amount
    pub completed_amount: Money,
    /// Pending or processing payouts
    pub pending_count: usize,
    /// Amount still held
    pub pending_amount: Money,
    /// Failed payouts
    pub failed_count: usize,
    /// Failed amount
    pub failed_amount: Money,
}

fn in_window<'a>(
    ledger: &'a Ledger,
    since: DateTime<Utc>,
    vendor: Option<UserId>,
) -> impl Iterator<Item = &'a ReturnRequest> {
    ledger.returns().filter(move |request| {
        request.requested_at >= since && vendor.is_none_or(|v| v == request.vendor_id)
    })
}

fn mean(durations: &[Duration]) -> Option<Duration> {
    let count = i32::try_from(durations.len()).ok().filter(|n| *n > 0)?;
    let total = durations
        .iter()
        .fold(Duration::zero(), |acc, duration| acc + *duration);
    Some(total / count)
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[allow(clippy::cast_precision_loss)]
fn hours(duration: Duration) -> f64 {
    duration.num_seconds() as f64 / 3600.0
}

/// Return/refund rollup.
#[must_use]
pub fn refund_analytics(
    ledger: &Ledger,
    period: Period,
    vendor: Option<UserId>,
    now: DateTime<Utc>,
) -> RefundAnalytics {
    let requests: Vec<&ReturnRequest> = in_window(ledger, period.since(now), vendor).collect();
    let count = |status: ReturnStatus| requests.iter().filter(|r| r.status == status).count();
    let pending = count(ReturnStatus::Pending);
    let approved = count(ReturnStatus::Approved);
    let rejected = count(ReturnStatus::Rejected);
    let completed = count(ReturnStatus::Completed);

    let processing: Vec<Duration> = requests
        .iter()
        .filter_map(|request| request.processing_time())
        .collect();

    let mut by_reason: HashMap<ReturnReason, ReasonStats> = HashMap::new();
    for request in &requests {
        let stats = by_reason.entry(request.reason).or_insert(ReasonStats {
            reason: request.reason,
            count: 0,
            requested: Money::ZERO,
        });
        stats.count += 1;
        stats.requested += request.requested_amount;
    }

    RefundAnalytics {
        period,
        vendor_id: vendor,
        total: requests.len(),
        pending,
        approved,
        rejected,
        completed,
        approval_rate: ratio(approved + completed, approved + completed + rejected),
        average_processing_time: mean(&processing),
        refunded: requests
            .iter()
            .filter(|request| request.counts_as_refund())
            .map(|request| request.requested_amount)
            .sum(),
        by_reason: ReturnReason::ALL
            .iter()
            .filter_map(|reason| by_reason.remove(reason))
            .collect(),
    }
}

/// Per-vendor risk, highest score first.
///
/// Covers every vendor with a delivery or a return request in the window.
#[must_use]
pub fn vendor_risk(
    ledger: &Ledger,
    period: Period,
    policy: &RiskPolicy,
    now: DateTime<Utc>,
) -> Vec<VendorRisk> {
    let since = period.since(now);

    let mut delivered: HashMap<UserId, usize> = HashMap::new();
    for item in ledger.items().filter(|item| {
        item.status == FulfillmentStatus::Delivered
            && item.delivered_at.is_some_and(|at| at >= since)
    }) {
        *delivered.entry(item.vendor_id).or_default() += 1;
    }

    let mut responses: HashMap<UserId, Vec<Duration>> = HashMap::new();
    for request in in_window(ledger, since, None) {
        let response = request
            .processing_time()
            .unwrap_or_else(|| request.age(now));
        responses.entry(request.vendor_id).or_default().push(response);
    }

    let mut vendors: Vec<UserId> = delivered.keys().chain(responses.keys()).copied().collect();
    vendors.sort_unstable();
    vendors.dedup();

    let mut report: Vec<VendorRisk> = vendors
        .into_iter()
        .map(|vendor_id| {
            let delivered_items = delivered.get(&vendor_id).copied().unwrap_or(0);
            let times = responses.get(&vendor_id).map_or(&[][..], Vec::as_slice);
            let returns = times.len();
            let refund_rate = ratio(returns, delivered_items.max(returns));
            let average_response = mean(times);
            let response_factor = average_response
                .map_or(0.0, |avg| (hours(avg) / policy.response_ceiling_hours).min(1.0));
            let score = policy
                .refund_weight
                .mul_add(refund_rate, policy.response_weight * response_factor);
            VendorRisk {
                vendor_id,
                delivered_items,
                returns,
                refund_rate,
                average_response,
                score,
                level: RiskLevel::classify(score, policy),
            }
        })
        .collect();
    report.sort_by(|a, b| b.score.total_cmp(&a.score));
    report
}

/// Payout rollup by status.
#[must_use]
pub fn payout_summary(
    ledger: &Ledger,
    period: Period,
    vendor: Option<UserId>,
    now: DateTime<Utc>,
) -> PayoutSummary {
    let since = period.since(now);
    let mut summary = PayoutSummary {
        period,
        vendor_id: vendor,
        completed_count: 0,
        completed_amount: Money::ZERO,
        pending_count: 0,
        pending_amount: Money::ZERO,
        failed_count: 0,
        failed_amount: Money::ZERO,
    };
    for payout in ledger.payouts().filter(|payout| {
        payout.requested_at >= since && vendor.is_none_or(|v| v == payout.vendor_id)
    }) {
        match payout.status {
            PayoutStatus::Completed => {
                summary.completed_count += 1;
                summary.completed_amount += payout.amount;
            },
            PayoutStatus::Pending | PayoutStatus::Processing => {
                summary.pending_count += 1;
                summary.pending_amount += payout.amount;
            },
            PayoutStatus::Failed => {
                summary.failed_count += 1;
                summary.failed_amount += payout.amount;
            },
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periods_parse() {
        assert_eq!("7d".parse(), Ok(Period::Week));
        assert_eq!("30d".parse(), Ok(Period::Month));
        assert_eq!("90d".parse(), Ok(Period::Quarter));
        assert_eq!("1y".parse(), Ok(Period::Year));
        assert!("2w".parse::<Period>().is_err());
    }

    #[test]
    fn thresholds_are_strict() {
        let policy = RiskPolicy::default();
        assert_eq!(RiskLevel::classify(0.7, &policy), RiskLevel::Medium);
        assert_eq!(RiskLevel::classify(0.71, &policy), RiskLevel::High);
        assert_eq!(RiskLevel::classify(0.4, &policy), RiskLevel::Low);
    }

    #[test]
    fn mean_of_nothing_is_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(
            mean(&[Duration::hours(2), Duration::hours(4)]),
            Some(Duration::hours(3))
        );
    }

    #[test]
    fn empty_ledger_reports_zeroes() {
        let ledger = Ledger::new();
        let now = Utc::now();
        let report = refund_analytics(&ledger, Period::Month, None, now);
        assert_eq!(report.total, 0);
        assert!(report.approval_rate.abs() < f64::EPSILON);
        assert!(vendor_risk(&ledger, Period::Month, &RiskPolicy::default(), now).is_empty());
        assert_eq!(payout_summary(&ledger, Period::Year, None, now).completed_count, 0);
    }
}
