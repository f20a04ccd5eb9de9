use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::{minor_to_major, Charge, Dispute, Record, Refund};
use crate::orchestrator::ReportRow;
use crate::range::ReportRange;

/// One calendar day of activity for one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyBucket {
    pub account_id: String,
    pub date: NaiveDate,
    pub charges_count: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub charges_amount: Decimal,
    pub refunds_count: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub refunds_amount: Decimal,
    pub disputes_count: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub disputes_amount: Decimal,
    pub declines_count: u64,
    /// Charges as a share of charge attempts (charges + declines), 0-100.
    #[serde(with = "rust_decimal::serde::float")]
    pub aprvl_pct: Decimal,
    /// Monetary movements on the day: charges + refunds + disputes.
    pub net_count: u64,
    /// Charges minus refunds minus disputes.
    #[serde(with = "rust_decimal::serde::float")]
    pub net_amount: Decimal,
}

impl ReportRow for DailyBucket {
    fn sort_key(&self) -> i64 {
        i64::from(self.date.num_days_from_ce())
    }
}

// Running totals kept in minor units until the day is finalized.
#[derive(Debug, Default)]
struct DayTotals {
    charges: u64,
    charges_minor: i64,
    refunds: u64,
    refunds_minor: i64,
    disputes: u64,
    disputes_minor: i64,
    declines: u64,
}

impl DayTotals {
    fn into_bucket(self, account_id: &str, date: NaiveDate) -> DailyBucket {
        let net_minor = self.charges_minor - self.refunds_minor - self.disputes_minor;
        DailyBucket {
            account_id: account_id.to_string(),
            date,
            charges_count: self.charges,
            charges_amount: round2(minor_to_major(self.charges_minor)),
            refunds_count: self.refunds,
            refunds_amount: round2(minor_to_major(self.refunds_minor)),
            disputes_count: self.disputes,
            disputes_amount: round2(minor_to_major(self.disputes_minor)),
            declines_count: self.declines,
            aprvl_pct: approval_pct(self.charges, self.declines),
            net_count: self.charges + self.refunds + self.disputes,
            net_amount: round2(minor_to_major(net_minor)),
        }
    }
}

/// Share of attempts that succeeded, rounded to 2 places. A day without
/// attempts reads as 100.
pub fn approval_pct(charges: u64, declines: u64) -> Decimal {
    let attempts = charges + declines;
    if attempts == 0 {
        return Decimal::ONE_HUNDRED;
    }
    round2(Decimal::from(charges) * Decimal::ONE_HUNDRED / Decimal::from(attempts))
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp(2)
}

/// Buckets records into one slot per calendar day of `range`, in the range's
/// timezone. Days without records are zero-filled; records whose local date
/// lands outside the range are dropped.
pub fn aggregate_by_day(
    charges: &[Charge],
    refunds: &[Refund],
    disputes: &[Dispute],
    declines: &[Charge],
    range: &ReportRange,
    account_id: &str,
) -> Vec<DailyBucket> {
    let mut days: BTreeMap<NaiveDate, DayTotals> =
        range.days().map(|d| (d, DayTotals::default())).collect();
    let mut dropped = 0usize;

    for charge in charges {
        if let Some(day) = slot(&mut days, range, charge, &mut dropped) {
            day.charges += 1;
            day.charges_minor += charge.amount;
        }
    }
    for refund in refunds {
        if let Some(day) = slot(&mut days, range, refund, &mut dropped) {
            day.refunds += 1;
            day.refunds_minor += refund.amount;
        }
    }
    for dispute in disputes {
        if let Some(day) = slot(&mut days, range, dispute, &mut dropped) {
            day.disputes += 1;
            day.disputes_minor += dispute.amount;
        }
    }
    for decline in declines {
        if let Some(day) = slot(&mut days, range, decline, &mut dropped) {
            day.declines += 1;
        }
    }

    if dropped > 0 {
        debug!(account_id, dropped, "Dropped records outside the requested days");
    }

    days.into_iter()
        .map(|(date, totals)| totals.into_bucket(account_id, date))
        .collect()
}

fn slot<'a, R: Record>(
    days: &'a mut BTreeMap<NaiveDate, DayTotals>,
    range: &ReportRange,
    record: &R,
    dropped: &mut usize,
) -> Option<&'a mut DayTotals> {
    let day = range
        .local_date(record.created())
        .and_then(|date| days.get_mut(&date));
    if day.is_none() {
        *dropped += 1;
    }
    day
}
