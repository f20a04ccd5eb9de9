use tracing::{debug, info};

use crate::collector::{collect, Collected, FetchWarning};
use crate::models::{BalanceTransaction, Charge, Dispute, Event, PaymentIntent, Refund};
use crate::range::ReportRange;
use crate::stripe::ListApi;

/// Everything collected for one connected account over one date range.
#[derive(Debug, Default)]
pub struct AccountBundle {
    pub charges: Vec<Charge>,
    pub refunds: Vec<Refund>,
    pub disputes: Vec<Dispute>,
    /// Failed charge attempts, from a second pass over the charges listing.
    pub declines: Vec<Charge>,
    pub payment_intents: Vec<PaymentIntent>,
    pub balance_transactions: Vec<BalanceTransaction>,
    pub events: Vec<Event>,
    pub warnings: Vec<FetchWarning>,
}

/// Collects every record kind for `account_id` concurrently. A kind that
/// fails contributes its partial records and a warning; the rest are unaffected.
pub async fn fetch_account_bundle<C: ListApi>(
    client: &C,
    account_id: &str,
    range: &ReportRange,
) -> AccountBundle {
    let window = range.window();

    let (charges, refunds, disputes, declines, payment_intents, balance_transactions, events) = tokio::join!(
        collect::<Charge, _>(client, account_id, window),
        collect::<Refund, _>(client, account_id, window),
        collect::<Dispute, _>(client, account_id, window),
        collect::<Charge, _>(client, account_id, window),
        collect::<PaymentIntent, _>(client, account_id, window),
        collect::<BalanceTransaction, _>(client, account_id, window),
        collect::<Event, _>(client, account_id, window),
    );

    let mut warnings = Vec::new();
    let charges = take(charges, &mut warnings);
    let refunds = take(refunds, &mut warnings);
    let disputes = take(disputes, &mut warnings);

    let attempts = take(declines, &mut warnings);
    let fetched = attempts.len();
    let declines: Vec<Charge> = attempts.into_iter().filter(Charge::is_declined).collect();
    debug!(
        account_id,
        fetched,
        declines = declines.len(),
        "Filtered decline candidates"
    );

    let bundle = AccountBundle {
        charges,
        refunds,
        disputes,
        declines,
        payment_intents: take(payment_intents, &mut warnings),
        balance_transactions: take(balance_transactions, &mut warnings),
        events: take(events, &mut warnings),
        warnings,
    };

    info!(
        account_id,
        charges = bundle.charges.len(),
        refunds = bundle.refunds.len(),
        disputes = bundle.disputes.len(),
        declines = bundle.declines.len(),
        payment_intents = bundle.payment_intents.len(),
        balance_transactions = bundle.balance_transactions.len(),
        events = bundle.events.len(),
        warnings = bundle.warnings.len(),
        "Fetched account bundle"
    );

    bundle
}

fn take<T>(collected: Collected<T>, warnings: &mut Vec<FetchWarning>) -> Vec<T> {
    warnings.extend(collected.warning);
    collected.records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::models::RecordKind;
    use crate::testing::{charge_json, dispute_json, refund_json, MockApi};

    fn january() -> ReportRange {
        ReportRange::parse("2024-01-01", "2024-01-31", "UTC").unwrap()
    }

    #[tokio::test]
    async fn collects_all_kinds_with_one_window() {
        let api = MockApi::new();
        api.set_records(
            "acct_1",
            RecordKind::Charges,
            vec![
                charge_json("ch_1", 1_704_100_000, 1000, "succeeded"),
                charge_json("ch_2", 1_704_100_100, 500, "failed"),
            ],
        );
        api.set_records("acct_1", RecordKind::Refunds, vec![refund_json("re_1", 1_704_100_200, 300)]);
        api.set_records("acct_1", RecordKind::Disputes, vec![dispute_json("dp_1", 1_704_100_300, 1000)]);

        let bundle = fetch_account_bundle(&api, "acct_1", &january()).await;

        assert_eq!(bundle.charges.len(), 2);
        assert_eq!(bundle.refunds.len(), 1);
        assert_eq!(bundle.disputes.len(), 1);
        assert_eq!(bundle.declines.len(), 1);
        assert_eq!(bundle.declines[0].id, "ch_2");
        assert!(bundle.warnings.is_empty());

        let calls = api.calls();
        // Charges are listed twice: once as charges, once as declines.
        assert_eq!(calls.len(), 7);
        assert_eq!(calls.iter().filter(|c| c.kind == RecordKind::Charges).count(), 2);
        let window = january().window();
        assert!(calls.iter().all(|c| c.window == window));
    }

    #[tokio::test]
    async fn one_failing_kind_does_not_affect_others() {
        let api = MockApi::new();
        api.set_records("acct_1", RecordKind::Refunds, vec![refund_json("re_1", 1_704_100_200, 300)]);
        api.push_page(
            "acct_1",
            RecordKind::Disputes,
            Err(UpstreamError::Status { status: 500, message: "down".into() }),
        );

        let bundle = fetch_account_bundle(&api, "acct_1", &january()).await;

        assert_eq!(bundle.refunds.len(), 1);
        assert!(bundle.disputes.is_empty());
        assert_eq!(bundle.warnings.len(), 1);
        assert!(matches!(
            &bundle.warnings[0],
            FetchWarning::PartialCollection { kind: RecordKind::Disputes, .. }
        ));
    }
}
