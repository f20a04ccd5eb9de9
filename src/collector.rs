use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{Record, RecordKind};
use crate::range::TimeWindow;
use crate::stripe::ListApi;

/// A recoverable failure recorded alongside (possibly partial) data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetchWarning {
    /// Pagination for one kind stopped early; earlier pages were kept.
    PartialCollection {
        account_id: String,
        kind: RecordKind,
        records_collected: usize,
        pages_fetched: u32,
        message: String,
    },
    /// Account metadata could not be fetched, so the account was left out.
    AccountSkipped { account_id: String, message: String },
}

/// Records gathered for one kind and account, plus the reason it stopped
/// early, if it did.
#[derive(Debug)]
pub struct Collected<T> {
    pub records: Vec<T>,
    pub warning: Option<FetchWarning>,
}

/// Walks cursor pagination for `T::KIND` until the upstream reports no more
/// pages. A failing page ends the walk and keeps what was already collected.
pub async fn collect<T, C>(client: &C, account_id: &str, window: TimeWindow) -> Collected<T>
where
    T: Record,
    C: ListApi,
{
    let kind = T::KIND;
    let mut records: Vec<T> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0u32;

    let warning = loop {
        let page = match client
            .list_page(kind, account_id, window, cursor.as_deref())
            .await
        {
            Ok(page) => page,
            Err(e) => {
                warn!(
                    account_id,
                    kind = %kind,
                    pages_fetched = pages,
                    collected = records.len(),
                    "Collection stopped early: {}",
                    e
                );
                break Some(partial(account_id, kind, records.len(), pages, e.to_string()));
            }
        };
        pages += 1;

        if page.data.is_empty() {
            break None;
        }

        let last_id = page
            .data
            .last()
            .and_then(|item| item["id"].as_str())
            .map(str::to_string);

        for item in page.data {
            match serde_json::from_value::<T>(item) {
                Ok(record) => records.push(record),
                Err(e) => warn!(account_id, kind = %kind, "Skipping undecodable record: {}", e),
            }
        }

        if !page.has_more {
            break None;
        }

        match last_id {
            Some(id) if cursor.as_deref() == Some(id.as_str()) => {
                warn!(account_id, kind = %kind, cursor = %id, "Pagination cursor repeated");
                break Some(partial(
                    account_id,
                    kind,
                    records.len(),
                    pages,
                    format!("pagination stuck at starting_after={}", id),
                ));
            }
            Some(id) => cursor = Some(id),
            None => {
                warn!(account_id, kind = %kind, "Last record on page has no id");
                break Some(partial(
                    account_id,
                    kind,
                    records.len(),
                    pages,
                    "last record on page has no id".to_string(),
                ));
            }
        }
    };

    debug!(
        account_id,
        kind = %kind,
        pages,
        records = records.len(),
        "Collection finished"
    );

    Collected { records, warning }
}

fn partial(
    account_id: &str,
    kind: RecordKind,
    records_collected: usize,
    pages_fetched: u32,
    message: String,
) -> FetchWarning {
    FetchWarning::PartialCollection {
        account_id: account_id.to_string(),
        kind,
        records_collected,
        pages_fetched,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::models::{Charge, Refund};
    use crate::stripe::ListPage;
    use crate::testing::{charge_json, MockApi};
    use serde_json::json;

    const WINDOW: TimeWindow = TimeWindow { start: 0, end: 2_000_000_000 };

    #[tokio::test]
    async fn walks_pages_until_exhausted() {
        let api = MockApi::new();
        let charges: Vec<_> = (0..237)
            .map(|i| charge_json(&format!("ch_{i:03}"), 1_700_000_000 + i, 100, "succeeded"))
            .collect();
        api.set_records("acct_1", RecordKind::Charges, charges);

        let collected = collect::<Charge, _>(&api, "acct_1", WINDOW).await;

        assert_eq!(collected.records.len(), 237);
        assert!(collected.warning.is_none());
        let calls = api.calls_for("acct_1", RecordKind::Charges);
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], None);
        assert_eq!(calls[1].as_deref(), Some("ch_099"));
        assert_eq!(calls[2].as_deref(), Some("ch_199"));
        assert_eq!(collected.records[236].id, "ch_236");
    }

    #[tokio::test]
    async fn empty_page_stops_even_with_has_more() {
        let api = MockApi::new();
        api.push_page(
            "acct_1",
            RecordKind::Refunds,
            Ok(ListPage { data: vec![], has_more: true }),
        );

        let collected = collect::<Refund, _>(&api, "acct_1", WINDOW).await;

        assert!(collected.records.is_empty());
        assert!(collected.warning.is_none());
        assert_eq!(api.calls_for("acct_1", RecordKind::Refunds).len(), 1);
    }

    #[tokio::test]
    async fn failing_page_keeps_earlier_records() {
        let api = MockApi::new();
        api.push_page(
            "acct_1",
            RecordKind::Charges,
            Ok(ListPage {
                data: vec![
                    charge_json("ch_1", 1_700_000_000, 100, "succeeded"),
                    charge_json("ch_2", 1_700_000_001, 200, "succeeded"),
                ],
                has_more: true,
            }),
        );
        api.push_page(
            "acct_1",
            RecordKind::Charges,
            Err(UpstreamError::Status { status: 500, message: "boom".into() }),
        );

        let collected = collect::<Charge, _>(&api, "acct_1", WINDOW).await;

        assert_eq!(collected.records.len(), 2);
        match collected.warning {
            Some(FetchWarning::PartialCollection {
                records_collected,
                pages_fetched,
                ref message,
                ..
            }) => {
                assert_eq!(records_collected, 2);
                assert_eq!(pages_fetched, 1);
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected warning: {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeated_cursor_stops_loop() {
        let api = MockApi::new();
        for _ in 0..2 {
            api.push_page(
                "acct_1",
                RecordKind::Charges,
                Ok(ListPage {
                    data: vec![charge_json("ch_same", 1_700_000_000, 100, "succeeded")],
                    has_more: true,
                }),
            );
        }

        let collected = collect::<Charge, _>(&api, "acct_1", WINDOW).await;

        assert_eq!(api.calls_for("acct_1", RecordKind::Charges).len(), 2);
        assert_eq!(collected.records.len(), 2);
        assert!(matches!(
            collected.warning,
            Some(FetchWarning::PartialCollection { .. })
        ));
    }

    #[tokio::test]
    async fn undecodable_records_are_skipped() {
        let api = MockApi::new();
        api.push_page(
            "acct_1",
            RecordKind::Charges,
            Ok(ListPage {
                data: vec![
                    json!({ "id": "ch_bad", "amount": "not-a-number" }),
                    charge_json("ch_ok", 1_700_000_000, 100, "succeeded"),
                ],
                has_more: false,
            }),
        );

        let collected = collect::<Charge, _>(&api, "acct_1", WINDOW).await;

        assert_eq!(collected.records.len(), 1);
        assert_eq!(collected.records[0].id, "ch_ok");
    }

    #[tokio::test]
    async fn records_without_an_id_are_dropped() {
        let api = MockApi::new();
        api.push_page(
            "acct_1",
            RecordKind::Charges,
            Ok(ListPage {
                data: vec![
                    charge_json("ch_ok", 1_700_000_000, 100, "succeeded"),
                    json!({ "created": 1_700_000_001, "amount": 500, "status": "succeeded" }),
                    json!({ "id": "", "created": 1_700_000_002, "amount": 700 }),
                ],
                has_more: false,
            }),
        );

        let collected = collect::<Charge, _>(&api, "acct_1", WINDOW).await;

        let ids: Vec<&str> = collected.records.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["ch_ok"]);
    }

    #[test]
    fn warnings_serialize_with_type_tag() {
        let warning = FetchWarning::AccountSkipped {
            account_id: "acct_2".into(),
            message: "auth failed".into(),
        };
        let value = serde_json::to_value(&warning).unwrap();
        assert_eq!(value["type"], "account_skipped");
        assert_eq!(value["account_id"], "acct_2");
    }
}
