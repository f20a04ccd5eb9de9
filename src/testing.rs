//! Scripted `ListApi` used by unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use serde_json::{json, Value};

use crate::error::UpstreamError;
use crate::models::{Account, RecordKind};
use crate::range::TimeWindow;
use crate::stripe::{ListApi, ListPage, PAGE_LIMIT};

type Key = (String, RecordKind);

#[derive(Debug, Clone)]
pub struct Call {
    pub account_id: String,
    pub kind: RecordKind,
    pub window: TimeWindow,
    pub starting_after: Option<String>,
}

/// Serves pages either from a scripted queue or by slicing a full record set
/// with the same cursor rules as the real API.
#[derive(Default)]
pub struct MockApi {
    scripted: Mutex<HashMap<Key, VecDeque<Result<ListPage, UpstreamError>>>>,
    records: Mutex<HashMap<Key, Vec<Value>>>,
    failing_accounts: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Call>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_records(&self, account_id: &str, kind: RecordKind, records: Vec<Value>) {
        self.records
            .lock()
            .unwrap()
            .insert((account_id.to_string(), kind), records);
    }

    pub fn push_page(
        &self,
        account_id: &str,
        kind: RecordKind,
        page: Result<ListPage, UpstreamError>,
    ) {
        self.scripted
            .lock()
            .unwrap()
            .entry((account_id.to_string(), kind))
            .or_default()
            .push_back(page);
    }

    /// Account metadata lookups for `account_id` fail with a 403.
    pub fn fail_account(&self, account_id: &str) {
        self.failing_accounts
            .lock()
            .unwrap()
            .insert(account_id.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, account_id: &str, kind: RecordKind) -> Vec<Option<String>> {
        self.calls()
            .into_iter()
            .filter(|c| c.account_id == account_id && c.kind == kind)
            .map(|c| c.starting_after)
            .collect()
    }

    fn next_page(&self, key: &Key, starting_after: Option<&str>) -> Result<ListPage, UpstreamError> {
        if let Some(page) = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front)
        {
            return page;
        }

        let records = self.records.lock().unwrap();
        let all = records.get(key).map(Vec::as_slice).unwrap_or_default();
        let start = match starting_after {
            Some(cursor) => all
                .iter()
                .position(|r| r["id"].as_str() == Some(cursor))
                .map(|i| i + 1)
                .unwrap_or(all.len()),
            None => 0,
        };
        let end = (start + PAGE_LIMIT as usize).min(all.len());
        Ok(ListPage {
            data: all[start..end].to_vec(),
            has_more: end < all.len(),
        })
    }
}

impl ListApi for MockApi {
    async fn list_page(
        &self,
        kind: RecordKind,
        account_id: &str,
        window: TimeWindow,
        starting_after: Option<&str>,
    ) -> Result<ListPage, UpstreamError> {
        self.calls.lock().unwrap().push(Call {
            account_id: account_id.to_string(),
            kind,
            window,
            starting_after: starting_after.map(str::to_string),
        });
        self.next_page(&(account_id.to_string(), kind), starting_after)
    }

    async fn retrieve_account(&self, account_id: &str) -> Result<Account, UpstreamError> {
        if self.failing_accounts.lock().unwrap().contains(account_id) {
            return Err(UpstreamError::Auth {
                status: 403,
                message: format!("no access to {}", account_id),
            });
        }
        Ok(Account {
            id: account_id.to_string(),
            country: Some("US".into()),
            default_currency: Some("usd".into()),
            charges_enabled: true,
            ..Default::default()
        })
    }
}

pub fn charge_json(id: &str, created: i64, amount: i64, status: &str) -> Value {
    json!({
        "id": id,
        "object": "charge",
        "created": created,
        "amount": amount,
        "currency": "usd",
        "status": status,
        "paid": status == "succeeded",
        "captured": status == "succeeded",
        "metadata": {}
    })
}

pub fn refund_json(id: &str, created: i64, amount: i64) -> Value {
    json!({
        "id": id,
        "object": "refund",
        "created": created,
        "amount": amount,
        "currency": "usd",
        "status": "succeeded"
    })
}

pub fn dispute_json(id: &str, created: i64, amount: i64) -> Value {
    json!({
        "id": id,
        "object": "dispute",
        "created": created,
        "amount": amount,
        "currency": "usd",
        "status": "needs_response",
        "reason": "fraudulent"
    })
}

pub fn payment_intent_json(id: &str, created: i64, amount: i64, status: &str) -> Value {
    json!({
        "id": id,
        "object": "payment_intent",
        "created": created,
        "amount": amount,
        "currency": "usd",
        "status": status,
        "payment_method_types": ["card"],
        "metadata": {}
    })
}
