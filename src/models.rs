// src/models.rs
use rust_decimal::Decimal;
use serde::{de, de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use std::{collections::BTreeMap, fmt};

/// Free-form key/value metadata attached to upstream objects.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// The six list endpoints consumed per connected account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Charges,
    Refunds,
    Disputes,
    PaymentIntents,
    BalanceTransactions,
    Events,
}

impl RecordKind {
    /// Nested objects to inline in list responses.
    pub fn expand(self) -> &'static [&'static str] {
        match self {
            Self::Charges => &["data.payment_intent", "data.dispute"],
            _ => &[],
        }
    }

    /// Also the list endpoint's path segment under `/v1`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Charges => "charges",
            Self::Refunds => "refunds",
            Self::Disputes => "disputes",
            Self::PaymentIntents => "payment_intents",
            Self::BalanceTransactions => "balance_transactions",
            Self::Events => "events",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record type that can be listed page by page.
pub trait Record: DeserializeOwned + Send + 'static {
    const KIND: RecordKind;

    fn id(&self) -> &str;

    /// Creation time, seconds since the Unix epoch.
    fn created(&self) -> i64;
}

macro_rules! impl_record {
    ($ty:ty, $kind:expr) => {
        impl Record for $ty {
            const KIND: RecordKind = $kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn created(&self) -> i64 {
                self.created
            }
        }
    };
}

/// A reference that is either a bare id or the expanded object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(Box<T>),
}

impl<T> Expandable<T> {
    pub fn as_object(&self) -> Option<&T> {
        match self {
            Self::Id(_) => None,
            Self::Object(obj) => Some(obj),
        }
    }
}

impl<T: Record> Expandable<T> {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Object(obj) => obj.id(),
        }
    }
}

/// Object ids are mandatory; a record without one cannot be cursored past or
/// reported, so it fails to decode.
fn object_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let id = String::deserialize(deserializer)?;
    if id.trim().is_empty() {
        return Err(de::Error::invalid_value(
            de::Unexpected::Str(&id),
            &"a non-empty object id",
        ));
    }
    Ok(id)
}

/// Converts integer minor units (cents) into major units.
pub fn minor_to_major(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

// ---------- Connected account ----------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    #[serde(deserialize_with = "object_id")]
    pub id: String,
    pub country: Option<String>,
    pub default_currency: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub charges_enabled: bool,
    #[serde(default)]
    pub payouts_enabled: bool,
    /// Capability name to status, e.g. `card_payments => active`.
    #[serde(default)]
    pub capabilities: BTreeMap<String, String>,
    pub business_profile: Option<BusinessProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessProfile {
    pub name: Option<String>,
    pub url: Option<String>,
}

// ---------- Shared sub-objects ----------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CardDetails {
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PaymentMethodDetails {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub card: Option<CardDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BillingDetails {
    pub email: Option<String>,
    pub name: Option<String>,
}

// ---------- Charges ----------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Outcome {
    pub network_status: Option<String>,
    pub risk_level: Option<String>,
    pub risk_score: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub seller_message: Option<String>,
    pub reason: Option<String>,
}

/// Legacy payment source attached to a charge.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChargeSource {
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Charge {
    #[serde(deserialize_with = "object_id")]
    pub id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub amount_refunded: i64,
    pub currency: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub captured: bool,
    #[serde(default)]
    pub refunded: bool,
    #[serde(default)]
    pub disputed: bool,
    pub description: Option<String>,
    pub customer: Option<String>,
    pub receipt_email: Option<String>,
    pub receipt_url: Option<String>,
    pub billing_details: Option<BillingDetails>,
    pub outcome: Option<Outcome>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub payment_method_details: Option<PaymentMethodDetails>,
    #[serde(default)]
    pub metadata: Metadata,
    pub payment_intent: Option<Expandable<PaymentIntent>>,
    pub dispute: Option<Expandable<Dispute>>,
    pub source: Option<ChargeSource>,
}

impl Charge {
    /// A charge attempt the issuer or processor refused.
    pub fn is_declined(&self) -> bool {
        self.status.as_deref() == Some("failed")
    }
}

impl_record!(Charge, RecordKind::Charges);

// ---------- Refunds & disputes ----------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Refund {
    #[serde(deserialize_with = "object_id")]
    pub id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub amount: i64,
}

impl_record!(Refund, RecordKind::Refunds);

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dispute {
    #[serde(deserialize_with = "object_id")]
    pub id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub amount: i64,
    pub status: Option<String>,
    pub reason: Option<String>,
}

impl_record!(Dispute, RecordKind::Disputes);

// ---------- Payment intents ----------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LastPaymentError {
    pub code: Option<String>,
    pub decline_code: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub payment_method: Option<PaymentMethodDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentIntent {
    #[serde(deserialize_with = "object_id")]
    pub id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub amount: i64,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
    pub customer: Option<String>,
    pub receipt_email: Option<String>,
    #[serde(default)]
    pub payment_method_types: Vec<String>,
    pub last_payment_error: Option<LastPaymentError>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl PaymentIntent {
    pub fn is_succeeded(&self) -> bool {
        self.status.as_deref() == Some("succeeded")
    }
}

impl_record!(PaymentIntent, RecordKind::PaymentIntents);

// ---------- Balance transactions & events ----------

// Balance transactions and events are collected for completeness of the
// bundle; reports only need their identity and timestamp.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BalanceTransaction {
    #[serde(deserialize_with = "object_id")]
    pub id: String,
    #[serde(default)]
    pub created: i64,
}

impl_record!(BalanceTransaction, RecordKind::BalanceTransactions);

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Event {
    #[serde(deserialize_with = "object_id")]
    pub id: String,
    #[serde(default)]
    pub created: i64,
}

impl_record!(Event, RecordKind::Events);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minor_units_convert_exactly() {
        assert_eq!(minor_to_major(12345), Decimal::new(12345, 2));
        assert_eq!(minor_to_major(12345).to_string(), "123.45");
        assert_eq!(minor_to_major(-50).to_string(), "-0.50");
    }

    #[test]
    fn charge_tolerates_nulls_and_missing_fields() {
        let charge: Charge = serde_json::from_value(json!({
            "id": "ch_1",
            "created": 1700000000,
            "amount": 500,
            "currency": null,
            "outcome": null,
            "payment_intent": null
        }))
        .unwrap();
        assert_eq!(charge.id, "ch_1");
        assert!(charge.currency.is_none());
        assert!(charge.metadata.is_empty());
        assert!(!charge.paid);
    }

    #[test]
    fn expandable_reads_id_or_object() {
        let charge: Charge = serde_json::from_value(json!({
            "id": "ch_1",
            "payment_intent": "pi_1",
            "dispute": { "id": "dp_1", "amount": 700, "status": "needs_response" }
        }))
        .unwrap();

        let pi = charge.payment_intent.unwrap();
        assert_eq!(pi.id(), "pi_1");
        assert!(pi.as_object().is_none());

        let dispute = charge.dispute.unwrap();
        assert_eq!(dispute.id(), "dp_1");
        assert_eq!(dispute.as_object().map(|d| d.amount), Some(700));
    }

    #[test]
    fn missing_or_blank_ids_fail_to_decode() {
        assert!(serde_json::from_value::<Charge>(json!({ "amount": 100 })).is_err());
        assert!(serde_json::from_value::<PaymentIntent>(json!({ "id": " " })).is_err());
        assert!(serde_json::from_value::<Account>(json!({ "object": "list", "data": [] })).is_err());
        assert!(serde_json::from_value::<Event>(json!({ "id": "evt_1" })).is_ok());
    }

    #[test]
    fn declined_means_failed_status() {
        let failed = Charge {
            status: Some("failed".into()),
            ..Default::default()
        };
        let ok = Charge {
            status: Some("succeeded".into()),
            ..Default::default()
        };
        assert!(failed.is_declined());
        assert!(!ok.is_declined());
    }

    #[test]
    fn kinds_map_to_list_paths() {
        assert_eq!(RecordKind::PaymentIntents.as_str(), "payment_intents");
        assert_eq!(RecordKind::BalanceTransactions.to_string(), "balance_transactions");
        assert!(RecordKind::Refunds.expand().is_empty());
    }
}
