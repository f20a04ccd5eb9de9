//! Flattens charges and payment intents into one row shape for detail views
//! and exports.

use chrono::DateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use std::net::IpAddr;

use crate::models::{
    minor_to_major, CardDetails, Charge, Metadata, PaymentIntent, PaymentMethodDetails,
};
use crate::orchestrator::ReportRow;

/// Metadata keys that may carry the buyer's IP, in lookup order.
pub const IP_METADATA_KEYS: &[&str] = &[
    "customer_ip",
    "ip_address",
    "client_ip",
    "source_ip",
    "ip",
    "user_ip",
    "remote_ip",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Charge,
    PaymentIntent,
}

/// Detail row shared by charges and payment intents. Absent upstream values
/// are empty strings, `false` or zero, never null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedTransactionRow {
    pub transaction_type: TransactionType,
    pub id: String,
    pub account_id: String,
    pub created: i64,
    pub created_at: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount_refunded: Decimal,
    pub currency: String,
    pub status: String,
    pub paid: bool,
    pub captured: bool,
    pub refunded: bool,
    pub disputed: bool,
    pub description: String,
    pub customer_id: String,
    pub customer_email: String,
    pub customer_name: String,
    pub customer_ip: String,
    pub payment_intent_id: String,
    pub payment_method_type: String,
    pub card_brand: String,
    pub card_last4: String,
    pub card_country: String,
    pub network_status: String,
    pub risk_level: String,
    pub risk_score: String,
    pub outcome_type: String,
    pub seller_message: String,
    pub failure_code: String,
    pub failure_message: String,
    pub decline_code: String,
    pub chargeback_id: String,
    pub chargeback_status: String,
    pub chargeback_reason: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub chargeback_amount: Decimal,
    pub order_id: String,
    pub receipt_url: String,
}

impl ReportRow for NormalizedTransactionRow {
    fn sort_key(&self) -> i64 {
        self.created
    }
}

/// Charges first, then payment intents, each in input order.
pub fn normalize(
    charges: &[Charge],
    payment_intents: &[PaymentIntent],
    account_id: &str,
) -> Vec<NormalizedTransactionRow> {
    charges
        .iter()
        .map(|c| normalize_charge(c, account_id))
        .chain(payment_intents.iter().map(|pi| normalize_payment_intent(pi, account_id)))
        .collect()
}

pub fn normalize_charge(charge: &Charge, account_id: &str) -> NormalizedTransactionRow {
    let outcome = charge.outcome.clone().unwrap_or_default();
    let billing = charge.billing_details.clone().unwrap_or_default();
    let method = charge.payment_method_details.as_ref();
    let dispute = charge.dispute.as_ref().and_then(|d| d.as_object());

    NormalizedTransactionRow {
        transaction_type: TransactionType::Charge,
        id: charge.id.clone(),
        account_id: account_id.to_string(),
        created: charge.created,
        created_at: format_timestamp(charge.created),
        amount: minor_to_major(charge.amount),
        amount_refunded: minor_to_major(charge.amount_refunded),
        currency: upper(&charge.currency),
        status: text(&charge.status),
        paid: charge.paid,
        captured: charge.captured,
        refunded: charge.refunded,
        disputed: charge.disputed,
        description: text(&charge.description),
        customer_id: text(&charge.customer),
        customer_email: billing.email.or_else(|| charge.receipt_email.clone()).unwrap_or_default(),
        customer_name: billing.name.unwrap_or_default(),
        customer_ip: charge_customer_ip(charge),
        payment_intent_id: charge
            .payment_intent
            .as_ref()
            .map(|pi| pi.id().to_string())
            .unwrap_or_default(),
        payment_method_type: method.and_then(|m| m.kind.clone()).unwrap_or_default(),
        card_brand: card_field(method, |c| &c.brand),
        card_last4: card_field(method, |c| &c.last4),
        card_country: card_field(method, |c| &c.country),
        network_status: outcome.network_status.unwrap_or_default(),
        risk_level: outcome.risk_level.unwrap_or_default(),
        risk_score: outcome.risk_score.map(|s| s.to_string()).unwrap_or_default(),
        outcome_type: outcome.kind.unwrap_or_default(),
        seller_message: outcome.seller_message.unwrap_or_default(),
        failure_code: text(&charge.failure_code),
        failure_message: text(&charge.failure_message),
        decline_code: outcome.reason.unwrap_or_default(),
        chargeback_id: charge
            .dispute
            .as_ref()
            .map(|d| d.id().to_string())
            .unwrap_or_default(),
        chargeback_status: dispute.and_then(|d| d.status.clone()).unwrap_or_default(),
        chargeback_reason: dispute.and_then(|d| d.reason.clone()).unwrap_or_default(),
        chargeback_amount: dispute
            .map(|d| minor_to_major(d.amount))
            .unwrap_or(Decimal::ZERO),
        order_id: metadata_text(&charge.metadata, "order_id"),
        receipt_url: text(&charge.receipt_url),
    }
}

pub fn normalize_payment_intent(pi: &PaymentIntent, account_id: &str) -> NormalizedTransactionRow {
    let succeeded = pi.is_succeeded();
    let error = pi.last_payment_error.clone().unwrap_or_default();
    let method = error.payment_method.as_ref();

    NormalizedTransactionRow {
        transaction_type: TransactionType::PaymentIntent,
        id: pi.id.clone(),
        account_id: account_id.to_string(),
        created: pi.created,
        created_at: format_timestamp(pi.created),
        amount: minor_to_major(pi.amount),
        amount_refunded: Decimal::ZERO,
        currency: upper(&pi.currency),
        status: text(&pi.status),
        paid: succeeded,
        captured: succeeded,
        refunded: false,
        disputed: false,
        description: text(&pi.description),
        customer_id: text(&pi.customer),
        customer_email: text(&pi.receipt_email),
        customer_name: String::new(),
        customer_ip: extract_customer_ip(&[&pi.metadata]),
        payment_intent_id: pi.id.clone(),
        payment_method_type: method
            .and_then(|m| m.kind.clone())
            .or_else(|| pi.payment_method_types.first().cloned())
            .unwrap_or_default(),
        card_brand: card_field(method, |c| &c.brand),
        card_last4: card_field(method, |c| &c.last4),
        card_country: card_field(method, |c| &c.country),
        network_status: String::new(),
        risk_level: String::new(),
        risk_score: String::new(),
        outcome_type: error.kind.unwrap_or_default(),
        seller_message: String::new(),
        failure_code: error.code.unwrap_or_default(),
        failure_message: error.message.unwrap_or_default(),
        decline_code: error.decline_code.unwrap_or_default(),
        chargeback_id: String::new(),
        chargeback_status: String::new(),
        chargeback_reason: String::new(),
        chargeback_amount: Decimal::ZERO,
        order_id: metadata_text(&pi.metadata, "order_id"),
        receipt_url: String::new(),
    }
}

/// Charge metadata, then the expanded payment intent's, then the source's.
pub fn charge_customer_ip(charge: &Charge) -> String {
    let mut sources: Vec<&Metadata> = vec![&charge.metadata];
    if let Some(pi) = charge.payment_intent.as_ref().and_then(|p| p.as_object()) {
        sources.push(&pi.metadata);
    }
    if let Some(source) = &charge.source {
        sources.push(&source.metadata);
    }
    extract_customer_ip(&sources)
}

/// First value under one of [`IP_METADATA_KEYS`] that parses as an IPv4 or
/// IPv6 address, searching each metadata map in order. Empty when none match.
pub fn extract_customer_ip(sources: &[&Metadata]) -> String {
    sources
        .iter()
        .flat_map(|metadata| IP_METADATA_KEYS.iter().filter_map(move |key| metadata.get(*key)))
        .filter_map(|value| value.as_str())
        .map(str::trim)
        .find(|candidate| candidate.parse::<IpAddr>().is_ok())
        .map(str::to_string)
        .unwrap_or_default()
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn upper(value: &Option<String>) -> String {
    value.as_deref().map(str::to_uppercase).unwrap_or_default()
}

fn metadata_text(metadata: &Metadata, key: &str) -> String {
    match metadata.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn card_field(
    method: Option<&PaymentMethodDetails>,
    field: impl Fn(&CardDetails) -> &Option<String>,
) -> String {
    method
        .and_then(|m| m.card.as_ref())
        .and_then(|card| field(card).clone())
        .unwrap_or_default()
}

fn format_timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}
