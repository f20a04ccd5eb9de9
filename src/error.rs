use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

/// A failed call to the payment processor's API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("auth failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("rate limited after {attempts} attempts: {message}")]
    RateLimited { attempts: u32, message: String },

    #[error("upstream error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("invalid API base URL {0:?}")]
    BaseUrl(String),
}

/// Request problems caught before any upstream call is made.
#[derive(Debug, Error, PartialEq)]
pub enum ReportError {
    #[error("no account ids supplied")]
    NoAccounts,

    #[error("invalid account id {0:?} (expected acct_ followed by letters and digits)")]
    InvalidAccountId(String),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("invalid {field} {value:?} (expected YYYY-MM-DD)")]
    InvalidDate { field: &'static str, value: String },

    #[error("startDate {start} is after endDate {end}")]
    InvertedRange { start: String, end: String },

    #[error("date range spans {days} days, limit is {max}")]
    RangeTooLong { days: i64, max: u32 },

    #[error("unknown timezone {0:?} (expected IANA name, e.g. America/New_York)")]
    UnknownTimezone(String),

    #[error("invalid pagination: {0}")]
    InvalidPaging(String),
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        tracing::debug!(error = %self, "Rejected report request");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
