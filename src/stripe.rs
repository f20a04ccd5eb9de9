// src/stripe.rs
use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::StripeConfig;
use crate::error::UpstreamError;
use crate::models::{Account, RecordKind};
use crate::range::TimeWindow;

/// Records requested per list call (the upstream maximum).
pub const PAGE_LIMIT: u32 = 100;

/// Upper bound on a server-requested `Retry-After` wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// One page of a cursor-paginated list response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListPage {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub has_more: bool,
}

/// Read-only access to the payment processor's list API.
pub trait ListApi: Send + Sync {
    /// Fetch one page of `kind` for a connected account, created within `window`.
    fn list_page(
        &self,
        kind: RecordKind,
        account_id: &str,
        window: TimeWindow,
        starting_after: Option<&str>,
    ) -> impl Future<Output = Result<ListPage, UpstreamError>> + Send;

    fn retrieve_account(
        &self,
        account_id: &str,
    ) -> impl Future<Output = Result<Account, UpstreamError>> + Send;
}

pub struct StripeClient {
    http: Client,
    secret_key: SecretString,
    base_url: Url,
    max_retries: u32,
    retry_backoff: Duration,
}

impl StripeClient {
    pub fn new(cfg: StripeConfig) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(cfg.timeout)
            .user_agent(concat!("connect-reports/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = Url::parse(&cfg.api_base)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| UpstreamError::BaseUrl(cfg.api_base.clone()))?;

        Ok(Self {
            http,
            secret_key: cfg.secret_key,
            base_url,
            max_retries: cfg.max_retries,
            retry_backoff: cfg.retry_backoff,
        })
    }

    /// Joins `segments` onto the base URL, percent-encoding each one so an id
    /// can never change the path it lands on.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| UpstreamError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET `url` with retry on 429, 5xx and transport errors.
    async fn get_json(
        &self,
        url: Url,
        account_id: Option<&str>,
        query: &[(&str, String)],
    ) -> Result<Value, UpstreamError> {
        let path = url.path().to_string();
        let mut backoff = self.retry_backoff;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let req = self.authorize(self.http.get(url.clone()).query(query), account_id);

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp
                            .json::<Value>()
                            .await
                            .map_err(|e| UpstreamError::Malformed(e.to_string()));
                    }

                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if retryable && attempt <= self.max_retries {
                        let wait = retry_wait(retry_after(&resp), backoff);
                        warn!(
                            "{} {} (attempt {}/{}), retrying in {:?}",
                            path,
                            status,
                            attempt,
                            self.max_retries + 1,
                            wait
                        );
                        tokio::time::sleep(wait).await;
                        backoff = backoff.saturating_mul(2);
                        continue;
                    }

                    return Err(classify(status, attempt, resp).await);
                }
                Err(e) if attempt <= self.max_retries => {
                    warn!(
                        "{} request failed (attempt {}/{}): {}. Retrying...",
                        path,
                        attempt,
                        self.max_retries + 1,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(UpstreamError::Transport(e)),
            }
        }
    }

    fn authorize(&self, req: RequestBuilder, account_id: Option<&str>) -> RequestBuilder {
        let req = req.bearer_auth(self.secret_key.expose_secret());
        match account_id {
            Some(acct) => req.header("Stripe-Account", acct),
            None => req,
        }
    }
}

impl ListApi for StripeClient {
    async fn list_page(
        &self,
        kind: RecordKind,
        account_id: &str,
        window: TimeWindow,
        starting_after: Option<&str>,
    ) -> Result<ListPage, UpstreamError> {
        let mut query: Vec<(&str, String)> = vec![
            ("limit", PAGE_LIMIT.to_string()),
            ("created[gte]", window.start.to_string()),
            ("created[lte]", window.end.to_string()),
        ];
        if let Some(cursor) = starting_after {
            query.push(("starting_after", cursor.to_string()));
        }
        for field in kind.expand() {
            query.push(("expand[]", (*field).to_string()));
        }

        debug!(
            account_id,
            kind = %kind,
            cursor = starting_after.unwrap_or(""),
            "Listing page"
        );

        let url = self.endpoint(&["v1", kind.as_str()])?;
        let body = self.get_json(url, Some(account_id), &query).await?;
        serde_json::from_value(body).map_err(|e| UpstreamError::Malformed(e.to_string()))
    }

    async fn retrieve_account(&self, account_id: &str) -> Result<Account, UpstreamError> {
        let url = self.endpoint(&["v1", "accounts", account_id])?;
        let body = self.get_json(url, None, &[]).await?;
        serde_json::from_value(body).map_err(|e| UpstreamError::Malformed(e.to_string()))
    }
}

fn retry_after(resp: &Response) -> Option<Duration> {
    if resp.status() != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    resp.headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// A server-provided wait wins over our own backoff, up to a cap.
fn retry_wait(retry_after: Option<Duration>, backoff: Duration) -> Duration {
    retry_after.map_or(backoff, |wait| wait.min(MAX_RETRY_AFTER))
}

async fn classify(status: StatusCode, attempts: u32, resp: Response) -> UpstreamError {
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    let message = error_message(&body, status.as_u16());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UpstreamError::Auth {
            status: status.as_u16(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => UpstreamError::RateLimited { attempts, message },
        _ => UpstreamError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

fn error_message(body: &Value, status: u16) -> String {
    body["error"]["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status))
}
