use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregator::{aggregate_by_day, DailyBucket};
use crate::collector::FetchWarning;
use crate::config::ReportConfig;
use crate::error::ReportError;
use crate::fetcher::AccountBundle;
use crate::models::{Account, Charge};
use crate::normalizer::{normalize, NormalizedTransactionRow};
use crate::orchestrator::{fetch_multi_account, MultiAccountReport};
use crate::range::ReportRange;
use crate::stripe::ListApi;

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Inbound report request, as posted by the dashboard.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    #[serde(default)]
    pub account_ids: Vec<String>,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// A request that passed validation; safe to send upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub account_ids: Vec<String>,
    pub range: ReportRange,
    pub page: u32,
    pub per_page: u32,
}

impl ReportRequest {
    pub fn validate(&self, cfg: &ReportConfig) -> Result<ValidatedRequest, ReportError> {
        let account_ids: Vec<String> = self
            .account_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        if account_ids.is_empty() {
            return Err(ReportError::NoAccounts);
        }
        if let Some(bad) = account_ids.iter().find(|id| !is_account_id(id)) {
            return Err(ReportError::InvalidAccountId(bad.clone()));
        }

        let range = ReportRange::parse(&self.start_date, &self.end_date, &self.timezone)?;
        let days = range.day_count();
        if days > i64::from(cfg.max_range_days) {
            return Err(ReportError::RangeTooLong {
                days,
                max: cfg.max_range_days,
            });
        }

        let page = self.page.unwrap_or(1);
        if page == 0 {
            return Err(ReportError::InvalidPaging("page starts at 1".into()));
        }
        let per_page = self.limit.unwrap_or(cfg.default_page_size);
        if per_page == 0 || per_page > cfg.max_page_size {
            return Err(ReportError::InvalidPaging(format!(
                "limit must be between 1 and {}",
                cfg.max_page_size
            )));
        }

        Ok(ValidatedRequest {
            account_ids,
            range,
            page,
            per_page,
        })
    }
}

/// Connected account ids look like `acct_1Nv0FGQ9RKHgCVdK`.
fn is_account_id(id: &str) -> bool {
    id.strip_prefix("acct_")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub items_per_page: u32,
    pub total_items: usize,
    pub total_pages: usize,
    pub has_prev_page: bool,
    pub has_next_page: bool,
}

#[derive(Debug, Serialize)]
pub struct PagedReport<R> {
    pub data: Vec<R>,
    pub pagination: Pagination,
    pub accounts: Vec<Account>,
    pub warnings: Vec<FetchWarning>,
}

/// Slices one page out of fully materialized rows.
pub fn paginate<R>(rows: Vec<R>, page: u32, per_page: u32) -> (Vec<R>, Pagination) {
    let total_items = rows.len();
    let size = per_page.max(1) as usize;
    let total_pages = total_items.div_ceil(size);
    let skip = (page.max(1) as usize - 1).saturating_mul(size);

    let data: Vec<R> = rows.into_iter().skip(skip).take(size).collect();
    let pagination = Pagination {
        current_page: page,
        items_per_page: per_page,
        total_items,
        total_pages,
        has_prev_page: page > 1,
        has_next_page: (page as usize) < total_pages,
    };
    (data, pagination)
}

fn into_paged<R>(report: MultiAccountReport<R>, req: &ValidatedRequest) -> PagedReport<R> {
    let (data, pagination) = paginate(report.rows, req.page, req.per_page);
    PagedReport {
        data,
        pagination,
        accounts: report.account_infos,
        warnings: report.warnings,
    }
}

/// Daily buckets for every requested account, newest day first.
pub async fn summary_report<C: ListApi>(
    client: &C,
    cfg: &ReportConfig,
    request: &ReportRequest,
) -> Result<PagedReport<DailyBucket>, ReportError> {
    let req = request.validate(cfg)?;
    info!(
        accounts = req.account_ids.len(),
        start = %req.range.start,
        end = %req.range.end,
        tz = %req.range.tz,
        "Building summary report"
    );

    let range = req.range;
    let report = fetch_multi_account(
        client,
        &req.account_ids,
        &range,
        cfg.account_concurrency,
        |account_id: &str, bundle: AccountBundle| summarize(account_id, bundle, &range),
    )
    .await;

    Ok(into_paged(report, &req))
}

/// Normalized charge and payment-intent rows, newest first.
pub async fn detail_report<C: ListApi>(
    client: &C,
    cfg: &ReportConfig,
    request: &ReportRequest,
) -> Result<PagedReport<NormalizedTransactionRow>, ReportError> {
    let req = request.validate(cfg)?;
    info!(
        accounts = req.account_ids.len(),
        start = %req.range.start,
        end = %req.range.end,
        tz = %req.range.tz,
        "Building transaction report"
    );

    let report = fetch_multi_account(
        client,
        &req.account_ids,
        &req.range,
        cfg.account_concurrency,
        |account_id: &str, bundle: AccountBundle| {
            normalize(&bundle.charges, &bundle.payment_intents, account_id)
        },
    )
    .await;

    Ok(into_paged(report, &req))
}

// Failed attempts arrive through `declines`, so they are kept out of the
// charge totals to avoid counting them twice.
fn summarize(account_id: &str, bundle: AccountBundle, range: &ReportRange) -> Vec<DailyBucket> {
    let charges: Vec<Charge> = bundle
        .charges
        .into_iter()
        .filter(|c| !c.is_declined())
        .collect();
    aggregate_by_day(
        &charges,
        &bundle.refunds,
        &bundle.disputes,
        &bundle.declines,
        range,
        account_id,
    )
}
