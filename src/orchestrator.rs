use futures_util::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::collector::FetchWarning;
use crate::fetcher::{fetch_account_bundle, AccountBundle};
use crate::models::Account;
use crate::range::ReportRange;
use crate::stripe::ListApi;

/// A report row that can be ordered newest-first.
pub trait ReportRow {
    /// Larger means newer.
    fn sort_key(&self) -> i64;
}

/// Rows from every account that could be fetched, newest first.
#[derive(Debug)]
pub struct MultiAccountReport<R> {
    pub rows: Vec<R>,
    pub account_infos: Vec<Account>,
    pub warnings: Vec<FetchWarning>,
}

enum AccountOutcome<R> {
    Fetched {
        account: Account,
        rows: Vec<R>,
        warnings: Vec<FetchWarning>,
    },
    Skipped(FetchWarning),
}

/// Fetches each account's metadata and bundle, then turns the bundle into rows
/// with `project`. An account whose metadata lookup fails is skipped with a
/// warning; the remaining accounts are still reported. At most `concurrency`
/// accounts are in flight at once, and output order never depends on it.
pub async fn fetch_multi_account<C, R, F>(
    client: &C,
    account_ids: &[String],
    range: &ReportRange,
    concurrency: usize,
    project: F,
) -> MultiAccountReport<R>
where
    C: ListApi,
    R: ReportRow + Send,
    F: Fn(&str, AccountBundle) -> Vec<R> + Sync,
{
    let project = &project;
    // Each future owns its id so the stream is Send for any caller lifetime.
    let outcomes: Vec<AccountOutcome<R>> = stream::iter(account_ids.iter().cloned())
        .map(move |account_id: String| async move {
            fetch_one(client, &account_id, range, project).await
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut report = MultiAccountReport {
        rows: Vec::new(),
        account_infos: Vec::new(),
        warnings: Vec::new(),
    };

    for outcome in outcomes {
        match outcome {
            AccountOutcome::Fetched {
                account,
                rows,
                warnings,
            } => {
                report.account_infos.push(account);
                report.rows.extend(rows);
                report.warnings.extend(warnings);
            }
            AccountOutcome::Skipped(warning) => report.warnings.push(warning),
        }
    }

    if !account_ids.is_empty() && report.account_infos.is_empty() {
        error!(
            accounts = account_ids.len(),
            "Every account failed; returning an empty report"
        );
    }

    report.rows.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));

    info!(
        accounts = report.account_infos.len(),
        skipped = account_ids.len() - report.account_infos.len(),
        rows = report.rows.len(),
        warnings = report.warnings.len(),
        "Multi-account fetch complete"
    );

    report
}

async fn fetch_one<C, R, F>(
    client: &C,
    account_id: &str,
    range: &ReportRange,
    project: &F,
) -> AccountOutcome<R>
where
    C: ListApi,
    F: Fn(&str, AccountBundle) -> Vec<R>,
{
    let account = match client.retrieve_account(account_id).await {
        Ok(account) => account,
        Err(e) => {
            warn!(account_id, "Skipping account: {}", e);
            return AccountOutcome::Skipped(FetchWarning::AccountSkipped {
                account_id: account_id.to_string(),
                message: e.to_string(),
            });
        }
    };

    let mut bundle = fetch_account_bundle(client, account_id, range).await;
    let warnings = std::mem::take(&mut bundle.warnings);
    let rows = project(account_id, bundle);

    AccountOutcome::Fetched {
        account,
        rows,
        warnings,
    }
}
