use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::aggregator::DailyBucket;
use crate::config::{ReportConfig, ServerConfig};
use crate::error::ReportError;
use crate::normalizer::NormalizedTransactionRow;
use crate::report::{self, PagedReport, ReportRequest};
use crate::stripe::StripeClient;

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<StripeClient>,
    pub report: ReportConfig,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Connect reports API running" }))
        .route("/api/reports/summary", post(summary))
        .route("/api/reports/transactions", post(transactions))
        .with_state(state)
        .layer(cors)
}

pub async fn serve(cfg: ServerConfig, state: AppState) -> eyre::Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], cfg.port));
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn summary(
    State(state): State<AppState>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> Result<Json<PagedReport<DailyBucket>>, ReportError> {
    let Json(req) = payload.map_err(body_error)?;
    let report = report::summary_report(state.client.as_ref(), &state.report, &req).await?;
    Ok(Json(report))
}

async fn transactions(
    State(state): State<AppState>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> Result<Json<PagedReport<NormalizedTransactionRow>>, ReportError> {
    let Json(req) = payload.map_err(body_error)?;
    let report = report::detail_report(state.client.as_ref(), &state.report, &req).await?;
    Ok(Json(report))
}

fn body_error(rejection: JsonRejection) -> ReportError {
    ReportError::InvalidBody(rejection.body_text())
}
