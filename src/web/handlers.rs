//! HTTP request handlers.

use super::AppState;
use crate::db::{HistoryRecord, Status};

use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json},
};
use chrono::Local;
use serde::Deserialize;

/// Rows shown on the dashboard.
pub const DASHBOARD_LIMIT: usize = 100;
const MAX_HISTORY_LIMIT: usize = 1000;

// ============================================================================
// Dashboard
// ============================================================================

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    rows: Vec<RowView>,
}

/// One history record, formatted for display.
struct RowView {
    css: &'static str,
    name: String,
    url: String,
    status: &'static str,
    code: String,
    latency: String,
    time: String,
}

impl From<&HistoryRecord> for RowView {
    fn from(record: &HistoryRecord) -> Self {
        Self {
            css: match record.status {
                Status::Up => "up",
                Status::Down => "down",
            },
            name: record.name.clone(),
            url: record.url.clone(),
            status: record.status.as_str(),
            code: optional(record.http_code),
            latency: optional(record.latency_ms),
            time: record
                .observed_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        }
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn render_dashboard(records: &[HistoryRecord]) -> Result<String, askama::Error> {
    DashboardTemplate {
        rows: records.iter().map(RowView::from).collect(),
    }
    .render()
}

pub async fn handle_dashboard(State(state): State<AppState>) -> impl IntoResponse {
    let records = match state
        .store
        .blocking(|s| s.recent_records(DASHBOARD_LIMIT))
        .await
    {
        Ok(records) => records,
        Err(e) => {
            tracing::error!("Dashboard: failed to read history: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read history").into_response();
        }
    };

    match render_dashboard(&records) {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            tracing::error!("Dashboard: template error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render dashboard").into_response()
        }
    }
}

// ============================================================================
// API
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    /// Restrict to one target URL.
    #[serde(default)]
    pub url: Option<String>,
}

pub async fn handle_get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DASHBOARD_LIMIT)
        .min(MAX_HISTORY_LIMIT);

    let result = state
        .store
        .blocking(move |s| match query.url {
            Some(url) => s.recent_records_for(&url, limit),
            None => s.recent_records(limit),
        })
        .await;

    match result {
        Ok(records) => Json(records).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.tracker.snapshot())
}
