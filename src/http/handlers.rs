use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::error;

use super::AppState;
use super::error::ApiError;
use crate::core::{Alert, IntakeOutcome};
use crate::core::tx::TransactionRequest;

#[derive(Debug, Serialize, Deserialize)]
pub struct IntakeResponse {
    pub message: String,
    pub final_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<String>,
    /// Present whenever `alert_id` is. `false` means the alert was raised but
    /// never reached the alert store, so it will not appear in listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_persisted: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListAlertsParams {
    pub limit: Option<usize>,
}

/// `POST /api/transactions`: validate, score, maybe alert. Alerting is
/// best-effort, so any valid transaction gets a 200.
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<IntakeResponse>, ApiError> {
    let tx = TransactionRequest::from_slice(&body)
        .inspect_err(|e| error!(error = %e, "Error decoding transaction request"))?
        .validate()?;

    let outcome = state.pipeline.process(&tx).await;

    Ok(Json(IntakeResponse {
        message: "Transaction processed".to_string(),
        final_score: outcome.scored().final_score,
        alert_id: outcome.alert().map(|a| a.id.clone()),
        alert_persisted: match &outcome {
            IntakeOutcome::Accepted { .. } => None,
            IntakeOutcome::AcceptedWithAlertPersisted { .. } => Some(true),
            IntakeOutcome::AcceptedAlertPersistenceFailed { .. } => Some(false),
        },
    }))
}

/// `GET /api/alerts`: newest alerts first.
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListAlertsParams>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    let limit = state.limits.resolve(params.limit);
    let alerts = state
        .pipeline
        .alerts()
        .list_recent_alerts(limit)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to retrieve alerts");
            ApiError::Internal("Failed to retrieve alerts".to_string())
        })?;
    Ok(Json(alerts))
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.rule_store.ping().await {
        Ok(()) => (StatusCode::OK, "OK".to_string()),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Database not healthy: {e}"),
        ),
    }
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.pipeline.metrics().render(),
    )
}
