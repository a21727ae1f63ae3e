pub mod document;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::{Alert, AlertDecision, IntakeOutcome, ScoredTransaction, Transaction};
use crate::metrics::PipelineMetrics;

#[derive(Debug, Error)]
pub enum AlertStoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("alert store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed alert store response: {0}")]
    MalformedResponse(String),
    #[error("alert store timed out after {0:?}")]
    Timeout(Duration),
    #[error("alert store unavailable: {0}")]
    Unavailable(String),
}

/// Document store holding alerts.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Insert or replace the document with `alert.id`.
    async fn upsert(&self, alert: &Alert) -> Result<(), AlertStoreError>;

    /// Raw documents, newest `timestamp` first, at most `limit` of them.
    async fn query_recent(&self, limit: usize) -> Result<Vec<Value>, AlertStoreError>;
}

/// Decides alert-worthiness, raises and persists alerts, and reads them back.
pub struct AlertManager {
    store: Arc<dyn AlertStore>,
    metrics: Arc<PipelineMetrics>,
    threshold: f64,
    store_timeout: Duration,
}

impl AlertManager {
    pub fn new(
        store: Arc<dyn AlertStore>,
        metrics: Arc<PipelineMetrics>,
        threshold: f64,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            metrics,
            threshold,
            store_timeout,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn decide(&self, scored: &ScoredTransaction) -> AlertDecision {
        AlertDecision::from_score(scored.final_score, self.threshold)
    }

    /// Build a fresh alert for a transaction that crossed the threshold.
    pub fn build_alert(tx: &Transaction, scored: &ScoredTransaction) -> Alert {
        Alert {
            id: format!("alert-{}", Uuid::new_v4()),
            transaction_id: tx.id.clone(),
            account_id: tx.account_id.clone(),
            reason: format!(
                "High risk score detected (AI: {:.2}, Rules: {:.2}, Final Score: {:.2}). Explanation: {}",
                scored.anomaly_score, scored.rule_contribution, scored.final_score, scored.explanation
            ),
            score: scored.final_score,
            timestamp: Utc::now(),
        }
    }

    /// Apply the alert decision to a scored transaction. Persistence failures
    /// are logged and reported in the outcome, never returned as errors.
    pub async fn handle(&self, tx: &Transaction, scored: ScoredTransaction) -> IntakeOutcome {
        if self.decide(&scored) == AlertDecision::Suppressed {
            debug!(transaction_id = %tx.id, final_score = scored.final_score, "Below alert threshold");
            return IntakeOutcome::Accepted { scored };
        }

        let alert = Self::build_alert(tx, &scored);
        self.metrics.record_alert();

        warn!(
            id = %alert.id,
            account_id = %alert.account_id,
            reason = %alert.reason,
            score = alert.score,
            transaction_id = %alert.transaction_id,
            "Alert generated"
        );

        match self.persist(&alert).await {
            Ok(()) => IntakeOutcome::AcceptedWithAlertPersisted { scored, alert },
            Err(e) => {
                self.metrics.record_alert_persist_failure();
                warn!(id = %alert.id, error = %e, "Failed to index alert");
                IntakeOutcome::AcceptedAlertPersistenceFailed {
                    scored,
                    alert,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn persist(&self, alert: &Alert) -> Result<(), AlertStoreError> {
        tokio::time::timeout(self.store_timeout, self.store.upsert(alert))
            .await
            .map_err(|_| AlertStoreError::Timeout(self.store_timeout))?
    }

    /// Most recent alerts, newest first. Undecodable documents are skipped.
    pub async fn list_recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, AlertStoreError> {
        let docs = tokio::time::timeout(self.store_timeout, self.store.query_recent(limit))
            .await
            .map_err(|_| AlertStoreError::Timeout(self.store_timeout))??;

        let mut alerts: Vec<Alert> = docs
            .iter()
            .filter_map(|doc| match document::decode_alert(doc) {
                Ok(alert) => Some(alert),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable alert document");
                    None
                }
            })
            .collect();
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        alerts.truncate(limit);
        Ok(alerts)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// In-memory alert store keyed by id. `failing` makes every call error.
    #[derive(Default)]
    pub struct MemoryAlertStore {
        pub docs: Mutex<Vec<Value>>,
        pub failing: bool,
    }

    impl MemoryAlertStore {
        pub fn failing() -> Self {
            Self {
                docs: Mutex::new(Vec::new()),
                failing: true,
            }
        }

        pub fn with_docs(docs: Vec<Value>) -> Self {
            Self {
                docs: Mutex::new(docs),
                failing: false,
            }
        }

        pub fn len(&self) -> usize {
            self.docs.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AlertStore for MemoryAlertStore {
        async fn upsert(&self, alert: &Alert) -> Result<(), AlertStoreError> {
            if self.failing {
                return Err(AlertStoreError::Unavailable("index closed".into()));
            }
            let mut docs = self.docs.lock().unwrap();
            docs.retain(|d| d["id"] != Value::String(alert.id.clone()));
            docs.push(document::to_document(alert));
            Ok(())
        }

        async fn query_recent(&self, limit: usize) -> Result<Vec<Value>, AlertStoreError> {
            if self.failing {
                return Err(AlertStoreError::Unavailable("index closed".into()));
            }
            let mut docs = self.docs.lock().unwrap().clone();
            docs.sort_by_key(|d| std::cmp::Reverse(d["timestamp"].as_i64().unwrap_or(0)));
            docs.truncate(limit);
            Ok(docs)
        }
    }

    /// Alert store whose calls never complete.
    pub struct StalledAlertStore;

    #[async_trait]
    impl AlertStore for StalledAlertStore {
        async fn upsert(&self, _alert: &Alert) -> Result<(), AlertStoreError> {
            std::future::pending().await
        }

        async fn query_recent(&self, _limit: usize) -> Result<Vec<Value>, AlertStoreError> {
            std::future::pending().await
        }
    }
}
