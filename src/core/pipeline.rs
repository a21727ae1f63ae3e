use std::sync::Arc;

use tracing::{debug, info};

use crate::alerts::AlertManager;
use crate::core::{IntakeOutcome, Transaction};
use crate::metrics::PipelineMetrics;
use crate::signals::SignalEngine;

/// Scoring-and-alerting pipeline: score a transaction, then let the alert
/// manager decide whether to raise an alert.
pub struct Pipeline {
    engine: SignalEngine,
    alerts: AlertManager,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    pub fn new(engine: SignalEngine, alerts: AlertManager, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            engine,
            alerts,
            metrics,
        }
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Run one transaction through the pipeline. Always succeeds; the outcome
    /// records whether an alert was raised and stored.
    pub async fn process(&self, tx: &Transaction) -> IntakeOutcome {
        info!(
            transaction_id = %tx.id,
            account_id = %tx.account_id,
            transaction_type = %tx.transaction_type,
            amount = tx.amount,
            "Received transaction"
        );

        let scored = self.engine.score(tx).await;
        self.metrics.record_transaction();
        let outcome = self.alerts.handle(tx, scored).await;
        debug!(
            transaction_id = %tx.id,
            final_score = outcome.scored().final_score,
            decision = ?outcome.decision(),
            "Transaction processed"
        );
        outcome
    }
}
