pub mod anomaly;
pub mod rules;
pub mod score;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::core::{ScoredTransaction, Transaction};
use crate::db::RuleStore;
use anomaly::{AnomalyProducer, AnomalySignal};
use rules::{RuleEvaluation, RuleEvaluator};

/// The signal engine combines the anomaly signal with the rule contribution.
pub struct SignalEngine {
    anomaly: Arc<dyn AnomalyProducer>,
    rule_store: Arc<dyn RuleStore>,
    evaluator: RuleEvaluator,
    anomaly_timeout: Duration,
    rule_store_timeout: Duration,
}

impl SignalEngine {
    pub fn new(
        anomaly: Arc<dyn AnomalyProducer>,
        rule_store: Arc<dyn RuleStore>,
        evaluator: RuleEvaluator,
        anomaly_timeout: Duration,
        rule_store_timeout: Duration,
    ) -> Self {
        Self {
            anomaly,
            rule_store,
            evaluator,
            anomaly_timeout,
            rule_store_timeout,
        }
    }

    pub async fn score(&self, tx: &Transaction) -> ScoredTransaction {
        let signal = self.anomaly_signal(tx).await;
        let evaluation = self.rule_contribution(tx).await;
        let final_score = score::compute_final_score(signal.score, evaluation.contribution);

        info!(
            transaction_id = %tx.id,
            anomaly_score = signal.score,
            rule_score = evaluation.contribution,
            final_score,
            "Transaction scored"
        );

        ScoredTransaction {
            transaction_id: tx.id.clone(),
            anomaly_score: signal.score,
            explanation: signal.explanation,
            rule_contribution: evaluation.contribution,
            final_score,
            rule_hits: evaluation.hits,
        }
    }

    async fn anomaly_signal(&self, tx: &Transaction) -> AnomalySignal {
        match tokio::time::timeout(self.anomaly_timeout, self.anomaly.produce(tx)).await {
            Ok(signal) => signal,
            Err(_) => {
                warn!(
                    transaction_id = %tx.id,
                    timeout_ms = self.anomaly_timeout.as_millis() as u64,
                    "Anomaly producer timed out, using zero score"
                );
                AnomalySignal::new(0.0, "Anomaly model unavailable (timed out)")
            }
        }
    }

    /// Rules contribute nothing when the store is unreachable; intake never
    /// blocks on a rule-store outage.
    async fn rule_contribution(&self, tx: &Transaction) -> RuleEvaluation {
        let fetched =
            tokio::time::timeout(self.rule_store_timeout, self.rule_store.fetch_all_rules()).await;
        match fetched {
            Ok(Ok(rules)) => self.evaluator.evaluate(&rules, tx),
            Ok(Err(e)) => {
                warn!(transaction_id = %tx.id, error = %e, "Failed to fetch detection rules, scoring on anomaly signal only");
                RuleEvaluation::default()
            }
            Err(_) => {
                warn!(
                    transaction_id = %tx.id,
                    timeout_ms = self.rule_store_timeout.as_millis() as u64,
                    "Rule store timed out, scoring on anomaly signal only"
                );
                RuleEvaluation::default()
            }
        }
    }
}
