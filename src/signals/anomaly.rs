use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::Transaction;

/// Anomaly score in `[0, 1]` with a free-text explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySignal {
    pub score: f64,
    pub explanation: String,
}

impl AnomalySignal {
    pub fn new(score: f64, explanation: impl Into<String>) -> Self {
        Self {
            score,
            explanation: explanation.into(),
        }
    }
}

/// Source of anomaly signals. Implementations never fail: a producer that
/// cannot score a transaction returns its own fallback signal.
#[async_trait]
pub trait AnomalyProducer: Send + Sync {
    async fn produce(&self, tx: &Transaction) -> AnomalySignal;
}

/// Stand-in for a real model: derives a pseudo-random score from the clock.
#[derive(Debug, Default)]
pub struct SimulatedAnomalyModel;

impl SimulatedAnomalyModel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AnomalyProducer for SimulatedAnomalyModel {
    async fn produce(&self, tx: &Transaction) -> AnomalySignal {
        let now = Utc::now();
        let nanos = now.timestamp_subsec_nanos() as u64;
        let score = (nanos % 100) as f64 / 100.0;
        debug!(transaction_id = %tx.id, score, "Simulated anomaly model returned score");
        AnomalySignal::new(
            score,
            format!(
                "Simulated AI analysis based on transaction details at {}",
                now.to_rfc3339()
            ),
        )
    }
}
