pub mod pipeline;
pub mod tx;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A validated transaction, borrowed by the pipeline for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Caller-supplied; may be empty and is not checked for uniqueness.
    pub id: String,
    pub account_id: String,
    pub transaction_type: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

/// A detection rule as stored in the `detection_rules` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRule {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Stored and returned but not consulted by evaluation.
    pub priority: i32,
    pub condition: String,
    pub weight: f64,
}

/// A persisted alert. Write-once: never updated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub transaction_id: String,
    pub account_id: String,
    pub reason: String,
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}

/// A rule that fired for a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleHit {
    pub rule_id: i64,
    pub condition: String,
    pub weight: f64,
}

/// Output of the scoring orchestrator for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTransaction {
    pub transaction_id: String,
    pub anomaly_score: f64,
    pub explanation: String,
    pub rule_contribution: f64,
    /// `anomaly_score + rule_contribution`, unclamped.
    pub final_score: f64,
    pub rule_hits: Vec<RuleHit>,
}

/// Terminal state of a scored transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertDecision {
    Alerted,
    Suppressed,
}

impl AlertDecision {
    pub fn from_score(final_score: f64, threshold: f64) -> Self {
        if final_score >= threshold {
            AlertDecision::Alerted
        } else {
            AlertDecision::Suppressed
        }
    }
}

/// Result of transaction intake. Every variant is a successful intake;
/// alert persistence is best-effort.
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    /// Scored below the alert threshold.
    Accepted { scored: ScoredTransaction },
    AcceptedWithAlertPersisted {
        scored: ScoredTransaction,
        alert: Alert,
    },
    AcceptedAlertPersistenceFailed {
        scored: ScoredTransaction,
        alert: Alert,
        error: String,
    },
}

impl IntakeOutcome {
    pub fn scored(&self) -> &ScoredTransaction {
        match self {
            IntakeOutcome::Accepted { scored }
            | IntakeOutcome::AcceptedWithAlertPersisted { scored, .. }
            | IntakeOutcome::AcceptedAlertPersistenceFailed { scored, .. } => scored,
        }
    }

    /// The alert raised for this transaction, whether or not it was stored.
    pub fn alert(&self) -> Option<&Alert> {
        match self {
            IntakeOutcome::Accepted { .. } => None,
            IntakeOutcome::AcceptedWithAlertPersisted { alert, .. }
            | IntakeOutcome::AcceptedAlertPersistenceFailed { alert, .. } => Some(alert),
        }
    }

    pub fn decision(&self) -> AlertDecision {
        match self {
            IntakeOutcome::Accepted { .. } => AlertDecision::Suppressed,
            _ => AlertDecision::Alerted,
        }
    }
}
