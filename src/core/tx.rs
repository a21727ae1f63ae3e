use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use super::Transaction;

/// Inbound transaction body as posted by clients. Every field is optional on
/// the wire so that missing fields become a validation error instead of a
/// decode error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransactionRequest {
    pub id: String,
    pub account_id: String,
    pub transaction_type: String,
    pub amount: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Error, PartialEq)]
pub enum IntakeError {
    #[error("Invalid request body: {0}")]
    Malformed(String),
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

impl TransactionRequest {
    /// Decode a raw JSON body.
    pub fn from_slice(body: &[u8]) -> Result<Self, IntakeError> {
        serde_json::from_slice(body).map_err(|e| IntakeError::Malformed(e.to_string()))
    }

    /// Check required fields and build the transaction. A missing timestamp
    /// is replaced with the receipt time.
    pub fn validate(self) -> Result<Transaction, IntakeError> {
        let mut missing = Vec::new();
        if self.account_id.is_empty() {
            missing.push("account_id");
        }
        if self.transaction_type.is_empty() {
            missing.push("transaction_type");
        }
        if self.amount == 0.0 {
            missing.push("amount");
        }
        if !missing.is_empty() {
            return Err(IntakeError::MissingFields(missing));
        }

        Ok(Transaction {
            id: self.id,
            account_id: self.account_id,
            transaction_type: self.transaction_type,
            amount: self.amount,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        })
    }
}
