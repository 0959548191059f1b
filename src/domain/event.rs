//! Lifecycle events carried on the `transaction` topic.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::TransactionStatus;
use super::transaction::Transaction;

/// One bus message. Producers send either the full snapshot (on create and
/// confirm) or the light `{transaction_id, status}` echo the worker emits.
/// Consumers only trust `transaction_id` and `status`; the row is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
}

impl TransactionEvent {
    pub fn snapshot(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id.clone(),
            user_id: Some(tx.user_id),
            amount: Some(tx.amount.clone()),
            payment_method: Some(tx.payment_method.clone()),
            status: tx.status,
            expired_at: Some(tx.expired_at),
        }
    }

    pub fn echo(transaction_id: impl Into<String>, status: TransactionStatus) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            user_id: None,
            amount: None,
            payment_method: None,
            status,
            expired_at: None,
        }
    }

    /// Partition key; keeps every event of one transaction in order.
    pub fn key(&self) -> &str {
        &self.transaction_id
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_echo_has_only_id_and_status() {
        let event = TransactionEvent::echo("txn-1", TransactionStatus::Verified);
        let value: serde_json::Value = serde_json::from_slice(&event.to_bytes().unwrap()).unwrap();

        assert_eq!(value, json!({"transaction_id": "txn-1", "status": "verified"}));
    }

    #[test]
    fn test_snapshot_carries_full_message() {
        let tx = Transaction::pending(3, BigDecimal::from(100), "card".into(), Duration::minutes(5), Utc::now());
        let value = serde_json::to_value(TransactionEvent::snapshot(&tx)).unwrap();

        assert_eq!(value["transaction_id"], tx.id.as_str());
        assert_eq!(value["user_id"], 3);
        assert_eq!(value["payment_method"], "card");
        assert_eq!(value["status"], "pending");
        assert!(value["expired_at"].is_string());
    }

    #[test]
    fn test_decodes_producer_message_with_numeric_amount() {
        let payload = br#"{"transaction_id":"txn-9","user_id":1,"amount":100.5,
            "payment_method":"card","status":"pending","expired_at":"2026-01-01T00:00:00Z"}"#;
        let event = TransactionEvent::from_bytes(payload).unwrap();

        assert_eq!(event.transaction_id, "txn-9");
        assert_eq!(event.status, TransactionStatus::Pending);
        assert_eq!(event.amount, Some("100.5".parse().unwrap()));
    }

    #[test]
    fn test_rejects_unknown_status() {
        let payload = br#"{"transaction_id":"txn-9","status":"refunded"}"#;
        assert!(TransactionEvent::from_bytes(payload).is_err());
    }
}
