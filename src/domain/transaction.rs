//! Transaction domain entity.
//! Framework-agnostic representation of a wallet top-up ledger entry.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chain::{ChainLink, MONEY_SCALE};
use super::status::TransactionStatus;

/// Domain entity representing one ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "transaction_id")]
    pub id: String,
    pub user_id: i64,
    pub amount: BigDecimal,
    pub payment_method: String,
    pub status: TransactionStatus,
    /// Resulting balance once verified; `None` while pending.
    pub balance: Option<BigDecimal>,
    pub prev_transaction_id: Option<String>,
    pub prev_balance: Option<BigDecimal>,
    pub expired_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Builds a fresh `pending` entry whose confirmation deadline is `now + window`.
    pub fn pending(
        user_id: i64,
        amount: BigDecimal,
        payment_method: String,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_transaction_id(),
            user_id,
            amount: amount.with_scale(MONEY_SCALE),
            payment_method,
            status: TransactionStatus::Pending,
            balance: None,
            prev_transaction_id: None,
            prev_balance: None,
            expired_at: now + window,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expired_at
    }

    /// The chain fields this entry was verified (or completed) with.
    pub fn link(&self) -> Option<ChainLink> {
        match (&self.balance, &self.prev_balance) {
            (Some(balance), Some(prev_balance)) => Some(ChainLink {
                prev_transaction_id: self.prev_transaction_id.clone(),
                prev_balance: prev_balance.clone(),
                balance: balance.clone(),
            }),
            _ => None,
        }
    }

    pub(crate) fn apply_link(&mut self, link: ChainLink) {
        self.prev_transaction_id = link.prev_transaction_id;
        self.prev_balance = Some(link.prev_balance);
        self.balance = Some(link.balance);
    }
}

pub fn new_transaction_id() -> String {
    format!("txn-{}", Uuid::new_v4().simple())
}

/// A registered wallet owner. `balance` mirrors the head of the user's completed chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "user_id")]
    pub id: i64,
    pub balance: BigDecimal,
}
