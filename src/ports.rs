//! Collaborator contracts used by the services and the worker.
//!
//! Each port has a production adapter (Postgres, Redis, Kafka) and an
//! in-memory adapter, see [`crate::adapters`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::domain::{ChainLink, Transaction, TransactionEvent, TransactionStatus, User};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional update found the row in a different status.
    #[error("transaction {id} is no longer {expected}")]
    Conflict {
        id: String,
        expected: TransactionStatus,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("ledger store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt ledger row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage of users and transactions.
///
/// Status changes are compare-and-set on `(id, expected status)`; a mismatch
/// returns [`StoreError::Conflict`] and changes nothing.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<Transaction>;

    async fn find_transaction(&self, id: &str) -> StoreResult<Option<Transaction>>;

    async fn find_user(&self, id: i64) -> StoreResult<Option<User>>;

    async fn list_users(&self) -> StoreResult<Vec<User>>;

    /// The chain head: the completed transaction no other completed one links to.
    async fn latest_completed(&self, user_id: i64) -> StoreResult<Option<Transaction>>;

    /// `pending → verified`, writing the chain fields.
    async fn mark_verified(
        &self,
        id: &str,
        link: &ChainLink,
        at: DateTime<Utc>,
    ) -> StoreResult<Transaction>;

    /// `verified → confirming`.
    async fn mark_confirming(&self, id: &str, at: DateTime<Utc>) -> StoreResult<Transaction>;

    /// `confirming → completed`. Serialized per user: re-links against the
    /// current chain head if it moved since verification, and writes the new
    /// head balance to the user row in the same unit of work.
    async fn complete(&self, id: &str, at: DateTime<Utc>) -> StoreResult<Transaction>;

    /// Completed transactions of one user in link order, from the zero base.
    async fn completed_chain(&self, user_id: i64) -> StoreResult<Vec<Transaction>>;

    async fn ping(&self) -> StoreResult<()>;
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock store unavailable: {0}")]
    Unavailable(String),
}

/// Expiring claims keyed by transaction id. A claim is a lease, not a mutex:
/// once the TTL passes another worker may claim the same key.
#[async_trait]
pub trait IdempotencyLock: Send + Sync {
    /// Set-if-absent with TTL. `Ok(false)` means someone already holds the key.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, LockError>;

    async fn exists(&self, key: &str) -> Result<bool, LockError>;

    async fn release(&self, key: &str) -> Result<(), LockError>;

    async fn ping(&self) -> Result<(), LockError>;
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to publish event: {0}")]
    Publish(String),

    #[error("failed to receive event: {0}")]
    Receive(String),

    #[error("failed to commit offset: {0}")]
    Commit(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &TransactionEvent) -> Result<(), BusError>;
}

/// One message read from the bus.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

/// At-least-once consumer. `commit` acknowledges everything received so far.
#[async_trait]
pub trait EventSubscriber: Send {
    async fn receive(&mut self) -> Result<Delivery, BusError>;

    async fn commit(&mut self) -> Result<(), BusError>;
}
