//! Transaction status values.
//!
//! Stored as lowercase text in PostgreSQL and carried verbatim on the bus.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Row created, waiting for the worker to chain it.
    Pending,
    /// Balance chained; waiting for the client to confirm.
    Verified,
    /// Confirmed by the client; waiting for the worker to finalize.
    Confirming,
    /// Terminal: part of the user's balance chain.
    Completed,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 4] = [
        TransactionStatus::Pending,
        TransactionStatus::Verified,
        TransactionStatus::Confirming,
        TransactionStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Verified => "verified",
            TransactionStatus::Confirming => "confirming",
            TransactionStatus::Completed => "completed",
        }
    }

    /// Position in the lifecycle. Transitions only ever increase it.
    pub fn rank(&self) -> u8 {
        match self {
            TransactionStatus::Pending => 0,
            TransactionStatus::Verified => 1,
            TransactionStatus::Confirming => 2,
            TransactionStatus::Completed => 3,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Completed)
    }

    /// Statuses the worker publishes itself. Seeing one of these on the bus
    /// means there is nothing left for the worker to do.
    #[inline]
    pub fn is_worker_echo(&self) -> bool {
        matches!(self, TransactionStatus::Verified | TransactionStatus::Completed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "verified" => Ok(TransactionStatus::Verified),
            "confirming" => Ok(TransactionStatus::Confirming),
            "completed" => Ok(TransactionStatus::Completed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
