//! Per-user balance chain.
//!
//! A user's completed transactions form a singly linked list through
//! `prev_transaction_id`. The chain starts from a zero balance.

use bigdecimal::BigDecimal;
use serde::Serialize;
use thiserror::Error;

use super::status::TransactionStatus;
use super::transaction::Transaction;

/// Chain fields written onto a transaction when it is verified or completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainLink {
    pub prev_transaction_id: Option<String>,
    pub prev_balance: BigDecimal,
    pub balance: BigDecimal,
}

impl ChainLink {
    /// Links `amount` onto `head`, the user's chain head.
    /// No head means the user has no chain yet and the base balance is zero.
    pub fn extend(head: Option<&Transaction>, amount: &BigDecimal) -> Self {
        let (prev_transaction_id, prev_balance) = match head {
            Some(head) => (
                Some(head.id.clone()),
                head.balance.clone().unwrap_or_else(zero),
            ),
            None => (None, zero()),
        };
        let balance = &prev_balance + amount;

        Self {
            prev_transaction_id,
            prev_balance,
            balance,
        }
    }

    /// Whether this link still points at `head`.
    pub fn follows(&self, head: Option<&Transaction>) -> bool {
        match head {
            Some(head) => {
                self.prev_transaction_id.as_deref() == Some(head.id.as_str())
                    && head.balance.as_ref() == Some(&self.prev_balance)
            }
            None => self.prev_transaction_id.is_none() && self.prev_balance == zero(),
        }
    }
}

/// Scale of every stored amount and balance, matching NUMERIC(20, 2).
pub const MONEY_SCALE: i64 = 2;

pub fn zero() -> BigDecimal {
    BigDecimal::from(0).with_scale(MONEY_SCALE)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainViolation {
    #[error("transaction {id} is {status}, not completed")]
    NotCompleted { id: String, status: TransactionStatus },

    #[error("transaction {id} has no chain fields")]
    Unlinked { id: String },

    #[error("transaction {id} links to {found:?}, expected {expected:?}")]
    BrokenLink {
        id: String,
        expected: Option<String>,
        found: Option<String>,
    },

    #[error("transaction {id} starts from {found}, expected {expected}")]
    PrevBalanceMismatch {
        id: String,
        expected: BigDecimal,
        found: BigDecimal,
    },

    #[error("transaction {id} balance is {found}, expected {expected}")]
    BalanceMismatch {
        id: String,
        expected: BigDecimal,
        found: BigDecimal,
    },
}

/// The tail of a user's completed transactions: the one no other completed
/// transaction links to. Completion timestamps are taken before the per-user
/// lock, so they do not order the chain.
///
/// A broken chain can have several tails; the latest update wins then.
pub fn chain_head<'a>(completed: impl IntoIterator<Item = &'a Transaction>) -> Option<&'a Transaction> {
    let completed: Vec<&Transaction> = completed.into_iter().collect();
    completed
        .iter()
        .copied()
        .filter(|tx| {
            !completed
                .iter()
                .any(|next| next.prev_transaction_id.as_deref() == Some(tx.id.as_str()))
        })
        .max_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then(a.created_at.cmp(&b.created_at))
        })
}

/// Orders completed transactions by following `prev_transaction_id` from the
/// zero base. Rows the walk does not reach are appended by update time, so
/// [`audit_chain`] still sees them.
pub fn in_link_order(mut completed: Vec<Transaction>) -> Vec<Transaction> {
    completed.sort_by(|a, b| {
        a.updated_at
            .cmp(&b.updated_at)
            .then(a.created_at.cmp(&b.created_at))
    });

    let mut ordered = Vec::with_capacity(completed.len());
    let mut prev: Option<String> = None;
    while let Some(pos) = completed
        .iter()
        .position(|tx| tx.prev_transaction_id == prev)
    {
        let tx = completed.remove(pos);
        prev = Some(tx.id.clone());
        ordered.push(tx);
    }

    ordered.extend(completed);
    ordered
}

/// Checks a user's completed transactions, oldest first, against the chain invariant.
/// Returns the head balance on success.
pub fn audit_chain(chain: &[Transaction]) -> Result<BigDecimal, ChainViolation> {
    let mut prev_id: Option<&str> = None;
    let mut running = zero();

    for tx in chain {
        if tx.status != TransactionStatus::Completed {
            return Err(ChainViolation::NotCompleted {
                id: tx.id.clone(),
                status: tx.status,
            });
        }

        let link = tx.link().ok_or_else(|| ChainViolation::Unlinked { id: tx.id.clone() })?;

        if link.prev_transaction_id.as_deref() != prev_id {
            return Err(ChainViolation::BrokenLink {
                id: tx.id.clone(),
                expected: prev_id.map(str::to_string),
                found: link.prev_transaction_id,
            });
        }
        if link.prev_balance != running {
            return Err(ChainViolation::PrevBalanceMismatch {
                id: tx.id.clone(),
                expected: running,
                found: link.prev_balance,
            });
        }

        let expected = &running + &tx.amount;
        if link.balance != expected {
            return Err(ChainViolation::BalanceMismatch {
                id: tx.id.clone(),
                expected,
                found: link.balance,
            });
        }

        running = link.balance;
        prev_id = Some(tx.id.as_str());
    }

    Ok(running)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn completed(amount: &str, head: Option<&Transaction>) -> Transaction {
        let mut tx = Transaction::pending(1, dec(amount), "card".into(), Duration::minutes(5), Utc::now());
        let link = ChainLink::extend(head, &tx.amount);
        tx.apply_link(link);
        tx.status = TransactionStatus::Completed;
        tx
    }

    #[test]
    fn test_first_link_starts_from_zero() {
        let link = ChainLink::extend(None, &dec("100"));

        assert_eq!(link.prev_transaction_id, None);
        assert_eq!(link.prev_balance, zero());
        assert_eq!(link.balance, dec("100"));
        assert!(link.follows(None));
    }

    #[test]
    fn test_link_extends_head_balance() {
        let first = completed("100", None);
        let link = ChainLink::extend(Some(&first), &dec("50.25"));

        assert_eq!(link.prev_transaction_id.as_deref(), Some(first.id.as_str()));
        assert_eq!(link.prev_balance, dec("100"));
        assert_eq!(link.balance, dec("150.25"));
        assert!(link.follows(Some(&first)));
        assert!(!link.follows(None));
    }

    #[test]
    fn test_audit_accepts_valid_chain() {
        let a = completed("100", None);
        let b = completed("50", Some(&a));
        let c = completed("0.10", Some(&b));

        assert_eq!(audit_chain(&[a, b, c]), Ok(dec("150.10")));
        assert_eq!(audit_chain(&[]), Ok(zero()));
    }

    #[test]
    fn test_audit_detects_stale_link() {
        let a = completed("100", None);
        let b = completed("50", Some(&a));
        // c was chained off `a` while `b` was in flight
        let c = completed("25", Some(&a));

        let err = audit_chain(&[a, b.clone(), c.clone()]).unwrap_err();
        assert_eq!(
            err,
            ChainViolation::BrokenLink {
                id: c.id,
                expected: Some(b.id),
                found: c.prev_transaction_id,
            }
        );
    }

    #[test]
    fn test_audit_detects_wrong_balance() {
        let a = completed("100", None);
        let mut b = completed("50", Some(&a));
        b.balance = Some(dec("151"));

        assert!(matches!(
            audit_chain(&[a, b]),
            Err(ChainViolation::BalanceMismatch { .. })
        ));
    }

    #[test]
    fn test_head_follows_links_not_timestamps() {
        let mut a = completed("100", None);
        let mut b = completed("50", Some(&a));
        // b finished under an earlier clock reading than a
        b.updated_at = a.updated_at - Duration::milliseconds(3);
        a.updated_at += Duration::milliseconds(3);

        assert_eq!(chain_head([&a, &b]).map(|t| t.id.as_str()), Some(b.id.as_str()));
        assert_eq!(chain_head(Vec::<&Transaction>::new()), None);

        let ordered = in_link_order(vec![b.clone(), a.clone()]);
        assert_eq!(ordered, vec![a, b]);
        assert_eq!(audit_chain(&ordered), Ok(dec("150")));
    }

    #[test]
    fn test_link_order_keeps_unreachable_rows() {
        let a = completed("100", None);
        let b = completed("50", Some(&a));
        let stray = completed("25", Some(&a));

        let ordered = in_link_order(vec![stray.clone(), b, a]);
        assert_eq!(ordered.len(), 3);
        assert!(matches!(
            audit_chain(&ordered),
            Err(ChainViolation::BrokenLink { .. })
        ));
        assert!(ordered.iter().any(|t| t.id == stray.id));
    }

    #[test]
    fn test_audit_rejects_unfinished_entries() {
        let mut a = completed("100", None);
        a.status = TransactionStatus::Verified;

        assert!(matches!(
            audit_chain(&[a]),
            Err(ChainViolation::NotCompleted { .. })
        ));
    }
}
