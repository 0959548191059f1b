//! Confirmation Trigger Service: moves a verified top-up into `confirming`.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{Effect, Transaction, TransactionEvent, TransactionStatus, Trigger};
use crate::error::AppError;
use crate::ports::{EventPublisher, IdempotencyLock, LedgerStore, StoreError};
use crate::validation::validate_transaction_id;

/// What a confirm request found.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    /// The transaction is settled.
    Completed(Transaction),
    /// Still in flight. The worker has not finished with it yet.
    NotCompleted(Transaction),
    /// The confirmation window closed before the transaction was confirmed.
    Expired(Transaction),
}

impl ConfirmOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            ConfirmOutcome::Completed(tx)
            | ConfirmOutcome::NotCompleted(tx)
            | ConfirmOutcome::Expired(tx) => tx,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ConfirmOutcome::Completed(_) => "transaction completed",
            ConfirmOutcome::NotCompleted(_) => "transaction is not completed yet",
            ConfirmOutcome::Expired(_) => "transaction has expired",
        }
    }
}

#[derive(Clone)]
pub struct ConfirmationService {
    ledger: Arc<dyn LedgerStore>,
    lock: Arc<dyn IdempotencyLock>,
    publisher: Arc<dyn EventPublisher>,
    stall_after: Duration,
}

impl ConfirmationService {
    /// `stall_after` is how long a row may sit in `confirming` before a
    /// confirm call re-announces it. Use the worker's claim TTL.
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        lock: Arc<dyn IdempotencyLock>,
        publisher: Arc<dyn EventPublisher>,
        stall_after: Duration,
    ) -> Self {
        Self {
            ledger,
            lock,
            publisher,
            stall_after,
        }
    }

    pub async fn confirm(&self, transaction_id: &str) -> Result<ConfirmOutcome, AppError> {
        let transaction_id = validate_transaction_id(transaction_id)?;
        let tx = self
            .ledger
            .find_transaction(&transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", transaction_id)))?;

        if tx.status.is_terminal() {
            return Ok(ConfirmOutcome::Completed(tx));
        }

        match tx.status {
            TransactionStatus::Pending | TransactionStatus::Verified
                if tx.is_expired_at(Utc::now()) =>
            {
                tracing::info!(
                    transaction_id = %tx.id,
                    status = %tx.status,
                    expired_at = %tx.expired_at,
                    "Confirm requested after expiry"
                );
                Ok(ConfirmOutcome::Expired(tx))
            }
            TransactionStatus::Verified => self.start_confirming(tx).await,
            TransactionStatus::Confirming => {
                self.resume_confirming(&tx).await;
                Ok(ConfirmOutcome::NotCompleted(tx))
            }
            _ => Ok(ConfirmOutcome::NotCompleted(tx)),
        }
    }

    /// Re-announces a `confirming` row that has stalled.
    ///
    /// The worker commits its offset even when finalization fails and leaves
    /// the claim to expire. Once the row is older than `stall_after` and
    /// unclaimed, the next confirm call puts it back on the bus.
    async fn resume_confirming(&self, tx: &Transaction) {
        let stalled = chrono::Duration::from_std(self.stall_after)
            .map(|stall_after| tx.updated_at + stall_after <= Utc::now())
            .unwrap_or(false);
        if !stalled {
            return;
        }

        match self.lock.exists(&tx.id).await {
            Ok(false) => {}
            Ok(true) => return,
            Err(e) => {
                tracing::warn!(transaction_id = %tx.id, error = %e, "Failed to check claim");
                return;
            }
        }

        tracing::warn!(
            transaction_id = %tx.id,
            updated_at = %tx.updated_at,
            "Re-announcing stalled confirming transaction"
        );
        if let Err(e) = self.publisher.publish(&TransactionEvent::snapshot(tx)).await {
            tracing::error!(
                transaction_id = %tx.id,
                error = %e,
                "Failed to publish confirming event"
            );
        }
    }

    async fn start_confirming(&self, tx: Transaction) -> Result<ConfirmOutcome, AppError> {
        let transition = Trigger::Confirm.transition();
        let confirming = match self.ledger.mark_confirming(&tx.id, Utc::now()).await {
            Ok(updated) => updated,
            Err(StoreError::Conflict { .. }) => {
                tracing::info!(
                    transaction_id = %tx.id,
                    "Transaction left verified concurrently, not re-announcing"
                );
                return Ok(ConfirmOutcome::NotCompleted(tx));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            transaction_id = %confirming.id,
            user_id = confirming.user_id,
            "Transaction confirming"
        );

        if transition.has(Effect::Announce) {
            if let Err(e) = self
                .publisher
                .publish(&TransactionEvent::snapshot(&confirming))
                .await
            {
                tracing::error!(
                    transaction_id = %confirming.id,
                    error = %e,
                    "Failed to publish confirming event"
                );
            }
        }

        Ok(ConfirmOutcome::NotCompleted(confirming))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryBus, InMemoryLedger, InMemoryLock};
    use crate::domain::ChainLink;
    use bigdecimal::BigDecimal;
    use chrono::Duration;

    const STALL_AFTER: std::time::Duration = std::time::Duration::from_secs(600);

    fn service(ledger: &InMemoryLedger, lock: &InMemoryLock, bus: &InMemoryBus) -> ConfirmationService {
        ConfirmationService::new(
            Arc::new(ledger.clone()),
            Arc::new(lock.clone()),
            Arc::new(bus.clone()),
            STALL_AFTER,
        )
    }

    async fn seeded(ledger: &InMemoryLedger, window: Duration) -> Transaction {
        let tx = Transaction::pending(1, BigDecimal::from(100), "card".into(), window, Utc::now());
        ledger.insert_transaction(&tx).await.unwrap()
    }

    async fn verify(ledger: &InMemoryLedger, tx: &Transaction) {
        let link = ChainLink::extend(None, &tx.amount);
        ledger.mark_verified(&tx.id, &link, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_verified_moves_to_confirming_and_announces() {
        let ledger = InMemoryLedger::with_users([1]);
        let bus = InMemoryBus::new();
        let tx = seeded(&ledger, Duration::minutes(5)).await;
        verify(&ledger, &tx).await;

        let service = service(&ledger, &InMemoryLock::new(), &bus);
        let outcome = service.confirm(&tx.id).await.unwrap();

        assert!(matches!(outcome, ConfirmOutcome::NotCompleted(_)));
        assert_eq!(outcome.transaction().status, TransactionStatus::Confirming);
        let events = bus.published_for(&tx.id);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, TransactionStatus::Confirming);
        assert_eq!(events[0].user_id, Some(1));
    }

    #[tokio::test]
    async fn test_pending_is_not_mutated() {
        let ledger = InMemoryLedger::with_users([1]);
        let bus = InMemoryBus::new();
        let tx = seeded(&ledger, Duration::minutes(5)).await;

        let service = service(&ledger, &InMemoryLock::new(), &bus);
        let outcome = service.confirm(&tx.id).await.unwrap();

        assert_eq!(outcome, ConfirmOutcome::NotCompleted(tx.clone()));
        assert_eq!(ledger.find_transaction(&tx.id).await.unwrap(), Some(tx));
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_expired_verified_is_not_confirmed() {
        let ledger = InMemoryLedger::with_users([1]);
        let bus = InMemoryBus::new();
        let tx = seeded(&ledger, Duration::seconds(-1)).await;
        verify(&ledger, &tx).await;

        let service = service(&ledger, &InMemoryLock::new(), &bus);
        let outcome = service.confirm(&tx.id).await.unwrap();

        assert!(matches!(outcome, ConfirmOutcome::Expired(_)));
        assert_eq!(outcome.transaction().status, TransactionStatus::Verified);
        assert!(bus.published().is_empty());
    }

    /// A `confirming` row last touched well before the stall threshold.
    async fn stalled(ledger: &InMemoryLedger) -> Transaction {
        let tx = seeded(ledger, Duration::minutes(30)).await;
        verify(ledger, &tx).await;
        ledger
            .mark_confirming(&tx.id, Utc::now() - Duration::minutes(20))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_stalled_confirming_is_announced_again() {
        let ledger = InMemoryLedger::with_users([1]);
        let bus = InMemoryBus::new();
        let confirming = stalled(&ledger).await;

        let outcome = service(&ledger, &InMemoryLock::new(), &bus)
            .confirm(&confirming.id)
            .await
            .unwrap();

        assert_eq!(outcome, ConfirmOutcome::NotCompleted(confirming.clone()));
        assert_eq!(
            bus.published_for(&confirming.id),
            vec![TransactionEvent::snapshot(&confirming)]
        );
    }

    #[tokio::test]
    async fn test_claimed_confirming_is_left_to_the_worker() {
        let ledger = InMemoryLedger::with_users([1]);
        let lock = InMemoryLock::new();
        let bus = InMemoryBus::new();
        let confirming = stalled(&ledger).await;
        lock.try_acquire(&confirming.id, STALL_AFTER).await.unwrap();

        let outcome = service(&ledger, &lock, &bus).confirm(&confirming.id).await.unwrap();

        assert!(matches!(outcome, ConfirmOutcome::NotCompleted(_)));
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_recent_confirming_is_not_announced_again() {
        let ledger = InMemoryLedger::with_users([1]);
        let bus = InMemoryBus::new();
        let tx = seeded(&ledger, Duration::minutes(5)).await;
        verify(&ledger, &tx).await;
        ledger.mark_confirming(&tx.id, Utc::now()).await.unwrap();

        let outcome = service(&ledger, &InMemoryLock::new(), &bus).confirm(&tx.id).await.unwrap();

        assert!(matches!(outcome, ConfirmOutcome::NotCompleted(_)));
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_transaction_is_not_found() {
        let service = service(&InMemoryLedger::new(), &InMemoryLock::new(), &InMemoryBus::new());

        let err = service.confirm("txn-missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_blank_id_is_invalid() {
        let service = service(&InMemoryLedger::new(), &InMemoryLock::new(), &InMemoryBus::new());

        let err = service.confirm("  ").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
