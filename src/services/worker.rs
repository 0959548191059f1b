//! Confirmation Worker: the event-driven engine of the transaction lifecycle.
//!
//! Consumes the `transaction` topic one delivery at a time. Each delivery is
//! claimed through the idempotency lock, then dispatched on the *persisted*
//! status of the row, never on the status carried by the event.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{ChainLink, Effect, Transaction, TransactionEvent, Trigger};
use crate::ports::{EventPublisher, EventSubscriber, IdempotencyLock, LedgerStore, StoreError};

const RECEIVE_BACKOFF: Duration = Duration::from_secs(1);

/// How one delivery was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
    /// Payload was not a transaction event.
    Malformed,
    /// Event carried a status the worker itself announces.
    Ignored,
    /// Another delivery of the same transaction holds the claim.
    Duplicate,
    LockUnavailable,
    /// No row for the event's transaction id.
    Missing,
    StoreFailed,
    Verified(Transaction),
    Completed(Transaction),
    /// Pending past its deadline; left untouched.
    Expired,
    /// Persisted status needs no worker action.
    NoOp,
    /// A concurrent update moved the row first.
    Conflict,
}

#[derive(Clone)]
pub struct ConfirmationWorker {
    ledger: Arc<dyn LedgerStore>,
    lock: Arc<dyn IdempotencyLock>,
    publisher: Arc<dyn EventPublisher>,
    lock_ttl: Duration,
}

impl ConfirmationWorker {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        lock: Arc<dyn IdempotencyLock>,
        publisher: Arc<dyn EventPublisher>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            ledger,
            lock,
            publisher,
            lock_ttl,
        }
    }

    /// Consumes deliveries until `shutdown` resolves. Errors never end the loop.
    pub async fn run<S, F>(&self, subscriber: &mut S, shutdown: F)
    where
        S: EventSubscriber + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!("Confirmation worker started");

        loop {
            let delivery = tokio::select! {
                _ = &mut shutdown => break,
                received = subscriber.receive() => received,
            };

            match delivery {
                Ok(delivery) => {
                    let outcome = self.handle_payload(&delivery.payload).await;
                    tracing::debug!(key = ?delivery.key, outcome = ?outcome, "Delivery handled");
                    if let Err(e) = subscriber.commit().await {
                        tracing::warn!(error = %e, "Failed to commit offset");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to receive event");
                    tokio::time::sleep(RECEIVE_BACKOFF).await;
                }
            }
        }

        tracing::info!("Confirmation worker stopped");
    }

    pub async fn handle_payload(&self, payload: &[u8]) -> WorkerOutcome {
        let event = match TransactionEvent::from_bytes(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "Skipping malformed event"
                );
                return WorkerOutcome::Malformed;
            }
        };

        self.handle_event(&event).await
    }

    pub async fn handle_event(&self, event: &TransactionEvent) -> WorkerOutcome {
        let id = event.transaction_id.as_str();

        if event.status.is_worker_echo() {
            tracing::debug!(transaction_id = %id, status = %event.status, "Ignoring status echo");
            return WorkerOutcome::Ignored;
        }

        match self.lock.try_acquire(id, self.lock_ttl).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(transaction_id = %id, "Transaction already being processed");
                return WorkerOutcome::Duplicate;
            }
            Err(e) => {
                tracing::error!(transaction_id = %id, error = %e, "Failed to claim transaction");
                return WorkerOutcome::LockUnavailable;
            }
        }

        let tx = match self.ledger.find_transaction(id).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                tracing::warn!(transaction_id = %id, "Transaction not found");
                self.release(id).await;
                return WorkerOutcome::Missing;
            }
            Err(e) => {
                tracing::error!(transaction_id = %id, error = %e, "Failed to load transaction");
                return WorkerOutcome::StoreFailed;
            }
        };

        match tx.status.worker_trigger() {
            Some(Trigger::Verify) => self.verify(tx).await,
            Some(Trigger::Finalize) => self.finalize(tx).await,
            _ => {
                tracing::debug!(transaction_id = %id, status = %tx.status, "Nothing to do");
                self.release(id).await;
                WorkerOutcome::NoOp
            }
        }
    }

    async fn verify(&self, tx: Transaction) -> WorkerOutcome {
        let now = Utc::now();
        if tx.is_expired_at(now) {
            tracing::info!(
                transaction_id = %tx.id,
                expired_at = %tx.expired_at,
                "Pending transaction expired, not verifying"
            );
            self.release(&tx.id).await;
            return WorkerOutcome::Expired;
        }

        let head = match self.ledger.latest_completed(tx.user_id).await {
            Ok(head) => head,
            Err(e) => {
                tracing::error!(transaction_id = %tx.id, error = %e, "Failed to read chain head");
                return WorkerOutcome::StoreFailed;
            }
        };
        let link = ChainLink::extend(head.as_ref(), &tx.amount);

        let verified = match self.ledger.mark_verified(&tx.id, &link, now).await {
            Ok(verified) => verified,
            Err(e) => return self.update_failed(&tx.id, e).await,
        };

        tracing::info!(
            transaction_id = %verified.id,
            user_id = verified.user_id,
            prev_transaction_id = ?verified.prev_transaction_id,
            prev_balance = %link.prev_balance,
            balance = %link.balance,
            "Transaction verified"
        );

        self.release(&verified.id).await;
        self.announce(Trigger::Verify, &verified).await;
        WorkerOutcome::Verified(verified)
    }

    async fn finalize(&self, tx: Transaction) -> WorkerOutcome {
        let completed = match self.ledger.complete(&tx.id, Utc::now()).await {
            Ok(completed) => completed,
            Err(e) => return self.update_failed(&tx.id, e).await,
        };

        tracing::info!(
            transaction_id = %completed.id,
            user_id = completed.user_id,
            balance = ?completed.balance,
            "Transaction completed"
        );

        self.announce(Trigger::Finalize, &completed).await;
        self.release(&completed.id).await;
        WorkerOutcome::Completed(completed)
    }

    async fn update_failed(&self, id: &str, err: StoreError) -> WorkerOutcome {
        match err {
            StoreError::Conflict { .. } => {
                tracing::info!(transaction_id = %id, reason = %err, "Lost update race");
                self.release(id).await;
                WorkerOutcome::Conflict
            }
            err => {
                // claim is left to expire
                tracing::error!(transaction_id = %id, error = %err, "Failed to update transaction");
                WorkerOutcome::StoreFailed
            }
        }
    }

    async fn announce(&self, trigger: Trigger, tx: &Transaction) {
        let transition = trigger.transition();
        if !transition.has(Effect::Announce) {
            return;
        }

        let event = TransactionEvent::echo(tx.id.clone(), transition.to);
        if let Err(e) = self.publisher.publish(&event).await {
            tracing::error!(
                transaction_id = %tx.id,
                status = %transition.to,
                error = %e,
                "Failed to publish status event"
            );
        }
    }

    async fn release(&self, id: &str) {
        if let Err(e) = self.lock.release(id).await {
            tracing::warn!(transaction_id = %id, error = %e, "Failed to release lock");
        }
    }
}
