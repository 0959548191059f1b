//! Verification Service: turns a top-up request into a pending ledger entry.

use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::config::Config;
use crate::domain::{Transaction, TransactionEvent};
use crate::error::AppError;
use crate::ports::{EventPublisher, LedgerStore};
use crate::validation::{
    validate_money_scale, validate_payment_method, validate_positive_amount, validate_user_id,
};

/// Limits applied to every top-up request.
#[derive(Debug, Clone)]
pub struct TopUpPolicy {
    pub max_amount: BigDecimal,
    pub window: Duration,
}

impl TopUpPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_amount: config.max_topup_amount.clone(),
            window: config.topup_window(),
        }
    }
}

impl Default for TopUpPolicy {
    fn default() -> Self {
        Self {
            max_amount: BigDecimal::from(1000),
            window: Duration::minutes(5),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopUpRequest {
    pub user_id: i64,
    pub amount: BigDecimal,
    pub payment_method: String,
}

#[derive(Clone)]
pub struct VerificationService {
    ledger: Arc<dyn LedgerStore>,
    publisher: Arc<dyn EventPublisher>,
    policy: TopUpPolicy,
}

impl VerificationService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        publisher: Arc<dyn EventPublisher>,
        policy: TopUpPolicy,
    ) -> Self {
        Self {
            ledger,
            publisher,
            policy,
        }
    }

    /// Creates a `pending` transaction and announces it on the bus.
    ///
    /// The row is committed before the event is published. A publish failure
    /// is logged and the request still succeeds.
    pub async fn request_top_up(&self, request: TopUpRequest) -> Result<Transaction, AppError> {
        let user_id = request.user_id;
        validate_user_id(user_id)?;
        validate_positive_amount(&request.amount)?;
        validate_money_scale(&request.amount)?;
        let payment_method = validate_payment_method(&request.payment_method)?;

        if request.amount > self.policy.max_amount {
            return Err(AppError::LimitExceeded {
                amount: request.amount,
                limit: self.policy.max_amount.clone(),
            });
        }

        if self.ledger.find_user(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }

        let pending = Transaction::pending(
            user_id,
            request.amount,
            payment_method,
            self.policy.window,
            Utc::now(),
        );
        let created = self.ledger.insert_transaction(&pending).await?;

        tracing::info!(
            transaction_id = %created.id,
            user_id = created.user_id,
            amount = %created.amount,
            expired_at = %created.expired_at,
            "Top-up transaction created"
        );

        if let Err(e) = self
            .publisher
            .publish(&TransactionEvent::snapshot(&created))
            .await
        {
            tracing::error!(
                transaction_id = %created.id,
                error = %e,
                "Failed to publish created event"
            );
        }

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryBus, InMemoryLedger};
    use crate::domain::TransactionStatus;
    use std::str::FromStr;

    fn service(ledger: &InMemoryLedger, bus: &InMemoryBus) -> VerificationService {
        VerificationService::new(
            Arc::new(ledger.clone()),
            Arc::new(bus.clone()),
            TopUpPolicy::default(),
        )
    }

    fn request(user_id: i64, amount: &str) -> TopUpRequest {
        TopUpRequest {
            user_id,
            amount: BigDecimal::from_str(amount).unwrap(),
            payment_method: "card".to_string(),
        }
    }

    #[tokio::test]
    async fn test_creates_pending_transaction_and_event() {
        let ledger = InMemoryLedger::with_users([1]);
        let bus = InMemoryBus::new();

        let tx = service(&ledger, &bus)
            .request_top_up(request(1, "100.00"))
            .await
            .unwrap();

        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.balance.is_none());
        assert!(tx.prev_balance.is_none());
        assert_eq!(tx.expired_at - tx.created_at, Duration::minutes(5));

        let events = bus.published();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], TransactionEvent::snapshot(&tx));
    }

    #[tokio::test]
    async fn test_rejects_amount_above_cap_without_side_effects() {
        let ledger = InMemoryLedger::with_users([1]);
        let bus = InMemoryBus::new();

        let err = service(&ledger, &bus)
            .request_top_up(request(1, "1000.01"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::LimitExceeded { .. }));
        assert_eq!(ledger.transaction_count(), 0);
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_accepts_amount_equal_to_cap() {
        let ledger = InMemoryLedger::with_users([1]);
        let bus = InMemoryBus::new();

        let tx = service(&ledger, &bus)
            .request_top_up(request(1, "1000.00"))
            .await
            .unwrap();
        assert_eq!(tx.amount, BigDecimal::from(1000));
    }

    #[tokio::test]
    async fn test_rejects_non_positive_and_fractional_cents() {
        let ledger = InMemoryLedger::with_users([1]);
        let bus = InMemoryBus::new();
        let service = service(&ledger, &bus);

        for amount in ["0", "-5", "10.001"] {
            let err = service.request_top_up(request(1, amount)).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)), "amount {}", amount);
        }
        assert_eq!(ledger.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let ledger = InMemoryLedger::with_users([1]);
        let bus = InMemoryBus::new();

        let err = service(&ledger, &bus)
            .request_top_up(request(2, "10"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(bus.published().is_empty());
    }
}
