//! Postgres implementation of LedgerStore.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};

use crate::domain::{chain, ChainLink, Transaction, TransactionStatus, Trigger, User};
use crate::ports::{LedgerStore, StoreError, StoreResult};

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// The completed row no other completed row links to. `updated_at` only
/// breaks ties on a broken chain: it is stamped before the user row lock.
const CHAIN_HEAD_QUERY: &str = r#"
    SELECT t.* FROM transactions t
    WHERE t.user_id = $1 AND t.status = 'completed'
      AND NOT EXISTS (
          SELECT 1 FROM transactions n
          WHERE n.prev_transaction_id = t.id AND n.status = 'completed'
      )
    ORDER BY t.updated_at DESC, t.created_at DESC
    LIMIT 1
"#;

/// Postgres-backed ledger.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn chain_head_in(
        executor: &mut SqlxTransaction<'_, Postgres>,
        user_id: i64,
    ) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(CHAIN_HEAD_QUERY)
            .bind(user_id)
            .fetch_optional(&mut **executor)
            .await?;

        row.map(TransactionRow::into_domain).transpose()
    }
}

#[async_trait]
impl LedgerStore for PostgresLedger {
    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO transactions (
                id, user_id, amount, payment_method, status, balance,
                prev_transaction_id, prev_balance, expired_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&tx.id)
        .bind(tx.user_id)
        .bind(&tx.amount)
        .bind(&tx.payment_method)
        .bind(tx.status.as_str())
        .bind(&tx.balance)
        .bind(&tx.prev_transaction_id)
        .bind(&tx.prev_balance)
        .bind(tx.expired_at)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn find_transaction(&self, id: &str) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, balance FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(UserRow::into_domain))
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT id, balance FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(UserRow::into_domain).collect())
    }

    async fn latest_completed(&self, user_id: i64) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(CHAIN_HEAD_QUERY)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn mark_verified(
        &self,
        id: &str,
        link: &ChainLink,
        at: DateTime<Utc>,
    ) -> StoreResult<Transaction> {
        let transition = Trigger::Verify.transition();
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions
            SET status = $3, balance = $4, prev_transaction_id = $5, prev_balance = $6, updated_at = $7
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(transition.from.as_str())
        .bind(transition.to.as_str())
        .bind(&link.balance)
        .bind(&link.prev_transaction_id)
        .bind(&link.prev_balance)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_domain(),
            None => Err(StoreError::Conflict {
                id: id.to_string(),
                expected: transition.from,
            }),
        }
    }

    async fn mark_confirming(&self, id: &str, at: DateTime<Utc>) -> StoreResult<Transaction> {
        let transition = Trigger::Confirm.transition();
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions
            SET status = $3, updated_at = $4
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(transition.from.as_str())
        .bind(transition.to.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_domain(),
            None => Err(StoreError::Conflict {
                id: id.to_string(),
                expected: transition.from,
            }),
        }
    }

    async fn complete(&self, id: &str, at: DateTime<Utc>) -> StoreResult<Transaction> {
        let transition = Trigger::Finalize.transition();
        let mut db_tx = self.pool.begin().await?;

        // Lock order: transaction row, then user row.
        let current = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *db_tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("transaction {}", id)))?
        .into_domain()?;

        if current.status != transition.from {
            db_tx.rollback().await?;
            return Err(StoreError::Conflict {
                id: id.to_string(),
                expected: transition.from,
            });
        }

        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(current.user_id)
            .fetch_optional(&mut *db_tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", current.user_id)))?;

        let head = Self::chain_head_in(&mut db_tx, current.user_id).await?;
        let link = match current.link() {
            Some(link) if link.follows(head.as_ref()) => link,
            stale => {
                tracing::warn!(
                    transaction_id = %id,
                    user_id = current.user_id,
                    stale_prev = ?stale.and_then(|l| l.prev_transaction_id),
                    head = ?head.as_ref().map(|h| h.id.as_str()),
                    "Chain head moved since verification, re-linking"
                );
                ChainLink::extend(head.as_ref(), &current.amount)
            }
        };

        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions
            SET status = $3, balance = $4, prev_transaction_id = $5, prev_balance = $6, updated_at = $7
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(transition.from.as_str())
        .bind(transition.to.as_str())
        .bind(&link.balance)
        .bind(&link.prev_transaction_id)
        .bind(&link.prev_balance)
        .bind(at)
        .fetch_one(&mut *db_tx)
        .await?;

        sqlx::query("UPDATE users SET balance = $2 WHERE id = $1")
            .bind(current.user_id)
            .bind(&link.balance)
            .execute(&mut *db_tx)
            .await?;

        db_tx.commit().await?;
        row.into_domain()
    }

    async fn completed_chain(&self, user_id: i64) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT * FROM transactions
            WHERE user_id = $1 AND status = 'completed'
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let completed = rows
            .into_iter()
            .map(TransactionRow::into_domain)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(chain::in_link_order(completed))
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: String,
    user_id: i64,
    amount: BigDecimal,
    payment_method: String,
    status: String,
    balance: Option<BigDecimal>,
    prev_transaction_id: Option<String>,
    prev_balance: Option<BigDecimal>,
    expired_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> StoreResult<Transaction> {
        let status = self
            .status
            .parse::<TransactionStatus>()
            .map_err(|e| StoreError::Corrupt(format!("transaction {}: {}", self.id, e)))?;

        Ok(Transaction {
            id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            payment_method: self.payment_method,
            status,
            balance: self.balance,
            prev_transaction_id: self.prev_transaction_id,
            prev_balance: self.prev_balance,
            expired_at: self.expired_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    balance: BigDecimal,
}

impl UserRow {
    fn into_domain(self) -> User {
        User {
            id: self.id,
            balance: self.balance,
        }
    }
}
