//! In-memory adapters for tests and local runs.
//!
//! Each adapter keeps its state behind a single mutex, so conditional
//! updates are atomic the same way they are in Postgres.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use crate::domain::{chain, ChainLink, Transaction, TransactionEvent, Trigger, User};
use crate::ports::{
    BusError, Delivery, EventPublisher, EventSubscriber, IdempotencyLock, LedgerStore, LockError,
    StoreError, StoreResult,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct LedgerState {
    users: HashMap<i64, BigDecimal>,
    transactions: HashMap<String, Transaction>,
}

impl LedgerState {
    fn completed(&self, user_id: i64) -> impl Iterator<Item = &Transaction> {
        self.transactions
            .values()
            .filter(move |t| t.user_id == user_id && t.status == Trigger::Finalize.transition().to)
    }

    fn chain_head(&self, user_id: i64) -> Option<&Transaction> {
        chain::chain_head(self.completed(user_id))
    }

    fn advance(
        &mut self,
        id: &str,
        trigger: Trigger,
        link: Option<ChainLink>,
        at: DateTime<Utc>,
    ) -> StoreResult<Transaction> {
        let transition = trigger.transition();
        let tx = self
            .transactions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", id)))?;

        if tx.status != transition.from {
            return Err(StoreError::Conflict {
                id: id.to_string(),
                expected: transition.from,
            });
        }

        tx.status = transition.to;
        tx.updated_at = at;
        if let Some(link) = link {
            tx.apply_link(link);
        }
        Ok(tx.clone())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(ids: impl IntoIterator<Item = i64>) -> Self {
        let ledger = Self::new();
        for id in ids {
            ledger.insert_user(id);
        }
        ledger
    }

    pub fn insert_user(&self, id: i64) {
        lock(&self.state).users.entry(id).or_insert_with(chain::zero);
    }

    pub fn transaction_count(&self) -> usize {
        lock(&self.state).transactions.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let mut state = lock(&self.state);
        if !state.users.contains_key(&tx.user_id) {
            return Err(StoreError::NotFound(format!("user {}", tx.user_id)));
        }
        if state.transactions.contains_key(&tx.id) {
            return Err(StoreError::Unavailable(format!(
                "duplicate transaction id {}",
                tx.id
            )));
        }
        state.transactions.insert(tx.id.clone(), tx.clone());
        Ok(tx.clone())
    }

    async fn find_transaction(&self, id: &str) -> StoreResult<Option<Transaction>> {
        Ok(lock(&self.state).transactions.get(id).cloned())
    }

    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(lock(&self.state).users.get(&id).map(|balance| User {
            id,
            balance: balance.clone(),
        }))
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let state = lock(&self.state);
        let mut users: Vec<User> = state
            .users
            .iter()
            .map(|(id, balance)| User {
                id: *id,
                balance: balance.clone(),
            })
            .collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn latest_completed(&self, user_id: i64) -> StoreResult<Option<Transaction>> {
        Ok(lock(&self.state).chain_head(user_id).cloned())
    }

    async fn mark_verified(
        &self,
        id: &str,
        link: &ChainLink,
        at: DateTime<Utc>,
    ) -> StoreResult<Transaction> {
        lock(&self.state).advance(id, Trigger::Verify, Some(link.clone()), at)
    }

    async fn mark_confirming(&self, id: &str, at: DateTime<Utc>) -> StoreResult<Transaction> {
        lock(&self.state).advance(id, Trigger::Confirm, None, at)
    }

    async fn complete(&self, id: &str, at: DateTime<Utc>) -> StoreResult<Transaction> {
        let mut state = lock(&self.state);
        let current = state
            .transactions
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", id)))?;

        let head = state.chain_head(current.user_id);
        let link = match current.link() {
            Some(link) if link.follows(head) => link,
            _ => ChainLink::extend(head, &current.amount),
        };
        let balance = link.balance.clone();

        let completed = state.advance(id, Trigger::Finalize, Some(link), at)?;
        state.users.insert(current.user_id, balance);
        Ok(completed)
    }

    async fn completed_chain(&self, user_id: i64) -> StoreResult<Vec<Transaction>> {
        let state = lock(&self.state);
        let completed = state.completed(user_id).cloned().collect();
        Ok(chain::in_link_order(completed))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryLock {
    entries: Arc<Mutex<HashMap<String, Instant>>>,
}

impl InMemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyLock for InMemoryLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut entries = lock(&self.entries);
        let now = Instant::now();
        match entries.get(key) {
            Some(expires_at) if *expires_at > now => Ok(false),
            _ => {
                entries.insert(key.to_string(), now + ttl);
                Ok(true)
            }
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, LockError> {
        Ok(lock(&self.entries)
            .get(key)
            .is_some_and(|expires_at| *expires_at > Instant::now()))
    }

    async fn release(&self, key: &str) -> Result<(), LockError> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), LockError> {
        Ok(())
    }
}

#[derive(Default)]
struct BusState {
    queue: VecDeque<Delivery>,
    history: Vec<TransactionEvent>,
}

/// Single-topic bus. Every published event is queued for the subscriber and
/// kept in a history for assertions.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    state: Arc<Mutex<BusState>>,
    notify: Arc<Notify>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber(&self) -> InMemorySubscriber {
        InMemorySubscriber { bus: self.clone() }
    }

    /// Every event published so far, in order.
    pub fn published(&self) -> Vec<TransactionEvent> {
        lock(&self.state).history.clone()
    }

    pub fn published_for(&self, transaction_id: &str) -> Vec<TransactionEvent> {
        self.published()
            .into_iter()
            .filter(|e| e.transaction_id == transaction_id)
            .collect()
    }

    /// Pops the next undelivered message without waiting.
    pub fn try_next(&self) -> Option<Delivery> {
        lock(&self.state).queue.pop_front()
    }

    /// Re-queues a raw payload, simulating broker redelivery.
    pub fn redeliver(&self, delivery: Delivery) {
        lock(&self.state).queue.push_back(delivery);
        self.notify.notify_one();
    }
}

#[async_trait]
impl EventPublisher for InMemoryBus {
    async fn publish(&self, event: &TransactionEvent) -> Result<(), BusError> {
        let delivery = Delivery {
            key: Some(event.key().to_string()),
            payload: event.to_bytes()?,
        };
        {
            let mut state = lock(&self.state);
            state.queue.push_back(delivery);
            state.history.push(event.clone());
        }
        self.notify.notify_one();
        Ok(())
    }
}

pub struct InMemorySubscriber {
    bus: InMemoryBus,
}

#[async_trait]
impl EventSubscriber for InMemorySubscriber {
    async fn receive(&mut self) -> Result<Delivery, BusError> {
        loop {
            if let Some(delivery) = self.bus.try_next() {
                return Ok(delivery);
            }
            self.bus.notify.notified().await;
        }
    }

    async fn commit(&mut self) -> Result<(), BusError> {
        Ok(())
    }
}
