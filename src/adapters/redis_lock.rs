//! Redis implementation of IdempotencyLock.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;

use crate::ports::{IdempotencyLock, LockError};

const LOCK_PREFIX: &str = "wallet:txn-lock:";
const LOCK_VALUE: &str = "PROCESSING";

impl From<redis::RedisError> for LockError {
    fn from(err: redis::RedisError) -> Self {
        LockError::Unavailable(err.to_string())
    }
}

#[derive(Clone)]
pub struct RedisLock {
    redis_client: redis::Client,
}

impl RedisLock {
    pub fn new(redis_url: &str) -> Result<Self, LockError> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self { redis_client })
    }

    fn key(key: &str) -> String {
        format!("{}{}", LOCK_PREFIX, key)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, LockError> {
        Ok(self.redis_client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl IdempotencyLock for RedisLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut conn = self.connection().await?;
        // SET NX EX answers OK when the key was set and nil when it already existed
        let reply: Option<String> = redis::cmd("SET")
            .arg(Self::key(key))
            .arg(LOCK_VALUE)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, LockError> {
        let mut conn = self.connection().await?;
        let exists: bool = conn.exists(Self::key(key)).await?;
        Ok(exists)
    }

    async fn release(&self, key: &str) -> Result<(), LockError> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(Self::key(key)).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), LockError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced() {
        assert_eq!(RedisLock::key("txn-1"), "wallet:txn-lock:txn-1");
    }

    #[test]
    fn test_rejects_malformed_url() {
        assert!(RedisLock::new("not a url").is_err());
    }
}
