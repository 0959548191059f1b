//! Port implementations: Postgres, Redis and Kafka for production, plus
//! in-memory versions for tests and local runs.

pub mod kafka_bus;
pub mod memory;
pub mod postgres_ledger;
pub mod redis_lock;

pub use kafka_bus::{KafkaEventPublisher, KafkaEventSubscriber};
pub use memory::{InMemoryBus, InMemoryLedger, InMemoryLock, InMemorySubscriber};
pub use postgres_ledger::PostgresLedger;
pub use redis_lock::RedisLock;
