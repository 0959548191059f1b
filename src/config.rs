use anyhow::Context;
use bigdecimal::BigDecimal;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    pub kafka_brokers: String,
    pub kafka_topic: String,
    pub kafka_group_id: String,
    pub max_topup_amount: BigDecimal,
    pub topup_window_secs: u64,
    pub lock_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let max_topup_amount = BigDecimal::from_str(&var("MAX_TOPUP_AMOUNT", "1000.00"))
            .context("MAX_TOPUP_AMOUNT must be a decimal")?;
        if max_topup_amount <= BigDecimal::from(0) {
            anyhow::bail!("MAX_TOPUP_AMOUNT must be greater than zero");
        }

        let log_format = match var("LOG_FORMAT", "text").to_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
        };

        Ok(Config {
            server_port: var("SERVER_PORT", "8084")
                .parse()
                .context("SERVER_PORT must be a port number")?,
            database_url: lookup("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: var("DATABASE_MAX_CONNECTIONS", "5")
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be an integer")?,
            redis_url: var("REDIS_URL", "redis://127.0.0.1:6379"),
            kafka_brokers: var("KAFKA_BROKERS", "localhost:9092"),
            kafka_topic: var("KAFKA_TOPIC", "transaction"),
            kafka_group_id: var("KAFKA_GROUP_ID", "transaction-group"),
            max_topup_amount,
            topup_window_secs: var("TOPUP_WINDOW_SECS", "300")
                .parse()
                .context("TOPUP_WINDOW_SECS must be an integer")?,
            lock_ttl_secs: var("LOCK_TTL_SECS", "600")
                .parse()
                .context("LOCK_TTL_SECS must be an integer")?,
            request_timeout_secs: var("REQUEST_TIMEOUT_SECS", "10")
                .parse()
                .context("REQUEST_TIMEOUT_SECS must be an integer")?,
            log_format,
        })
    }

    pub fn topup_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.topup_window_secs as i64)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
