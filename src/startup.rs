use crate::config::Config;
use crate::ports::{IdempotencyLock, LedgerStore};
use anyhow::{Context, Result};

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub redis: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.redis
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Redis Connectivity:    {}", status(self.redis));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(
    config: &Config,
    ledger: &dyn LedgerStore,
    lock: &dyn IdempotencyLock,
) -> ValidationReport {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        redis: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = ledger.ping().await.context("Failed to reach database") {
        report.database = false;
        report.errors.push(format!("Database: {:#}", e));
    }

    if let Err(e) = lock.ping().await.context("Redis PING failed") {
        report.redis = false;
        report.errors.push(format!("Redis: {:#}", e));
    }

    report
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.redis_url.is_empty() {
        anyhow::bail!("REDIS_URL is empty");
    }
    if config.kafka_brokers.is_empty() {
        anyhow::bail!("KAFKA_BROKERS is empty");
    }
    if config.kafka_topic.is_empty() {
        anyhow::bail!("KAFKA_TOPIC is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.topup_window_secs == 0 {
        anyhow::bail!("TOPUP_WINDOW_SECS must be greater than 0");
    }
    if config.lock_ttl_secs == 0 {
        anyhow::bail!("LOCK_TTL_SECS must be greater than 0");
    }

    Ok(())
}
