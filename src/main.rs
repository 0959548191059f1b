use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_topup::adapters::{KafkaEventPublisher, KafkaEventSubscriber, PostgresLedger, RedisLock};
use wallet_topup::cli::{Cli, Commands, DbCommands, LedgerCommands, TxCommands};
use wallet_topup::config::{Config, LogFormat};
use wallet_topup::ports::{EventPublisher, IdempotencyLock, LedgerStore};
use wallet_topup::services::{
    ConfirmationService, ConfirmationWorker, TopUpPolicy, VerificationService,
};
use wallet_topup::{cli, create_app, db, startup, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    init_tracing(config.log_format);

    match cli.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(Commands::Worker) => run_worker(config).await,
        Some(Commands::Tx(TxCommands::Show { tx_id })) => {
            let (ledger, lock) = open_stores(&config).await?;
            let result = cli::handle_tx_show(&ledger, &lock, &tx_id).await;
            ledger.pool().close().await;
            result
        }
        Some(Commands::Db(DbCommands::Migrate)) => cli::handle_db_migrate(&config).await,
        Some(Commands::Db(DbCommands::Seed { users })) => cli::handle_db_seed(&config, users).await,
        Some(Commands::Ledger(LedgerCommands::Audit { user_id })) => {
            let pool = db::create_pool(&config).await?;
            let ledger = PostgresLedger::new(pool.clone());
            let result = cli::handle_ledger_audit(&ledger, user_id).await;
            pool.close().await;
            result
        }
        Some(Commands::Config) => {
            cli::handle_config_validate(&config)?;
            let (ledger, lock) = open_stores(&config).await?;
            let report = startup::validate_environment(&config, &ledger, &lock).await;
            ledger.pool().close().await;
            report.print();
            if !report.is_valid() {
                anyhow::bail!("Startup validation failed");
            }
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn open_stores(config: &Config) -> anyhow::Result<(PostgresLedger, RedisLock)> {
    let pool = db::create_pool(config).await?;
    let lock = RedisLock::new(&config.redis_url)?;
    Ok((PostgresLedger::new(pool), lock))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let (ledger, lock) = open_stores(&config).await?;
    db::run_migrations(ledger.pool()).await?;
    let pool = ledger.pool().clone();

    let publisher: Arc<dyn EventPublisher> = Arc::new(KafkaEventPublisher::new(
        &config.kafka_brokers,
        config.kafka_topic.clone(),
    )?);
    tracing::info!(brokers = %config.kafka_brokers, topic = %config.kafka_topic, "Kafka producer initialized");

    let ledger: Arc<dyn LedgerStore> = Arc::new(ledger);
    let lock: Arc<dyn IdempotencyLock> = Arc::new(lock);

    let state = AppState {
        verification: VerificationService::new(
            ledger.clone(),
            publisher.clone(),
            TopUpPolicy::from_config(&config),
        ),
        confirmation: ConfirmationService::new(
            ledger.clone(),
            lock.clone(),
            publisher,
            config.lock_ttl(),
        ),
        ledger,
        lock,
        start_time: Instant::now(),
    };
    let app = create_app(state, config.request_timeout());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn run_worker(config: Config) -> anyhow::Result<()> {
    let (ledger, lock) = open_stores(&config).await?;
    let pool = ledger.pool().clone();

    let publisher = KafkaEventPublisher::new(&config.kafka_brokers, config.kafka_topic.clone())?;
    let mut subscriber = KafkaEventSubscriber::new(
        &config.kafka_brokers,
        config.kafka_topic.clone(),
        &config.kafka_group_id,
    )?;
    tracing::info!(
        brokers = %config.kafka_brokers,
        topic = %subscriber.topic(),
        group_id = %config.kafka_group_id,
        "Kafka consumer subscribed"
    );

    let worker = ConfirmationWorker::new(
        Arc::new(ledger),
        Arc::new(lock),
        Arc::new(publisher),
        config.lock_ttl(),
    );
    worker.run(&mut subscriber, shutdown_signal()).await;

    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
