pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod startup;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::timeout::TimeoutLayer;

use crate::ports::{IdempotencyLock, LedgerStore};
use crate::services::{ConfirmationService, VerificationService};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub lock: Arc<dyn IdempotencyLock>,
    pub verification: VerificationService,
    pub confirmation: ConfirmationService,
    pub start_time: Instant,
}

pub fn create_app(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/wallet", get(handlers::wallet::list_wallets))
        .route("/wallet/verify", post(handlers::wallet::verify))
        .route("/wallet/confirm", post(handlers::wallet::confirm))
        .route("/wallet/transactions/:id", get(handlers::wallet::get_transaction))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(axum::middleware::from_fn(
            middleware::request_logger::request_logger_middleware,
        ))
        .with_state(state)
}
