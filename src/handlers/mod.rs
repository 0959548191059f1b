pub mod wallet;

use crate::health::{check_health, LedgerChecker, LockChecker};
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let postgres = LedgerChecker::new(state.ledger.clone());
    let redis = LockChecker::new(state.lock.clone());

    let response = check_health(&postgres, &redis, state.start_time).await;

    // Return 503 if a critical dependency is down, 200 otherwise
    let status_code = if response.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}
