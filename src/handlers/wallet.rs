//! HTTP handlers for wallet top-ups, balances and transaction lookups.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::{Transaction, TransactionStatus};
use crate::error::AppError;
use crate::services::{ConfirmOutcome, TopUpRequest};
use crate::validation::validate_transaction_id;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub transaction_id: String,
}

/// Body of a confirm request that did not end in a completed transaction.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmPendingResponse {
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub message: String,
}

fn bad_body(rejection: JsonRejection) -> AppError {
    AppError::InvalidInput(rejection.body_text())
}

pub async fn verify(
    State(state): State<AppState>,
    payload: Result<Json<TopUpRequest>, JsonRejection>,
) -> Result<Json<Transaction>, AppError> {
    let Json(request) = payload.map_err(bad_body)?;
    let tx = state.verification.request_top_up(request).await?;
    Ok(Json(tx))
}

pub async fn confirm(
    State(state): State<AppState>,
    payload: Result<Json<ConfirmRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(bad_body)?;
    let outcome = state.confirmation.confirm(&request.transaction_id).await?;

    let response = match outcome {
        ConfirmOutcome::Completed(tx) => Json(tx).into_response(),
        other => {
            let tx = other.transaction();
            let body = ConfirmPendingResponse {
                transaction_id: tx.id.clone(),
                status: tx.status,
                message: other.message().to_string(),
            };
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        }
    };

    Ok(response)
}

pub async fn list_wallets(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let users = state.ledger.list_users().await?;
    Ok(Json(users))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = validate_transaction_id(&id)?;
    let tx = state
        .ledger
        .find_transaction(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))?;

    Ok(Json(tx))
}
