use axum::{body::Bytes, extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::api::threat::ThreatReport;
use crate::api::AppState;
use crate::chain::{AppendOutcome, ChainEntry, VerifyReport};
use crate::error::SentinelError;

type ApiResponse = (StatusCode, Json<Value>);

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": state.chain.store().version(),
    }))
}

pub async fn get_chain(State(state): State<AppState>) -> Json<Value> {
    let entries = state.chain.snapshot().await;
    Json(json!({
        "length": entries.len(),
        "chain": representations(&entries),
    }))
}

pub async fn add_threat(State(state): State<AppState>, body: Bytes) -> ApiResponse {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!("Rejected unparsable threat body: {}", e);
            return bad_request("Invalid threat data");
        }
    };

    let report = match ThreatReport::from_value(&value) {
        Ok(report) => report,
        Err(e) => {
            warn!("Rejected threat report: {}", e);
            return bad_request(&e.to_string());
        }
    };

    let kind = report.kind;
    match state.chain.append(report.into_payload()).await {
        Ok(AppendOutcome::Accepted(entry)) => {
            info!("Recorded {} threat as entry {}", kind, entry.entry_hash);
            (
                StatusCode::OK,
                Json(json!({
                    "message": "Threat added successfully!",
                    "new_entry": entry.representation(),
                })),
            )
        }
        Ok(AppendOutcome::Duplicate) => (
            StatusCode::CONFLICT,
            Json(json!({"message": "Duplicate threat data, entry not added"})),
        ),
        Err(e) => server_error("Server error", e),
    }
}

pub async fn verify_chain(State(state): State<AppState>) -> ApiResponse {
    match state.chain.verify().await {
        Ok(VerifyReport::Valid { length }) => (
            StatusCode::OK,
            Json(json!({"message": "Chain is valid", "length": length})),
        ),
        Ok(VerifyReport::Invalid { index, reason }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": reason, "index": index})),
        ),
        Err(e) => server_error("Error verifying chain", e),
    }
}

pub async fn reset_chain(State(state): State<AppState>) -> ApiResponse {
    match state.chain.reset().await {
        Ok(entries) => (
            StatusCode::OK,
            Json(json!({
                "message": "Chain reset successfully!",
                "chain": representations(&entries),
            })),
        ),
        Err(e) => server_error("Failed to reset chain", e),
    }
}

fn representations(entries: &[ChainEntry]) -> Vec<Value> {
    entries.iter().map(ChainEntry::representation).collect()
}

fn bad_request(message: &str) -> ApiResponse {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message})))
}

/// Lock contention maps to 503 so clients know to retry
fn server_error(context: &str, err: SentinelError) -> ApiResponse {
    error!("{}: {}", context, err);
    let status = if err.is_retryable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({"error": format!("{}: {}", context, err)})))
}
