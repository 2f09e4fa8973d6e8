//! # Issuance API
//!
//! Builds the axum router that exposes the node's HTTP interface. All
//! endpoints share application state through axum's `State` extractor;
//! the ledger itself is the only mutable state and it does its own
//! locking.
//!
//! ## Endpoints
//!
//! | Method | Path                        | Description                        |
//! |--------|-----------------------------|------------------------------------|
//! | GET    | `/health`                   | Liveness probe                     |
//! | GET    | `/status`                   | Chain summary                      |
//! | POST   | `/certificates`             | Issue a certificate                |
//! | GET    | `/certificates/:member_id`  | Certificates issued to a member    |
//! | GET    | `/blocks/:index`            | Block by index                     |
//! | GET    | `/chain/validate`           | Whole-chain integrity scan         |
//! | POST   | `/chain/persist`            | Retry a failed snapshot save       |

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use certchain_protocol::certificate::Certificate;
use certchain_protocol::storage::{Block, Ledger, StorageError};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The chain owner. Injected here instead of living in a global.
    pub ledger: Arc<Ledger>,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/certificates", post(issue_handler))
        .route("/certificates/:member_id", get(member_certificates_handler))
        .route("/blocks/:index", get(block_by_index_handler))
        .route("/chain/validate", get(validate_handler))
        .route("/chain/persist", post(persist_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /certificates`.
#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    /// Holder's full name.
    pub name: String,
    /// Event attended.
    pub event: String,
    /// Optional member identifier; a UUID is assigned when absent or blank.
    #[serde(default)]
    pub member_id: Option<String>,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    /// Index of the tip block.
    pub height: u64,
    /// Hash of the tip block.
    pub tip_hash: String,
    /// Whether the whole chain currently validates.
    pub valid: bool,
    /// Whether committed blocks are waiting for a snapshot save.
    pub dirty: bool,
    /// Snapshot path.
    pub snapshot: String,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /chain/validate`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub valid: bool,
    /// Offset of the first invalid block, when invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Error body. `block` is set when a certificate was committed in memory
/// but its snapshot save failed.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<Block>,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            block: None,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` - returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` - chain summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let tip = state.ledger.tip().await;
    let resp = StatusResponse {
        version: state.version.clone(),
        height: tip.index,
        tip_hash: tip.hash,
        valid: state.ledger.validate().await.is_ok(),
        dirty: state.ledger.is_dirty().await,
        snapshot: state.ledger.config().snapshot_path.display().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Json(resp)
}

/// `POST /certificates` - append a certificate and save the chain.
///
/// 201 with the new block on success; 400 for an empty name or event;
/// 409 if the candidate block failed validation; 503 with the committed
/// block when the save failed (retry with `POST /chain/persist`).
async fn issue_handler(
    State(state): State<AppState>,
    Json(req): Json<IssueRequest>,
) -> Response {
    let member_id = req
        .member_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let certificate = Certificate::new(member_id, req.name, req.event);

    let started = Instant::now();
    let result = state.ledger.append_certificate(certificate).await;
    state
        .metrics
        .issuance_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(block) => {
            state.metrics.certificates_issued_total.inc();
            state.metrics.chain_height.set(block.index as i64);
            (StatusCode::CREATED, Json(block)).into_response()
        }
        Err(StorageError::PersistFailed { block, source }) => {
            state.metrics.certificates_issued_total.inc();
            state.metrics.snapshot_save_failures_total.inc();
            state.metrics.chain_height.set(block.index as i64);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: format!("certificate recorded but not saved: {source}"),
                    block: Some(*block),
                }),
            )
                .into_response()
        }
        Err(e @ StorageError::InvalidCertificate(_)) => {
            state.metrics.certificates_rejected_total.inc();
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e @ StorageError::Integrity(_)) => {
            state.metrics.certificates_rejected_total.inc();
            error_response(StatusCode::CONFLICT, e.to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, "issuance failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// `GET /certificates/:member_id` - every block issued to a member.
async fn member_certificates_handler(
    Path(member_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    Json(state.ledger.certificates_for_member(&member_id).await)
}

/// `GET /blocks/:index` - a block by its index.
async fn block_by_index_handler(
    Path(index): Path<u64>,
    State(state): State<AppState>,
) -> Response {
    match state.ledger.block(index).await {
        Some(block) => (StatusCode::OK, Json(block)).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("Block not found at index {}", index),
        ),
    }
}

/// `GET /chain/validate` - full integrity scan.
async fn validate_handler(State(state): State<AppState>) -> impl IntoResponse {
    let resp = match state.ledger.validate().await {
        Ok(()) => ValidationResponse {
            valid: true,
            invalid_index: None,
            error: None,
        },
        Err(e) => ValidationResponse {
            valid: false,
            invalid_index: Some(e.position()),
            error: Some(e.to_string()),
        },
    };
    Json(resp)
}

/// `POST /chain/persist` - retry saving the snapshot.
async fn persist_handler(State(state): State<AppState>) -> Response {
    match state.ledger.persist().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "persisted": true,
                "blocks": state.ledger.len().await,
            })),
        )
            .into_response(),
        Err(e) => {
            state.metrics.snapshot_save_failures_total.inc();
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
