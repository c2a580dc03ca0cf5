//! HTTP API for the dispatcher: transfers, health checks and status

use crate::config::ApiConfig;
use crate::error::{FaucetError, FaucetResult};
use crate::tx::TransactionSender;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub sender: Arc<TransactionSender>,
    pub started_at: DateTime<Utc>,
    pub transfer_timeout: Duration,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/status", get(get_status))
        .route("/transfers", post(create_transfer))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, sender: Arc<TransactionSender>) -> FaucetResult<()> {
    let state = AppState {
        sender,
        started_at: Utc::now(),
        transfer_timeout: Duration::from_secs(config.transfer_timeout_secs),
    };

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| FaucetError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, router(state))
        .await
        .map_err(|e| FaucetError::Internal(format!("API server failed: {}", e)))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - the endpoint must answer
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let chain = state.sender.health_check().await;
    let status = if chain {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(ReadinessResponse { ready: chain, chain }))
}

/// Get relayer status
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let sender = &state.sender;
    let uptime = Utc::now().signed_duration_since(state.started_at);

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        address: format!("{:?}", sender.address()),
        chain_id: sender.chain_id(),
        fee_scheme: sender.fee_scheme().as_str().to_string(),
        token_address: sender.token_address().map(|a| format!("{:?}", a)),
        next_nonce: sender.next_nonce(),
    })
}

/// Submit a transfer on behalf of the dispatcher
async fn create_transfer(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("transfer", %request_id, to = %request.to);

    async move {
        let (destination, amount) = request.parse()?;

        let hash = tokio::time::timeout(
            state.transfer_timeout,
            state.sender.transfer(destination, amount),
        )
        .await
        .map_err(|_| FaucetError::Timeout {
            operation: "transfer".to_string(),
        })??;

        Ok::<_, FaucetError>(Json(TransferResponse {
            request_id,
            tx_hash: format!("{:?}", hash),
        }))
    }
    .instrument(span)
    .await
    .map_err(|error| ApiError { request_id, error })
}

// Request and response types

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub to: String,
    /// Amount in base units, decimal or 0x-prefixed hex
    pub amount: String,
}

impl TransferRequest {
    fn parse(&self) -> FaucetResult<(Address, U256)> {
        let destination = self
            .to
            .trim()
            .parse::<Address>()
            .map_err(|e| FaucetError::InvalidRequest(format!("Invalid address: {}", e)))?;

        let raw = self.amount.trim();
        let amount = match raw.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16).ok(),
            None => U256::from_dec_str(raw).ok(),
        }
        .ok_or_else(|| FaucetError::InvalidRequest(format!("Invalid amount: {}", raw)))?;

        if amount.is_zero() {
            return Err(FaucetError::InvalidRequest("Amount must be positive".to_string()));
        }

        Ok((destination, amount))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferResponse {
    pub request_id: Uuid,
    pub tx_hash: String,
}

/// Transfer failure translated to an HTTP response
struct ApiError {
    request_id: Uuid,
    error: FaucetError,
}

fn status_for(error: &FaucetError) -> StatusCode {
    match error {
        FaucetError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        FaucetError::NonceConflict { .. } => StatusCode::CONFLICT,
        FaucetError::Rejected(_) | FaucetError::FeeCapExceeded { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        FaucetError::ChainConnection { .. } | FaucetError::GasEstimation(_) => {
            StatusCode::BAD_GATEWAY
        }
        FaucetError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        if self.error.should_alert() {
            error!(
                request_id = %self.request_id,
                kind = self.error.kind(),
                "Transfer failed: {}",
                self.error
            );
        } else {
            warn!(request_id = %self.request_id, "Transfer failed: {}", self.error);
        }

        (
            status,
            Json(ErrorResponse {
                request_id: self.request_id,
                error: self.error.to_string(),
                kind: self.error.kind().to_string(),
                retryable: self.error.is_retryable(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    request_id: Uuid,
    error: String,
    kind: String,
    retryable: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    chain: bool,
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_seconds: u64,
    address: String,
    chain_id: u64,
    fee_scheme: String,
    token_address: Option<String>,
    next_nonce: u64,
}
