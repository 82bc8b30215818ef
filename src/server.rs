//! HTTP surface: `GET /rate`

use crate::core::config::AppConfig;
use crate::core::{RateOutcome, RateProvider};
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

#[derive(Clone)]
struct RateState {
    provider: Arc<RateProvider>,
    currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateResponse {
    pub currency: String,
    pub rate: f64,
    pub source: String,
    /// When the rate was fetched upstream; `None` for the built-in default
    pub last_updated: Option<DateTime<Utc>>,
}

impl RateResponse {
    fn new(currency: &str, source: &str, outcome: &RateOutcome) -> Self {
        RateResponse {
            currency: currency.to_string(),
            rate: outcome.value(),
            source: source.to_string(),
            last_updated: outcome.fetched_at(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    pub error: String,
}

/// Faults of the handler itself. Upstream failures never end up here.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rate task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self, "Rate handler failed");
        let body = ErrorResponse {
            message: "Error fetching exchange rate".to_string(),
            error: self.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

pub fn routes(provider: Arc<RateProvider>, currency: &str) -> Router {
    Router::new()
        .route("/rate", get(handle_get_rate))
        .with_state(RateState {
            provider,
            currency: currency.to_string(),
        })
}

async fn handle_get_rate(
    State(state): State<RateState>,
) -> Result<Json<RateResponse>, ApiError> {
    let provider = Arc::clone(&state.provider);
    // Detached so a disconnecting client cannot cancel a refresh halfway
    let outcome = tokio::spawn(async move { provider.resolve().await }).await?;
    debug!(rate = outcome.value(), tier = outcome.tier(), "Serving rate");

    Ok(Json(RateResponse::new(
        &state.currency,
        state.provider.source_name(),
        &outcome,
    )))
}

/// Binds the configured address and serves until Ctrl-C.
pub async fn serve(config: &AppConfig, provider: Arc<RateProvider>) -> Result<()> {
    let listener = TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, routes(provider, &config.currency))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CachedRate;

    #[test]
    fn test_rate_response_serialization() {
        let fetched_at = "2024-03-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let outcome = RateOutcome::Stale(CachedRate {
            value: 120.0,
            fetched_at,
        });

        let json = serde_json::to_value(RateResponse::new("USD", "BCV", &outcome)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "currency": "USD",
                "rate": 120.0,
                "source": "BCV",
                "lastUpdated": "2024-03-01T12:00:00Z"
            })
        );
    }

    #[test]
    fn test_default_rate_has_no_last_updated() {
        let json =
            serde_json::to_value(RateResponse::new("USD", "BCV", &RateOutcome::Default(361.49)))
                .unwrap();
        assert_eq!(json["rate"], 361.49);
        assert!(json["lastUpdated"].is_null());
    }

    #[tokio::test]
    async fn test_api_error_is_internal_server_error() {
        let handle = tokio::spawn(std::future::pending::<()>());
        handle.abort();
        let join_error = handle.await.unwrap_err();
        let response = ApiError::from(join_error).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.message, "Error fetching exchange rate");
        assert!(body.error.starts_with("rate task failed"));
    }
}
