//! HTTP surface: delivery intake and lifecycle lookups

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use intake_common::FileFingerprint;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::envelope::DeliveryRequest;
use crate::error::{AppError, AppResult};
use crate::orchestrator::{Orchestrator, Outcome};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Build the router. `request_timeout` must exceed the repair bound plus the
/// I/O bounds of one attempt.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/deliveries", post(receive_delivery))
        .route("/files/:fingerprint", get(get_file))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(tracing_layer())
}

/// Create tracing/logging layer
pub fn tracing_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(tower_http::LatencyUnit::Micros),
        )
}

/// Accept an envelope or a push wrapper. Any parseable body gets a 200 with
/// the attempt's outcome, so the transport never redelivers on our failures.
async fn receive_delivery(State(state): State<AppState>, body: Bytes) -> AppResult<Json<Outcome>> {
    let request: DeliveryRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Unrecognized delivery body: {}", e)))?;

    let outcome = match request.into_envelope() {
        Ok(envelope) => state.orchestrator.process(envelope).await,
        Err(error) => {
            tracing::warn!(error_code = %error.code, "Undecodable push message: {}", error.message);
            Outcome::rejected(error)
        },
    };

    Ok(Json(outcome))
}

async fn get_file(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> AppResult<impl IntoResponse> {
    let fingerprint: FileFingerprint = fingerprint
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid fingerprint: {}", fingerprint)))?;

    match state.orchestrator.store().get(&fingerprint).await? {
        Some(record) => Ok(Json(record)),
        None => Err(AppError::NotFound(format!("No lifecycle record for {}", fingerprint))),
    }
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let store = state.orchestrator.store();
    match store.ping().await {
        Ok(()) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "store": store.backend(),
                "version": env!("CARGO_PKG_VERSION"),
            })),
        )),
        Err(e) => Err(AppError::Unavailable(format!("{} store: {}", store.backend(), e))),
    }
}
