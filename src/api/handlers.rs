use crate::api::AppState;
use crate::chat::render_discussion;
use crate::error::Result;
use crate::metrics::gather_metrics;
use crate::models::{PassengerRecord, PredictionResult};
use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub model_loaded: bool,
    pub version: String,
    pub run_id: Option<Uuid>,
}

/// Liveness banner
pub async fn root(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let status = state.predictor.status();
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        message: "Titanic Survival Prediction API is running".to_string(),
        model_loaded: status.loaded,
        version: env!("CARGO_PKG_VERSION").to_string(),
        run_id: status.run_id,
    }))
}

/// Health check endpoint; reports whether a model is being served
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let status = state.predictor.status();
    let message = match (&status.reason, status.loaded) {
        (_, true) => "Service is running and model is loaded".to_string(),
        (Some(reason), false) => format!("Service is running but model is not loaded: {}", reason),
        (None, false) => "Service is running but model is not loaded".to_string(),
    };

    Ok(Json(HealthResponse {
        status: if status.loaded { "healthy" } else { "unhealthy" }.to_string(),
        message,
        model_loaded: status.loaded,
        version: env!("CARGO_PKG_VERSION").to_string(),
        run_id: status.run_id,
    }))
}

/// Predict survival for a single passenger
pub async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PassengerRecord>,
) -> Result<Json<PredictionResult>> {
    request.validate()?;

    let result = state.predictor.predict(&request.normalized())?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize, Validate)]
pub struct BatchPredictionRequest {
    #[validate(length(min = 1, max = 1000), nested)]
    pub passengers: Vec<PassengerRecord>,
}

#[derive(Debug, Serialize)]
pub struct BatchPredictionResponse {
    pub predictions: Vec<PredictionResult>,
    pub total_passengers: usize,
}

/// Predict survival for several passengers, in request order
pub async fn predict_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchPredictionRequest>,
) -> Result<Json<BatchPredictionResponse>> {
    request.validate()?;

    let records: Vec<PassengerRecord> = request
        .passengers
        .into_iter()
        .map(PassengerRecord::normalized)
        .collect();
    let predictions = state.predictor.predict_batch(&records)?;

    Ok(Json(BatchPredictionResponse {
        total_passengers: predictions.len(),
        predictions,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 4000))]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub passenger: PassengerRecord,
    pub survived: u8,
    pub survival_probability: f64,
    pub death_probability: f64,
    pub reasoning: String,
    pub discussion: String,
}

/// Extract a passenger from free text, then predict
pub async fn predict_natural_language(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    request.validate()?;

    let extraction = state.extractor.extract(&request.message).await?;
    extraction.passenger.validate()?;

    info!(
        path = %extraction.path,
        pclass = extraction.passenger.pclass,
        sex = %extraction.passenger.sex,
        "Passenger extracted from message"
    );

    let prediction = state.predictor.predict(&extraction.passenger)?;
    let discussion = render_discussion(&extraction.passenger, &prediction, &extraction.reasoning);

    Ok(Json(ChatResponse {
        passenger: extraction.passenger,
        survived: prediction.survived,
        survival_probability: prediction.survival_probability,
        death_probability: prediction.death_probability,
        reasoning: extraction.reasoning,
        discussion,
    }))
}

/// Prometheus text exposition
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}
