use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use models::{PaymentMethod, TimelineMode};
use payment_service::{PaymentProcessor, ReducedPeriod};
use store::{AllocationStore, PaymentStore, SantriDirectory, TimelineStore};
use timeline::TimelineConfig;

use crate::Result;

pub type ProcessorState = Arc<PaymentProcessor>;

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "bisyaroh-api"
    }))
}

/// GET /api/timeline
/// Returns the active timeline
pub async fn get_timeline(State(processor): State<ProcessorState>) -> Result<impl IntoResponse> {
    let timeline = processor
        .store()
        .get_active_timeline()
        .await
        .map_err(payment_service::ServiceError::from)?
        .ok_or_else(|| crate::ApiError::NotFound("active timeline".to_string()))?;
    Ok(Json(timeline))
}

/// POST /api/timeline
/// Creates a new active timeline and seeds unpaid records for every santri
pub async fn create_timeline(
    State(processor): State<ProcessorState>,
    Json(config): Json<TimelineConfig>,
) -> Result<impl IntoResponse> {
    let timeline = processor.create_timeline(&config).await?;
    Ok((StatusCode::CREATED, Json(timeline)))
}

/// DELETE /api/timeline
/// Deletes the active timeline together with its payment records
pub async fn delete_timeline(State(processor): State<ProcessorState>) -> Result<impl IntoResponse> {
    processor.delete_timeline().await?;
    Ok(Json(serde_json::json!({ "status": "success" })))
}

/// POST /api/timeline/reset
/// Clears all payment records but keeps the timeline
pub async fn reset_timeline_payments(
    State(processor): State<ProcessorState>,
) -> Result<impl IntoResponse> {
    processor
        .store()
        .reset_payments()
        .await
        .map_err(payment_service::ServiceError::from)?;
    Ok(Json(serde_json::json!({ "status": "success" })))
}

/// GET /api/timeline/periods/:key/payments
/// Stored payment records of one period across all santri
pub async fn get_period_payments(
    State(processor): State<ProcessorState>,
    Path(period_key): Path<String>,
) -> Result<impl IntoResponse> {
    let timeline = processor
        .store()
        .get_active_timeline()
        .await
        .map_err(payment_service::ServiceError::from)?
        .ok_or_else(|| crate::ApiError::NotFound("active timeline".to_string()))?;
    if timeline.period(&period_key).is_none() {
        return Err(crate::ApiError::NotFound(format!("period {}", period_key)));
    }

    let payments = processor
        .store()
        .payments_for_period(&period_key)
        .await
        .map_err(payment_service::ServiceError::from)?;
    Ok(Json(payments))
}

#[derive(Debug, Deserialize)]
pub struct SimulationRequest {
    pub mode: TimelineMode,
    #[serde(default)]
    pub simulation_date: Option<NaiveDate>,
}

/// PUT /api/timeline/simulation
/// Switches between real-time and manual mode / moves the simulated clock
pub async fn set_simulation(
    State(processor): State<ProcessorState>,
    Json(req): Json<SimulationRequest>,
) -> Result<impl IntoResponse> {
    let timeline = processor.set_simulation(req.mode, req.simulation_date).await?;
    Ok(Json(timeline))
}

/// GET /api/santri
/// Enrolled santri, sorted by name
pub async fn list_santri(State(processor): State<ProcessorState>) -> Result<impl IntoResponse> {
    let santri = processor
        .store()
        .list_santri()
        .await
        .map_err(payment_service::ServiceError::from)?;
    Ok(Json(santri))
}

/// GET /api/santri/:id/payments
/// Payment history of one santri with derived statuses and a summary
pub async fn get_santri_payments(
    State(processor): State<ProcessorState>,
    Path(santri_id): Path<String>,
) -> Result<impl IntoResponse> {
    let history = processor.payment_history(&santri_id).await?;
    Ok(Json(history))
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: u64,
    pub payment_method: PaymentMethod,
}

/// POST /api/santri/:id/payments
/// Allocates a payment across the santri's outstanding periods
pub async fn submit_payment(
    State(processor): State<ProcessorState>,
    Path(santri_id): Path<String>,
    Json(req): Json<PaymentRequest>,
) -> Result<impl IntoResponse> {
    let processed = processor
        .process_payment_with_credit(&santri_id, req.amount, req.payment_method)
        .await?;
    Ok((StatusCode::CREATED, Json(processed)))
}

#[derive(Debug, Serialize)]
pub struct CreditResponse {
    pub santri_id: String,
    pub balance: u64,
    pub reduced_amounts: Vec<ReducedPeriod>,
}

/// GET /api/santri/:id/credit
/// Credit balance plus the per-period preview of what it still covers
pub async fn get_credit(
    State(processor): State<ProcessorState>,
    Path(santri_id): Path<String>,
) -> Result<impl IntoResponse> {
    let balance = processor.credit_balance(&santri_id).await?;
    let reduced_amounts = processor.reduced_amounts(&santri_id).await?;
    Ok(Json(CreditResponse {
        santri_id,
        balance,
        reduced_amounts,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    20
}

/// GET /api/santri/:id/credit/history
/// Credit transaction log, newest first
pub async fn get_credit_history(
    State(processor): State<ProcessorState>,
    Path(santri_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse> {
    let transactions = processor.credit_history(&santri_id, params.limit).await?;
    Ok(Json(transactions))
}

/// GET /api/payments/status
/// Per-santri payment summaries for the admin overview
pub async fn payments_status(State(processor): State<ProcessorState>) -> Result<impl IntoResponse> {
    let statuses = processor.all_santri_status().await?;
    Ok(Json(statuses))
}

/// POST /api/cache/invalidate
/// Drops the store cache so the next request reads fresh data
/// Useful after editing the database file without restarting the server
pub async fn invalidate_cache(State(processor): State<ProcessorState>) -> impl IntoResponse {
    processor.store().invalidate_cache().await;

    Json(serde_json::json!({
        "status": "success",
        "message": "Cache invalidated. Fresh data will be loaded on next request."
    }))
}
