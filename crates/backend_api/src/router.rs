use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use payment_service::PaymentProcessor;

use crate::handlers;

/// Create the main application router with all API endpoints
pub fn create_router(processor: Arc<PaymentProcessor>) -> Router {
    // Create CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Timeline management
        .route("/api/timeline", get(handlers::get_timeline))
        .route("/api/timeline", post(handlers::create_timeline))
        .route("/api/timeline", delete(handlers::delete_timeline))
        .route("/api/timeline/simulation", put(handlers::set_simulation))
        .route("/api/timeline/reset", post(handlers::reset_timeline_payments))
        .route(
            "/api/timeline/periods/:key/payments",
            get(handlers::get_period_payments),
        )
        // Santri endpoints
        .route("/api/santri", get(handlers::list_santri))
        .route("/api/santri/:id/payments", get(handlers::get_santri_payments))
        .route("/api/santri/:id/payments", post(handlers::submit_payment))
        .route("/api/santri/:id/credit", get(handlers::get_credit))
        .route(
            "/api/santri/:id/credit/history",
            get(handlers::get_credit_history),
        )
        // Admin overview
        .route("/api/payments/status", get(handlers::payments_status))
        // Cache management
        .route("/api/cache/invalidate", post(handlers::invalidate_cache))
        // Shared state
        .with_state(processor)
        // Add middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
