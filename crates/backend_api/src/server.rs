use std::net::SocketAddr;
use std::sync::Arc;

use payment_service::PaymentProcessor;

use crate::router::create_router;

/// Run the API server
pub async fn run_server(processor: Arc<PaymentProcessor>, host: &str, port: u16) -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backend_api=debug,payment_service=debug,tower_http=debug".into()),
        )
        .init();

    let app = create_router(processor);

    let addr = format!("{}:{}", host, port).parse::<SocketAddr>()?;
    tracing::info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
