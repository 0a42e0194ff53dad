use std::env;
use std::sync::Arc;

use backend_api::run_server;
use payment_service::PaymentProcessor;
use store::FileStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // settings.json is optional; env vars override, defaults as fallback
    let settings = settings_loader::load_settings_with_fallback(None)?;

    let data_file = env::var("BISYAROH_DATA_FILE")
        .ok()
        .or_else(|| settings.as_ref().map(|s| s.data_file.clone()))
        .unwrap_or_else(|| "data/bisyaroh.json".to_string());
    let host = env::var("HOST")
        .ok()
        .or_else(|| settings.as_ref().map(|s| s.server.host.clone()))
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .or_else(|| settings.as_ref().map(|s| s.server.port))
        .unwrap_or(3000);

    println!("Bisyaroh API Server");
    println!("===================");
    println!("Database file: {}", data_file);
    println!("Listening on: {}:{}", host, port);
    println!();

    let store = Arc::new(FileStore::new(&data_file));
    let processor = Arc::new(PaymentProcessor::new(store));

    run_server(processor, &host, port).await?;

    Ok(())
}
