use tracing_subscriber::EnvFilter;

use calparse::{CoreResult, Server, Settings};

#[tokio::main]
async fn main() -> CoreResult<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Settings::from_env();
    let mut server = Server::start(settings).await?;
    tracing::info!(addr = %server.addr(), "calparse ready");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| calparse::CoreError::Internal(e.to_string()))?;
    tracing::info!("shutting down");
    server.shutdown()
}
