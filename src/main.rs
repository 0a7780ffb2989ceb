use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use news_digest::config::Config;
use news_digest::pipeline::Pipeline;
use news_digest::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "news_digest=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("NEWS_DIGEST_CONFIG").unwrap_or_else(|_| "sources.toml".to_string());
    let config = Config::load(&config_path)?;
    for channel in &config.channels {
        info!(
            "Channel '{}' configured with {} sources",
            channel.name,
            channel.sources.len()
        );
    }

    let bind = std::env::var("NEWS_DIGEST_BIND").unwrap_or_else(|_| config.bind.clone());
    let pipeline = Pipeline::new(&config.fetch)?;

    // Create app state
    let state = Arc::new(AppState { config, pipeline });
    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Server starting on http://{}", bind);

    axum::serve(listener, app).await?;

    Ok(())
}
