mod bootstrap;
mod health;
mod ingest;
mod relay;
mod reports;

use anyhow::Result;
use axum::Router;
use crashdesk_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use crashdesk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    if app.config.relay.enabled {
        // Validation guarantees a target url whenever the relay is enabled.
        if let Some(target_url) = app.config.relay.target_url.clone() {
            relay::spawn(
                &app.config.server.bind_address,
                app.config.relay.port,
                app.http_client.clone(),
                target_url,
            )
            .await?;
        }
    }

    let router = api_router(&app);
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        relay_enabled = app.config.relay.enabled,
        "crashdesk api listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(event_name = "system.server.stopping", "crashdesk api stopping");
    Ok(())
}

fn api_router(app: &bootstrap::Application) -> Router {
    Router::new()
        .merge(health::router(app.db_pool.clone()))
        .merge(ingest::router(&app.config.ingest))
        .merge(reports::router(
            app.db_pool.clone(),
            app.http_client.clone(),
            app.config.workflow.webhook_url.clone(),
        ))
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
