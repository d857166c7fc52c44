//! CallSight gateway binary.

mod api;
mod bootstrap;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tower_http::trace::TraceLayer;

use cs_domain::config::Config;

#[derive(Parser)]
#[command(name = "callsight", about = "Multi-tenant sales-call intelligence backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook gateway and background jobs.
    Serve {
        /// Path to the TOML config file.
        #[arg(long, default_value = "callsight.toml")]
        config: PathBuf,
    },
}

fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    if path.exists() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    } else {
        tracing::warn!(path = %path.display(), "config file not found; using defaults");
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let Cli { command } = Cli::parse();
    match command {
        Commands::Serve { config } => serve(config).await,
    }
}

async fn serve(config_path: PathBuf) -> anyhow::Result<()> {
    let config = Arc::new(load_config(&config_path)?);
    let state = bootstrap::build_app_state(config.clone()).await?;
    bootstrap::spawn_background_loops(&state);

    let app = api::router(state.clone())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(addr = %addr, "gateway listening");
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
