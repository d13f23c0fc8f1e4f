//! `taskboard-api`: privileged forwarding server.
//!
//! Exposes bulk task completion and profile upsert over HTTP, performed
//! against the backend with the service role key.
//!
//! # Usage
//!
//! ```bash
//! TASKBOARD_BACKEND_URL=https://proj.example.co \
//! TASKBOARD_SERVICE_ROLE_KEY=... \
//!     cargo run --bin taskboard-api -- --bind 127.0.0.1:8787
//! ```

use std::sync::Arc;

use clap::Parser;
use taskboard_api::backend::PostgrestBackend;
use taskboard_api::config::{ApiCliArgs, ApiConfig};
use taskboard_api::server::{self, ApiState};

#[tokio::main]
async fn main() {
    let cli = ApiCliArgs::parse();

    let config = match ApiConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting taskboard api");

    let state = match config.credentials() {
        Some((url, key)) => match PostgrestBackend::new(url, key) {
            Ok(backend) => ApiState::new(backend),
            Err(e) => {
                tracing::error!(error = %e, "failed to build backend client");
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("backend url or service role key missing; privileged routes will fail");
            ApiState::unconfigured()
        }
    };

    match server::start_server_with_state(&config.bind_addr, Arc::new(state)).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "api server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "api server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start api server");
            std::process::exit(1);
        }
    }
}
