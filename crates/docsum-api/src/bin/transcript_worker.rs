//! Standalone remote transcript worker binary.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use docsum_api::{transcript_worker_router, TranscriptWorkerConfig, TranscriptWorkerState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);
    let env_filter = EnvFilter::from_default_env().add_directive("docsum=info".parse().unwrap());
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    if let Err(e) = run().await {
        error!("docsum-transcript-worker failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = TranscriptWorkerConfig::from_env();
    if config.key.is_none() {
        warn!("TRANSCRIPT_WORKER_KEY not set, every transcript request will be rejected");
    }

    let state = TranscriptWorkerState::new(config.clone());
    if !state.extractor.is_available() {
        warn!(path = %config.ytdlp.path, "yt-dlp binary not found");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Transcript worker listening on {}", addr);

    axum::serve(listener, transcript_worker_router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
        })
        .await?;
    Ok(())
}
