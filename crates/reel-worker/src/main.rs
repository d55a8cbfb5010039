//! Narrated video worker binary.
//!
//! Resumes interrupted jobs, submits one job per topic given on the command
//! line, and waits for them. Ctrl-C interrupts running jobs; they resume on
//! the next start.

use anyhow::Context;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_media::FfmpegEncoder;
use reel_models::{AspectRatio, JobParams, JobStatus};
use reel_providers::OpenAiClient;
use reel_store::FileJobRepository;
use reel_worker::{metrics, Collaborators, JobOrchestrator, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

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

    info!("Starting reel-worker");

    if let Ok(addr) = std::env::var("REEL_METRICS_ADDR") {
        let addr: std::net::SocketAddr = addr.parse().context("invalid REEL_METRICS_ADDR")?;
        metrics::init_metrics(addr)?;
        info!("Metrics exporter listening on {}", addr);
    }

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let repo = Arc::new(
        FileJobRepository::open(&config.store_dir)
            .await
            .context("failed to open job store")?,
    );
    let encoder = Arc::new(FfmpegEncoder::new().with_timeout(config.encode_timeout));
    let client = Arc::new(
        OpenAiClient::from_env()
            .context("failed to create provider client")?
            .with_media(encoder.clone()),
    );
    let collaborators = Collaborators {
        text: client.clone(),
        images: client.clone(),
        voices: client,
        encoder,
    };
    let orchestrator = JobOrchestrator::new(config, repo, collaborators);

    let mut jobs = orchestrator.resume_interrupted().await?;

    let owner = std::env::var("REEL_OWNER").unwrap_or_else(|_| "cli".to_string());
    let target: u32 = std::env::var("REEL_TARGET_DURATION")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);
    for topic in std::env::args().skip(1) {
        let mut params = JobParams::new(topic, target);
        if let Ok(voice) = std::env::var("REEL_VOICE") {
            params.voice = voice;
        }
        if let Ok(style) = std::env::var("REEL_ART_STYLE") {
            params.art_style = style;
        }
        if let Some(ratio) = std::env::var("REEL_ASPECT_RATIO")
            .ok()
            .and_then(|v| v.parse::<AspectRatio>().ok())
        {
            params.aspect_ratio = ratio;
        }
        match orchestrator.submit(&owner, params).await {
            Ok(id) => jobs.push(id),
            Err(e) => error!("Rejected job: {}", e),
        }
    }

    if jobs.is_empty() {
        info!("Nothing to do");
        return Ok(());
    }

    let waits = futures::future::join_all(jobs.iter().map(|id| orchestrator.wait(id)));
    tokio::select! {
        views = waits => {
            for view in views {
                match view {
                    Ok(view) if view.status == JobStatus::Completed => info!(
                        job_id = %view.job_id,
                        output = ?view.output_path,
                        "Job completed"
                    ),
                    Ok(view) => warn!(
                        job_id = %view.job_id,
                        status = %view.status,
                        detail = ?view.error_detail,
                        "Job did not complete"
                    ),
                    Err(e) => error!("Failed to read job status: {}", e),
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            orchestrator.shutdown().await;
        }
    }

    info!("Worker shutdown complete");
    Ok(())
}
