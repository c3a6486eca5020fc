use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use common::types::upload::UploadRequest;
use job_poller::{GenerationSession, HttpGenerationApi, PollerConfig, SessionState};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Upload an image to the generation service and wait for the 3D model.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JPEG, PNG, WebP or AVIF image to convert
    image: PathBuf,

    /// Base URL of the generation service
    #[arg(long, env = "GENERATION_SERVER_URL", default_value = "http://localhost:3000")]
    server: String,

    /// Seconds between status checks
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,

    /// Status checks before giving up
    #[arg(long, default_value_t = 120)]
    max_attempts: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let args = Args::parse();

    let data = tokio::fs::read(&args.image)
        .await
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let content_type = mime_guess::from_path(&args.image)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    let file_name = args
        .image
        .file_name()
        .map_or_else(|| "image".to_string(), |name| name.to_string_lossy().into_owned());

    let config = PollerConfig {
        interval: Duration::from_secs(args.interval_secs),
        max_attempts: args.max_attempts,
        ..PollerConfig::default()
    };
    let api = Arc::new(HttpGenerationApi::new(&args.server));
    let mut session = GenerationSession::new(api, config);

    // Progress reporting
    let mut snapshots = session.subscribe();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            if snapshot.state == SessionState::Loading {
                info!(
                    job_id = snapshot.job_id.as_deref().unwrap_or("-"),
                    progress = snapshot.progress,
                    "{}",
                    snapshot.status_message
                );
            }
        }
    });

    let token = session.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let upload = UploadRequest::new(data, content_type, file_name);
    match session.run(upload).await {
        Ok(model_url) => {
            if let Some(warning) = session.snapshot().warning {
                warn!(%warning, "Model is only temporarily available");
            }
            println!("{model_url}");
            Ok(())
        }
        Err(err) => {
            let message = session.snapshot().error.unwrap_or_else(|| err.to_string());
            Err(anyhow::anyhow!(message)).context("generation did not complete")
        }
    }
}
