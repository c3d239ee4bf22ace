//! VisionLab worker binary.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::future::join_all;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vlab_media::{check_ffmpeg, check_ffprobe, FilterRegistry};
use vlab_worker::{Manifest, RunExecutor, WorkerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "VisionLab frame pipeline worker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every job in a JSON manifest and print one result per line
    Run {
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
    },
    /// List registered filters
    Filters,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Filters => {
            for (kind, name) in FilterRegistry::global().kinds() {
                println!("{kind}\t{name}");
            }
            Ok(())
        }
        Commands::Run { manifest } => run_manifest(manifest).await,
    }
}

fn init_tracing() -> anyhow::Result<()> {
    // JSON for production, colored text for dev
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vlab=info".parse()?)
        .add_directive("ort=warn".parse()?);

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
    Ok(())
}

async fn run_manifest(path: PathBuf) -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "Serving metrics");
    }

    if config.ffmpeg_path.is_none() {
        if let Err(e) = check_ffmpeg() {
            warn!("{}; set VLAB_FFMPEG_PATH", e);
        }
    }
    if config.ffprobe_path.is_none() {
        if let Err(e) = check_ffprobe() {
            warn!("{}; set VLAB_FFPROBE_PATH", e);
        }
    }

    let json = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let manifest = Manifest::from_json(&json)?;
    info!(jobs = manifest.jobs.len(), "Loaded manifest {}", path.display());

    let executor = RunExecutor::new(config)?;
    let mut handles = Vec::with_capacity(manifest.jobs.len());
    for job in manifest.jobs {
        handles.push(executor.submit(job)?);
    }

    let ids: Vec<_> = handles.iter().map(|h| h.job_id().clone()).collect();
    let results = join_all(handles.into_iter().map(|h| h.wait())).await;

    let mut failed = 0usize;
    for (job_id, result) in ids.iter().zip(results) {
        let line = match result {
            Ok(output) => serde_json::json!({ "job_id": job_id, "status": "completed", "result": output }),
            Err(e) => {
                failed += 1;
                error!(%job_id, "Job failed: {}", e);
                serde_json::json!({ "job_id": job_id, "status": "failed", "error": e.to_string() })
            }
        };
        println!("{line}");
    }

    executor.shutdown().await;
    info!("Worker shutdown complete");

    if failed > 0 {
        anyhow::bail!("{failed} job(s) failed");
    }
    Ok(())
}
