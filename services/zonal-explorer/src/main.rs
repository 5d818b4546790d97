//! Zonal statistics explorer.
//!
//! Reads one `lon,lat` selection per stdin line, runs the analysis for the
//! latest selection and writes one JSON presentation payload per line to
//! stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use zonal_common::GeoPoint;
use zonal_explorer::config::ExplorerConfig;
use zonal_explorer::presentation::Presenter;
use zonal_explorer::sources::open_sources;
use zonal_processor::{InteractiveTrigger, ZonalPipeline};

#[derive(Parser, Debug)]
#[command(name = "zonal-explorer")]
#[command(about = "Per land cover class climate statistics around selected points")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "ZONAL_EXPLORER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .init();

    info!("Starting zonal explorer");

    let config = ExplorerConfig::load(args.config.as_deref())?;
    info!(
        model = %config.analysis.model,
        variable = %config.analysis.variable,
        classes = ?config.analysis.classes,
        buffer_m = config.analysis.buffer_m,
        "Loaded configuration"
    );

    let sources = open_sources(&config)?;
    let pipeline = Arc::new(
        ZonalPipeline::new(sources.climate, sources.land_cover, config.analysis.clone())
            .context("Failed to create pipeline")?,
    );

    let mut presenter = Presenter::new(
        config.analysis.variable.clone(),
        config.chart_statistic,
        pipeline.legend().clone(),
        config.analysis.preview.clone(),
    );

    let (tx, mut rx) = mpsc::channel(16);
    let trigger = InteractiveTrigger::new(Arc::clone(&pipeline), tx);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;

    loop {
        // Once input is exhausted, wait for the latest selection only.
        if !input_open && presenter.shown_generation() >= trigger.current_generation() {
            break;
        }

        tokio::select! {
            line = lines.next_line(), if input_open => {
                match line.context("Failed to read selection")? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match GeoPoint::parse(&line) {
                        Ok(point) => {
                            let generation = trigger.select_point(point);
                            info!(generation, lon = point.lon, lat = point.lat, "Point selected");
                        }
                        Err(e) => warn!(input = %line.trim(), error = %e, "Ignoring selection"),
                    },
                    None => input_open = false,
                }
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                if let Some(payload) = presenter.present(&event) {
                    println!("{}", serde_json::to_string(&payload)?);
                }
                if let Some(cache) = &sources.cache {
                    let stats = cache.read().await.stats();
                    info!(
                        hits = stats.hits,
                        misses = stats.misses,
                        hit_rate = stats.hit_rate(),
                        entries = stats.entries,
                        memory_mb = stats.memory_bytes as f64 / (1024.0 * 1024.0),
                        "Chunk cache"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, cancelling analysis in flight");
                trigger.cancel();
                break;
            }
        }
    }

    info!("Zonal explorer stopped");
    Ok(())
}
