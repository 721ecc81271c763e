//! pulsewatch -- self-hosted HTTP endpoint latency monitoring.
//!
//! This crate probes a configured endpoint on a cron cadence, keeps a rolling
//! statistical baseline in SQLite, flags anomalous samples, forecasts the next
//! expected latency, and serves it all over an HTTP API with a live event
//! stream.

pub mod analysis;
pub mod api;
pub mod config;
pub mod notify;
pub mod probe;
pub mod scheduler;
pub mod storage;

use crate::analysis::forecast::{ExternalPredictor, ForecastEngine};
use crate::analysis::stats::StatsEngine;
use crate::analysis::SampleSource;
use crate::api::state::AppState;
use crate::config::Config;
use crate::notify::Notifier;
use crate::probe::HttpProbe;
use crate::scheduler::Monitor;
use crate::storage::Store;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Wired-up application components, shared by the daemon and the CLI.
pub struct App {
    pub store: Arc<Store>,
    pub stats: Arc<StatsEngine>,
    pub forecast: Arc<ForecastEngine>,
    pub notifier: Notifier,
    pub monitor: Arc<Monitor>,
}

/// Build the full component graph from a config.
pub fn build(config: &Config) -> Result<App> {
    tracing::info!(db_path = %config.db_path, "Initializing database");
    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let pool = storage::open_pool(&config.db_path)?;
    let store = Arc::new(Store::new(pool));
    let source: Arc<dyn SampleSource> = store.clone();

    let stats = Arc::new(StatsEngine::new(source.clone()));

    let mut forecast = ForecastEngine::new(source);
    match &config.predictor.url {
        Some(url) => {
            tracing::info!(%url, "External predictor configured for forecasting");
            forecast = forecast.with_predictor(Box::new(ExternalPredictor::new(
                url,
                config.predictor.timeout_ms,
            )));
        }
        None => {
            tracing::warn!("No external predictor configured, using statistical methods only");
        }
    }
    let forecast = Arc::new(forecast);

    let notifier = Notifier::new(64);

    let probe = Arc::new(HttpProbe::new(
        &config.monitor.url,
        Duration::from_secs(config.monitor.timeout_secs),
    )?);
    let monitor = Arc::new(Monitor::new(
        probe,
        store.clone(),
        stats.clone(),
        notifier.clone(),
        config.monitor.window_hours,
    ));

    Ok(App {
        store,
        stats,
        forecast,
        notifier,
        monitor,
    })
}

/// Start the pulsewatch daemon: monitor loop plus API server.
pub async fn serve(config: Config) -> Result<()> {
    // Fail fast on a bad cron expression before anything is spawned.
    let schedule = scheduler::parse_cron(&config.monitor.cron)?;

    let app = build(&config)?;

    let monitor = app.monitor.clone();
    tokio::spawn(async move {
        scheduler::run_monitor_loop(monitor, schedule).await;
    });

    let state = AppState {
        store: app.store,
        stats: app.stats,
        forecast: app.forecast,
        notifier: app.notifier,
        default_window_hours: config.monitor.window_hours,
    };
    let router = api::router(state);

    let addr: std::net::SocketAddr = config.bind.parse()?;
    tracing::info!(%addr, "pulsewatch listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
