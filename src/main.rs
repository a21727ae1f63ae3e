mod alerts;
mod config;
mod core;
mod db;
mod elastic;
mod http;
mod metrics;
mod signals;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, reload};

use crate::alerts::AlertManager;
use crate::config::{Config, LoggingConfig};
use crate::core::pipeline::Pipeline;
use crate::db::{RuleStore, SharedDatabase};
use crate::elastic::ElasticAlertStore;
use crate::http::AppState;
use crate::metrics::PipelineMetrics;
use crate::signals::SignalEngine;
use crate::signals::anomaly::{AnomalyProducer, SimulatedAnomalyModel};
use crate::signals::rules::RuleEvaluator;

/// Slot for the JSON file layer, filled once the log dir is known.
type FileLogSlot = Option<Box<dyn Layer<Registry> + Send + Sync>>;
type FileLogHandle = reload::Handle<FileLogSlot, Registry>;

/// Console logging with an empty file slot. Installed before config is read
/// so config warnings are not lost.
fn build_subscriber<W>(console: W) -> (impl Subscriber + Send + Sync + 'static, FileLogHandle)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let (file_slot, handle) = reload::Layer::new(FileLogSlot::None);
    let filter = EnvFilter::from_default_env().add_directive(
        "fincrime_detector=info"
            .parse()
            .unwrap_or_else(|_| LevelFilter::INFO.into()),
    );
    let subscriber = tracing_subscriber::registry()
        .with(file_slot)
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(console));
    (subscriber, handle)
}

/// Append JSON lines to `<dir>/backend.log` when a log dir is configured.
fn attach_file_log(handle: &FileLogHandle, logging: &LoggingConfig) -> anyhow::Result<()> {
    let Some(dir) = &logging.dir else {
        return Ok(());
    };
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create log directory {dir}"))?;
    let path = Path::new(dir).join("backend.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let layer: FileLogSlot = Some(
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(Arc::new(file))
            .boxed(),
    );
    handle.reload(layer).context("failed to attach file logger")?;
    tracing::info!("Writing JSON logs to {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (subscriber, file_log) = build_subscriber(std::io::stdout);
    tracing::subscriber::set_global_default(subscriber).context("failed to install logger")?;

    dotenvy::dotenv().ok();
    let mut config = Config::load("config.toml");
    config.apply_env();
    attach_file_log(&file_log, &config.logging)?;

    tracing::info!("fincrime-detector starting...");
    tracing::info!("Config: {:?}", config);
    if config.auth.username.is_empty() {
        tracing::warn!("API_USER is not set; every /api request will be rejected");
    }

    // Rule store
    let db_path = Path::new(&config.database.path);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create database directory {}", parent.display()))?;
    }
    let db = SharedDatabase::open(db_path).context("failed to open rule database")?;
    tracing::info!("Rule database opened at {}", config.database.path);
    if config.database.seed_default_rules {
        let seeded = db.seed_default_rules().context("failed to seed default rules")?;
        if seeded > 0 {
            tracing::info!("Seeded {seeded} default detection rules");
        }
    }
    tracing::info!("{} detection rules loaded", db.rule_count()?);

    // Alert store
    let elastic = ElasticAlertStore::new(&config.elasticsearch)
        .context("failed to build Elasticsearch client")?;
    let cluster = elastic
        .info()
        .await
        .context("failed to reach Elasticsearch")?;
    tracing::info!(
        version = %cluster["version"]["number"].as_str().unwrap_or("unknown"),
        "Connected to Elasticsearch at {}",
        config.elasticsearch.url
    );
    elastic
        .ensure_index()
        .await
        .with_context(|| format!("failed to prepare index {}", elastic.index()))?;

    // Pipeline
    let metrics = Arc::new(PipelineMetrics::new());
    let rule_store: Arc<dyn RuleStore> = Arc::new(db);
    let anomaly: Arc<dyn AnomalyProducer> = Arc::new(SimulatedAnomalyModel::new());
    let engine = SignalEngine::new(
        anomaly,
        rule_store.clone(),
        RuleEvaluator::from_config(&config.signals),
        config.pipeline.anomaly_timeout(),
        config.pipeline.rule_store_timeout(),
    );
    let alerts = AlertManager::new(
        Arc::new(elastic),
        metrics.clone(),
        config.signals.alert_threshold,
        config.pipeline.alert_store_timeout(),
    );
    tracing::info!("Alert threshold {:.2}", alerts.threshold());
    let pipeline = Arc::new(Pipeline::new(engine, alerts, metrics));

    let state = Arc::new(AppState {
        pipeline,
        rule_store,
        auth: config.auth.clone(),
        limits: config.alerts.clone(),
    });
    let app = http::build_router(state, &config.server.allowed_origins);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Server listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
