pub mod api;
pub mod cli;
pub mod clients;
pub mod config;
pub mod db;
pub mod domain;
pub mod entities;
pub mod models;
pub mod services;
pub mod state;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
pub use config::Config;
use state::SharedState;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let cli = Cli::parse();

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(handle)
    } else {
        None
    };

    init_tracing(&config)?;

    match cli.command() {
        Commands::Serve => {
            config.validate()?;
            run_server(config, prometheus_handle).await
        }
        Commands::Init => cmd_init(),
        Commands::Check => {
            config.validate()?;
            cmd_check(config).await
        }
    }
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer());

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let mut builder = tracing_loki::builder().label("app", "gatehouse")?;
        for (key, value) in &config.observability.loki_labels {
            builder = builder.extra_field(key.as_str(), value.as_str())?;
        }
        let (layer, task) = builder.build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    Ok(())
}

async fn run_server(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!("gatehouse v{} starting...", env!("CARGO_PKG_VERSION"));

    if !config.server.enabled {
        warn!("server.enabled is false, nothing to do");
        return Ok(());
    }

    let port = config.server.port;
    let api_state = api::create_app_state_from_config(config, prometheus_handle).await?;
    let app = api::router(api_state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Web API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {}", e),
    }
}

fn cmd_init() -> anyhow::Result<()> {
    if Config::create_default_if_missing()? {
        println!("Wrote default config.toml");
        println!("Generated random auth.jwt_secret and storage.signing_key; keep the file private.");
    } else {
        println!("config.toml already exists, leaving it untouched");
    }
    Ok(())
}

async fn cmd_check(config: Config) -> anyhow::Result<()> {
    let shared = Arc::new(SharedState::new(config).await?);

    shared.store.ping().await.context("Database unreachable")?;
    println!("✓ database");

    match shared.cache.ping().await {
        Ok(()) => println!("✓ cache"),
        Err(e) => println!("✗ cache: {e}"),
    }

    let bucket = &shared.config.storage.default_bucket;
    let exists = shared
        .storage
        .bucket_exists(bucket)
        .await
        .context("Object store unreachable")?;
    println!(
        "✓ object store (bucket '{bucket}' {})",
        if exists { "exists" } else { "will be created on first upload" }
    );

    Ok(())
}
