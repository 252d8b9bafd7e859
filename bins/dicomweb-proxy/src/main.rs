//! DICOMweb Proxy CLI and Server Binary
//!
//! Entry point for the proxy. It provides commands for initializing and
//! validating a configuration file and for starting the HTTP server.

use anyhow::{Context, Result};
use cli::{Cli, Commands, LogFormatArg};
use common::resolver::UPSTREAM_URL_ENV;
use config::{
    default_upstream_base_url, generate_default_config, load_config, save_config,
    validate_config, ProxyConfig,
};
use metadata::{DicomWebForwarder, HttpDicomWebClient, MetadataApiState, StudyMetadataAggregator};
use observability::{init_logging, init_metrics, LogFormat, ServerMetrics};
use server::{
    health_routes, validate_ports_available, HealthState, HttpServer, ServerConfig, ServerExt,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const SERVICE_NAME: &str = "dicomweb-proxy";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Start {
            config,
            port,
            upstream,
            log_format,
        } => start_proxy(config, port, upstream, log_format).await,
        Commands::Validate { config } => {
            init_logging(SERVICE_NAME, LogFormat::Pretty)?;
            info!("Executing 'validate' command");
            validate_command(config).await
        }
        Commands::Init { output, force } => {
            init_logging(SERVICE_NAME, LogFormat::Pretty)?;
            info!("Executing 'init' command");
            init_command(output, force).await
        }
    }
}

async fn start_proxy<P: AsRef<Path>>(
    config_path: P,
    port_override: Option<u16>,
    upstream_override: Option<String>,
    log_format_override: Option<LogFormatArg>,
) -> Result<()> {
    let mut config = load_config(config_path.as_ref())?;

    let log_format = match log_format_override {
        Some(arg) => LogFormat::parse(arg.as_str()).unwrap_or_default(),
        None => LogFormat::parse(&config.observability.log_format).unwrap_or_default(),
    };
    init_logging(SERVICE_NAME, log_format)?;

    info!("DICOMweb proxy starting...");
    debug!(path = ?config_path.as_ref(), "Configuration loaded");

    // CLI flag > env var > config file
    config.upstream.base_url = common::resolve_url_with_override(
        upstream_override.as_deref(),
        UPSTREAM_URL_ENV,
        Some(&config.upstream.base_url),
        &default_upstream_base_url(),
    );

    if let Some(port) = port_override {
        debug!(port, "Overriding HTTP port from the command line");
        config.server.http_port = port;
    }

    let report = validate_config(&config);

    if !report.warnings.is_empty() {
        warn!("Configuration warnings:");
        for warning in &report.warnings {
            warn!(field = %warning.field, message = %warning.message);
        }
    }

    if !report.is_valid() {
        error!(
            error_count = report.errors.len(),
            "Configuration validation failed"
        );
        for err in &report.errors {
            error!("{}", err);
        }
        anyhow::bail!("Cannot start proxy due to configuration errors");
    }

    run_proxy(config).await
}

async fn run_proxy(config: ProxyConfig) -> Result<()> {
    let metrics = if config.observability.metrics_enabled {
        init_metrics(config.observability.metrics_port)?;
        Some(Arc::new(ServerMetrics::new("http")))
    } else {
        None
    };

    let client = HttpDicomWebClient::from_config(&config.upstream)
        .context("Failed to build upstream DICOMweb client")?;
    let aggregator = StudyMetadataAggregator::from_config(Arc::new(client), &config)
        .context("Failed to build study metadata aggregator")?;
    let forwarder = DicomWebForwarder::from_config(&config.upstream)
        .context("Failed to build pass-through forwarder")?;

    let state = Arc::new(MetadataApiState {
        aggregator: Arc::new(aggregator),
        forwarder,
    });

    let health = HealthState::new(config.proxy.name.clone())?
        .with_upstream(config.upstream.base_url.clone());

    let router = metadata::create_router(state).merge(health_routes(Arc::new(health)));

    let request_timeout = match config.server.request_timeout_seconds {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let router = metadata::with_http_layers(router, request_timeout, metrics);

    let server_config = ServerConfig::new(config.server.host.clone(), config.server.http_port);
    validate_ports_available(&server_config).await?;

    info!(
        proxy = %config.proxy.name,
        host = %config.server.host,
        http_port = config.server.http_port,
        upstream = %config.upstream.base_url,
        local_base = %config.rewrite.local_base_url,
        max_concurrent_series = config.aggregation.max_concurrent_series,
        "Starting proxy"
    );

    HttpServer::new(server_config, router)
        .with_name(config.proxy.name.clone())
        .run_with_ctrl_c()
        .await?;

    Ok(())
}

async fn validate_command<P: AsRef<Path>>(config_path: P) -> Result<()> {
    info!(path = ?config_path.as_ref(), "Validating configuration");

    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "Failed to load configuration");
            anyhow::bail!(e);
        }
    };

    let report = validate_config(&config);

    println!("\n=== Configuration Validation Report ===\n");

    if !report.defaults_applied.is_empty() {
        println!("Defaults Applied ({}):", report.defaults_applied.len());
        for default in &report.defaults_applied {
            println!("  [info] {} = {}", default.field, default.value);
        }
        println!();
    }

    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  [warn] [{}] {}", warning.field, warning.message);
        }
        println!();
    }

    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for err in &report.errors {
            println!("  [error] {}", err);
        }
        println!();
        anyhow::bail!("Configuration validation failed");
    }

    let retry = &config.aggregation.retry;

    println!("[ok] Configuration is valid!");
    println!();
    println!("Proxy: {}", config.proxy.name);
    println!("Listen: {}:{}", config.server.host, config.server.http_port);
    println!("Upstream: {}", config.upstream.base_url);
    println!(
        "Series Concurrency: {}",
        config.aggregation.max_concurrent_series
    );
    println!(
        "Series List Retry: {} retries, {}ms..{}ms backoff",
        retry.max_retries, retry.initial_backoff_ms, retry.max_backoff_ms
    );
    println!("Bulk Data Base: {}", config.rewrite.local_base_url);

    Ok(())
}

async fn init_command<P: AsRef<Path>>(output_path: P, force: bool) -> Result<()> {
    let output_path = output_path.as_ref();
    info!(?output_path, "Initializing new configuration file");

    if output_path.exists() && !force {
        anyhow::bail!(
            "Configuration file {:?} already exists (use --force to overwrite)",
            output_path
        );
    }

    let config = generate_default_config();

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    save_config(&config, output_path)?;

    println!("[ok] Configuration file created successfully!");
    println!();
    println!("Location: {:?}", output_path);
    println!();
    println!("This configuration includes:");
    println!("  - Listener on {}:{}", config.server.host, config.server.http_port);
    println!("  - Upstream DICOMweb service at {}", config.upstream.base_url);
    println!(
        "  - Up to {} concurrent series fetches per study",
        config.aggregation.max_concurrent_series
    );
    println!("  - Bulk data URIs rewritten to {}", config.rewrite.local_base_url);
    println!();
    println!("Next steps:");
    println!(
        "  1. Point upstream.base_url at your DICOMweb service (or set {})",
        UPSTREAM_URL_ENV
    );
    println!(
        "  2. Run 'dicomweb-proxy validate --config {:?}' to check configuration",
        output_path
    );
    println!(
        "  3. Run 'dicomweb-proxy start --config {:?}' to start the proxy",
        output_path
    );

    Ok(())
}
