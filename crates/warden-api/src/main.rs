//! # wardend — FleetWarden Controller Daemon
//!
//! Parses flags (merged over an optional JSON config file, flags winning),
//! opens the fleet store, wires up the runtime, and serves the API.
//!
//! Exit codes: 0 on clean shutdown, 1 on startup failure, 2 on bad flags
//! (clap's usage-error exit).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use warden_api::config::{ApiConfig, ConfigFile};
use warden_api::middleware::metrics::metrics_router;
use warden_api::state::AppState;
use warden_api::{app, sweeper};
use warden_store::FleetStore;
use warden_verifier::{EdgeApiClient, EdgeApiConfig};

/// FleetWarden controller — continuous-compliance control plane.
#[derive(Parser, Debug)]
#[command(name = "wardend", version, about, long_about = None)]
struct Cli {
    /// Path to a JSON configuration file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cloudflare API token for the edge-configuration probe.
    #[arg(long = "cf-api-token", env = "CF_API_TOKEN", hide_env_values = true)]
    cf_api_token: Option<String>,

    /// Cloudflare zone to probe.
    #[arg(long = "cf-zone-id")]
    cf_zone_id: Option<String>,

    /// Cloudflare account id (tunnel queries).
    #[arg(long = "cf-account-id")]
    cf_account_id: Option<String>,

    /// Cloudflare tunnel id (tunnel queries).
    #[arg(long = "cf-tunnel-id")]
    cf_tunnel_id: Option<String>,

    /// Bind address for the Prometheus metrics listener.
    #[arg(long = "metrics-addr")]
    metrics_addr: Option<SocketAddr>,

    /// Build manifest JSON served at /api/v1/manifest.
    #[arg(long = "manifest-path")]
    manifest_path: Option<PathBuf>,

    /// Local crypto self-test results consumed by the aggregator.
    #[arg(long = "selftest-path")]
    selftest_path: Option<PathBuf>,

    /// Admin API key. Unset leaves admin endpoints open (development mode).
    #[arg(long = "admin-key", env = "WARDEN_ADMIN_KEY", hide_env_values = true)]
    admin_key: Option<String>,

    /// Path to the durable fleet database file.
    #[arg(long = "fleet-db", default_value = "warden-fleet.db")]
    fleet_db: PathBuf,

    /// API bind address.
    #[arg(long, default_value = "0.0.0.0:8440")]
    listen: SocketAddr,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to start async runtime");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let file = match &cli.config {
        Some(path) => ConfigFile::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ConfigFile::default(),
    };

    let admin_key = cli.admin_key.or(file.admin_key);
    if admin_key.is_none() {
        tracing::warn!(
            "no admin key configured — admin endpoints are OPEN. \
             Set --admin-key before exposing this controller."
        );
    }

    let mut config = ApiConfig::new();
    config.admin_key = admin_key;
    config.manifest_path = cli.manifest_path.or(file.manifest_path);
    config.selftest_path = cli.selftest_path.or(file.selftest_path);

    let store = FleetStore::open(&cli.fleet_db)
        .await
        .with_context(|| format!("opening fleet db {}", cli.fleet_db.display()))?;

    let mut state = AppState::new(store, config);

    let cf_token = cli.cf_api_token.or(file.cf_api_token);
    let cf_zone = cli.cf_zone_id.or(file.cf_zone_id);
    if let (Some(token), Some(zone)) = (cf_token, cf_zone) {
        let mut edge_config =
            EdgeApiConfig::new("https://api.cloudflare.com/client/v4", token, zone);
        edge_config.account_id = cli.cf_account_id.or(file.cf_account_id);
        edge_config.tunnel_id = cli.cf_tunnel_id.or(file.cf_tunnel_id);
        let edge = EdgeApiClient::new(edge_config)
            .map_err(|e| anyhow::anyhow!("edge client: {e}"))?;
        state = state.with_edge(edge);
        tracing::info!("edge-configuration probe enabled");
    } else {
        tracing::info!("edge-configuration probe disabled (no API token/zone)");
    }

    tokio::spawn(sweeper::run_staleness_sweeper(state.clone()));
    tokio::spawn(sweeper::run_summary_emitter(state.clone()));

    if let Some(metrics_addr) = cli.metrics_addr {
        let metrics_app = metrics_router(state.clone());
        let listener = tokio::net::TcpListener::bind(metrics_addr)
            .await
            .with_context(|| format!("binding metrics listener {metrics_addr}"))?;
        tracing::info!(addr = %metrics_addr, "metrics listener up");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, metrics_app).await {
                tracing::error!(error = %e, "metrics listener failed");
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("binding api listener {}", cli.listen))?;
    tracing::info!(addr = %cli.listen, "controller up");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("api server failed")?;

    tracing::info!("controller shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        // Fall through: without a signal handler we just serve forever.
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
