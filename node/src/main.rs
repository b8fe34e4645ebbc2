use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use custody_core::CustodyTracker;
use custody_rpc::{start_server, AppState};
use custody_storage::{CustodyStore, MemoryCustodyStore, SledCustodyStore};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::{IpAddr, TcpListener};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod version;

use config::{load_config_with_overrides, AppConfig, StoreBackend};
use version::{git_commit_hash, CUSTODY_SERVICE_NAME, CUSTODY_VERSION};

pub(crate) fn build_cli() -> Command {
    Command::new(CUSTODY_SERVICE_NAME)
        .version(CUSTODY_VERSION)
        .about("Content custody status service")
        .disable_version_flag(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (defaults to config/custody.toml if present)"),
        )
        .arg(
            Arg::new("version_flag")
                .short('V')
                .long("version")
                .action(ArgAction::SetTrue)
                .help("Print detailed version information and exit"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .action(ArgAction::SetTrue)
                .help("Run configuration and environment self-checks, then exit"),
        )
        .arg(
            Arg::new("rpc-host")
                .long("rpc-host")
                .value_name("HOST")
                .help("Override RPC bind host"),
        )
        .arg(
            Arg::new("rpc-port")
                .long("rpc-port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Override RPC port"),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .value_name("BACKEND")
                .value_parser(value_parser!(StoreBackend))
                .help("Record store backend (memory, sled)"),
        )
        .arg(
            Arg::new("db-path")
                .long("db-path")
                .value_name("DIR")
                .help("Directory of the sled database"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Override the log level"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["pretty", "json"])
                .help("Select log output format"),
        )
        .arg(
            Arg::new("disable-metrics")
                .long("disable-metrics")
                .action(ArgAction::SetTrue)
                .help("Disable the Prometheus metrics endpoint"),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    let config = load_config_with_overrides(&matches)?;

    if matches.get_flag("version_flag") {
        print_version_info(&config);
        return Ok(());
    }

    if matches.get_flag("check") {
        run_self_check(&config)?;
        return Ok(());
    }

    init_logging(&config)?;
    let prometheus_handle = init_metrics(&config);

    info!("Starting {}: {}", CUSTODY_SERVICE_NAME, config.node_id);
    if let Some(path) = &config.config_path {
        info!("Config file: {}", path.display());
    } else {
        info!("Config file: (built-in defaults)");
    }
    if let Ok(ip) = config.rpc_host.parse::<IpAddr>() {
        if ip.is_unspecified() {
            warn!(
                "RPC host {} binds to all interfaces; ingestion routes are unauthenticated, front them with a reverse proxy or firewall",
                config.rpc_host
            );
        }
    }

    let (store, sled_store) = open_store(&config)?;
    let tracker = Arc::new(CustodyTracker::new(store));
    let app_state =
        AppState::new(tracker, config.node_id.clone()).with_metrics(prometheus_handle);

    let rpc_addr = config.rpc_addr();
    let rpc_addr_clone = rpc_addr.clone();
    info!("Starting RPC server on {}", rpc_addr);
    let rpc_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state, &rpc_addr_clone).await {
            error!("RPC server error: {}", e);
        }
    });

    info!("Custody API available at: http://{}/api/:cid", rpc_addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down {}", CUSTODY_SERVICE_NAME);
    rpc_handle.abort();

    if let Some(sled_store) = sled_store {
        sled_store.flush()?;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Open the configured backend. The sled handle is returned separately so
/// it can be flushed on shutdown.
fn open_store(
    config: &AppConfig,
) -> Result<(Arc<dyn CustodyStore>, Option<Arc<SledCustodyStore>>)> {
    match config.store_backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory store; records are lost on restart");
            let store: Arc<dyn CustodyStore> = Arc::new(MemoryCustodyStore::new());
            Ok((store, None))
        }
        StoreBackend::Sled => {
            fs::create_dir_all(&config.db_path)
                .with_context(|| format!("failed to create {}", config.db_path))?;
            let sled_store = Arc::new(
                SledCustodyStore::new(&config.db_path)
                    .with_context(|| format!("failed to open sled store at {}", config.db_path))?,
            );
            info!("Storage initialized at {}", config.db_path);
            let store: Arc<dyn CustodyStore> = sled_store.clone();
            Ok((store, Some(sled_store)))
        }
    }
}

fn init_metrics(config: &AppConfig) -> Option<PrometheusHandle> {
    if !config.prometheus_enabled {
        info!("Prometheus metrics exporter disabled via configuration");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics exporter registered");
            custody_core::metrics::describe();
            Some(handle)
        }
        Err(err) => {
            warn!("Failed to install Prometheus metrics exporter: {}", err);
            None
        }
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    Ok(())
}

fn print_version_info(config: &AppConfig) {
    println!(
        "{} {} (commit {}) [store: {}]",
        CUSTODY_SERVICE_NAME,
        CUSTODY_VERSION,
        git_commit_hash(),
        config.store_backend
    );
}

fn run_self_check(config: &AppConfig) -> Result<()> {
    println!("Running {} self-check...", CUSTODY_SERVICE_NAME);
    let mut issues = Vec::new();

    if let Err(err) = ensure_port_available(&config.rpc_host, config.rpc_port, "RPC") {
        issues.push(err);
    }
    if config.store_backend == StoreBackend::Sled {
        if let Err(err) = ensure_storage_directory(&config.db_path) {
            issues.push(err);
        }
    }

    if issues.is_empty() {
        println!("Self-check passed ({} store, {})", config.store_backend, config.rpc_addr());
        Ok(())
    } else {
        for issue in &issues {
            println!("  - {issue}");
        }
        anyhow::bail!("self-check found {} issue(s)", issues.len())
    }
}

fn ensure_port_available(host: &str, port: u16, label: &str) -> Result<(), String> {
    let addr = format!("{host}:{port}");
    match TcpListener::bind(&addr) {
        Ok(listener) => drop(listener),
        Err(err) => {
            return Err(format!(
                "{label} port {addr} is not available for binding: {err}"
            ))
        }
    }
    Ok(())
}

fn ensure_storage_directory(path: &str) -> Result<(), String> {
    let dir = Path::new(path);
    if dir.exists() && !dir.is_dir() {
        return Err(format!("Storage path {} is not a directory", dir.display()));
    }
    fs::create_dir_all(dir)
        .map_err(|err| format!("Unable to create {}: {}", dir.display(), err))?;

    let probe = dir.join(".custody_write_test");
    let written = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&probe)
        .and_then(|mut file| file.write_all(b"ok"));
    let _ = fs::remove_file(&probe);
    written.map_err(|err| format!("Unable to write into {}: {}", dir.display(), err))
}
