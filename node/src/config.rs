use anyhow::{bail, Result};
use clap::ValueEnum;
use config::{Config, File as ConfigFile};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_CONFIG_PATH: &str = "config/custody.toml";
const ENV_PREFIX: &str = "CUSTODY";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    Memory,
    Sled,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "sled" => Ok(StoreBackend::Sled),
            other => bail!("unknown store backend '{other}'; expected 'memory' or 'sled'"),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => f.write_str("memory"),
            StoreBackend::Sled => f.write_str("sled"),
        }
    }
}

/// Service configuration: file values layered under `CUSTODY_*` variables,
/// then command line overrides.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_path: Option<PathBuf>,
    pub node_id: String,

    // Network
    pub rpc_host: String,
    pub rpc_port: u16,

    // Storage
    pub store_backend: StoreBackend,
    pub db_path: String,

    // Observability
    pub prometheus_enabled: bool,

    // Logging
    pub log_level: String,
    pub log_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            node_id: "custody-node".to_string(),
            rpc_host: "127.0.0.1".to_string(),
            rpc_port: 8080,
            store_backend: StoreBackend::Memory,
            db_path: "./data/custody".to_string(),
            prometheus_enabled: true,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path_override: Option<&str>) -> Result<Self> {
        let resolved_path = match config_path_override {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    bail!(
                        "Configuration file {} not found (specified via --config)",
                        path.display()
                    );
                }
                Some(path)
            }
            None => Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|path| path.exists()),
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));
        let config = builder.build()?;

        let defaults = AppConfig::default();
        let rpc_port = match get_string_value(&config, &["RPC_PORT", "rpc.port"]) {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|err| anyhow::anyhow!("invalid RPC port '{raw}': {err}"))?,
            None => defaults.rpc_port,
        };
        let store_backend = match get_string_value(&config, &["STORE_BACKEND", "storage.backend"])
        {
            Some(raw) => raw.parse()?,
            None => defaults.store_backend,
        };

        Ok(Self {
            config_path: resolved_path,
            node_id: get_string_value(&config, &["NODE_ID", "node.id"])
                .unwrap_or(defaults.node_id),
            rpc_host: get_string_value(&config, &["RPC_HOST", "rpc.host"])
                .unwrap_or(defaults.rpc_host),
            rpc_port,
            store_backend,
            db_path: get_string_value(&config, &["DB_PATH", "storage.db_path"])
                .unwrap_or(defaults.db_path),
            prometheus_enabled: get_bool_value(
                &config,
                &["PROMETHEUS_ENABLED", "metrics.prometheus"],
                defaults.prometheus_enabled,
            ),
            log_level: get_string_value(&config, &["LOG_LEVEL", "log.level"])
                .unwrap_or(defaults.log_level),
            log_format: get_string_value(&config, &["LOG_FORMAT", "log.format"])
                .unwrap_or(defaults.log_format),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_id.trim().is_empty() {
            bail!("NODE_ID must not be empty");
        }
        if self.rpc_port == 0 {
            bail!("RPC_PORT must be a non-zero port");
        }
        if self.log_format != "pretty" && self.log_format != "json" {
            bail!(
                "Invalid LOG_FORMAT '{}'; expected 'pretty' or 'json'",
                self.log_format
            );
        }
        if self.store_backend == StoreBackend::Sled && self.db_path.trim().is_empty() {
            bail!("DB_PATH is required for the sled store backend");
        }
        Ok(())
    }

    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_host, self.rpc_port)
    }
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn get_bool_value(config: &Config, keys: &[&str], default: bool) -> bool {
    for key in keys {
        if let Ok(value) = config.get_bool(key) {
            return value;
        }
        if let Ok(raw) = config.get_string(key) {
            if let Ok(parsed) = raw.parse::<bool>() {
                return parsed;
            }
        }
    }
    default
}

pub fn apply_overrides(matches: &clap::ArgMatches, config: &mut AppConfig) {
    if let Some(rpc_host) = matches.get_one::<String>("rpc-host") {
        config.rpc_host = rpc_host.clone();
    }

    if let Some(rpc_port) = matches.get_one::<u16>("rpc-port") {
        config.rpc_port = *rpc_port;
    }

    if let Some(store) = matches.get_one::<StoreBackend>("store") {
        config.store_backend = *store;
    }

    if let Some(db_path) = matches.get_one::<String>("db-path") {
        config.db_path = db_path.clone();
    }

    if let Some(log_level) = matches.get_one::<String>("log-level") {
        config.log_level = log_level.clone();
    }

    if let Some(log_format) = matches.get_one::<String>("log-format") {
        config.log_format = log_format.clone();
    }

    if matches.get_flag("disable-metrics") {
        config.prometheus_enabled = false;
    }
}

pub fn load_config_with_overrides(matches: &clap::ArgMatches) -> Result<AppConfig> {
    let config_path = matches
        .get_one::<String>("config")
        .map(|value| value.as_str());
    let mut config = AppConfig::load(config_path)?;
    apply_overrides(matches, &mut config);
    config.validate()?;
    Ok(config)
}
