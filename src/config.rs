//! Configuration for the SportsHub server.
//!
//! Settings are layered, later layers winning:
//! defaults → `sportshub.toml` → environment (`SPORTSHUB_*`, `.env`) → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! db_path = "/var/lib/sportshub/shop.db"
//! dev_mode = false
//!
//! [logging]
//! format = "json"
//! dir = "/var/log/sportshub"
//! filter = "info,tower_http=debug"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::shop::server::ServerConfig;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "sportshub.toml";

pub const ENV_HOST: &str = "SPORTSHUB_HOST";
pub const ENV_PORT: &str = "SPORTSHUB_PORT";
pub const ENV_DB: &str = "SPORTSHUB_DB";
pub const ENV_LOG_FORMAT: &str = "SPORTSHUB_LOG_FORMAT";
pub const ENV_LOG_DIR: &str = "SPORTSHUB_LOG_DIR";

/// Console log output style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!(
                "Invalid log format '{}'. Valid options: pretty, json",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Permissive CORS for a frontend served from another origin.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    ServerConfig::default().host
}

fn default_port() -> u16 {
    ServerConfig::default().port
}

fn default_db_path() -> PathBuf {
    ServerConfig::default().db_path
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
    /// Directory for a daily rolling log file. Console only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// `EnvFilter` directives used when `RUST_LOG` is not set.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            dir: None,
            filter: default_filter(),
        }
    }
}

/// Root of `sportshub.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShopConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Values given on the command line. `None` keeps the lower layer's value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub dev: bool,
}

impl ShopConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse sportshub.toml")
    }

    /// Load from `path`, or from `sportshub.toml` in `dir` when no path is
    /// given. A missing default file yields the defaults; a missing explicit
    /// file is an error.
    pub fn load_or_default(path: Option<&Path>, dir: &Path) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = dir.join(CONFIG_FILE);
                if default_path.exists() {
                    Self::load(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply `SPORTSHUB_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`. Empty values are
    /// ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get(ENV_HOST) {
            self.server.host = host;
        }
        if let Some(port) = get(ENV_PORT) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("{} must be a port number, got '{}'", ENV_PORT, port))?;
        }
        if let Some(db) = get(ENV_DB) {
            self.server.db_path = PathBuf::from(db);
        }
        if let Some(format) = get(ENV_LOG_FORMAT) {
            self.logging.format = format
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .with_context(|| format!("Invalid {}", ENV_LOG_FORMAT))?;
        }
        if let Some(dir) = get(ENV_LOG_DIR) {
            self.logging.dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: CliOverrides) {
        if let Some(host) = cli.host {
            self.server.host = host;
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(db_path) = cli.db_path {
            self.server.db_path = db_path;
        }
        if cli.dev {
            self.server.dev_mode = true;
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("port is 0: the OS will pick a random port".to_string());
        }
        if self.server.host.trim().is_empty() {
            warnings.push("host is empty".to_string());
        }
        if self.server.db_path.as_os_str().is_empty() {
            warnings.push("db_path is empty".to_string());
        }
        if self.server.dev_mode && self.server.host != "127.0.0.1" && self.server.host != "localhost"
        {
            warnings.push(format!(
                "dev_mode enables permissive CORS while listening on {}",
                self.server.host
            ));
        }
        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.logging.filter) {
            warnings.push(format!(
                "Invalid log filter '{}': {}",
                self.logging.filter, e
            ));
        }

        warnings
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            db_path: self.server.db_path.clone(),
            dev_mode: self.server.dev_mode,
        }
    }
}
