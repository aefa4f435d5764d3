use std::{
    net::{AddrParseError, SocketAddr},
    num::ParseIntError,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

pub const LISTEN_ADDR_VAR: &str = "MCORE_LISTEN_ADDR";
pub const STATIC_DIR_VAR: &str = "MCORE_STATIC_DIR";
pub const STORE_VAR: &str = "MCORE_STORE";
pub const READ_TIMEOUT_VAR: &str = "MCORE_READ_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub static_dir: PathBuf,
    pub store: StoreConfig,
    /// time a client gets to send one complete request
    pub read_timeout_ms: u64,
}

/// `"memory"` or a path to a JSON lines file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum StoreConfig {
    Memory,
    File(PathBuf),
}

impl From<String> for StoreConfig {
    fn from(value: String) -> Self {
        match value.as_str() {
            "memory" => StoreConfig::Memory,
            _ => StoreConfig::File(value.into()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("error parsing config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid {var}: {source}")]
    InvalidAddr {
        var: &'static str,
        source: AddrParseError,
    },
    #[error("invalid {var}: {source}")]
    InvalidNumber {
        var: &'static str,
        source: ParseIntError,
    },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            static_dir: "static".into(),
            store: StoreConfig::File("data/measurements.jsonl".into()),
            read_timeout_ms: 10_000,
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then `MCORE_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let config = match path {
            Some(path) => Config::from_toml(&std::fs::read_to_string(path)?)?,
            None => Config::default(),
        };
        config.with_overrides(|var| std::env::var(var).ok())
    }

    pub fn from_toml(src: &str) -> Result<Config, ConfigError> {
        Ok(toml::from_str(src)?)
    }

    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Config, ConfigError> {
        if let Some(addr) = lookup(LISTEN_ADDR_VAR) {
            self.listen_addr = addr
                .parse()
                .map_err(|source| ConfigError::InvalidAddr {
                    var: LISTEN_ADDR_VAR,
                    source,
                })?;
        }
        if let Some(dir) = lookup(STATIC_DIR_VAR) {
            self.static_dir = dir.into();
        }
        if let Some(store) = lookup(STORE_VAR) {
            self.store = store.into();
        }
        if let Some(ms) = lookup(READ_TIMEOUT_VAR) {
            self.read_timeout_ms = ms.parse().map_err(|source| ConfigError::InvalidNumber {
                var: READ_TIMEOUT_VAR,
                source,
            })?;
        }
        Ok(self)
    }
}
