use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::chain::StoreOptions;
use crate::error::{Result, SentinelError};

/// Optional config file looked up in the working directory (any extension
/// the `config` crate understands, e.g. `sentinel.toml`).
const CONFIG_FILE_NAME: &str = "sentinel";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub chain_file: String,
    /// Delete the stored chain on startup.
    pub reset_on_start: bool,
    pub server_host: String,
    pub server_port: u16,
    pub allowed_origins: Vec<String>,
    pub lock_timeout_ms: u64,
    pub fsync_writes: bool,
}

impl AppConfig {
    /// Defaults, then `sentinel.*` if present, then `SENTINEL_*` variables
    pub fn load() -> Result<Self> {
        let config = Self::defaults()?
            .add_source(File::with_name(CONFIG_FILE_NAME).required(false))
            .add_source(
                Environment::with_prefix("SENTINEL")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("allowed_origins"),
            )
            .build()?
            .try_deserialize::<Self>()?;

        config.validate()?;
        info!("Configuration loaded (chain file: {})", config.chain_file);
        Ok(config)
    }

    /// Defaults overlaid with a single config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config = Self::defaults()?
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Self>()?;

        config.validate()?;
        Ok(config)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("chain_file", "blockchain.json")?
            .set_default("reset_on_start", false)?
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 8080)?
            .set_default("allowed_origins", vec!["*"])?
            .set_default("lock_timeout_ms", 5000)?
            .set_default("fsync_writes", true)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain_file.trim().is_empty() {
            return Err(SentinelError::Config("chain_file must not be empty".to_string()));
        }
        if self.lock_timeout_ms == 0 {
            return Err(SentinelError::Config(
                "lock_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            fsync_writes: self.fsync_writes,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
