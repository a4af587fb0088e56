//! Configuration for the workbench CLI.
//!
//! Sources, later ones winning: built-in defaults, the JSON file at
//! `<config dir>/workbench/config.json`, `WORKBENCH_*` environment
//! variables, command-line flags.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use workbench_core::error::{WorkbenchError, WorkbenchResult};

pub const ENV_RPC_URL: &str = "WORKBENCH_RPC_URL";
pub const ENV_KEYPAIR: &str = "WORKBENCH_KEYPAIR";
pub const ENV_STORE: &str = "WORKBENCH_STORE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Solana CLI style keypair file used to sign
    pub keypair_path: PathBuf,
    /// Test suite store file
    pub store_path: PathBuf,
    /// `processed`, `confirmed` or `finalized`
    pub commitment: String,
    pub poll_interval_ms: u64,
    pub suite_delay_ms: u64,
    pub skip_preflight: bool,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_default();
        let data = dirs::data_dir().unwrap_or_else(|| home.join(".local").join("share"));
        Self {
            rpc_url: "http://127.0.0.1:8899".to_string(),
            keypair_path: home.join(".config").join("solana").join("id.json"),
            store_path: data.join("workbench").join("suites.json"),
            commitment: "confirmed".to_string(),
            poll_interval_ms: 500,
            suite_delay_ms: 500,
            skip_preflight: false,
        }
    }
}

impl Config {
    /// Defaults, then the config file if present, then the environment.
    pub fn load() -> WorkbenchResult<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("workbench").join("config.json"))
    }

    pub fn from_file(path: &Path) -> WorkbenchResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| WorkbenchError::Config {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        serde_json::from_str(&text).map_err(|e| WorkbenchError::Config {
            message: format!("Invalid config {}: {}", path.display(), e),
        })
    }

    /// Override fields from environment variables, looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(ENV_RPC_URL).filter(|v| !v.is_empty()) {
            self.rpc_url = url;
        }
        if let Some(path) = var(ENV_KEYPAIR).filter(|v| !v.is_empty()) {
            self.keypair_path = PathBuf::from(path);
        }
        if let Some(path) = var(ENV_STORE).filter(|v| !v.is_empty()) {
            self.store_path = PathBuf::from(path);
        }
    }

    pub fn commitment_config(&self) -> WorkbenchResult<CommitmentConfig> {
        CommitmentConfig::from_str(&self.commitment).map_err(|_| WorkbenchError::Config {
            message: format!("Unknown commitment level '{}'", self.commitment),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn suite_delay(&self) -> Duration {
        Duration::from_millis(self.suite_delay_ms)
    }
}
