//! Configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use walletbridge::{ClientConfig, DappMetadata, ProviderConfig};

/// Default config file, looked up in the working directory
pub const CONFIG_FILE: &str = "walletbridge.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub rpc_url: String,
    /// HTTP timeout per wallet call
    pub timeout_secs: u64,
    /// Poll the endpoint for chain/account changes; 0 disables polling
    pub poll_interval_ms: u64,
    pub client: ClientConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            timeout_secs: 120,
            poll_interval_ms: 2_000,
            client: ClientConfig::new()
                .with_dapp_metadata(DappMetadata::new("walletbridge CLI", "http://localhost")),
        }
    }
}

impl CliConfig {
    /// Reads `path` if it exists; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }

    /// Applies `WALLETBRIDGE_*` variables from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("WALLETBRIDGE_RPC_URL") {
            self.rpc_url = url;
        }
        if let Some(secs) = lookup("WALLETBRIDGE_TIMEOUT_SECS") {
            self.timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("WALLETBRIDGE_TIMEOUT_SECS={secs:?}"))?;
        }
        Ok(())
    }

    /// Command-line flags win over everything else.
    pub fn apply_flags(&mut self, rpc_url: Option<String>, timeout_secs: Option<u64>) {
        if let Some(url) = rpc_url {
            self.rpc_url = url;
        }
        if let Some(secs) = timeout_secs {
            self.timeout_secs = secs;
        }
    }

    pub fn provider_config(&self) -> ProviderConfig {
        let config = ProviderConfig::new(self.rpc_url.clone()).with_timeout(self.timeout_secs);
        if self.poll_interval_ms == 0 {
            config
        } else {
            config.with_poll_interval(Duration::from_millis(self.poll_interval_ms))
        }
    }
}
