use serde::{Deserialize, Serialize};
use std::time::Duration;
use walletbridge_provider::DappMetadata;

/// Configuration for a [`WalletSessionClient`](crate::WalletSessionClient)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Metadata shown by the wallet when the channel opens
    pub dapp: DappMetadata,
    /// Upper bound on a single request, in milliseconds.
    ///
    /// `None` waits until the wallet answers or the session is torn down;
    /// approvals are paced by the user and can take arbitrarily long.
    pub request_timeout_ms: Option<u64>,
    /// Chain id stored when `eth_chainId` fails during connect
    pub default_chain_id: Option<String>,
    /// Fetch the selected account's balance after connect and account changes
    pub refresh_balance_on_accounts_change: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dapp: DappMetadata::new("walletbridge", ""),
            request_timeout_ms: None,
            default_chain_id: None,
            refresh_balance_on_accounts_change: false,
        }
    }
}

impl ClientConfig {
    /// Creates the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the dapp metadata
    pub fn with_dapp_metadata(mut self, dapp: DappMetadata) -> Self {
        self.dapp = dapp;
        self
    }

    /// Bounds every request
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the fallback chain id
    pub fn with_default_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.default_chain_id = Some(chain_id.into());
        self
    }

    /// Enables or disables balance auto-refresh
    pub fn with_balance_refresh(mut self, enable: bool) -> Self {
        self.refresh_balance_on_accounts_change = enable;
        self
    }

    /// The request timeout as a duration
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}
