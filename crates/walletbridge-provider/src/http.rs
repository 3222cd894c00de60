//! JSON-RPC over HTTP.
//!
//! Talks to any endpoint that answers wallet methods over plain JSON-RPC: a
//! development node with unlocked accounts, a signing proxy, or a wallet
//! bridge service. HTTP has no push channel, so wallet events are
//! synthesized by polling `eth_chainId` and `eth_accounts` when a poll
//! interval is configured.

use crate::{
    DappMetadata, JsonRpcRequest, JsonRpcResponse, ProviderError, ProviderEvent, ProviderMessage,
    Result, WalletProvider,
};
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use parking_lot::Mutex;
use reqwest::{header::ORIGIN, Client};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;
use walletbridge_error::{INTERNAL_ERROR_CODE, PARSE_ERROR_CODE};

/// Rate limiter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub requests_per_second: u32,
    /// Burst size (max requests in a burst)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 20,
        }
    }
}

/// Configuration for an HTTP wallet endpoint
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// JSON-RPC URL
    pub url: String,
    /// Per-request HTTP timeout in seconds
    pub timeout_secs: u64,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Optional client-side rate limit
    pub rate_limit: Option<RateLimitConfig>,
    /// Interval for synthesizing chain/account events, if any
    pub poll_interval: Option<Duration>,
    /// User agent string
    pub user_agent: String,
}

impl ProviderConfig {
    /// Creates a new provider configuration with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: 120,
            connect_timeout_secs: 10,
            rate_limit: Some(RateLimitConfig::default()),
            poll_interval: None,
            user_agent: format!("walletbridge/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Sets the request timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets or clears the rate limit
    pub fn with_rate_limit(mut self, rate_limit: Option<RateLimitConfig>) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Enables event polling at the given interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.url).map_err(|e| ProviderError::InvalidUrl(e.to_string()))?;
        if let Some(limit) = &self.rate_limit {
            if limit.requests_per_second == 0 || limit.burst_size == 0 {
                return Err(ProviderError::InvalidConfig(
                    "rate limit values must be non-zero".into(),
                ));
            }
        }
        if self.poll_interval == Some(Duration::ZERO) {
            return Err(ProviderError::InvalidConfig(
                "poll interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new("http://localhost:8545")
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Everything a spawned request task needs, cloned per task.
#[derive(Clone)]
struct Transport {
    client: Client,
    url: String,
    origin: Option<String>,
    rate_limiter: Option<Arc<DirectLimiter>>,
    internal_id: Arc<AtomicU64>,
}

impl Transport {
    async fn post(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let mut builder = self.client.post(&self.url).json(request);
        if let Some(origin) = &self.origin {
            builder = builder.header(ORIGIN, origin.as_str());
        }
        let body = builder.send().await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Forwards one session request and turns any transport failure into an
    /// error response for the same id.
    async fn forward(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match self.post(&request).await {
            Ok(response) if response.id == request.id => response,
            Ok(response) => {
                tracing::warn!(sent = request.id, received = response.id, "response id mismatch");
                JsonRpcResponse::failure(
                    request.id,
                    PARSE_ERROR_CODE,
                    format!("response id mismatch: sent {}, received {}", request.id, response.id),
                )
            }
            Err(ProviderError::Json(e)) => {
                JsonRpcResponse::failure(request.id, PARSE_ERROR_CODE, e.to_string())
            }
            Err(e) => JsonRpcResponse::failure(request.id, INTERNAL_ERROR_CODE, e.to_string()),
        }
    }

    /// Issues a provider-internal call. Ids live in a separate space from the
    /// session's and never reach the inbound stream.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let id = self.internal_id.fetch_add(1, Ordering::SeqCst);
        let response = self.post(&JsonRpcRequest::new(id, method, params)).await?;
        if let Some(error) = response.error {
            return Err(ProviderError::RpcError {
                code: error.code,
                message: error.message,
            });
        }
        response.result.ok_or_else(|| ProviderError::RpcError {
            code: PARSE_ERROR_CODE,
            message: "No result in response".to_string(),
        })
    }
}

struct OpenChannel {
    transport: Transport,
    tx: mpsc::UnboundedSender<ProviderMessage>,
    poller: Option<JoinHandle<()>>,
}

impl Drop for OpenChannel {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

/// Wallet provider speaking JSON-RPC over HTTP
pub struct HttpWalletProvider {
    config: ProviderConfig,
    client: Client,
    rate_limiter: Option<Arc<DirectLimiter>>,
    channel: Mutex<Option<OpenChannel>>,
}

impl HttpWalletProvider {
    /// Creates a new HTTP provider
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()
            .map_err(|e: reqwest::Error| ProviderError::ConnectionFailed(e.to_string()))?;

        let rate_limiter = match &config.rate_limit {
            Some(limit) => {
                let per_second = NonZeroU32::new(limit.requests_per_second)
                    .ok_or_else(|| ProviderError::InvalidConfig("requests_per_second".into()))?;
                let burst = NonZeroU32::new(limit.burst_size)
                    .ok_or_else(|| ProviderError::InvalidConfig("burst_size".into()))?;
                Some(Arc::new(RateLimiter::direct(
                    Quota::per_second(per_second).allow_burst(burst),
                )))
            }
            None => None,
        };

        Ok(Self {
            config,
            client,
            rate_limiter,
            channel: Mutex::new(None),
        })
    }

    /// Returns the endpoint URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Returns true while a channel is open
    pub fn is_open(&self) -> bool {
        self.channel.lock().is_some()
    }
}

impl std::fmt::Debug for HttpWalletProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpWalletProvider")
            .field("url", &self.config.url)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .field("is_open", &self.is_open())
            .finish()
    }
}

#[async_trait]
impl WalletProvider for HttpWalletProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn open(&self, dapp: &DappMetadata) -> Result<mpsc::UnboundedReceiver<ProviderMessage>> {
        let transport = Transport {
            client: self.client.clone(),
            url: self.config.url.clone(),
            origin: (!dapp.url.is_empty()).then(|| dapp.url.clone()),
            rate_limiter: self.rate_limiter.clone(),
            internal_id: Arc::new(AtomicU64::new(1)),
        };

        let chain_id = transport
            .call("eth_chainId", vec![])
            .await
            .map_err(|e| ProviderError::ConnectionFailed(e.to_string()))?;
        tracing::info!(url = %self.config.url, dapp = %dapp.name, chain_id = %chain_id, "HTTP wallet channel open");

        let (tx, rx) = mpsc::unbounded_channel();
        let poller = match self.config.poll_interval {
            Some(interval) => {
                let accounts = transport.call("eth_accounts", vec![]).await.ok();
                Some(tokio::spawn(poll_state(
                    transport.clone(),
                    tx.clone(),
                    interval,
                    Some(chain_id),
                    accounts,
                )))
            }
            None => None,
        };

        *self.channel.lock() = Some(OpenChannel {
            transport,
            tx,
            poller,
        });
        Ok(rx)
    }

    async fn send(&self, request: JsonRpcRequest) -> Result<()> {
        let (transport, tx) = {
            let guard = self.channel.lock();
            let channel = guard.as_ref().ok_or(ProviderError::NotOpen)?;
            (channel.transport.clone(), channel.tx.clone())
        };

        tracing::debug!(id = request.id, method = %request.method, "forwarding request over HTTP");
        tokio::spawn(async move {
            let response = transport.forward(request).await;
            // The receiver is gone once the session closes; late answers are dropped.
            let _ = tx.send(ProviderMessage::Response(response));
        });
        Ok(())
    }

    async fn close(&self) {
        if self.channel.lock().take().is_some() {
            tracing::info!(url = %self.config.url, "HTTP wallet channel closed");
        }
    }
}

async fn poll_state(
    transport: Transport,
    tx: mpsc::UnboundedSender<ProviderMessage>,
    interval: Duration,
    mut last_chain: Option<Value>,
    mut last_accounts: Option<Value>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        match transport.call("eth_chainId", vec![]).await {
            Ok(chain) if last_chain.as_ref() != Some(&chain) => {
                if let Some(id) = chain.as_str() {
                    if tx
                        .send(ProviderMessage::Event(ProviderEvent::ChainChanged(id.to_string())))
                        .is_err()
                    {
                        return;
                    }
                }
                last_chain = Some(chain);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "chain id poll failed"),
        }

        match transport.call("eth_accounts", vec![]).await {
            Ok(accounts) if last_accounts.as_ref() != Some(&accounts) => {
                if let Ok(list) = serde_json::from_value::<Vec<String>>(accounts.clone()) {
                    if tx
                        .send(ProviderMessage::Event(ProviderEvent::AccountsChanged(list)))
                        .is_err()
                    {
                        return;
                    }
                }
                last_accounts = Some(accounts);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "accounts poll failed"),
        }

        if tx.is_closed() {
            return;
        }
    }
}
