//! # walletbridge Provider
//!
//! The seam between a wallet session and whatever actually holds the user's
//! keys. A provider is a bidirectional message channel: the session pushes
//! [`JsonRpcRequest`]s through [`WalletProvider::send`], and everything the
//! wallet says back (responses and unsolicited events alike) arrives on the
//! single stream returned by [`WalletProvider::open`].
//!
//! Responses are not required to arrive in the order requests were sent.
//! Matching them to their request by id is the session's job.
//!
//! ## Example
//!
//! ```ignore
//! use walletbridge_provider::{DappMetadata, HttpWalletProvider, ProviderConfig, WalletProvider};
//!
//! let provider = HttpWalletProvider::new(
//!     ProviderConfig::new("http://localhost:8545").with_timeout(30),
//! )?;
//! let mut inbound = provider.open(&DappMetadata::new("Demo", "https://example.com")).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod http;

pub use http::{HttpWalletProvider, ProviderConfig, RateLimitConfig};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use walletbridge_error::SessionError;

/// Provider-related errors
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Invalid URL format
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The channel has not been opened, or was closed
    #[error("Provider channel is not open")]
    NotOpen,

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// RPC error response
    #[error("RPC error: code={code}, message={message}")]
    RpcError {
        /// Error code
        code: i64,
        /// Error message
        message: String,
    },
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

impl From<ProviderError> for SessionError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::RpcError { code, message } => SessionError::from_rpc(code, message),
            other => SessionError::ProviderUnavailable(other.to_string()),
        }
    }
}

/// Identifies the application asking for wallet access.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DappMetadata {
    /// Human readable application name shown by the wallet
    pub name: String,
    /// Origin of the application
    pub url: String,
}

impl DappMetadata {
    /// Creates dapp metadata from a name and origin URL
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// RPC request payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version
    pub jsonrpc: &'static str,
    /// Request ID
    pub id: u64,
    /// Method name
    pub method: String,
    /// Parameters
    pub params: Vec<Value>,
}

impl JsonRpcRequest {
    /// Creates a new JSON-RPC request
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// Error code
    pub code: i64,
    /// Error message
    pub message: String,
    /// Additional data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// RPC response payload
///
/// `result: null` is a legitimate success (`wallet_addEthereumChain` answers
/// with it), so a missing `result` and a null one are kept apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Response ID
    pub id: u64,
    /// Result (if successful)
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    /// Error (if failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

fn default_version() -> String {
    "2.0".to_string()
}

fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcResponse {
    /// Builds a successful response
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response
    pub fn failure(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Converts the response into the value or typed error it carries
    pub fn into_result(self) -> walletbridge_error::Result<Value> {
        match (self.error, self.result) {
            (Some(error), _) => Err(SessionError::from_rpc(error.code, error.message)),
            (None, Some(value)) => Ok(value),
            (None, None) => Err(SessionError::Malformed(format!(
                "response {} carries neither result nor error",
                self.id
            ))),
        }
    }
}

/// Notifications pushed by the wallet outside any request/response pair.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// The wallet can serve requests on the given chain
    Connect {
        /// Hex chain id
        chain_id: String,
    },
    /// The active chain changed (hex chain id, verbatim)
    ChainChanged(String),
    /// The exposed accounts changed; the first one is selected
    AccountsChanged(Vec<String>),
    /// The wallet dropped the connection
    Disconnect(Option<RpcErrorObject>),
}

/// Everything a provider can deliver on its inbound stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderMessage {
    /// Answer to a request previously passed to [`WalletProvider::send`]
    Response(JsonRpcResponse),
    /// Unsolicited notification
    Event(ProviderEvent),
}

/// A wallet endpoint reachable through a message channel.
///
/// Implementations must tolerate `send` being called concurrently and may
/// deliver responses in any order.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Opens the channel and returns the stream of inbound messages.
    ///
    /// Opening an already open channel replaces it; the previous stream ends.
    async fn open(&self, dapp: &DappMetadata) -> Result<mpsc::UnboundedReceiver<ProviderMessage>>;

    /// Hands a request to the wallet. The answer arrives on the inbound stream.
    async fn send(&self, request: JsonRpcRequest) -> Result<()>;

    /// Closes the channel. The inbound stream ends once buffered messages drain.
    async fn close(&self);
}
