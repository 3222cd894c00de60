//! # walletbridge Error
//!
//! Error types shared by every walletbridge crate. A wallet session can end a
//! call in a small, closed set of ways; [`SessionError`] names each of them so
//! callers can decide how to present a failure without string matching.
//!
//! ## Example
//!
//! ```
//! use walletbridge_error::{SessionError, ErrorCode};
//!
//! let err = SessionError::from_rpc(4001, "User denied account access");
//! assert!(matches!(err, SessionError::UserRejected));
//! assert_eq!(err.code(), ErrorCode::UserRejected);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;
use thiserror::Error;

/// EIP-1193 code a wallet returns when the user declines a request.
pub const USER_REJECTED_CODE: i64 = 4001;

/// EIP-1193 code for a request the wallet has not authorized.
pub const UNAUTHORIZED_CODE: i64 = 4100;

/// EIP-1193 code reported when the wallet is disconnected from every chain.
pub const DISCONNECTED_CODE: i64 = 4900;

/// JSON-RPC internal error, used for transport failures surfaced per request.
pub const INTERNAL_ERROR_CODE: i64 = -32603;

/// JSON-RPC parse error, used when a response body cannot be decoded.
pub const PARSE_ERROR_CODE: i64 = -32700;

/// Every way a session call can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The user or the wallet declined the request
    #[error("Request rejected by the user")]
    UserRejected,

    /// The call needs a selected account and there is none
    #[error("No account connected")]
    NotConnected,

    /// The wallet endpoint could not be reached
    #[error("Wallet provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// No response arrived within the configured wait
    #[error("Request '{method}' timed out after {after:?}")]
    Timeout {
        /// Method of the request that timed out
        method: String,
        /// How long the client waited
        after: Duration,
    },

    /// The session was torn down while the request was in flight
    #[error("Request cancelled")]
    Cancelled,

    /// The response did not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Any other error reported by the wallet, passed through as-is
    #[error("Provider error {code}: {message}")]
    Provider {
        /// Error code reported by the wallet
        code: i64,
        /// Error message reported by the wallet
        message: String,
    },

    /// The request was refused before reaching the wallet
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Convenient Result type using SessionError
pub type Result<T> = std::result::Result<T, SessionError>;

impl SessionError {
    /// Maps a JSON-RPC error object reported by the wallet.
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        match code {
            USER_REJECTED_CODE => SessionError::UserRejected,
            PARSE_ERROR_CODE => SessionError::Malformed(message.into()),
            _ => SessionError::Provider {
                code,
                message: message.into(),
            },
        }
    }

    /// Returns the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::UserRejected => ErrorCode::UserRejected,
            SessionError::NotConnected => ErrorCode::NotConnected,
            SessionError::ProviderUnavailable(_) => ErrorCode::ProviderUnavailable,
            SessionError::Timeout { .. } => ErrorCode::Timeout,
            SessionError::Cancelled => ErrorCode::Cancelled,
            SessionError::Malformed(_) => ErrorCode::Malformed,
            SessionError::Provider { .. } => ErrorCode::Provider,
            SessionError::InvalidRequest(_) => ErrorCode::InvalidRequest,
        }
    }

    /// Returns true if repeating the call could plausibly succeed.
    ///
    /// The client itself never retries; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Timeout { .. } | SessionError::ProviderUnavailable(_)
        )
    }

    /// Returns true if the failure came from a user decision rather than a fault.
    pub fn is_user_decision(&self) -> bool {
        matches!(self, SessionError::UserRejected | SessionError::Cancelled)
    }
}

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum ErrorCode {
    /// User rejected
    UserRejected = 1001,
    /// Not connected
    NotConnected = 1002,
    /// Provider unavailable
    ProviderUnavailable = 2001,
    /// Timeout
    Timeout = 2002,
    /// Cancelled
    Cancelled = 2003,
    /// Malformed response
    Malformed = 3001,
    /// Provider passthrough
    Provider = 3002,
    /// Invalid request
    InvalidRequest = 4001,
}
