//! # walletbridge - Wallet Session Client
//!
//! Connects an application to an external wallet it does not control and
//! keeps a consistent view of what that wallet has exposed: the selected
//! account, the active chain and, optionally, the account's native balance.
//!
//! All traffic goes through a [`WalletProvider`]. Requests are correlated
//! with their responses by a fresh numeric id, so answers may arrive in any
//! order. Unsolicited wallet events (`chainChanged`, `accountsChanged`,
//! `disconnect`) update the session before listeners are told about them.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use walletbridge::prelude::*;
//!
//! let provider = HttpWalletProvider::new(ProviderConfig::new("http://localhost:8545"))?;
//! let client = WalletSessionClient::new(Arc::new(provider), ClientConfig::default());
//!
//! client.on_chain_changed(|chain_id| println!("now on {chain_id}"));
//! let address = client.connect().await?;
//! let balance = client.get_balance(&address).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod amount;
mod client;
mod config;
mod listeners;
mod requests;
mod session;

pub use amount::NativeAmount;
pub use client::WalletSessionClient;
pub use config::ClientConfig;
pub use listeners::{BalanceUpdate, EventKind, ListenerId, ListenerRegistry};
pub use requests::{
    presets, requires_signer, AddChainParams, NativeCurrency, TransactionRequest, SIGNER_METHODS,
};
pub use session::{Session, SessionState};

pub use walletbridge_error::{ErrorCode, Result, SessionError};
pub use walletbridge_provider::{
    DappMetadata, HttpWalletProvider, JsonRpcRequest, JsonRpcResponse, ProviderConfig,
    ProviderError, ProviderEvent, ProviderMessage, RateLimitConfig, RpcErrorObject,
    WalletProvider,
};

/// Commonly used types
pub mod prelude {
    pub use crate::{
        ClientConfig, DappMetadata, HttpWalletProvider, ProviderConfig, Session, SessionError,
        SessionState, WalletProvider, WalletSessionClient,
    };
}
