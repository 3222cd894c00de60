//! Parameter shapes for the wallet methods the convenience wrappers send.
//!
//! These follow the wallet standards (EIP-1193, EIP-3085) and are passed
//! through to the wallet unchanged.

use serde::{Deserialize, Serialize};

/// Signer method names; calling them requires a selected account.
pub const SIGNER_METHODS: &[&str] = &[
    "eth_sendTransaction",
    "eth_signTransaction",
    "eth_sign",
    "personal_sign",
    "eth_signTypedData",
    "eth_signTypedData_v3",
    "eth_signTypedData_v4",
];

/// Returns true for methods that act on behalf of the selected account
pub fn requires_signer(method: &str) -> bool {
    SIGNER_METHODS.contains(&method)
}

/// Parameters of `eth_sendTransaction`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Sender; filled with the selected account when empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Recipient; absent for contract creation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Value in wei, hex quantity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Call data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Gas limit, hex quantity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
}

impl TransactionRequest {
    /// A plain value transfer
    pub fn transfer(to: impl Into<String>, value_hex: impl Into<String>) -> Self {
        Self {
            to: Some(to.into()),
            value: Some(value_hex.into()),
            ..Default::default()
        }
    }
}

/// Native currency description used by `wallet_addEthereumChain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    /// Currency name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Ticker symbol
    pub symbol: String,
    /// Decimal places
    pub decimals: u8,
}

/// Parameters of `wallet_addEthereumChain` (EIP-3085)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    /// Hex chain id
    pub chain_id: String,
    /// Display name
    pub chain_name: String,
    /// Block explorer URLs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub block_explorer_urls: Vec<String>,
    /// Native currency
    pub native_currency: NativeCurrency,
    /// RPC URLs
    pub rpc_urls: Vec<String>,
}

/// Common chain presets
pub mod presets {
    use super::{AddChainParams, NativeCurrency};

    /// Polygon PoS mainnet
    pub fn polygon() -> AddChainParams {
        AddChainParams {
            chain_id: "0x89".into(),
            chain_name: "Polygon".into(),
            block_explorer_urls: vec!["https://polygonscan.com".into()],
            native_currency: NativeCurrency {
                name: None,
                symbol: "MATIC".into(),
                decimals: 18,
            },
            rpc_urls: vec!["https://polygon-rpc.com/".into()],
        }
    }

    /// Base mainnet
    pub fn base() -> AddChainParams {
        AddChainParams {
            chain_id: "0x2105".into(),
            chain_name: "Base".into(),
            block_explorer_urls: vec!["https://basescan.org".into()],
            native_currency: NativeCurrency {
                name: Some("Ether".into()),
                symbol: "ETH".into(),
                decimals: 18,
            },
            rpc_urls: vec!["https://mainnet.base.org".into()],
        }
    }
}
