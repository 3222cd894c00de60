//! # walletbridge Testing Infrastructure
//!
//! Testing utilities for the walletbridge session client:
//! - [`MockWalletProvider`], a scriptable in-memory wallet
//! - Edge case fixtures for addresses and balances
//! - Property-based testing strategies
//!
//! ## Usage
//!
//! ```rust,ignore
//! use walletbridge_testing::*;
//!
//! let wallet = Arc::new(
//!     MockWalletProvider::new()
//!         .with_reply("eth_requestAccounts", json!(["0xabc"]))
//!         .with_reply("eth_chainId", json!("0x1")),
//! );
//! let client = WalletSessionClient::new(wallet.clone(), ClientConfig::default());
//! client.connect().await?;
//! wallet.emit(ProviderEvent::ChainChanged("0x89".into()));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{mpsc, Notify};
use walletbridge_provider::{
    DappMetadata, JsonRpcRequest, JsonRpcResponse, ProviderError, ProviderEvent, ProviderMessage,
    Result, WalletProvider,
};

// ============================================================================
// Scripted Wallet Provider
// ============================================================================

/// Canned answer for a method.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Answer with a result
    Result(Value),
    /// Answer with a JSON-RPC error
    Error {
        /// Error code
        code: i64,
        /// Error message
        message: String,
    },
}

#[derive(Default)]
struct MockState {
    tx: Option<mpsc::UnboundedSender<ProviderMessage>>,
    sent: Vec<JsonRpcRequest>,
    replies: HashMap<String, MockReply>,
    opened_with: Vec<DappMetadata>,
    close_count: usize,
    unavailable: bool,
}

/// In-memory wallet that records every request and answers only when told to.
///
/// Methods with a registered reply are answered as soon as they are sent;
/// everything else waits for [`respond`](Self::respond) or
/// [`respond_error`](Self::respond_error), which makes out-of-order delivery
/// easy to script.
#[derive(Default)]
pub struct MockWalletProvider {
    state: Mutex<MockState>,
    sent_notify: Notify,
}

impl MockWalletProvider {
    /// Creates a wallet with no canned replies
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `method` with `result` from now on
    pub fn with_reply(self, method: &str, result: Value) -> Self {
        self.set_reply(method, MockReply::Result(result));
        self
    }

    /// Answers `method` with an error from now on
    pub fn with_error(self, method: &str, code: i64, message: &str) -> Self {
        self.set_reply(
            method,
            MockReply::Error {
                code,
                message: message.to_string(),
            },
        );
        self
    }

    /// Makes `open` fail, as if no wallet were reachable
    pub fn unavailable(self) -> Self {
        self.state.lock().unavailable = true;
        self
    }

    /// Registers or replaces the canned reply for `method`
    pub fn set_reply(&self, method: &str, reply: MockReply) {
        self.state.lock().replies.insert(method.to_string(), reply);
    }

    /// Removes the canned reply for `method`; later calls wait for a manual answer
    pub fn clear_reply(&self, method: &str) {
        self.state.lock().replies.remove(method);
    }

    /// Delivers a successful response for `id`
    pub fn respond(&self, id: u64, result: Value) -> bool {
        self.push(ProviderMessage::Response(JsonRpcResponse::success(id, result)))
    }

    /// Delivers an error response for `id`
    pub fn respond_error(&self, id: u64, code: i64, message: &str) -> bool {
        self.push(ProviderMessage::Response(JsonRpcResponse::failure(
            id, code, message,
        )))
    }

    /// Pushes a wallet event
    pub fn emit(&self, event: ProviderEvent) -> bool {
        self.push(ProviderMessage::Event(event))
    }

    /// Pushes any message. Returns false when no channel is open.
    pub fn push(&self, message: ProviderMessage) -> bool {
        match &self.state.lock().tx {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// All requests sent so far, in send order
    pub fn sent_requests(&self) -> Vec<JsonRpcRequest> {
        self.state.lock().sent.clone()
    }

    /// Requests sent so far for one method
    pub fn requests_for(&self, method: &str) -> Vec<JsonRpcRequest> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }

    /// Number of requests sent for one method
    pub fn count_for(&self, method: &str) -> usize {
        self.requests_for(method).len()
    }

    /// Waits until at least `count` requests for `method` have been sent
    pub async fn wait_for_requests(&self, method: &str, count: usize) -> Vec<JsonRpcRequest> {
        loop {
            let notified = self.sent_notify.notified();
            let requests = self.requests_for(method);
            if requests.len() >= count {
                return requests;
            }
            notified.await;
        }
    }

    /// Returns true while a channel is open
    pub fn is_open(&self) -> bool {
        self.state.lock().tx.is_some()
    }

    /// Number of times the channel was opened
    pub fn open_count(&self) -> usize {
        self.state.lock().opened_with.len()
    }

    /// Metadata passed to the most recent `open`
    pub fn last_dapp(&self) -> Option<DappMetadata> {
        self.state.lock().opened_with.last().cloned()
    }

    /// Number of times the channel was closed
    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }
}

#[async_trait]
impl WalletProvider for MockWalletProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn open(&self, dapp: &DappMetadata) -> Result<mpsc::UnboundedReceiver<ProviderMessage>> {
        let mut state = self.state.lock();
        if state.unavailable {
            return Err(ProviderError::ConnectionFailed("mock wallet unavailable".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.tx = Some(tx);
        state.opened_with.push(dapp.clone());
        Ok(rx)
    }

    async fn send(&self, request: JsonRpcRequest) -> Result<()> {
        {
            let mut state = self.state.lock();
            let tx = state.tx.clone().ok_or(ProviderError::NotOpen)?;
            let reply = state.replies.get(&request.method).cloned();
            state.sent.push(request.clone());

            if let Some(reply) = reply {
                let response = match reply {
                    MockReply::Result(value) => JsonRpcResponse::success(request.id, value),
                    MockReply::Error { code, message } => {
                        JsonRpcResponse::failure(request.id, code, message)
                    }
                };
                let _ = tx.send(ProviderMessage::Response(response));
            }
        }
        self.sent_notify.notify_waiters();
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.state.lock();
        state.tx = None;
        state.close_count += 1;
    }
}

// ============================================================================
// Edge Case Addresses
// ============================================================================

/// Edge case addresses for testing
pub struct EdgeCaseAddresses;

impl EdgeCaseAddresses {
    /// A checksummed account
    pub const PRIMARY: &'static str = "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826";

    /// A second, distinct account
    pub const SECONDARY: &'static str = "0xDeaDbeefdEAdbeefdEadbEEFdeadbeEFdEaDbeeF";

    /// Ethereum zero address
    pub const ZERO: &'static str = "0x0000000000000000000000000000000000000000";

    /// Ethereum max address
    pub const MAX: &'static str = "0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF";
}

// ============================================================================
// Edge Case Balances
// ============================================================================

/// Balance answers paired with the ether string they must format to
pub struct EdgeCaseBalances;

impl EdgeCaseBalances {
    /// `(eth_getBalance result, expected ether string)`
    pub fn cases() -> Vec<(&'static str, &'static str)> {
        vec![
            ("0x0", "0.0"),
            ("0x1", "0.000000000000000001"),
            ("0x5af3107a4000", "0.0001"),
            ("0xde0b6b3a7640000", "1.0"),
            ("0x1bc16d674ec80001", "2.000000000000000001"),
            ("0xd3c21bcecceda1000000", "1000000.0"),
            (
                "0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
                "115792089237316195423570985008687907853269984665640564039457.584007913129639935",
            ),
        ]
    }

    /// Answers that are not hex quantities
    pub fn malformed() -> Vec<Value> {
        vec![
            Value::Null,
            Value::from(""),
            Value::from("0x"),
            Value::from("1000"),
            Value::from("0xzz"),
            Value::from(12),
            serde_json::json!({"balance": "0x1"}),
            Value::from("0x1ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"),
        ]
    }
}

// ============================================================================
// Property-Based Testing Strategies
// ============================================================================

/// Generates lowercase hex account addresses
pub fn eth_address() -> impl Strategy<Value = String> {
    prop::array::uniform20(any::<u8>()).prop_map(|bytes| format!("0x{}", hex::encode(bytes)))
}

/// Generates non-empty account lists
pub fn account_list() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(eth_address(), 1..4)
}

/// Generates hex chain ids, as a wallet reports them
pub fn hex_chain_id() -> impl Strategy<Value = String> {
    (1u64..=u32::MAX as u64).prop_map(|id| format!("{id:#x}"))
}

/// Generates wei balances as hex quantities, paired with the raw value
pub fn wei_quantity() -> impl Strategy<Value = (u128, String)> {
    any::<u128>().prop_map(|wei| (wei, format!("{wei:#x}")))
}

/// Generates a permutation of `0..len`, used to shuffle response order
pub fn response_order(len: usize) -> impl Strategy<Value = Vec<usize>> {
    Just((0..len).collect::<Vec<_>>()).prop_shuffle()
}

// ============================================================================
// Tests
// ============================================================================
