use crate::amount::NativeAmount;
use crate::config::ClientConfig;
use crate::listeners::{BalanceUpdate, ListenerId, ListenerRegistry};
use crate::requests::{requires_signer, AddChainParams, TransactionRequest};
use crate::session::{Session, SessionState};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use walletbridge_error::{Result, SessionError};
use walletbridge_provider::{
    JsonRpcRequest, JsonRpcResponse, ProviderEvent, ProviderMessage, RpcErrorObject,
    WalletProvider,
};

type PendingMap = HashMap<u64, oneshot::Sender<Result<Value>>>;

struct Inner {
    provider: Arc<dyn WalletProvider>,
    config: ClientConfig,
    session: RwLock<Session>,
    pending: Mutex<PendingMap>,
    next_id: AtomicU64,
    listeners: Arc<ListenerRegistry>,
    router: Mutex<Option<JoinHandle<()>>>,
    opening: tokio::sync::Mutex<()>,
    /// Events are applied only while this is set
    live: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(router) = self.router.get_mut().take() {
            router.abort();
        }
    }
}

impl Inner {
    fn complete(&self, response: JsonRpcResponse) {
        let id = response.id;
        match self.pending.lock().remove(&id) {
            Some(waiter) => {
                tracing::debug!(id, "routing response to waiter");
                // The caller may have stopped waiting; nothing to do then.
                let _ = waiter.send(response.into_result());
            }
            None => tracing::warn!(id, "dropping response with no pending request"),
        }
    }

    /// Resolves every outstanding request with `error`. Returns how many.
    fn fail_pending(&self, error: SessionError) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        let count = drained.len();
        for (_, waiter) in drained {
            let _ = waiter.send(Err(error.clone()));
        }
        count
    }

    /// Ends the session from the router side after the wallet went away.
    ///
    /// The router gives up its slot before closing the provider so the next
    /// request opens a fresh channel.
    async fn shut_down(&self, error: SessionError, reason: &Option<RpcErrorObject>) {
        let was_live = self
            .apply_event(&ProviderEvent::Disconnect(reason.clone()))
            .is_some();
        self.live.store(false, Ordering::SeqCst);
        drop(self.router.lock().take());
        self.provider.close().await;

        if was_live {
            self.listeners.disconnected(reason);
        }
        let failed = self.fail_pending(error);
        tracing::debug!(failed, "pending requests resolved");
    }

    /// Applies a chain/account event. Returns the session state afterwards
    /// if the event was applied.
    fn apply_event(&self, event: &ProviderEvent) -> Option<SessionState> {
        let mut session = self.session.write();
        if !self.live.load(Ordering::SeqCst) {
            return None;
        }
        match event {
            ProviderEvent::ChainChanged(chain_id) | ProviderEvent::Connect { chain_id } => {
                session.set_chain_id(chain_id.clone());
            }
            ProviderEvent::AccountsChanged(accounts) => session.set_accounts(accounts.clone()),
            ProviderEvent::Disconnect(_) => session.reset(),
        }
        Some(session.state())
    }
}

/// Client for one logical connection to an external wallet.
///
/// Owns the session state, correlates every request with its response by id,
/// and fans wallet events out to registered listeners. Clones share the same
/// session.
///
/// Lifecycle calls (`connect`, `disconnect`) are not coordinated between
/// independent callers; serialize them above this type if several tasks may
/// issue them at once.
#[derive(Clone)]
pub struct WalletSessionClient {
    inner: Arc<Inner>,
}

impl WalletSessionClient {
    /// Creates a disconnected client. No channel is opened until needed.
    pub fn new(provider: Arc<dyn WalletProvider>, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                config,
                session: RwLock::new(Session::default()),
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                listeners: Arc::new(ListenerRegistry::new()),
                router: Mutex::new(None),
                opening: tokio::sync::Mutex::new(()),
                live: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // ========================================================================
    // Session reads
    // ========================================================================

    /// A consistent copy of the current session
    pub fn session(&self) -> Session {
        self.inner.session.read().clone()
    }

    /// Returns true when an account is selected
    pub fn is_connected(&self) -> bool {
        self.inner.session.read().is_connected()
    }

    /// The selected account
    pub fn selected_address(&self) -> Option<String> {
        self.inner.session.read().selected_address().map(str::to_owned)
    }

    /// The hex chain id as reported by the wallet
    pub fn chain_id(&self) -> Option<String> {
        self.inner.session.read().chain_id().map(str::to_owned)
    }

    /// Number of requests still waiting for an answer
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().len()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Asks the wallet for account access and returns the selected address.
    ///
    /// Returns the current address without contacting the wallet when
    /// already connected.
    pub async fn connect(&self) -> Result<String> {
        if let Some(address) = self.selected_address() {
            return Ok(address);
        }

        self.ensure_channel().await?;
        self.inner.live.store(true, Ordering::SeqCst);

        match self.establish().await {
            Ok(address) => Ok(address),
            Err(e) => {
                {
                    let session = self.inner.session.read();
                    if !session.is_connected() {
                        self.inner.live.store(false, Ordering::SeqCst);
                    }
                }
                tracing::info!(error = %e, "connect failed");
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<String> {
        let value = self.dispatch("eth_requestAccounts", Vec::new()).await?;
        let accounts: Vec<String> = serde_json::from_value(value)
            .map_err(|e| SessionError::Malformed(format!("eth_requestAccounts: {e}")))?;
        let selected = accounts.first().cloned().ok_or(SessionError::UserRejected)?;

        let chain_id = match self.dispatch("eth_chainId", Vec::new()).await {
            Ok(Value::String(chain_id)) => Some(chain_id),
            Ok(other) => {
                tracing::warn!(result = %other, "eth_chainId returned a non-string");
                self.inner.config.default_chain_id.clone()
            }
            Err(SessionError::Cancelled) => return Err(SessionError::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "eth_chainId failed, using default");
                self.inner.config.default_chain_id.clone()
            }
        };

        {
            let mut session = self.inner.session.write();
            if !self.inner.live.load(Ordering::SeqCst) {
                return Err(SessionError::Cancelled);
            }
            session.set_accounts(accounts);
            if let Some(chain_id) = chain_id {
                session.set_chain_id(chain_id);
            }
        }
        tracing::info!(address = %selected, provider = self.inner.provider.name(), "wallet connected");

        if self.inner.config.refresh_balance_on_accounts_change {
            self.spawn_balance_refresh();
        }
        Ok(selected)
    }

    /// Tears the session down.
    ///
    /// Every outstanding request resolves with [`SessionError::Cancelled`]
    /// before this returns, and no wallet event is dispatched until the next
    /// `connect`.
    pub async fn disconnect(&self) {
        {
            let mut session = self.inner.session.write();
            self.inner.live.store(false, Ordering::SeqCst);
            session.reset();
        }
        if let Some(router) = self.inner.router.lock().take() {
            router.abort();
        }
        let cancelled = self.inner.fail_pending(SessionError::Cancelled);
        self.inner.provider.close().await;
        tracing::info!(cancelled, "wallet session disconnected");
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Sends one JSON-RPC call to the wallet and waits for its answer.
    ///
    /// Signer methods fail with [`SessionError::NotConnected`] before the
    /// wallet is contacted when no account is selected. The result is
    /// returned exactly as the wallet produced it.
    pub async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        if method.trim().is_empty() {
            return Err(SessionError::InvalidRequest("method must not be empty".into()));
        }
        if requires_signer(method) && !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.ensure_channel().await?;
        self.dispatch(method, params).await
    }

    async fn dispatch(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id, tx);
        let _guard = PendingGuard {
            inner: &self.inner,
            id,
        };

        tracing::debug!(id, method, "issuing request");
        if let Err(e) = self
            .inner
            .provider
            .send(JsonRpcRequest::new(id, method, params))
            .await
        {
            // Drained by a disconnect while sending: the request was cancelled.
            if !self.inner.pending.lock().contains_key(&id) {
                return Err(SessionError::Cancelled);
            }
            return Err(e.into());
        }

        let outcome = match self.inner.config.request_timeout() {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| SessionError::Timeout {
                    method: method.to_string(),
                    after: limit,
                })?,
            None => rx.await,
        };
        // A dropped sender means the waiter was discarded without an answer.
        outcome.unwrap_or(Err(SessionError::Cancelled))
    }

    async fn ensure_channel(&self) -> Result<()> {
        let _opening = self.inner.opening.lock().await;
        let running = self
            .inner
            .router
            .lock()
            .as_ref()
            .is_some_and(|router| !router.is_finished());
        if running {
            return Ok(());
        }

        let inbound = self
            .inner
            .provider
            .open(&self.inner.config.dapp)
            .await
            .map_err(|e| SessionError::ProviderUnavailable(e.to_string()))?;
        tracing::debug!(provider = self.inner.provider.name(), "wallet channel open");

        let router = tokio::spawn(route_messages(Arc::downgrade(&self.inner), inbound));
        if let Some(previous) = self.inner.router.lock().replace(router) {
            previous.abort();
        }
        Ok(())
    }

    // ========================================================================
    // Balances
    // ========================================================================

    /// Native balance of `address`, formatted in ether with full precision
    pub async fn get_balance(&self, address: &str) -> Result<String> {
        if address.is_empty() {
            return Err(SessionError::InvalidRequest("address must not be empty".into()));
        }
        let value = self
            .request("eth_getBalance", vec![json!(address), json!("latest")])
            .await?;
        let quantity = value
            .as_str()
            .ok_or_else(|| SessionError::Malformed(format!("eth_getBalance returned {value}")))?;
        Ok(NativeAmount::from_hex_quantity(quantity)?.to_ether_string())
    }

    /// Balance of the account selected at call time, without storing it
    pub async fn selected_balance(&self) -> Result<String> {
        let address = self.selected_address().ok_or(SessionError::NotConnected)?;
        self.get_balance(&address).await
    }

    /// Fetches the balance of the account selected at call time.
    ///
    /// The result is stored in the session and announced to balance
    /// listeners only if that account is still selected when it arrives.
    pub async fn refresh_balance(&self) -> Result<String> {
        let address = self.selected_address().ok_or(SessionError::NotConnected)?;
        let balance = self.get_balance(&address).await?;

        let stored = self
            .inner
            .session
            .write()
            .set_balance_for(&address, balance.clone());
        if stored {
            self.inner.listeners.balance_changed(&BalanceUpdate {
                address,
                balance: balance.clone(),
            });
        } else {
            tracing::debug!(address = %address, "selected account changed during balance fetch");
        }
        Ok(balance)
    }

    fn spawn_balance_refresh(&self) {
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client.refresh_balance().await {
                tracing::warn!(error = %e, "balance refresh failed");
            }
        });
    }

    // ========================================================================
    // Wallet actions
    // ========================================================================

    /// `eth_signTypedData_v4` for the selected account; returns the signature
    pub async fn sign_typed_data_v4(&self, typed_data: &Value) -> Result<String> {
        let from = self.selected_address().ok_or(SessionError::NotConnected)?;
        let payload = match typed_data {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        let signature = self
            .request("eth_signTypedData_v4", vec![json!(from), json!(payload)])
            .await?;
        expect_string("eth_signTypedData_v4", signature)
    }

    /// `eth_sendTransaction`; fills `from` with the selected account when unset
    pub async fn send_transaction(&self, mut transaction: TransactionRequest) -> Result<String> {
        let from = self.selected_address().ok_or(SessionError::NotConnected)?;
        transaction.from.get_or_insert(from);
        let params = serde_json::to_value(&transaction)
            .map_err(|e| SessionError::InvalidRequest(e.to_string()))?;
        let hash = self.request("eth_sendTransaction", vec![params]).await?;
        expect_string("eth_sendTransaction", hash)
    }

    /// `wallet_addEthereumChain`; the wallet answers `null` on success
    pub async fn add_ethereum_chain(&self, chain: &AddChainParams) -> Result<Value> {
        let params =
            serde_json::to_value(chain).map_err(|e| SessionError::InvalidRequest(e.to_string()))?;
        self.request("wallet_addEthereumChain", vec![params]).await
    }

    /// `wallet_switchEthereumChain` to a hex chain id
    pub async fn switch_ethereum_chain(&self, chain_id: &str) -> Result<Value> {
        self.request(
            "wallet_switchEthereumChain",
            vec![json!({ "chainId": chain_id })],
        )
        .await
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Called with the new hex chain id whenever the wallet switches chains
    pub fn on_chain_changed<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.listeners.on_chain_changed(Arc::new(handler))
    }

    /// Called with the new account list; the session is already updated
    pub fn on_accounts_changed<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        self.inner.listeners.on_accounts_changed(Arc::new(handler))
    }

    /// Called when the wallet drops the connection
    pub fn on_disconnect<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&Option<RpcErrorObject>) + Send + Sync + 'static,
    {
        self.inner.listeners.on_disconnect(Arc::new(handler))
    }

    /// Called after the selected account's balance is refreshed
    pub fn on_balance_changed<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&BalanceUpdate) + Send + Sync + 'static,
    {
        self.inner.listeners.on_balance_changed(Arc::new(handler))
    }

    /// Unregisters a listener; safe to call from inside any listener
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// The listener registry, for handlers that need to remove themselves
    /// without holding the whole client
    pub fn listeners(&self) -> Arc<ListenerRegistry> {
        self.inner.listeners.clone()
    }
}

impl std::fmt::Debug for WalletSessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSessionClient")
            .field("provider", &self.inner.provider.name())
            .field("session", &self.session())
            .field("pending_requests", &self.pending_requests())
            .field("listeners", &self.inner.listeners)
            .finish()
    }
}

/// Removes a pending entry when its caller stops waiting, whatever the reason.
struct PendingGuard<'a> {
    inner: &'a Inner,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.pending.lock().remove(&self.id);
    }
}

fn expect_string(method: &str, value: Value) -> Result<String> {
    match value {
        Value::String(text) => Ok(text),
        other => Err(SessionError::Malformed(format!(
            "{method} returned {other}, expected a string"
        ))),
    }
}

/// Reads the provider's inbound stream until it ends or the client is gone.
///
/// This is the only place responses are matched and events applied, so
/// listeners never run concurrently with each other.
async fn route_messages(inner: Weak<Inner>, mut inbound: mpsc::UnboundedReceiver<ProviderMessage>) {
    while let Some(message) = inbound.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match message {
            ProviderMessage::Response(response) => inner.complete(response),
            ProviderMessage::Event(ProviderEvent::Disconnect(error)) => {
                tracing::info!(?error, "wallet reported disconnect");
                inner.shut_down(SessionError::Cancelled, &error).await;
                return;
            }
            ProviderMessage::Event(event) => dispatch_event(&inner, event),
        }
    }

    if let Some(inner) = inner.upgrade() {
        tracing::warn!("wallet channel closed by provider");
        inner
            .shut_down(
                SessionError::ProviderUnavailable("wallet channel closed".into()),
                &None,
            )
            .await;
    }
}

fn dispatch_event(inner: &Arc<Inner>, event: ProviderEvent) {
    let Some(state) = inner.apply_event(&event) else {
        tracing::debug!(?event, "no live session, event dropped");
        return;
    };

    match event {
        ProviderEvent::ChainChanged(chain_id) => {
            tracing::info!(chain_id = %chain_id, "chain changed");
            inner.listeners.chain_changed(&chain_id);
        }
        ProviderEvent::AccountsChanged(accounts) => {
            tracing::info!(?accounts, ?state, "accounts changed");
            inner.listeners.accounts_changed(&accounts);
            if state == SessionState::Connected && inner.config.refresh_balance_on_accounts_change {
                WalletSessionClient {
                    inner: inner.clone(),
                }
                .spawn_balance_refresh();
            }
        }
        ProviderEvent::Connect { chain_id } => {
            tracing::debug!(chain_id = %chain_id, "wallet connect event");
        }
        ProviderEvent::Disconnect(_) => {}
    }
}
