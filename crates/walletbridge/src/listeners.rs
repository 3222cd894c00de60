//! Observer lists for wallet events, keyed by event kind.
//!
//! Dispatch walks a snapshot of the list taken before the first handler
//! runs, so handlers may register or remove listeners (themselves included)
//! while being invoked. Each handler runs under `catch_unwind`; a panic is
//! logged and the remaining handlers still run.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use walletbridge_provider::RpcErrorObject;

/// Which event a listener is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `chainChanged`
    ChainChanged,
    /// `accountsChanged`
    AccountsChanged,
    /// `disconnect` reported by the wallet
    Disconnect,
    /// Balance of the selected account refreshed
    BalanceChanged,
}

/// Handle returned on registration, used to remove the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId {
    kind: EventKind,
    seq: u64,
}

impl ListenerId {
    /// The event this listener is registered for
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

/// Payload of a balance notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdate {
    /// Account the balance belongs to
    pub address: String,
    /// Ether amount, full precision
    pub balance: String,
}

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct ListenerList<E: ?Sized> {
    entries: Mutex<Vec<(ListenerId, Handler<E>)>>,
}

impl<E: ?Sized> ListenerList<E> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    fn add(&self, id: ListenerId, handler: Handler<E>) {
        self.entries.lock().push((id, handler));
    }

    fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn dispatch(&self, event: &E) -> usize {
        let snapshot: Vec<(ListenerId, Handler<E>)> = self.entries.lock().clone();
        let mut delivered = 0;
        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::warn!(listener = ?id, "event listener panicked"),
            }
        }
        delivered
    }
}

/// All registered listeners of one client
pub struct ListenerRegistry {
    next_seq: AtomicU64,
    chain: ListenerList<str>,
    accounts: ListenerList<[String]>,
    disconnect: ListenerList<Option<RpcErrorObject>>,
    balance: ListenerList<BalanceUpdate>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            next_seq: AtomicU64::new(1),
            chain: ListenerList::new(),
            accounts: ListenerList::new(),
            disconnect: ListenerList::new(),
            balance: ListenerList::new(),
        }
    }

    fn next_id(&self, kind: EventKind) -> ListenerId {
        ListenerId {
            kind,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub(crate) fn on_chain_changed(&self, handler: Handler<str>) -> ListenerId {
        let id = self.next_id(EventKind::ChainChanged);
        self.chain.add(id, handler);
        id
    }

    pub(crate) fn on_accounts_changed(&self, handler: Handler<[String]>) -> ListenerId {
        let id = self.next_id(EventKind::AccountsChanged);
        self.accounts.add(id, handler);
        id
    }

    pub(crate) fn on_disconnect(&self, handler: Handler<Option<RpcErrorObject>>) -> ListenerId {
        let id = self.next_id(EventKind::Disconnect);
        self.disconnect.add(id, handler);
        id
    }

    pub(crate) fn on_balance_changed(&self, handler: Handler<BalanceUpdate>) -> ListenerId {
        let id = self.next_id(EventKind::BalanceChanged);
        self.balance.add(id, handler);
        id
    }

    /// Removes a listener. Returns false if it was already gone.
    pub fn remove(&self, id: ListenerId) -> bool {
        match id.kind {
            EventKind::ChainChanged => self.chain.remove(id),
            EventKind::AccountsChanged => self.accounts.remove(id),
            EventKind::Disconnect => self.disconnect.remove(id),
            EventKind::BalanceChanged => self.balance.remove(id),
        }
    }

    /// Number of listeners registered for `kind`
    pub fn count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::ChainChanged => self.chain.len(),
            EventKind::AccountsChanged => self.accounts.len(),
            EventKind::Disconnect => self.disconnect.len(),
            EventKind::BalanceChanged => self.balance.len(),
        }
    }

    pub(crate) fn chain_changed(&self, chain_id: &str) -> usize {
        self.chain.dispatch(chain_id)
    }

    pub(crate) fn accounts_changed(&self, accounts: &[String]) -> usize {
        self.accounts.dispatch(accounts)
    }

    pub(crate) fn disconnected(&self, error: &Option<RpcErrorObject>) -> usize {
        self.disconnect.dispatch(error)
    }

    pub(crate) fn balance_changed(&self, update: &BalanceUpdate) -> usize {
        self.balance.dispatch(update)
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("chain", &self.chain.len())
            .field("accounts", &self.accounts.len())
            .field("disconnect", &self.disconnect.len())
            .field("balance", &self.balance.len())
            .finish()
    }
}
