use serde::Serialize;

/// The two states a session can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// No account is exposed
    Disconnected,
    /// At least one account is exposed; the first is selected
    Connected,
}

/// Snapshot of what the wallet has told us.
///
/// Connectedness is derived from `accounts`, so a session is connected
/// exactly when it has a selected address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    accounts: Vec<String>,
    chain_id: Option<String>,
    balance: Option<String>,
}

impl Session {
    /// Returns true when an account is selected
    pub fn is_connected(&self) -> bool {
        !self.accounts.is_empty()
    }

    /// Returns the high-level state
    pub fn state(&self) -> SessionState {
        if self.is_connected() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    /// All exposed accounts, selected first
    pub fn accounts(&self) -> &[String] {
        &self.accounts
    }

    /// The selected account
    pub fn selected_address(&self) -> Option<&str> {
        self.accounts.first().map(String::as_str)
    }

    /// Hex chain id exactly as the wallet reported it
    pub fn chain_id(&self) -> Option<&str> {
        self.chain_id.as_deref()
    }

    /// Last known ether balance of the selected account
    pub fn balance(&self) -> Option<&str> {
        self.balance.as_deref()
    }

    /// Replaces the account list. A change of selected account drops the
    /// balance, which belonged to the previous one.
    pub(crate) fn set_accounts(&mut self, accounts: Vec<String>) {
        if self.accounts.first() != accounts.first() {
            self.balance = None;
        }
        self.accounts = accounts;
    }

    pub(crate) fn set_chain_id(&mut self, chain_id: String) {
        self.chain_id = Some(chain_id);
    }

    /// Stores a balance if `address` is still the selected account.
    pub(crate) fn set_balance_for(&mut self, address: &str, balance: String) -> bool {
        if self.selected_address() == Some(address) {
            self.balance = Some(balance);
            true
        } else {
            false
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Session::default();
    }
}
