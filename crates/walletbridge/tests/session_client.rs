//! Session client behaviour against a scripted wallet
//!
//! Tests cover:
//! - Request/response correlation, including out-of-order answers
//! - Connect and disconnect lifecycle
//! - Wallet events and listener dispatch
//! - Balance lookups and refresh
//! - Error mapping (rejection, timeouts, unavailable wallet, bad data)

use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use walletbridge::{
    presets, BalanceUpdate, ClientConfig, DappMetadata, ProviderEvent, RpcErrorObject,
    SessionError, SessionState, TransactionRequest, WalletSessionClient,
};
use walletbridge_testing::{
    account_list, hex_chain_id, response_order, EdgeCaseAddresses, EdgeCaseBalances, MockReply,
    MockWalletProvider,
};

const CONCRETE_ADDRESS: &str = "0xABC0000000000000000000000000000000000123";

/// Method with a canned answer, used to wait until earlier inbound messages
/// have been routed.
const BARRIER_METHOD: &str = "net_version";

fn scripted_wallet(address: &str) -> MockWalletProvider {
    MockWalletProvider::new()
        .with_reply("eth_requestAccounts", json!([address]))
        .with_reply("eth_chainId", json!("0x1"))
        .with_reply(BARRIER_METHOD, json!("1"))
}

fn client_for(wallet: &Arc<MockWalletProvider>, config: ClientConfig) -> WalletSessionClient {
    WalletSessionClient::new(wallet.clone(), config)
}

async fn connected(address: &str) -> (Arc<MockWalletProvider>, WalletSessionClient) {
    let wallet = Arc::new(scripted_wallet(address));
    let client = client_for(&wallet, ClientConfig::default());
    client.connect().await.unwrap();
    (wallet, client)
}

/// Messages are routed in arrival order, so once the barrier answer is back
/// every event pushed before it has been applied.
async fn settle(client: &WalletSessionClient) {
    client.request(BARRIER_METHOD, vec![]).await.unwrap();
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
    let calls = Arc::new(AtomicUsize::new(0));
    let read = {
        let calls = calls.clone();
        move || calls.load(Ordering::SeqCst)
    };
    (calls, read)
}

// ============================================================================
// End-to-end scenario
// ============================================================================

mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_switch_chain_send_and_disconnect() {
        let wallet = Arc::new(scripted_wallet(CONCRETE_ADDRESS));
        let client = client_for(
            &wallet,
            ClientConfig::new()
                .with_dapp_metadata(DappMetadata::new("React Native Test Dapp", "example.com")),
        );

        let address = client.connect().await.unwrap();
        assert_eq!(address, CONCRETE_ADDRESS);
        assert_eq!(client.session().state(), SessionState::Connected);
        assert_eq!(client.chain_id().as_deref(), Some("0x1"));
        assert_eq!(wallet.last_dapp().unwrap().name, "React Native Test Dapp");

        let (calls, chain_calls) = counter();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            client.on_chain_changed(move |chain_id| {
                calls.fetch_add(1, Ordering::SeqCst);
                seen.lock().push(chain_id.to_string());
            });
        }
        wallet.emit(ProviderEvent::ChainChanged("0x89".into()));
        settle(&client).await;

        assert_eq!(chain_calls(), 1);
        assert_eq!(*seen.lock(), vec!["0x89".to_string()]);
        assert_eq!(client.chain_id().as_deref(), Some("0x89"));

        let sender = client.clone();
        let pending = tokio::spawn(async move {
            sender
                .send_transaction(TransactionRequest::transfer(
                    EdgeCaseAddresses::ZERO,
                    "0x5AF3107A4000",
                ))
                .await
        });
        let sent = wallet.wait_for_requests("eth_sendTransaction", 1).await;
        assert_eq!(sent[0].params[0]["from"], json!(CONCRETE_ADDRESS));
        assert_eq!(sent[0].params[0]["value"], json!("0x5AF3107A4000"));
        assert!(wallet.respond(sent[0].id, json!("0xdeadbeef")));

        assert_eq!(pending.await.unwrap().unwrap(), "0xdeadbeef");

        client.disconnect().await;
        assert!(!client.is_connected());
        assert_eq!(client.selected_address(), None);
        assert_eq!(client.chain_id(), None);
        assert_eq!(wallet.close_count(), 1);
    }
}

// ============================================================================
// Request Correlation
// ============================================================================

mod correlation_tests {
    use super::*;

    fn answer_in_order(count: usize, order: Vec<usize>) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async move {
            let wallet = Arc::new(MockWalletProvider::new());
            let client = client_for(&wallet, ClientConfig::default());

            let handles: Vec<_> = (0..count)
                .map(|i| {
                    let client = client.clone();
                    tokio::spawn(async move { client.request("eth_call", vec![json!(i)]).await })
                })
                .collect();

            let sent = wallet.wait_for_requests("eth_call", count).await;
            for index in order {
                let request = &sent[index];
                let tag = request.params[0].clone();
                assert!(wallet.respond(request.id, json!({ "echo": tag })));
            }

            for (i, handle) in handles.into_iter().enumerate() {
                let value = handle.await.unwrap().unwrap();
                assert_eq!(value, json!({ "echo": i }));
            }
            assert_eq!(client.pending_requests(), 0);
        });
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_each_caller_gets_its_own_answer(order in response_order(6)) {
            answer_in_order(6, order);
        }
    }

    #[tokio::test]
    async fn test_reversed_answers() {
        let wallet = Arc::new(MockWalletProvider::new());
        let client = client_for(&wallet, ClientConfig::default());

        let first = {
            let client = client.clone();
            tokio::spawn(async move { client.request("eth_blockNumber", vec![]).await })
        };
        wallet.wait_for_requests("eth_blockNumber", 1).await;
        let second = {
            let client = client.clone();
            tokio::spawn(async move { client.request("eth_gasPrice", vec![]).await })
        };
        let gas = wallet.wait_for_requests("eth_gasPrice", 1).await;
        let block = wallet.requests_for("eth_blockNumber");

        wallet.respond(gas[0].id, json!("0x3b9aca00"));
        wallet.respond(block[0].id, json!("0x10"));

        assert_eq!(first.await.unwrap().unwrap(), json!("0x10"));
        assert_eq!(second.await.unwrap().unwrap(), json!("0x3b9aca00"));
    }

    #[tokio::test]
    async fn test_null_result_is_success() {
        let wallet = Arc::new(
            MockWalletProvider::new().with_reply("wallet_addEthereumChain", Value::Null),
        );
        let client = client_for(&wallet, ClientConfig::default());

        let result = client.add_ethereum_chain(&presets::polygon()).await.unwrap();
        assert_eq!(result, Value::Null);

        let sent = wallet.requests_for("wallet_addEthereumChain");
        assert_eq!(sent[0].params[0]["chainId"], json!("0x89"));
    }

    #[tokio::test]
    async fn test_unknown_response_id_is_ignored() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        assert!(wallet.respond(9_999, json!("stray")));
        settle(&client).await;
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_dropped_caller_releases_pending_entry() {
        let wallet = Arc::new(scripted_wallet(EdgeCaseAddresses::PRIMARY));
        let client = client_for(&wallet, ClientConfig::default());

        let abandoned = {
            let client = client.clone();
            tokio::spawn(async move { client.request("eth_call", vec![]).await })
        };
        let sent = wallet.wait_for_requests("eth_call", 1).await;
        assert_eq!(client.pending_requests(), 1);

        abandoned.abort();
        assert!(abandoned.await.unwrap_err().is_cancelled());
        assert_eq!(client.pending_requests(), 0);

        // A late answer for the abandoned id is dropped without harm.
        wallet.respond(sent[0].id, json!("late"));
        settle(&client).await;
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;

        let again = client.connect().await.unwrap();
        assert_eq!(again, EdgeCaseAddresses::PRIMARY);
        assert_eq!(wallet.count_for("eth_requestAccounts"), 1);
        assert_eq!(wallet.open_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_uses_first_account() {
        let wallet = Arc::new(
            scripted_wallet(EdgeCaseAddresses::PRIMARY).with_reply(
                "eth_requestAccounts",
                json!([EdgeCaseAddresses::SECONDARY, EdgeCaseAddresses::PRIMARY]),
            ),
        );
        let client = client_for(&wallet, ClientConfig::default());

        assert_eq!(client.connect().await.unwrap(), EdgeCaseAddresses::SECONDARY);
        assert_eq!(client.session().accounts().len(), 2);
    }

    #[tokio::test]
    async fn test_chain_id_failure_falls_back_to_default() {
        let wallet = Arc::new(
            scripted_wallet(EdgeCaseAddresses::PRIMARY).with_error(
                "eth_chainId",
                -32601,
                "method not supported",
            ),
        );
        let client = client_for(&wallet, ClientConfig::new().with_default_chain_id("0x1"));

        client.connect().await.unwrap();
        assert!(client.is_connected());
        assert_eq!(client.chain_id().as_deref(), Some("0x1"));
    }

    #[tokio::test]
    async fn test_disconnect_cancels_every_pending_request() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.request("eth_call", vec![]).await })
            })
            .collect();
        wallet.wait_for_requests("eth_call", 3).await;
        assert_eq!(client.pending_requests(), 3);

        client.disconnect().await;

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Err(SessionError::Cancelled));
        }
        assert_eq!(client.pending_requests(), 0);
        assert_eq!(client.session().state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_no_events_after_disconnect() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        let (calls, chain_calls) = counter();
        client.on_chain_changed(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });

        client.disconnect().await;
        // The channel is closed; nothing can be delivered.
        assert!(!wallet.emit(ProviderEvent::ChainChanged("0x89".into())));

        // A request reopens the channel, but the session is not live until
        // the next connect.
        settle(&client).await;
        wallet.emit(ProviderEvent::ChainChanged("0x89".into()));
        settle(&client).await;

        assert_eq!(chain_calls(), 0);
        assert_eq!(client.chain_id(), None);
    }

    #[tokio::test]
    async fn test_disconnect_cancels_waiting_connect() {
        let wallet = Arc::new(MockWalletProvider::new().with_reply("eth_chainId", json!("0x1")));
        let client = client_for(&wallet, ClientConfig::default());

        let connecting = {
            let client = client.clone();
            tokio::spawn(async move { client.connect().await })
        };
        wallet.wait_for_requests("eth_requestAccounts", 1).await;
        assert_eq!(client.pending_requests(), 1);

        client.disconnect().await;

        assert_eq!(connecting.await.unwrap(), Err(SessionError::Cancelled));
        assert!(!client.is_connected());
        assert_eq!(client.chain_id(), None);
        assert_eq!(client.pending_requests(), 0);
        assert_eq!(wallet.count_for("eth_chainId"), 0);
    }

    #[tokio::test]
    async fn test_reconnect_after_disconnect() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        client.disconnect().await;

        client.connect().await.unwrap();
        assert!(client.is_connected());
        assert_eq!(wallet.open_count(), 2);
        assert_eq!(wallet.count_for("eth_requestAccounts"), 2);
    }

    #[tokio::test]
    async fn test_wallet_disconnect_event() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        let (calls, disconnect_calls) = counter();
        let reason = Arc::new(parking_lot::Mutex::new(None));
        {
            let reason = reason.clone();
            client.on_disconnect(move |error| {
                calls.fetch_add(1, Ordering::SeqCst);
                *reason.lock() = error.clone();
            });
        }

        let pending = {
            let client = client.clone();
            tokio::spawn(async move { client.request("eth_call", vec![]).await })
        };
        wallet.wait_for_requests("eth_call", 1).await;

        wallet.emit(ProviderEvent::Disconnect(Some(RpcErrorObject {
            code: 4900,
            message: "Disconnected".into(),
            data: None,
        })));

        assert_eq!(pending.await.unwrap(), Err(SessionError::Cancelled));
        assert_eq!(disconnect_calls(), 1);
        assert_eq!(reason.lock().as_ref().map(|e| e.code), Some(4900));
        assert!(!client.is_connected());
        assert_eq!(wallet.close_count(), 1);

        // The next call opens a fresh channel.
        client.connect().await.unwrap();
        assert_eq!(wallet.open_count(), 2);
    }

    #[tokio::test]
    async fn test_explicit_disconnect_does_not_notify_listeners() {
        let (_, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        let (calls, disconnect_calls) = counter();
        client.on_disconnect(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });

        client.disconnect().await;
        assert_eq!(disconnect_calls(), 0);
    }
}

// ============================================================================
// Wallet Events
// ============================================================================

mod event_tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_accounts_disconnects_but_keeps_chain() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        let lists = Arc::new(parking_lot::Mutex::new(Vec::new()));
        {
            let lists = lists.clone();
            client.on_accounts_changed(move |accounts| lists.lock().push(accounts.to_vec()));
        }

        wallet.emit(ProviderEvent::AccountsChanged(vec![]));
        settle(&client).await;

        assert_eq!(*lists.lock(), vec![Vec::<String>::new()]);
        assert_eq!(client.session().state(), SessionState::Disconnected);
        assert_eq!(client.chain_id().as_deref(), Some("0x1"));

        let result = client
            .request("eth_sendTransaction", vec![json!({ "to": EdgeCaseAddresses::ZERO })])
            .await;
        assert_eq!(result, Err(SessionError::NotConnected));
        assert_eq!(wallet.count_for("eth_sendTransaction"), 0);
    }

    #[tokio::test]
    async fn test_session_updated_before_listener_runs() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        let observed = Arc::new(parking_lot::Mutex::new(None));
        {
            let observed = observed.clone();
            let reader = client.clone();
            client.on_accounts_changed(move |_| {
                *observed.lock() = reader.selected_address();
            });
        }

        wallet.emit(ProviderEvent::AccountsChanged(vec![
            EdgeCaseAddresses::SECONDARY.to_string(),
        ]));
        settle(&client).await;

        assert_eq!(
            observed.lock().as_deref(),
            Some(EdgeCaseAddresses::SECONDARY)
        );
    }

    #[tokio::test]
    async fn test_chain_id_is_stored_verbatim() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        wallet.emit(ProviderEvent::ChainChanged("0x0089".into()));
        settle(&client).await;
        assert_eq!(client.chain_id().as_deref(), Some("0x0089"));
    }

    fn apply_events(events: Vec<ProviderEvent>) -> WalletSessionClient {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async move {
            let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
            for event in events {
                wallet.emit(event);
            }
            settle(&client).await;
            client
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_any_chain_id_is_stored_verbatim(chain_id in hex_chain_id()) {
            let client = apply_events(vec![ProviderEvent::ChainChanged(chain_id.clone())]);
            prop_assert_eq!(client.chain_id(), Some(chain_id));
        }

        #[test]
        fn prop_accounts_change_selects_first(accounts in account_list()) {
            let client = apply_events(vec![ProviderEvent::AccountsChanged(accounts.clone())]);
            prop_assert!(client.is_connected());
            prop_assert_eq!(client.selected_address(), accounts.first().cloned());
            let session = client.session();
            prop_assert_eq!(session.accounts(), accounts.as_slice());
        }
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_block_others() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        let (calls, chain_calls) = counter();
        client.on_chain_changed(|_| panic!("listener failure"));
        client.on_chain_changed(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });

        wallet.emit(ProviderEvent::ChainChanged("0x89".into()));
        settle(&client).await;
        wallet.emit(ProviderEvent::ChainChanged("0xa".into()));
        settle(&client).await;

        assert_eq!(chain_calls(), 2);
        assert_eq!(client.chain_id().as_deref(), Some("0xa"));
    }

    #[tokio::test]
    async fn test_removed_listener_is_not_called() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        let (calls, chain_calls) = counter();
        let id = client.on_chain_changed(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });

        assert!(client.remove_listener(id));
        wallet.emit(ProviderEvent::ChainChanged("0x89".into()));
        settle(&client).await;

        assert_eq!(chain_calls(), 0);
        assert!(!client.remove_listener(id));
    }

    #[tokio::test]
    async fn test_listener_may_remove_itself() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        let (calls, chain_calls) = counter();
        let own_id = Arc::new(std::sync::OnceLock::new());
        let id = {
            let registry = client.listeners();
            let own_id = own_id.clone();
            client.on_chain_changed(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = own_id.get() {
                    registry.remove(*id);
                }
            })
        };
        own_id.set(id).unwrap();

        wallet.emit(ProviderEvent::ChainChanged("0x89".into()));
        wallet.emit(ProviderEvent::ChainChanged("0x1".into()));
        settle(&client).await;

        assert_eq!(chain_calls(), 1);
    }

    #[tokio::test]
    async fn test_events_before_connect_are_ignored() {
        let wallet = Arc::new(scripted_wallet(EdgeCaseAddresses::PRIMARY));
        let client = client_for(&wallet, ClientConfig::default());
        let (calls, chain_calls) = counter();
        client.on_chain_changed(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });

        settle(&client).await;
        wallet.emit(ProviderEvent::ChainChanged("0x89".into()));
        settle(&client).await;

        assert_eq!(chain_calls(), 0);
        assert_eq!(client.chain_id(), None);
    }
}

// ============================================================================
// Balances
// ============================================================================

mod balance_tests {
    use super::*;

    #[tokio::test]
    async fn test_balance_formatting_edge_cases() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        for (quantity, expected) in EdgeCaseBalances::cases() {
            wallet.set_reply("eth_getBalance", MockReply::Result(json!(quantity)));
            let balance = client.get_balance(EdgeCaseAddresses::PRIMARY).await.unwrap();
            assert_eq!(balance, expected, "formatting {quantity}");
        }

        let sent = wallet.requests_for("eth_getBalance");
        assert_eq!(
            sent[0].params,
            vec![json!(EdgeCaseAddresses::PRIMARY), json!("latest")]
        );
    }

    #[tokio::test]
    async fn test_malformed_balance_answers() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        for answer in EdgeCaseBalances::malformed() {
            wallet.set_reply("eth_getBalance", MockReply::Result(answer.clone()));
            let result = client.get_balance(EdgeCaseAddresses::PRIMARY).await;
            assert!(
                matches!(result, Err(SessionError::Malformed(_))),
                "{answer} gave {result:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_balance_follows_account_change() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        wallet.set_reply(
            "eth_getBalance",
            MockReply::Result(json!("0xde0b6b3a7640000")),
        );

        wallet.emit(ProviderEvent::AccountsChanged(vec![
            EdgeCaseAddresses::SECONDARY.to_string(),
        ]));
        settle(&client).await;

        let balance = client.refresh_balance().await.unwrap();
        assert_eq!(balance, "1.0");

        let sent = wallet.requests_for("eth_getBalance");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].params[0], json!(EdgeCaseAddresses::SECONDARY));
        assert_eq!(client.session().balance(), Some("1.0"));
    }

    #[tokio::test]
    async fn test_selected_balance_does_not_store() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        wallet.set_reply("eth_getBalance", MockReply::Result(json!("0x5af3107a4000")));

        assert_eq!(client.selected_balance().await.unwrap(), "0.0001");
        assert_eq!(client.session().balance(), None);
    }

    #[tokio::test]
    async fn test_refresh_requires_connection() {
        let wallet = Arc::new(scripted_wallet(EdgeCaseAddresses::PRIMARY));
        let client = client_for(&wallet, ClientConfig::default());
        assert_eq!(
            client.refresh_balance().await,
            Err(SessionError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_stale_refresh_does_not_overwrite() {
        let wallet = Arc::new(scripted_wallet(EdgeCaseAddresses::PRIMARY));
        let client = client_for(&wallet, ClientConfig::new().with_balance_refresh(true));
        let (updates_tx, mut updates) = tokio::sync::mpsc::unbounded_channel::<BalanceUpdate>();
        client.on_balance_changed(move |update| {
            let _ = updates_tx.send(update.clone());
        });

        client.connect().await.unwrap();
        let first = wallet.wait_for_requests("eth_getBalance", 1).await;
        assert_eq!(first[0].params[0], json!(EdgeCaseAddresses::PRIMARY));

        wallet.emit(ProviderEvent::AccountsChanged(vec![
            EdgeCaseAddresses::SECONDARY.to_string(),
        ]));
        let both = wallet.wait_for_requests("eth_getBalance", 2).await;
        assert_eq!(both[1].params[0], json!(EdgeCaseAddresses::SECONDARY));

        wallet.respond(both[0].id, json!("0x1"));
        wallet.respond(both[1].id, json!("0xde0b6b3a7640000"));

        let update = updates.recv().await.unwrap();
        assert_eq!(update.address, EdgeCaseAddresses::SECONDARY);
        assert_eq!(update.balance, "1.0");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(updates.try_recv().is_err());
        assert_eq!(client.session().balance(), Some("1.0"));
    }
}

// ============================================================================
// Error Mapping
// ============================================================================

mod error_tests {
    use super::*;

    #[tokio::test]
    async fn test_user_rejects_connection() {
        let wallet = Arc::new(
            scripted_wallet(EdgeCaseAddresses::PRIMARY).with_error(
                "eth_requestAccounts",
                4001,
                "User rejected the request.",
            ),
        );
        let client = client_for(&wallet, ClientConfig::default());

        assert_eq!(client.connect().await, Err(SessionError::UserRejected));
        assert!(!client.is_connected());
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_empty_account_grant_is_rejection() {
        let wallet = Arc::new(
            scripted_wallet(EdgeCaseAddresses::PRIMARY).with_reply("eth_requestAccounts", json!([])),
        );
        let client = client_for(&wallet, ClientConfig::default());
        assert_eq!(client.connect().await, Err(SessionError::UserRejected));
    }

    #[tokio::test]
    async fn test_user_rejects_signature() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        wallet.set_reply(
            "eth_signTypedData_v4",
            MockReply::Error {
                code: 4001,
                message: "User denied message signature.".into(),
            },
        );

        let result = client.sign_typed_data_v4(&json!({ "primaryType": "Mail" })).await;
        assert_eq!(result, Err(SessionError::UserRejected));
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_typed_data_sent_as_string() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        wallet.set_reply("eth_signTypedData_v4", MockReply::Result(json!("0x5ig")));

        let typed = json!({ "primaryType": "Mail", "message": { "contents": "Hello, Bob!" } });
        assert_eq!(client.sign_typed_data_v4(&typed).await.unwrap(), "0x5ig");

        let sent = wallet.requests_for("eth_signTypedData_v4");
        assert_eq!(sent[0].params[0], json!(EdgeCaseAddresses::PRIMARY));
        let payload: Value = serde_json::from_str(sent[0].params[1].as_str().unwrap()).unwrap();
        assert_eq!(payload, typed);
    }

    #[tokio::test]
    async fn test_other_wallet_errors_pass_through() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        wallet.set_reply(
            "wallet_switchEthereumChain",
            MockReply::Error {
                code: 4902,
                message: "Unrecognized chain ID".into(),
            },
        );

        let result = client.switch_ethereum_chain("0x2105").await;
        assert_eq!(
            result,
            Err(SessionError::Provider {
                code: 4902,
                message: "Unrecognized chain ID".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_wallet_unavailable() {
        let wallet = Arc::new(MockWalletProvider::new().unavailable());
        let client = client_for(&wallet, ClientConfig::default());

        assert!(matches!(
            client.connect().await,
            Err(SessionError::ProviderUnavailable(_))
        ));
        assert!(matches!(
            client.request("eth_chainId", vec![]).await,
            Err(SessionError::ProviderUnavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout() {
        let wallet = Arc::new(scripted_wallet(EdgeCaseAddresses::PRIMARY));
        let client = client_for(
            &wallet,
            ClientConfig::new().with_request_timeout(Duration::from_secs(5)),
        );

        let result = client.request("eth_call", vec![]).await;
        assert_eq!(
            result,
            Err(SessionError::Timeout {
                method: "eth_call".into(),
                after: Duration::from_secs(5),
            })
        );
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_empty_method_is_invalid() {
        let wallet = Arc::new(MockWalletProvider::new());
        let client = client_for(&wallet, ClientConfig::default());
        assert!(matches!(
            client.request("", vec![]).await,
            Err(SessionError::InvalidRequest(_))
        ));
        assert!(wallet.sent_requests().is_empty());
    }

    #[tokio::test]
    async fn test_non_string_transaction_hash_is_malformed() {
        let (wallet, client) = connected(EdgeCaseAddresses::PRIMARY).await;
        wallet.set_reply("eth_sendTransaction", MockReply::Result(json!(42)));

        let result = client
            .send_transaction(TransactionRequest::transfer(EdgeCaseAddresses::ZERO, "0x1"))
            .await;
        assert!(matches!(result, Err(SessionError::Malformed(_))));
    }
}
