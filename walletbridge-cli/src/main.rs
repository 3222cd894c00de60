//! walletbridge CLI
//!
//! Drives a wallet session against a JSON-RPC wallet endpoint: connect,
//! read balances, sign typed data, send a transaction, add a chain, or
//! watch chain and account changes.

mod config;
mod logging;
mod typed_data;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::{CliConfig, CONFIG_FILE};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walletbridge::{
    presets, AddChainParams, HttpWalletProvider, NativeCurrency, TransactionRequest,
    WalletSessionClient,
};

#[derive(Debug, Parser)]
#[command(name = "walletbridge", version, about = "Talk to an external wallet over JSON-RPC")]
struct Cli {
    /// Config file
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Wallet endpoint; overrides config and WALLETBRIDGE_RPC_URL
    #[arg(long, global = true, value_name = "URL")]
    rpc_url: Option<String>,

    /// Per-call HTTP timeout; overrides config and WALLETBRIDGE_TIMEOUT_SECS
    #[arg(long, global = true, value_name = "SECS")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Request account access and print the session
    Connect,
    /// Print the native balance of an account (defaults to the selected one)
    Balance { address: Option<String> },
    /// Sign the Ether Mail EIP-712 sample with the selected account
    SignTypedData,
    /// Send a value transfer from the selected account
    SendTransaction {
        #[arg(long, default_value = "0x0000000000000000000000000000000000000000")]
        to: String,
        /// Wei, hex quantity
        #[arg(long, default_value = "0x5AF3107A4000")]
        value: String,
    },
    /// Ask the wallet to add a chain
    AddChain {
        #[arg(long, default_value = "0x89")]
        chain_id: String,
        #[arg(long, default_value = "Polygon")]
        name: String,
        #[arg(long, default_value = "https://polygon-rpc.com/")]
        rpc: String,
        #[arg(long, default_value = "MATIC")]
        symbol: String,
        #[arg(long, default_value = "https://polygonscan.com")]
        explorer: String,
    },
    /// Print chain and account changes until Ctrl-C
    Watch,
    /// Write the resolved configuration to the config file
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let mut config = CliConfig::load(&cli.config)?;
    config.apply_env(|key| std::env::var(key).ok())?;
    config.apply_flags(cli.rpc_url, cli.timeout_secs);

    if let Command::Init { force } = cli.command {
        init_config(&config, &cli.config, force)?;
        println!("Wrote {}", cli.config.display());
        return Ok(());
    }

    let provider = HttpWalletProvider::new(config.provider_config())
        .with_context(|| format!("configuring wallet endpoint {}", config.rpc_url))?;
    let client = WalletSessionClient::new(Arc::new(provider), config.client.clone());

    let result = run(&client, cli.command).await;
    client.disconnect().await;
    result
}

async fn run(client: &WalletSessionClient, command: Command) -> Result<()> {
    match command {
        Command::Connect => {
            let address = client.connect().await?;
            println!("Connected account: {address}");
            if let Some(chain_id) = client.chain_id() {
                println!("Connected chain: {chain_id}");
            }
        }
        Command::Balance { address } => {
            let address = match address {
                Some(address) => address,
                None => client.connect().await?,
            };
            let balance = client.get_balance(&address).await?;
            println!("Balance: {balance} ETH");
        }
        Command::SignTypedData => {
            client.connect().await?;
            let chain_id = client
                .chain_id()
                .context("wallet did not report a chain id")?;
            let typed = typed_data::ether_mail(&chain_id)?;
            let signature = client.sign_typed_data_v4(&typed).await?;
            println!("{signature}");
        }
        Command::SendTransaction { to, value } => {
            client.connect().await?;
            let hash = client
                .send_transaction(TransactionRequest::transfer(to, value))
                .await?;
            println!("{hash}");
        }
        Command::AddChain {
            chain_id,
            name,
            rpc,
            symbol,
            explorer,
        } => {
            let polygon = presets::polygon();
            let params = if chain_id == polygon.chain_id && name == polygon.chain_name {
                polygon
            } else {
                AddChainParams {
                    chain_id,
                    chain_name: name,
                    block_explorer_urls: vec![explorer],
                    native_currency: NativeCurrency {
                        name: None,
                        symbol,
                        decimals: 18,
                    },
                    rpc_urls: vec![rpc],
                }
            };
            let result = client.add_ethereum_chain(&params).await?;
            println!("{result}");
        }
        Command::Watch => watch(client).await?,
        Command::Init { .. } => {}
    }
    Ok(())
}

fn init_config(config: &CliConfig, path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to replace it", path.display());
    }
    config.save(path)
}

async fn watch(client: &WalletSessionClient) -> Result<()> {
    client.on_chain_changed(|chain_id| println!("Connected chain: {chain_id}"));
    client.on_accounts_changed(|accounts| match accounts.first() {
        Some(account) => println!("Connected account: {account}"),
        None => println!("No account exposed"),
    });
    client.on_disconnect(|error| match error {
        Some(error) => println!("Wallet disconnected: {} ({})", error.message, error.code),
        None => println!("Wallet disconnected"),
    });
    client.on_balance_changed(|update| println!("Balance: {} ETH", update.balance));

    let address = client.connect().await?;
    println!("Connected account: {address}");
    if let Err(e) = client.refresh_balance().await {
        tracing::warn!(error = %e, "initial balance lookup failed");
    }

    tokio::signal::ctrl_c().await?;
    Ok(())
}
