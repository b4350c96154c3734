//! Only Wallet CLI
//!
//! Drives the wallet core in-process: every command goes through the same
//! page provider, bridge, relay and background path a browser would use.

use clap::{Parser, Subcommand};
use only_wallet::bridge;
use only_wallet::chains::ChainType;
use only_wallet::{Config, Error, Providers, Result, WalletBackend, PASSPHRASE_ENV};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "only-wallet")]
#[command(about = "Multi-chain wallet security core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Wallet passphrase (falls back to ONLY_WALLET_PASSPHRASE)
    #[arg(short, long, global = true)]
    passphrase: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new wallet and print its recovery phrase once
    Init {
        /// Phrase length (12 or 24)
        #[arg(short, long, default_value_t = 12)]
        words: usize,
    },

    /// Import an existing recovery phrase
    Import {
        /// Recovery phrase; read from stdin when omitted
        #[arg(long)]
        mnemonic: Option<String>,
    },

    /// Show account 0 on each chain
    Accounts {
        /// Restrict to these chain ids
        #[arg(long = "chain")]
        chains: Vec<String>,
    },

    /// Sign a message on one chain
    Sign {
        #[arg(long)]
        chain: String,

        #[arg(short, long)]
        message: String,
    },

    /// Send a legacy transaction on an EVM chain
    Send {
        #[arg(long)]
        chain: String,

        #[arg(long)]
        to: String,

        /// Value in wei
        #[arg(long, default_value = "0")]
        value: String,
    },

    /// List the chain registry
    Chains,

    /// Show current configuration
    Config,

    /// Delete all wallet data
    Reset {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let passphrase = cli
        .passphrase
        .or_else(|| std::env::var(PASSPHRASE_ENV).ok())
        .map(SecretString::from);

    match cli.command {
        Commands::Init { words } => run_init(&config, passphrase, words).await,
        Commands::Import { mnemonic } => run_import(&config, passphrase, mnemonic).await,
        Commands::Accounts { chains } => run_accounts(&config, passphrase, chains).await,
        Commands::Sign { chain, message } => run_sign(&config, passphrase, &chain, &message).await,
        Commands::Send { chain, to, value } => {
            run_send(&config, passphrase, &chain, &to, &value).await
        }
        Commands::Chains => run_chains(&config).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Reset { yes } => run_reset(&config, yes).await,
    }
}

fn require_passphrase(passphrase: Option<SecretString>) -> Result<SecretString> {
    passphrase.ok_or_else(|| {
        Error::Config(format!("passphrase required (--passphrase or {PASSPHRASE_ENV})"))
    })
}

/// Unlocked backend plus page-side providers wired through the relay
async fn open_wallet(
    config: &Config,
    passphrase: Option<SecretString>,
) -> Result<(Arc<WalletBackend>, Providers)> {
    let passphrase = require_passphrase(passphrase)?;
    let backend = Arc::new(WalletBackend::from_config(config)?);
    backend.keyring().unlock(&passphrase).await?;

    let relay = backend.relay(config);
    let (page, _relay_task) = bridge::connect(relay, config.bridge_timeout());
    Ok((backend, Providers::new(Arc::new(page))))
}

async fn run_init(config: &Config, passphrase: Option<SecretString>, words: usize) -> Result<()> {
    let passphrase = require_passphrase(passphrase)?;
    let backend = WalletBackend::from_config(config)?;
    if backend.keyring().has_wallet().await? {
        return Err(Error::Config(format!(
            "a wallet already exists in {}; run `reset --yes` first",
            config.data_dir.display()
        )));
    }
    let phrase = backend.keyring().create(&passphrase, words).await?;
    tracing::info!(data_dir = %config.data_dir.display(), "Wallet created");
    println!("Write down your recovery phrase. It will not be shown again:\n");
    println!("{}", phrase.expose_secret());
    Ok(())
}

async fn run_import(
    config: &Config,
    passphrase: Option<SecretString>,
    mnemonic: Option<String>,
) -> Result<()> {
    let passphrase = require_passphrase(passphrase)?;
    let phrase = match mnemonic {
        Some(phrase) => SecretString::from(phrase),
        None => {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            SecretString::from(line)
        }
    };
    let backend = WalletBackend::from_config(config)?;
    backend
        .keyring()
        .import(&passphrase, phrase.expose_secret())
        .await?;
    tracing::info!(data_dir = %config.data_dir.display(), "Wallet imported");
    Ok(())
}

async fn run_accounts(
    config: &Config,
    passphrase: Option<SecretString>,
    chains: Vec<String>,
) -> Result<()> {
    let (backend, providers) = open_wallet(config, passphrase).await?;
    let registry = backend.context().registry().await?;
    let selected: Vec<_> = if chains.is_empty() {
        registry.configs().into_iter().cloned().collect()
    } else {
        chains
            .iter()
            .map(|id| registry.require(id).cloned())
            .collect::<Result<_>>()?
    };

    let mut rows = Vec::with_capacity(selected.len());
    for chain in selected {
        let address = match chain.chain_type {
            ChainType::Cosmos => {
                let signer = providers.cosmos.get_offline_signer(&chain.chain_id).await?;
                signer
                    .initial_accounts()
                    .first()
                    .map(|account| account.address.clone())
            }
            ChainType::Evm => providers.ethereum.selected_address().await?,
            ChainType::Dogecoin => Some(
                providers
                    .dogecoin
                    .get_address(Some(&chain.chain_id))
                    .await?,
            ),
        };
        rows.push(json!({
            "chainId": chain.chain_id,
            "type": chain.chain_type,
            "address": address,
        }));
    }
    println!("{}", serde_json::to_string_pretty(&rows)?);
    backend.lock().await
}

async fn run_sign(
    config: &Config,
    passphrase: Option<SecretString>,
    chain_id: &str,
    message: &str,
) -> Result<()> {
    let (backend, providers) = open_wallet(config, passphrase).await?;
    let chain_type = backend.context().registry().await?.require(chain_id)?.chain_type;

    let signed = match chain_type {
        ChainType::Cosmos => {
            let signer = providers.cosmos.get_offline_signer(chain_id).await?;
            let address = signer
                .initial_accounts()
                .first()
                .map(|account| account.address.clone())
                .ok_or_else(|| Error::WalletNotInitialized(chain_id.to_string()))?;
            let doc = json!({
                "account_number": "0",
                "chain_id": chain_id,
                "fee": {"amount": [], "gas": "0"},
                "memo": message,
                "msgs": [],
                "sequence": "0",
            });
            serde_json::to_value(signer.sign_amino(&address, doc).await?)?
        }
        ChainType::Evm => {
            providers.ethereum.enable(chain_id).await?;
            let address = providers
                .ethereum
                .selected_address()
                .await?
                .ok_or(Error::Locked)?;
            providers
                .ethereum
                .request("personal_sign", vec![json!(message), json!(address)])
                .await?
        }
        ChainType::Dogecoin => serde_json::to_value(
            providers
                .dogecoin
                .sign_sha256(Some(chain_id), message)
                .await?,
        )?,
    };
    println!("{}", serde_json::to_string_pretty(&signed)?);
    backend.lock().await
}

async fn run_send(
    config: &Config,
    passphrase: Option<SecretString>,
    chain_id: &str,
    to: &str,
    value: &str,
) -> Result<()> {
    let (backend, providers) = open_wallet(config, passphrase).await?;
    providers.ethereum.enable(chain_id).await?;
    let hash = providers
        .ethereum
        .request("eth_sendTransaction", vec![json!({"to": to, "value": value})])
        .await?;
    println!("{}", hash.as_str().unwrap_or_default());
    backend.lock().await
}

async fn run_chains(config: &Config) -> Result<()> {
    let backend = WalletBackend::from_config(config)?;
    let registry = backend.context().registry().await?;
    println!("{}", serde_json::to_string_pretty(&registry.configs())?);
    Ok(())
}

async fn run_reset(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        return Err(Error::Config("refusing to reset without --yes".into()));
    }
    let backend = WalletBackend::from_config(config)?;
    backend.keyring().reset().await?;
    println!("Wallet data removed from {}", config.data_dir.display());
    Ok(())
}
