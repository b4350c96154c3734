//! Chain signer adapters
//!
//! Each adapter turns the decrypted mnemonic into chain-specific accounts
//! and signatures. Common rules, enforced through [`AdapterContext`]:
//! - `enable` checks the registry first, then the session, and only then
//!   records anything
//! - nothing reads the vault while the session is locked
//! - the mnemonic is dropped as soon as the signer is built

pub mod cosmos;
pub mod dogecoin;
pub mod evm;

pub use cosmos::CosmosAdapter;
pub use dogecoin::DogecoinAdapter;
pub use evm::EvmAdapter;

use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;

use crate::chains::{ChainConfig, ChainRegistry, ChainSource, ChainType};
use crate::config::RpcOverrides;
use crate::keyring::Keyring;
use crate::storage::KeyValueStore;
use crate::{Error, Result};

/// Session-store key of the active EVM chain
pub const ACTIVE_CHAIN_KEY: &str = "activeChainId";

/// Session-store key of the active Dogecoin chain
pub const ACTIVE_DOGECOIN_CHAIN_KEY: &str = "activeDogecoinChainId";

/// Active chain per single-chain family, kept in the session store
#[derive(Clone)]
pub struct ActiveChains {
    store: Arc<dyn KeyValueStore>,
}

impl ActiveChains {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(chain_type: ChainType) -> Option<&'static str> {
        match chain_type {
            ChainType::Evm => Some(ACTIVE_CHAIN_KEY),
            ChainType::Dogecoin => Some(ACTIVE_DOGECOIN_CHAIN_KEY),
            // Cosmos calls always name their chain
            ChainType::Cosmos => None,
        }
    }

    pub async fn get(&self, chain_type: ChainType) -> Result<Option<String>> {
        let Some(key) = Self::key(chain_type) else {
            return Ok(None);
        };
        Ok(self
            .store
            .get(key)
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    pub async fn require(&self, chain_type: ChainType) -> Result<String> {
        self.get(chain_type).await?.ok_or(Error::NoActiveChain)
    }

    async fn set(&self, chain_type: ChainType, chain_id: &str) -> Result<()> {
        if let Some(key) = Self::key(chain_type) {
            self.store.set(key, chain_id.into()).await?;
        }
        Ok(())
    }
}

/// What every adapter needs from the background
pub struct AdapterContext {
    keyring: Keyring,
    chains: Arc<dyn ChainSource>,
    rpc_overrides: RpcOverrides,
    active: ActiveChains,
}

impl AdapterContext {
    pub fn new(
        keyring: Keyring,
        chains: Arc<dyn ChainSource>,
        rpc_overrides: RpcOverrides,
        session_store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            keyring,
            chains,
            rpc_overrides,
            active: ActiveChains::new(session_store),
        }
    }

    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    pub fn active(&self) -> &ActiveChains {
        &self.active
    }

    /// Fresh registry with RPC overrides applied
    pub async fn registry(&self) -> Result<ChainRegistry> {
        Ok(self
            .chains
            .load()
            .await?
            .with_rpc_overrides(&self.rpc_overrides))
    }

    pub async fn chain(&self, chain_id: &str, chain_type: ChainType) -> Result<ChainConfig> {
        self.registry()
            .await?
            .require_type(chain_id, chain_type)
            .cloned()
    }

    pub async fn ensure_unlocked(&self) -> Result<()> {
        if self.keyring.is_unlocked().await {
            Ok(())
        } else {
            Err(Error::Locked)
        }
    }

    /// Family check, session check, then record the active chain.
    ///
    /// `chain` comes from a registry the caller loaded for this call.
    pub async fn activate(&self, chain: &ChainConfig, chain_type: ChainType) -> Result<()> {
        if chain.chain_type != chain_type {
            return Err(Error::UnsupportedChain(chain.chain_id.clone()));
        }
        self.ensure_unlocked().await?;
        self.active.set(chain_type, &chain.chain_id).await?;
        info!(chain_id = %chain.chain_id, chain_type = ?chain_type, "Connected to chain");
        Ok(())
    }

    /// Decrypted phrase for one operation; `Locked` before the vault is read
    pub async fn mnemonic(&self) -> Result<SecretString> {
        self.ensure_unlocked().await?;
        self.keyring.mnemonic().await
    }
}
