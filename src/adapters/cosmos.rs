//! Cosmos adapter
//!
//! `get_offline_signer` builds a per-chain signer instance from the
//! mnemonic; account and signing calls only ever use that instance. Locking
//! the session drops every instance.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::AdapterContext;
use crate::chains::{ChainConfig, ChainType};
use crate::wallet::cosmos::{AccountData, AminoSignResponse, DirectSignResponse, SignDoc};
use crate::wallet::CosmosSigner;
use crate::{Error, Result};

pub struct CosmosAdapter {
    ctx: Arc<AdapterContext>,
    instances: RwLock<HashMap<String, Arc<CosmosSigner>>>,
}

impl CosmosAdapter {
    pub fn new(ctx: Arc<AdapterContext>) -> Self {
        Self {
            ctx,
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Connect to a chain record the caller already resolved
    pub async fn enable(&self, chain: &ChainConfig) -> Result<()> {
        self.ctx.activate(chain, ChainType::Cosmos).await
    }

    /// Build (or rebuild) the signer for `chain_id` and return its accounts
    pub async fn get_offline_signer(&self, chain_id: &str) -> Result<Vec<AccountData>> {
        let chain = self.ctx.chain(chain_id, ChainType::Cosmos).await?;
        let prefix = chain
            .prefix
            .ok_or_else(|| Error::Registry(format!("chain {chain_id} has no bech32 prefix")))?;

        let phrase = match self.ctx.mnemonic().await {
            Ok(phrase) => phrase,
            Err(e) => {
                if matches!(e, Error::Locked | Error::InvalidPassword) {
                    self.clear();
                }
                return Err(e);
            }
        };
        let signer = CosmosSigner::from_mnemonic(&phrase, &prefix)?;
        drop(phrase);

        let accounts = signer.accounts();
        self.instances
            .write()
            .insert(chain_id.to_string(), Arc::new(signer));
        info!(chain_id = %chain_id, "Cosmos signer ready");
        Ok(accounts)
    }

    pub async fn get_accounts(&self, chain_id: &str) -> Result<Vec<AccountData>> {
        Ok(self.instance(chain_id).await?.accounts())
    }

    pub async fn sign_direct(
        &self,
        chain_id: &str,
        signer_address: &str,
        doc: SignDoc,
    ) -> Result<DirectSignResponse> {
        let signer = self.instance(chain_id).await?;
        let response = signer.sign_direct(signer_address, doc)?;
        debug!(chain_id = %chain_id, "Signed direct sign doc");
        Ok(response)
    }

    pub async fn sign_amino(
        &self,
        chain_id: &str,
        signer_address: &str,
        doc: Value,
    ) -> Result<AminoSignResponse> {
        let signer = self.instance(chain_id).await?;
        let response = signer.sign_amino(signer_address, doc)?;
        debug!(chain_id = %chain_id, "Signed amino sign doc");
        Ok(response)
    }

    /// Drop every signer instance
    pub fn clear(&self) {
        let mut instances = self.instances.write();
        if !instances.is_empty() {
            debug!(count = instances.len(), "Dropping cosmos signer instances");
            instances.clear();
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    async fn instance(&self, chain_id: &str) -> Result<Arc<CosmosSigner>> {
        if !self.ctx.keyring().is_unlocked().await {
            self.clear();
            return Err(Error::Locked);
        }
        self.instances
            .read()
            .get(chain_id)
            .cloned()
            .ok_or_else(|| Error::WalletNotInitialized(chain_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use serde_json::json;

    fn sign_doc() -> SignDoc {
        SignDoc {
            body_bytes: vec![0x0a, 0x01, 0x02],
            auth_info_bytes: vec![0x12, 0x00],
            chain_id: "cosmoshub-4".into(),
            account_number: 42,
        }
    }

    #[tokio::test]
    async fn calls_before_get_offline_signer_are_rejected() {
        let fx = fixture().await;
        unlock(&fx.ctx).await;
        let adapter = CosmosAdapter::new(fx.ctx.clone());

        let err = adapter.get_accounts("cosmoshub-4").await.unwrap_err();
        assert!(matches!(err, Error::WalletNotInitialized(id) if id == "cosmoshub-4"));
    }

    #[tokio::test]
    async fn offline_signer_uses_chain_prefix() {
        let fx = fixture().await;
        unlock(&fx.ctx).await;
        let adapter = CosmosAdapter::new(fx.ctx.clone());

        let hub = adapter.get_offline_signer("cosmoshub-4").await.unwrap();
        let osmo = adapter.get_offline_signer("osmosis-1").await.unwrap();
        assert_eq!(hub.len(), 1);
        assert!(hub[0].address.starts_with("cosmos1"));
        assert!(osmo[0].address.starts_with("osmo1"));
        assert_eq!(hub[0].pubkey, osmo[0].pubkey);
        assert_eq!(adapter.instance_count(), 2);

        let accounts = adapter.get_accounts("cosmoshub-4").await.unwrap();
        assert_eq!(accounts, hub);
    }

    #[tokio::test]
    async fn signing_returns_pubkey_and_signature() {
        let fx = fixture().await;
        unlock(&fx.ctx).await;
        let adapter = CosmosAdapter::new(fx.ctx.clone());
        let address = adapter.get_offline_signer("cosmoshub-4").await.unwrap()[0]
            .address
            .clone();

        let direct = adapter
            .sign_direct("cosmoshub-4", &address, sign_doc())
            .await
            .unwrap();
        assert_eq!(direct.signed, sign_doc());

        let amino = adapter
            .sign_amino(
                "cosmoshub-4",
                &address,
                json!({"chain_id": "cosmoshub-4", "memo": "", "msgs": []}),
            )
            .await
            .unwrap();
        assert_eq!(amino.signature.pub_key, direct.signature.pub_key);

        let err = adapter
            .sign_direct("cosmoshub-4", "cosmos1someoneelse", sign_doc())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AddressMismatch));
    }

    #[tokio::test]
    async fn lock_drops_instances() {
        let fx = fixture().await;
        unlock(&fx.ctx).await;
        let adapter = CosmosAdapter::new(fx.ctx.clone());
        adapter.get_offline_signer("cosmoshub-4").await.unwrap();

        fx.ctx.keyring().lock().await.unwrap();
        let err = adapter.get_accounts("cosmoshub-4").await.unwrap_err();
        assert!(matches!(err, Error::Locked));
        assert_eq!(adapter.instance_count(), 0);
    }

    #[tokio::test]
    async fn unknown_or_foreign_chain_is_unsupported() {
        let fx = fixture().await;
        unlock(&fx.ctx).await;
        let adapter = CosmosAdapter::new(fx.ctx.clone());

        for chain in ["juno-1", "1"] {
            let err = adapter.get_offline_signer(chain).await.unwrap_err();
            assert!(matches!(err, Error::UnsupportedChain(_)));
        }
    }
}
