//! Keplr-style Cosmos provider

use serde_json::Value;
use std::sync::Arc;

use crate::bridge::{PageBridge, WalletRequest};
use crate::wallet::cosmos::{AccountData, AminoSignResponse, DirectSignResponse, SignDoc};
use crate::Result;

#[derive(Debug, Clone)]
pub struct CosmosProvider {
    bridge: Arc<PageBridge>,
}

impl CosmosProvider {
    pub fn new(bridge: Arc<PageBridge>) -> Self {
        Self { bridge }
    }

    pub async fn enable(&self, chain_id: &str) -> Result<()> {
        self.bridge
            .call(WalletRequest::Enable {
                chain_id: chain_id.to_string(),
            })
            .await?;
        Ok(())
    }

    /// Ask the background for a signer on `chain_id`
    pub async fn get_offline_signer(&self, chain_id: &str) -> Result<OfflineSigner> {
        let accounts = self
            .bridge
            .call(WalletRequest::GetOfflineSigner {
                chain_id: chain_id.to_string(),
            })
            .await?;
        Ok(OfflineSigner {
            bridge: self.bridge.clone(),
            chain_id: chain_id.to_string(),
            accounts: serde_json::from_value(accounts)?,
        })
    }
}

/// Proxy for the signer instance the background holds for one chain
#[derive(Debug, Clone)]
pub struct OfflineSigner {
    bridge: Arc<PageBridge>,
    chain_id: String,
    accounts: Vec<AccountData>,
}

impl OfflineSigner {
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Accounts returned when the signer was created
    pub fn initial_accounts(&self) -> &[AccountData] {
        &self.accounts
    }

    pub async fn get_accounts(&self) -> Result<Vec<AccountData>> {
        let accounts = self
            .bridge
            .call(WalletRequest::GetAccounts {
                chain_id: self.chain_id.clone(),
            })
            .await?;
        Ok(serde_json::from_value(accounts)?)
    }

    pub async fn sign_direct(
        &self,
        signer_address: &str,
        sign_doc: SignDoc,
    ) -> Result<DirectSignResponse> {
        let signed = self
            .bridge
            .call(WalletRequest::SignDirect {
                chain_id: self.chain_id.clone(),
                signer_address: signer_address.to_string(),
                sign_doc,
            })
            .await?;
        Ok(serde_json::from_value(signed)?)
    }

    pub async fn sign_amino(&self, signer_address: &str, sign_doc: Value) -> Result<AminoSignResponse> {
        let signed = self
            .bridge
            .call(WalletRequest::SignAmino {
                chain_id: self.chain_id.clone(),
                signer_address: signer_address.to_string(),
                sign_doc,
            })
            .await?;
        Ok(serde_json::from_value(signed)?)
    }
}
