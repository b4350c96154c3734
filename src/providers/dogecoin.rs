//! Dogecoin provider

use serde_json::Value;
use std::sync::Arc;

use crate::bridge::{PageBridge, WalletRequest};
use crate::wallet::dogecoin::{DogeSignature, TxInput, TxOutput};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct DogecoinProvider {
    bridge: Arc<PageBridge>,
}

impl DogecoinProvider {
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

    pub async fn sign_sha256(&self, chain_id: Option<&str>, message: &str) -> Result<DogeSignature> {
        let signed = self
            .bridge
            .call(WalletRequest::DogeSignSha256 {
                chain_id: chain_id.map(str::to_string),
                message: message.to_string(),
            })
            .await?;
        Ok(serde_json::from_value(signed)?)
    }

    pub async fn sign_tx(
        &self,
        chain_id: Option<&str>,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
    ) -> Result<DogeSignature> {
        let signed = self
            .bridge
            .call(WalletRequest::DogeSignTx {
                chain_id: chain_id.map(str::to_string),
                inputs,
                outputs,
            })
            .await?;
        Ok(serde_json::from_value(signed)?)
    }

    pub async fn get_address(&self, chain_id: Option<&str>) -> Result<String> {
        match self
            .bridge
            .call(WalletRequest::DogeGetAddress {
                chain_id: chain_id.map(str::to_string),
            })
            .await?
        {
            Value::String(address) => Ok(address),
            other => Err(Error::InvalidArgument(format!(
                "unexpected address response {other}"
            ))),
        }
    }
}
