//! Dogecoin adapter
//!
//! Calls may name their chain; otherwise the chain recorded by the last
//! `enable` is used.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use super::AdapterContext;
use crate::chains::{ChainConfig, ChainType};
use crate::wallet::dogecoin::{TxInput, TxOutput};
use crate::wallet::DogecoinSigner;
use crate::Result;

pub struct DogecoinAdapter {
    ctx: Arc<AdapterContext>,
}

impl DogecoinAdapter {
    pub fn new(ctx: Arc<AdapterContext>) -> Self {
        Self { ctx }
    }

    /// Connect to a chain record the caller already resolved
    pub async fn enable(&self, chain: &ChainConfig) -> Result<()> {
        self.ctx.activate(chain, ChainType::Dogecoin).await
    }

    pub async fn sign_sha256(&self, chain_id: Option<&str>, message: &str) -> Result<Value> {
        let signer = self.signer(chain_id).await?;
        let signature = signer.sign_sha256(message.as_bytes())?;
        debug!(address = %signer.address(), "Signed dogecoin message");
        Ok(serde_json::to_value(signature)?)
    }

    pub async fn sign_tx(
        &self,
        chain_id: Option<&str>,
        inputs: &[TxInput],
        outputs: &[TxOutput],
    ) -> Result<Value> {
        let signer = self.signer(chain_id).await?;
        let signature = signer.sign_tx(inputs, outputs)?;
        debug!(
            inputs = inputs.len(),
            outputs = outputs.len(),
            "Signed dogecoin transaction"
        );
        Ok(serde_json::to_value(signature)?)
    }

    pub async fn get_address(&self, chain_id: Option<&str>) -> Result<Value> {
        Ok(json!(self.signer(chain_id).await?.address()))
    }

    async fn signer(&self, chain_id: Option<&str>) -> Result<DogecoinSigner> {
        let chain_id = match chain_id {
            Some(id) => id.to_string(),
            None => self.ctx.active().require(ChainType::Dogecoin).await?,
        };
        self.ctx.chain(&chain_id, ChainType::Dogecoin).await?;
        let phrase = self.ctx.mnemonic().await?;
        DogecoinSigner::from_mnemonic(&phrase)
    }
}
