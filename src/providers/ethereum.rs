//! EIP-1193 style provider

use serde_json::Value;
use std::sync::Arc;

use crate::bridge::{PageBridge, WalletRequest};
use crate::Result;

#[derive(Debug, Clone)]
pub struct EthereumProvider {
    bridge: Arc<PageBridge>,
}

impl EthereumProvider {
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

    pub async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.bridge
            .call(WalletRequest::EvmRequest {
                method: method.to_string(),
                params,
            })
            .await
    }

    /// Account 0, or `None` while the wallet is locked
    pub async fn selected_address(&self) -> Result<Option<String>> {
        let address = self.bridge.call(WalletRequest::EvmGetSelectedAddress).await?;
        Ok(address.as_str().map(str::to_string))
    }
}
