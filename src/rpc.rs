//! Blockchain RPC collaborator
//!
//! Adapters treat the network as an opaque query/broadcast service. The
//! production implementation is an alloy HTTP provider; tests plug in a
//! canned one through [`RpcConnector`].

use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use async_trait::async_trait;
use std::sync::Arc;

use crate::{Error, Result};

/// Numeric and broadcast plumbing for one chain endpoint
#[async_trait]
pub trait BlockchainRpc: Send + Sync {
    async fn gas_price(&self) -> Result<u128>;
    async fn transaction_count(&self, address: Address) -> Result<u64>;
    async fn balance(&self, address: Address) -> Result<U256>;
    async fn chain_id(&self) -> Result<u64>;
    /// Broadcast a signed, EIP-2718 encoded transaction
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256>;
}

/// Builds an RPC client for an endpoint URL
pub trait RpcConnector: Send + Sync {
    fn connect(&self, url: &str) -> Result<Arc<dyn BlockchainRpc>>;
}

/// alloy HTTP provider
pub struct AlloyRpc {
    provider: DynProvider,
    url: url::Url,
}

impl AlloyRpc {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| Error::Rpc(format!("Invalid RPC URL: {e}")))?;
        let provider = ProviderBuilder::new().connect_http(url.clone()).erased();
        Ok(Self { provider, url })
    }
}

impl std::fmt::Debug for AlloyRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlloyRpc").field("url", &self.url.host_str()).finish()
    }
}

#[async_trait]
impl BlockchainRpc for AlloyRpc {
    async fn gas_price(&self) -> Result<u128> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| Error::Rpc(format!("Failed to get gas price: {e}")))
    }

    async fn transaction_count(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .await
            .map_err(|e| Error::Rpc(format!("Failed to get nonce: {e}")))
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| Error::Rpc(format!("Failed to get balance: {e}")))
    }

    async fn chain_id(&self) -> Result<u64> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| Error::Rpc(format!("Failed to get chain id: {e}")))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| Error::Rpc(format!("Failed to broadcast transaction: {e}")))?;
        let hash = *pending.tx_hash();
        tracing::info!(tx_hash = %hash, "Transaction broadcast");
        Ok(hash)
    }
}

/// Connects [`AlloyRpc`] clients
#[derive(Debug, Default, Clone, Copy)]
pub struct AlloyConnector;

impl RpcConnector for AlloyConnector {
    fn connect(&self, url: &str) -> Result<Arc<dyn BlockchainRpc>> {
        Ok(Arc::new(AlloyRpc::new(url)?))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use parking_lot::Mutex;

    /// Canned responses; records every broadcast
    #[derive(Debug)]
    pub struct MockRpc {
        pub gas_price: u128,
        pub nonce: u64,
        pub balance: U256,
        pub chain_id: u64,
        pub sent: Mutex<Vec<Vec<u8>>>,
        pub connected_to: Mutex<Vec<String>>,
    }

    impl Default for MockRpc {
        fn default() -> Self {
            Self {
                gas_price: 20_000_000_000,
                nonce: 7,
                balance: U256::from(1_500_000_000_000_000_000u128),
                chain_id: 1,
                sent: Mutex::new(Vec::new()),
                connected_to: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BlockchainRpc for MockRpc {
        async fn gas_price(&self) -> Result<u128> {
            Ok(self.gas_price)
        }

        async fn transaction_count(&self, _address: Address) -> Result<u64> {
            Ok(self.nonce)
        }

        async fn balance(&self, _address: Address) -> Result<U256> {
            Ok(self.balance)
        }

        async fn chain_id(&self) -> Result<u64> {
            Ok(self.chain_id)
        }

        async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
            self.sent.lock().push(raw.to_vec());
            Ok(alloy::primitives::keccak256(raw))
        }
    }

    /// Hands out the same [`MockRpc`] for every URL
    #[derive(Debug, Clone, Default)]
    pub struct MockConnector(pub Arc<MockRpc>);

    impl RpcConnector for MockConnector {
        fn connect(&self, url: &str) -> Result<Arc<dyn BlockchainRpc>> {
            self.0.connected_to.lock().push(url.to_string());
            Ok(self.0.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_url() {
        assert!(matches!(AlloyRpc::new("not a url"), Err(Error::Rpc(_))));
    }

    #[tokio::test]
    async fn connector_builds_client_without_network() {
        let rpc = AlloyConnector.connect("http://127.0.0.1:8545");
        assert!(rpc.is_ok());
    }
}
