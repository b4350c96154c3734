//! EVM adapter
//!
//! Serves EIP-1193 style `request(method, params)` calls for the active EVM
//! chain. Account 0 (`m/44'/60'/0'/0/0`) is the only account exposed.

use alloy::consensus::TxLegacy;
use alloy::primitives::{keccak256, Address, Bytes, TxKind, U256};
use serde_json::{json, Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use super::AdapterContext;
use crate::chains::{ChainConfig, ChainType};
use crate::rpc::{BlockchainRpc, RpcConnector};
use crate::wallet::{signature_hex, SecureWallet};
use crate::{Error, Result};

/// Gas limit of a plain value transfer
pub const DEFAULT_GAS_LIMIT: u64 = 21_000;

pub struct EvmAdapter {
    ctx: Arc<AdapterContext>,
    connector: Arc<dyn RpcConnector>,
}

impl EvmAdapter {
    pub fn new(ctx: Arc<AdapterContext>, connector: Arc<dyn RpcConnector>) -> Self {
        Self { ctx, connector }
    }

    /// Connect to a chain record the caller already resolved
    pub async fn enable(&self, chain: &ChainConfig) -> Result<()> {
        self.ctx.activate(chain, ChainType::Evm).await
    }

    pub async fn request(&self, method: &str, params: &[Value]) -> Result<Value> {
        debug!(method = %method, "EVM request");
        match method {
            "eth_requestAccounts" | "eth_accounts" => {
                Ok(json!([self.wallet().await?.address_string()]))
            }
            "eth_chainId" => {
                let chain_id = self.ctx.active().require(ChainType::Evm).await?;
                Ok(json!(chain_id_hex(&chain_id)?))
            }
            "eth_getBalance" => self.get_balance(params).await,
            "eth_sendTransaction" => self.send_transaction(params).await,
            "personal_sign" => self.personal_sign(params).await,
            "eth_sign" => self.eth_sign(params).await,
            other => Err(Error::UnsupportedMethod(other.to_string())),
        }
    }

    /// Account 0, or `null` while there is no usable session
    pub async fn get_selected_address(&self) -> Result<Value> {
        match self.wallet().await {
            Ok(wallet) => Ok(json!(wallet.address_string())),
            Err(Error::Locked | Error::NoWallet | Error::InvalidPassword) => Ok(Value::Null),
            Err(e) => Err(e),
        }
    }

    async fn wallet(&self) -> Result<SecureWallet> {
        let phrase = self.ctx.mnemonic().await?;
        SecureWallet::from_mnemonic(&phrase)
    }

    async fn active_chain(&self) -> Result<ChainConfig> {
        let chain_id = self.ctx.active().require(ChainType::Evm).await?;
        self.ctx.chain(&chain_id, ChainType::Evm).await
    }

    fn rpc(&self, chain: &ChainConfig) -> Result<Arc<dyn BlockchainRpc>> {
        let url = chain
            .rpc
            .as_deref()
            .ok_or_else(|| Error::Rpc(format!("no RPC URL for chain {}", chain.chain_id)))?;
        self.connector.connect(url)
    }

    async fn get_balance(&self, params: &[Value]) -> Result<Value> {
        let chain = self.active_chain().await?;
        let address = match params.first().and_then(Value::as_str) {
            Some(address) => parse_address(address)?,
            None => self.wallet().await?.address(),
        };
        let balance = self.rpc(&chain)?.balance(address).await?;
        Ok(json!(format!("0x{balance:x}")))
    }

    async fn send_transaction(&self, params: &[Value]) -> Result<Value> {
        let request = params.first().and_then(Value::as_object).ok_or_else(|| {
            Error::InvalidArgument("eth_sendTransaction expects a transaction object".into())
        })?;
        let chain = self.active_chain().await?;
        let wallet = self.wallet().await?;
        if let Some(from) = request.get("from").and_then(Value::as_str) {
            if parse_address(from)? != wallet.address() {
                return Err(Error::AddressMismatch);
            }
        }

        let to = match request.get("to").and_then(Value::as_str) {
            Some(to) => TxKind::Call(parse_address(to)?),
            None => TxKind::Create,
        };
        let input = match request.get("data").or_else(|| request.get("input")) {
            Some(Value::String(data)) => Bytes::from(
                alloy::hex::decode(data)
                    .map_err(|e| Error::InvalidArgument(format!("invalid data: {e}")))?,
            ),
            _ => Bytes::new(),
        };
        let value = quantity(request, "value")?.unwrap_or(U256::ZERO);
        let gas_limit = match quantity(request, "gasLimit")?.or(quantity(request, "gas")?) {
            Some(gas) => to_u64(gas, "gas")?,
            None => DEFAULT_GAS_LIMIT,
        };

        let rpc = self.rpc(&chain)?;
        let gas_price = match quantity(request, "gasPrice")? {
            Some(price) => u128::try_from(price)
                .map_err(|_| Error::InvalidArgument("gasPrice out of range".into()))?,
            None => rpc.gas_price().await?,
        };
        let nonce = match quantity(request, "nonce")? {
            Some(nonce) => to_u64(nonce, "nonce")?,
            None => rpc.transaction_count(wallet.address()).await?,
        };
        let chain_id = rpc.chain_id().await?;

        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            input,
        };
        let raw = wallet.sign_legacy_tx(tx)?;
        let hash = rpc.send_raw_transaction(&raw).await?;
        info!(chain_id = chain_id, nonce = nonce, tx_hash = %hash, "Transaction sent");
        Ok(json!(hash.to_string()))
    }

    /// EIP-191 signature over the message bytes.
    ///
    /// A `0x`-prefixed message that decodes as hex is signed as those raw
    /// bytes, the way MetaMask treats it. Signing the literal string instead
    /// would cover its UTF-8 text, `0x` included, and yield a different
    /// signature.
    async fn personal_sign(&self, params: &[Value]) -> Result<Value> {
        let (message, address) = message_params("personal_sign", params)?;
        let wallet = self.wallet().await?;
        check_address(&wallet, address)?;
        let bytes = match message.strip_prefix("0x").map(alloy::hex::decode) {
            Some(Ok(bytes)) => bytes,
            _ => message.as_bytes().to_vec(),
        };
        Ok(json!(signature_hex(&wallet.sign_message(&bytes)?)))
    }

    /// EIP-191 signature over keccak256 of the UTF-8 message
    async fn eth_sign(&self, params: &[Value]) -> Result<Value> {
        let (message, address) = message_params("eth_sign", params)?;
        let wallet = self.wallet().await?;
        check_address(&wallet, address)?;
        let digest = keccak256(message.as_bytes());
        Ok(json!(signature_hex(&wallet.sign_message(digest.as_slice())?)))
    }
}

/// `"0x…"` form of a decimal chain id
pub fn chain_id_hex(chain_id: &str) -> Result<String> {
    let id: u64 = chain_id
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("chain id {chain_id} is not numeric")))?;
    Ok(format!("{id:#x}"))
}

fn message_params<'a>(method: &str, params: &'a [Value]) -> Result<(&'a str, &'a str)> {
    match params {
        [Value::String(message), Value::String(address), ..] => {
            Ok((message.as_str(), address.as_str()))
        }
        _ => Err(Error::InvalidArgument(format!(
            "{method} expects [message, address]"
        ))),
    }
}

fn parse_address(address: &str) -> Result<Address> {
    // Lowercase first so mixed-case input is not held to its checksum
    Address::from_str(&address.to_ascii_lowercase())
        .map_err(|_| Error::InvalidArgument(format!("invalid address {address}")))
}

fn check_address(wallet: &SecureWallet, address: &str) -> Result<()> {
    if parse_address(address)? != wallet.address() {
        return Err(Error::AddressMismatch);
    }
    Ok(())
}

/// Hex (`0x…`), decimal string or JSON number
fn quantity(request: &Map<String, Value>, field: &str) -> Result<Option<U256>> {
    let invalid = || Error::InvalidArgument(format!("invalid {field}"));
    match request.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(U256::from).map(Some).ok_or_else(invalid),
        Some(Value::String(s)) => {
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => U256::from_str_radix(hex, 16),
                None => U256::from_str_radix(s, 10),
            };
            parsed.map(Some).map_err(|_| invalid())
        }
        Some(_) => Err(invalid()),
    }
}

fn to_u64(value: U256, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::InvalidArgument(format!("{field} out of range")))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::rpc::mock::{MockConnector, MockRpc};
    use alloy::consensus::TxEnvelope;
    use alloy::eips::eip2718::Decodable2718;
    use alloy::primitives::Signature;

    const ADDRESS: &str = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94";

    async fn adapter() -> (EvmAdapter, Fixture, Arc<MockRpc>) {
        let fx = fixture().await;
        let rpc = Arc::new(MockRpc::default());
        let adapter = EvmAdapter::new(fx.ctx.clone(), Arc::new(MockConnector(rpc.clone())));
        (adapter, fx, rpc)
    }

    fn recover(signature: &Value, message: &[u8]) -> Address {
        let bytes = alloy::hex::decode(signature.as_str().unwrap()).unwrap();
        Signature::from_raw(&bytes)
            .unwrap()
            .recover_address_from_msg(message)
            .unwrap()
    }

    #[tokio::test]
    async fn accounts_require_session() {
        let (adapter, fx, _) = adapter().await;
        let err = adapter.request("eth_accounts", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Locked));
        assert_eq!(adapter.get_selected_address().await.unwrap(), Value::Null);

        unlock(&fx.ctx).await;
        assert_eq!(
            adapter.request("eth_requestAccounts", &[]).await.unwrap(),
            json!([ADDRESS])
        );
        assert_eq!(adapter.get_selected_address().await.unwrap(), json!(ADDRESS));
    }

    #[tokio::test]
    async fn chain_id_follows_enable() {
        let (adapter, fx, _) = adapter().await;
        assert!(matches!(
            adapter.request("eth_chainId", &[]).await,
            Err(Error::NoActiveChain)
        ));
        unlock(&fx.ctx).await;
        adapter
            .enable(&fx.ctx.chain("1", ChainType::Evm).await.unwrap())
            .await
            .unwrap();
        assert_eq!(adapter.request("eth_chainId", &[]).await.unwrap(), json!("0x1"));
    }

    #[tokio::test]
    async fn personal_sign_and_eth_sign_differ() {
        let (adapter, fx, _) = adapter().await;
        unlock(&fx.ctx).await;
        let lower = ADDRESS.to_lowercase();
        let params = [json!("hello"), json!(lower)];

        let personal = adapter.request("personal_sign", &params).await.unwrap();
        let eth = adapter.request("eth_sign", &params).await.unwrap();
        assert_ne!(personal, eth);

        let expected = Address::from_str(&lower).unwrap();
        assert_eq!(recover(&personal, b"hello"), expected);
        assert_eq!(recover(&eth, keccak256(b"hello").as_slice()), expected);

        // Hex messages are signed as bytes
        let hex = adapter
            .request("personal_sign", &[json!("0x68656c6c6f"), json!(ADDRESS)])
            .await
            .unwrap();
        assert_eq!(hex, personal);
    }

    #[tokio::test]
    async fn signing_rejects_foreign_address() {
        let (adapter, fx, _) = adapter().await;
        unlock(&fx.ctx).await;
        let err = adapter
            .request(
                "personal_sign",
                &[json!("hi"), json!("0x0000000000000000000000000000000000000001")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AddressMismatch));
    }

    #[tokio::test]
    async fn send_transaction_fills_defaults_from_rpc() {
        let (adapter, fx, rpc) = adapter().await;
        unlock(&fx.ctx).await;
        adapter
            .enable(&fx.ctx.chain("1", ChainType::Evm).await.unwrap())
            .await
            .unwrap();

        let to = "0x000000000000000000000000000000000000dEaD";
        let hash = adapter
            .request(
                "eth_sendTransaction",
                &[json!({"to": to, "value": "0xde0b6b3a7640000"})],
            )
            .await
            .unwrap();

        let sent = rpc.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(hash, json!(keccak256(&sent[0]).to_string()));
        assert_eq!(rpc.connected_to.lock().as_slice(), ["http://localhost:8545"]);

        let envelope = TxEnvelope::decode_2718(&mut sent[0].as_slice()).unwrap();
        let tx = envelope.as_legacy().unwrap().tx();
        assert_eq!(tx.nonce, 7);
        assert_eq!(tx.gas_price, 20_000_000_000);
        assert_eq!(tx.gas_limit, DEFAULT_GAS_LIMIT);
        assert_eq!(tx.chain_id, Some(1));
        assert_eq!(tx.value, U256::from(1_000_000_000_000_000_000u128));
        assert_eq!(tx.to, TxKind::Call(Address::from_str(&to.to_lowercase()).unwrap()));
    }

    #[tokio::test]
    async fn balance_of_account_zero() {
        let (adapter, fx, _) = adapter().await;
        unlock(&fx.ctx).await;
        adapter
            .enable(&fx.ctx.chain("1", ChainType::Evm).await.unwrap())
            .await
            .unwrap();
        assert_eq!(
            adapter.request("eth_getBalance", &[]).await.unwrap(),
            json!("0x14d1120d7b160000")
        );
    }

    #[tokio::test]
    async fn unknown_methods_are_unsupported() {
        let (adapter, _fx, _) = adapter().await;
        let err = adapter.request("eth_signTypedData_v4", &[]).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedMethod(m) if m == "eth_signTypedData_v4"));
    }

    #[test]
    fn chain_id_hex_formats() {
        assert_eq!(chain_id_hex("8453").unwrap(), "0x2105");
        assert!(chain_id_hex("cosmoshub-4").is_err());
    }
}
