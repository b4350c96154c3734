//! Background context
//!
//! The only place that holds key material. [`WalletBackend`] owns the
//! keyring and the three chain adapters and serves typed requests coming
//! off the relay through a single dispatcher.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::adapters::{AdapterContext, CosmosAdapter, DogecoinAdapter, EvmAdapter};
use crate::bridge::{Relay, RequestHandler, WalletRequest};
use crate::chains::{ChainSource, ChainType, FileChainSource, HttpChainSource, StaticChainSource};
use crate::config::{Config, RegistrySettings, RpcOverrides};
use crate::interceptors::{AuditLogInterceptor, MethodPolicy, PolicyInterceptor};
use crate::keyring::Keyring;
use crate::rpc::{AlloyConnector, RpcConnector};
use crate::session::{SessionKeyManager, SystemClock};
use crate::storage::{JsonFileStore, KeyValueStore, MemoryStore};
use crate::Result;

pub struct WalletBackend {
    ctx: Arc<AdapterContext>,
    cosmos: CosmosAdapter,
    evm: EvmAdapter,
    dogecoin: DogecoinAdapter,
}

impl WalletBackend {
    pub fn new(ctx: Arc<AdapterContext>, connector: Arc<dyn RpcConnector>) -> Self {
        Self {
            cosmos: CosmosAdapter::new(ctx.clone()),
            evm: EvmAdapter::new(ctx.clone(), connector),
            dogecoin: DogecoinAdapter::new(ctx.clone()),
            ctx,
        }
    }

    /// Wire stores, registry and RPC from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let local: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(config.local_store_path()));
        let session_store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let session = Arc::new(SessionKeyManager::new(
            Arc::new(SystemClock),
            config.session.persist.then(|| session_store.clone()),
        ));
        let ctx = AdapterContext::new(
            Keyring::new(session, local),
            chain_source(&config.registry)?,
            RpcOverrides::from_env(),
            session_store,
        );
        debug!(data_dir = %config.data_dir.display(), "Wallet backend configured");
        Ok(Self::new(Arc::new(ctx), Arc::new(AlloyConnector)))
    }

    pub fn keyring(&self) -> &Keyring {
        self.ctx.keyring()
    }

    pub fn context(&self) -> &Arc<AdapterContext> {
        &self.ctx
    }

    /// Lock the session and drop every derived signer
    pub async fn lock(&self) -> Result<()> {
        self.ctx.keyring().lock().await?;
        self.cosmos.clear();
        info!("Wallet locked");
        Ok(())
    }

    /// Relay in front of this backend with the configured interceptors
    pub fn relay(self: &Arc<Self>, config: &Config) -> Relay {
        let mut relay = Relay::new(self.clone()).with_interceptor(Arc::new(
            PolicyInterceptor::new(MethodPolicy::from_settings(&config.policy)),
        ));
        if let Some(path) = &config.audit_log_path {
            relay = relay.with_interceptor(Arc::new(AuditLogInterceptor::new(path)));
        }
        relay
    }

    /// One registry load per call; the adapter sees the same record
    async fn enable(&self, chain_id: &str) -> Result<Value> {
        let registry = self.ctx.registry().await?;
        let chain = registry.require(chain_id)?;
        match chain.chain_type {
            ChainType::Cosmos => self.cosmos.enable(chain).await?,
            ChainType::Evm => self.evm.enable(chain).await?,
            ChainType::Dogecoin => self.dogecoin.enable(chain).await?,
        }
        Ok(Value::Null)
    }
}

#[async_trait]
impl RequestHandler for WalletBackend {
    async fn handle(&self, request: WalletRequest) -> Result<Value> {
        match request {
            WalletRequest::Enable { chain_id } => self.enable(&chain_id).await,
            WalletRequest::GetOfflineSigner { chain_id } => {
                Ok(json!(self.cosmos.get_offline_signer(&chain_id).await?))
            }
            WalletRequest::GetAccounts { chain_id } => {
                Ok(json!(self.cosmos.get_accounts(&chain_id).await?))
            }
            WalletRequest::SignDirect {
                chain_id,
                signer_address,
                sign_doc,
            } => Ok(serde_json::to_value(
                self.cosmos
                    .sign_direct(&chain_id, &signer_address, sign_doc)
                    .await?,
            )?),
            WalletRequest::SignAmino {
                chain_id,
                signer_address,
                sign_doc,
            } => Ok(serde_json::to_value(
                self.cosmos
                    .sign_amino(&chain_id, &signer_address, sign_doc)
                    .await?,
            )?),
            WalletRequest::EvmRequest { method, params } => {
                self.evm.request(&method, &params).await
            }
            WalletRequest::EvmGetSelectedAddress => self.evm.get_selected_address().await,
            WalletRequest::DogeSignSha256 { chain_id, message } => {
                self.dogecoin
                    .sign_sha256(chain_id.as_deref(), &message)
                    .await
            }
            WalletRequest::DogeSignTx {
                chain_id,
                inputs,
                outputs,
            } => {
                self.dogecoin
                    .sign_tx(chain_id.as_deref(), &inputs, &outputs)
                    .await
            }
            WalletRequest::DogeGetAddress { chain_id } => {
                self.dogecoin.get_address(chain_id.as_deref()).await
            }
        }
    }
}

/// `url` over `file` over the bundled registry
pub fn chain_source(settings: &RegistrySettings) -> Result<Arc<dyn ChainSource>> {
    if let Some(url) = &settings.url {
        return Ok(Arc::new(HttpChainSource::new(url)?));
    }
    if let Some(path) = &settings.file {
        return Ok(Arc::new(FileChainSource::new(path)));
    }
    Ok(Arc::new(StaticChainSource::bundled()?))
}
