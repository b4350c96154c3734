//! Chain registry
//!
//! The registry is a static list of chain records (`chains.json`). It is
//! loaded fresh for every operation that needs it and never cached across
//! calls, so a registry update is picked up by the next request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::RpcOverrides;
use crate::{Error, Result};

/// Chain family, which decides the adapter that serves the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    Cosmos,
    Evm,
    Dogecoin,
}

/// One registry record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: String,
    #[serde(rename = "type")]
    pub chain_type: ChainType,
    /// Bech32 prefix (Cosmos chains)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc: Option<String>,
}

/// Registry contents keyed by chain id
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: HashMap<String, ChainConfig>,
}

impl ChainRegistry {
    pub fn from_configs(configs: impl IntoIterator<Item = ChainConfig>) -> Self {
        let chains = configs
            .into_iter()
            .map(|cfg| (cfg.chain_id.clone(), cfg))
            .collect();
        Self { chains }
    }

    pub fn get(&self, chain_id: &str) -> Option<&ChainConfig> {
        self.chains.get(chain_id)
    }

    /// Look up a chain, failing with `UnsupportedChain`
    pub fn require(&self, chain_id: &str) -> Result<&ChainConfig> {
        self.get(chain_id)
            .ok_or_else(|| Error::UnsupportedChain(chain_id.to_string()))
    }

    /// Look up a chain of a specific family
    pub fn require_type(&self, chain_id: &str, chain_type: ChainType) -> Result<&ChainConfig> {
        match self.get(chain_id) {
            Some(cfg) if cfg.chain_type == chain_type => Ok(cfg),
            _ => Err(Error::UnsupportedChain(chain_id.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Records sorted by chain id
    pub fn configs(&self) -> Vec<&ChainConfig> {
        let mut configs: Vec<_> = self.chains.values().collect();
        configs.sort_by(|a, b| a.chain_id.cmp(&b.chain_id));
        configs
    }

    /// Replace registry RPC endpoints with environment overrides
    pub fn with_rpc_overrides(mut self, overrides: &RpcOverrides) -> Self {
        for cfg in self.chains.values_mut() {
            if let Some(url) = overrides.get(&cfg.chain_id) {
                cfg.rpc = Some(url.to_string());
            }
        }
        self
    }
}

/// Where the registry comes from
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn load(&self) -> Result<ChainRegistry>;
}

/// Registry compiled into the binary
pub const BUNDLED_REGISTRY: &str = include_str!("../assets/chains.json");

fn parse_configs(content: &str) -> Result<Vec<ChainConfig>> {
    serde_json::from_str(content)
        .map_err(|e| Error::Registry(format!("invalid chain registry: {e}")))
}

fn parse_registry(content: &str) -> Result<ChainRegistry> {
    Ok(ChainRegistry::from_configs(parse_configs(content)?))
}

/// `chains.json` on disk
#[derive(Debug, Clone)]
pub struct FileChainSource {
    path: PathBuf,
}

impl FileChainSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ChainSource for FileChainSource {
    async fn load(&self) -> Result<ChainRegistry> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::Registry(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let registry = parse_registry(&content)?;
        tracing::debug!(path = %self.path.display(), chains = registry.len(), "Loaded chain registry");
        Ok(registry)
    }
}

/// Registry fetched over HTTP
#[derive(Debug, Clone)]
pub struct HttpChainSource {
    url: url::Url,
    client: reqwest::Client,
}

impl HttpChainSource {
    pub fn new(url: &str) -> Result<Self> {
        let url = url
            .parse()
            .map_err(|e| Error::Config(format!("invalid registry url {url}: {e}")))?;
        Ok(Self {
            url,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl ChainSource for HttpChainSource {
    async fn load(&self) -> Result<ChainRegistry> {
        let configs: Vec<ChainConfig> = self
            .client
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        tracing::debug!(url = %self.url, chains = configs.len(), "Fetched chain registry");
        Ok(ChainRegistry::from_configs(configs))
    }
}

/// Fixed in-memory registry
#[derive(Debug, Clone, Default)]
pub struct StaticChainSource {
    configs: Vec<ChainConfig>,
}

impl StaticChainSource {
    pub fn new(configs: Vec<ChainConfig>) -> Self {
        Self { configs }
    }

    pub fn bundled() -> Result<Self> {
        Ok(Self::new(parse_configs(BUNDLED_REGISTRY)?))
    }
}

#[async_trait]
impl ChainSource for StaticChainSource {
    async fn load(&self) -> Result<ChainRegistry> {
        Ok(ChainRegistry::from_configs(self.configs.clone()))
    }
}
