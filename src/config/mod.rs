//! Configuration for the wallet core

pub mod rpc;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

pub use rpc::RpcOverrides;

/// Passphrase environment variable used by the CLI
pub const PASSPHRASE_ENV: &str = "ONLY_WALLET_PASSPHRASE";

/// File name of the persistent local store inside `data_dir`
pub const LOCAL_STORE_FILE: &str = "local.json";

/// Where the chain registry is loaded from.
///
/// `url` wins over `file`; with neither, the registry bundled into the
/// binary is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySettings {
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Bound on every page-to-background round trip
    pub timeout_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Mirror the unlocked key into the session store
    pub persist: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { persist: true }
    }
}

/// Relay policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySettings {
    /// EVM request methods the relay refuses outright
    #[serde(default)]
    pub blocked_methods: Vec<String>,
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the local store
    pub data_dir: PathBuf,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub policy: PolicySettings,
    /// Path to audit log file
    #[serde(default)]
    pub audit_log_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".only-wallet"),
            registry: RegistrySettings::default(),
            bridge: BridgeSettings::default(),
            session: SessionSettings::default(),
            policy: PolicySettings::default(),
            audit_log_path: None,
        }
    }
}

impl Config {
    /// Read a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bridge.timeout_ms == 0 {
            return Err(Error::Config("bridge.timeout_ms must be positive".into()));
        }
        if let Some(url) = &self.registry.url {
            url::Url::parse(url)
                .map_err(|e| Error::Config(format!("invalid registry url {url}: {e}")))?;
        }
        Ok(())
    }

    pub fn local_store_path(&self) -> PathBuf {
        self.data_dir.join(LOCAL_STORE_FILE)
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_millis(self.bridge.timeout_ms)
    }
}
