//! RPC endpoint overrides
//!
//! The chain registry carries a default `rpc` per chain. Operators can
//! replace it from the environment:
//! 1. Per-chain env vars (`ETH_RPC_URL`, `SEPOLIA_RPC_URL`, ...) - highest priority
//! 2. Generic `ONLY_RPC_URL_<CHAINID>` (chain id upper-cased, `-` as `_`)
//! 3. `ALCHEMY_API_KEY` - builds URLs for the EVM chains Alchemy serves
//!
//! ```bash
//! export ETH_RPC_URL="https://eth-mainnet.g.alchemy.com/v2/YOUR_KEY"
//! export ONLY_RPC_URL_COSMOSHUB_4="https://rpc.cosmos.example"
//! ```

use std::collections::HashMap;

/// Prefix of the generic per-chain override variable
pub const GENERIC_PREFIX: &str = "ONLY_RPC_URL_";

/// Well-known chain ids with a dedicated env var
pub mod chains {
    pub const ETHEREUM: &str = "1";
    pub const SEPOLIA: &str = "11155111";
    pub const BASE: &str = "8453";
    pub const COSMOS_HUB: &str = "cosmoshub-4";
    pub const OSMOSIS: &str = "osmosis-1";
}

mod env_vars {
    pub const ETH_RPC_URL: &str = "ETH_RPC_URL";
    pub const SEPOLIA_RPC_URL: &str = "SEPOLIA_RPC_URL";
    pub const BASE_RPC_URL: &str = "BASE_RPC_URL";
    pub const COSMOS_RPC_URL: &str = "COSMOS_RPC_URL";
    pub const OSMOSIS_RPC_URL: &str = "OSMOSIS_RPC_URL";

    pub const ALCHEMY_API_KEY: &str = "ALCHEMY_API_KEY";
}

const DEDICATED: [(&str, &str); 5] = [
    (env_vars::ETH_RPC_URL, chains::ETHEREUM),
    (env_vars::SEPOLIA_RPC_URL, chains::SEPOLIA),
    (env_vars::BASE_RPC_URL, chains::BASE),
    (env_vars::COSMOS_RPC_URL, chains::COSMOS_HUB),
    (env_vars::OSMOSIS_RPC_URL, chains::OSMOSIS),
];

/// Env var name of the generic override for `chain_id`
pub fn generic_var(chain_id: &str) -> String {
    format!("{GENERIC_PREFIX}{}", chain_id.to_uppercase().replace('-', "_"))
}

/// RPC URLs indexed by chain id
#[derive(Debug, Clone, Default)]
pub struct RpcOverrides {
    urls: HashMap<String, String>,
    generic: HashMap<String, String>,
}

impl RpcOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok(), std::env::vars())
    }

    /// Build from a variable lookup plus the full variable listing (for the
    /// generic prefix scan)
    pub fn from_lookup<F, I>(lookup: F, vars: I) -> Self
    where
        F: Fn(&str) -> Option<String>,
        I: IntoIterator<Item = (String, String)>,
    {
        let mut urls = HashMap::new();

        for (var, chain_id) in DEDICATED {
            if let Some(url) = lookup(var) {
                tracing::debug!(var, chain_id, "Using RPC override");
                urls.insert(chain_id.to_string(), url);
            }
        }

        if let Some(key) = lookup(env_vars::ALCHEMY_API_KEY) {
            tracing::info!("Building EVM RPC URLs from ALCHEMY_API_KEY");
            urls.entry(chains::ETHEREUM.to_string())
                .or_insert_with(|| format!("https://eth-mainnet.g.alchemy.com/v2/{key}"));
            urls.entry(chains::SEPOLIA.to_string())
                .or_insert_with(|| format!("https://eth-sepolia.g.alchemy.com/v2/{key}"));
            urls.entry(chains::BASE.to_string())
                .or_insert_with(|| format!("https://base-mainnet.g.alchemy.com/v2/{key}"));
        }

        let generic = vars
            .into_iter()
            .filter(|(name, _)| name.starts_with(GENERIC_PREFIX))
            .collect();

        Self { urls, generic }
    }

    /// Create with explicit RPC URLs
    pub fn with_urls(urls: HashMap<String, String>) -> Self {
        Self {
            urls,
            generic: HashMap::new(),
        }
    }

    /// Override URL for a chain, dedicated vars first
    pub fn get(&self, chain_id: &str) -> Option<&str> {
        self.urls
            .get(chain_id)
            .or_else(|| self.generic.get(&generic_var(chain_id)))
            .map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty() && self.generic.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> RpcOverrides {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let listing = vars.clone();
        RpcOverrides::from_lookup(|name| vars.get(name).cloned(), listing)
    }

    #[test]
    fn dedicated_vars_map_to_chain_ids() {
        let config = overrides(&[("ETH_RPC_URL", "https://eth.example"), ("SEPOLIA_RPC_URL", "https://sep.example")]);
        assert_eq!(config.get("1"), Some("https://eth.example"));
        assert_eq!(config.get("11155111"), Some("https://sep.example"));
        assert_eq!(config.get("8453"), None);
    }

    #[test]
    fn generic_var_handles_cosmos_ids() {
        assert_eq!(generic_var("juno-1"), "ONLY_RPC_URL_JUNO_1");
        let config = overrides(&[("ONLY_RPC_URL_JUNO_1", "https://juno.example")]);
        assert_eq!(config.get("juno-1"), Some("https://juno.example"));
    }

    #[test]
    fn dedicated_beats_alchemy_and_generic() {
        let config = overrides(&[
            ("ETH_RPC_URL", "https://eth.example"),
            ("ALCHEMY_API_KEY", "k"),
            ("ONLY_RPC_URL_1", "https://generic.example"),
        ]);
        assert_eq!(config.get("1"), Some("https://eth.example"));
        assert_eq!(config.get("8453"), Some("https://base-mainnet.g.alchemy.com/v2/k"));
    }

    #[test]
    fn empty_environment_has_no_overrides() {
        assert!(overrides(&[]).is_empty());
    }
}
