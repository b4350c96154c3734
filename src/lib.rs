//! Only Wallet security core
//!
//! Key custody and signing for a multi-chain browser wallet:
//! - Passphrase-derived keys (PBKDF2-SHA256) and an AES-GCM vault for the mnemonic
//! - A process-wide session key with a one hour lifetime
//! - A correlated request/response bridge between the page and the background
//! - Cosmos, EVM and Dogecoin signer adapters
//!
//! # Security Model
//!
//! - The mnemonic is decrypted per operation and dropped right after use
//! - Page-side providers only ever hold proxies; keys never cross the bridge
//! - Every signing path fails with `Locked` before touching the vault
//! - Errors leaving the background carry a code and a sanitized message

pub mod adapters;
pub mod background;
pub mod bridge;
pub mod chains;
pub mod config;
pub mod interceptors;
pub mod kdf;
pub mod keyring;
pub mod providers;
pub mod rpc;
pub mod session;
pub mod storage;
pub mod vault;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use background::WalletBackend;
pub use chains::{ChainConfig, ChainRegistry, ChainType};
pub use config::{Config, RpcOverrides, PASSPHRASE_ENV};
pub use error::{Error, ErrorCode, Result};
pub use keyring::Keyring;
pub use providers::Providers;
pub use session::SessionKeyManager;
