//! Per-chain key material
//!
//! Everything here is built from the decrypted mnemonic for the duration of
//! one operation (Cosmos signers are kept in the adapter's instance table).
//! Private keys NEVER leave this module and are NEVER sent across the bridge.

pub mod cosmos;
pub mod dogecoin;
pub mod hd;
mod signer;

pub use cosmos::CosmosSigner;
pub use dogecoin::DogecoinSigner;
pub use signer::{signature_hex, SecureWallet};
