//! BIP-39 / BIP-44 key derivation
//!
//! Only account 0, external chain, index 0 is derived for each family.

use bip32::{DerivationPath, XPrv};
use bip39::Mnemonic;
use k256::ecdsa::SigningKey;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use zeroize::Zeroize;

use crate::{Error, Result};

pub const COSMOS_PATH: &str = "m/44'/118'/0'/0/0";
pub const ETHEREUM_PATH: &str = "m/44'/60'/0'/0/0";
pub const DOGECOIN_PATH: &str = "m/44'/3'/0'/0/0";

/// Derive the secp256k1 key at `path` from a BIP-39 phrase (empty BIP-39 passphrase)
pub fn derive_signing_key(phrase: &SecretString, path: &str) -> Result<SigningKey> {
    let mnemonic = Mnemonic::parse_normalized(phrase.expose_secret())
        .map_err(|e| Error::Signing(format!("invalid mnemonic: {e}")))?;
    let derivation_path = DerivationPath::from_str(path)
        .map_err(|e| Error::Signing(format!("invalid derivation path {path}: {e}")))?;

    let mut seed = mnemonic.to_seed("");
    let child = XPrv::derive_from_path(&seed, &derivation_path);
    seed.zeroize();

    let child = child.map_err(|e| Error::Signing(format!("key derivation failed: {e}")))?;
    Ok(child.private_key().clone())
}

/// Compressed SEC1 public key
pub fn compressed_pubkey(key: &SigningKey) -> [u8; 33] {
    let point = key.verifying_key().to_encoded_point(true);
    let mut out = [0u8; 33];
    out.copy_from_slice(point.as_bytes());
    out
}

/// RIPEMD-160(SHA-256(data))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let digest = ripemd::Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}
