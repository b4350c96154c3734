//! Passphrase key derivation
//!
//! PBKDF2-HMAC-SHA256 with a fixed iteration count producing a 256-bit
//! AES-GCM key. These parameters are part of the vault format: every
//! persisted vault depends on them staying exactly as they are.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Error, Result};

pub const KDF_ITERATIONS: u32 = 100_000;
pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 16;

/// AES-256-GCM key material.
///
/// Zeroized on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Export as a JWK-style octet key for the session store
    pub fn export(&self) -> ExportedKey {
        ExportedKey {
            kty: "oct".to_string(),
            alg: "A256GCM".to_string(),
            k: URL_SAFE_NO_PAD.encode(self.0),
            ext: true,
        }
    }

    /// Re-import a key produced by [`SymmetricKey::export`]
    pub fn import(exported: &ExportedKey) -> Result<Self> {
        if exported.kty != "oct" || exported.alg != "A256GCM" {
            return Err(Error::Storage(format!(
                "unsupported exported key type {}/{}",
                exported.kty, exported.alg
            )));
        }
        let mut raw = URL_SAFE_NO_PAD
            .decode(&exported.k)
            .map_err(|e| Error::Storage(format!("invalid exported key: {e}")))?;
        if raw.len() != KEY_LEN {
            raw.zeroize();
            return Err(Error::Storage("exported key has wrong length".to_string()));
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&raw);
        raw.zeroize();
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SymmetricKey").field(&"[REDACTED]").finish()
    }
}

/// JWK-equivalent export of a [`SymmetricKey`]
#[derive(Clone, Serialize, Deserialize)]
pub struct ExportedKey {
    pub kty: String,
    pub alg: String,
    pub k: String,
    pub ext: bool,
}

impl Drop for ExportedKey {
    fn drop(&mut self) {
        self.k.zeroize();
    }
}

/// Derive the vault key for `passphrase` and `salt`.
///
/// # Panics
/// Panics if `salt` is not [`SALT_LEN`] bytes; callers always build salts
/// through [`salt_from_string`] or [`random_salt`].
pub fn derive_key(passphrase: &str, salt: &[u8]) -> SymmetricKey {
    assert_eq!(salt.len(), SALT_LEN, "salt must be {SALT_LEN} bytes");
    let mut out = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, KDF_ITERATIONS, &mut out);
    let key = SymmetricKey(out);
    out.zeroize();
    key
}

/// Deterministic salt: SHA-256 of the input truncated to 16 bytes
pub fn salt_from_string(input: &str) -> [u8; SALT_LEN] {
    let digest = Sha256::digest(input.as_bytes());
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&digest[..SALT_LEN]);
    salt
}

pub fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// [`derive_key`] on the blocking pool; PBKDF2 must not stall the runtime.
pub async fn derive_key_async(passphrase: String, salt: [u8; SALT_LEN]) -> Result<SymmetricKey> {
    let mut passphrase = passphrase;
    tokio::task::spawn_blocking(move || {
        let key = derive_key(&passphrase, &salt);
        passphrase.zeroize();
        key
    })
    .await
    .map_err(|e| Error::Storage(format!("key derivation task failed: {e}")))
}
