//! Encrypted vault records
//!
//! Values are sealed with AES-256-GCM under a fresh 96-bit IV per write.
//! Any failure to open a record (wrong key, tampered ciphertext, mangled
//! encoding) is reported as [`Error::InvalidPassword`] and nothing else.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zeroize::Zeroize;

use crate::kdf::{self, SymmetricKey, SALT_LEN};
use crate::storage::KeyValueStore;
use crate::{Error, Result};

/// Storage key of the wallet mnemonic
pub const MNEMONIC_KEY: &str = "mnemonic";

pub const IV_LEN: usize = 12;

/// Persisted ciphertext, base64 encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    pub encrypted: String,
    pub iv: String,
    /// Present only for records sealed with a one-off random salt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
}

impl VaultRecord {
    fn salt_bytes(&self) -> Option<[u8; SALT_LEN]> {
        let raw = STANDARD.decode(self.salt.as_ref()?).ok()?;
        raw.try_into().ok()
    }
}

/// Encrypt `value` under `key` with a fresh random IV
pub fn seal(value: &str, key: &SymmetricKey) -> Result<VaultRecord> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Storage(format!("cipher init: {e}")))?;
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), value.as_bytes())
        .map_err(|e| Error::Storage(format!("encrypt: {e}")))?;

    Ok(VaultRecord {
        encrypted: STANDARD.encode(ciphertext),
        iv: STANDARD.encode(iv),
        salt: None,
    })
}

/// Decrypt a record; every failure is [`Error::InvalidPassword`]
pub fn open(record: &VaultRecord, key: &SymmetricKey) -> Result<SecretString> {
    let ciphertext = STANDARD
        .decode(&record.encrypted)
        .map_err(|_| Error::InvalidPassword)?;
    let iv = STANDARD.decode(&record.iv).map_err(|_| Error::InvalidPassword)?;
    if iv.len() != IV_LEN {
        return Err(Error::InvalidPassword);
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| Error::InvalidPassword)?;
    let mut plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
        .map_err(|_| Error::InvalidPassword)?;

    match String::from_utf8(std::mem::take(&mut plaintext)) {
        Ok(value) => Ok(SecretString::from(value)),
        Err(e) => {
            e.into_bytes().zeroize();
            Err(Error::InvalidPassword)
        }
    }
}

/// Named encrypted records on top of a [`KeyValueStore`]
#[derive(Clone)]
pub struct Vault {
    store: Arc<dyn KeyValueStore>,
}

impl Vault {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Seal `value` and persist it under `name`
    pub async fn encrypt(&self, name: &str, value: &str, key: &SymmetricKey) -> Result<VaultRecord> {
        let record = seal(value, key)?;
        self.put(name, &record).await?;
        tracing::debug!(name, "Stored encrypted record");
        Ok(record)
    }

    /// Decrypt the record stored under `name`; `Ok(None)` if there is none
    pub async fn decrypt(&self, name: &str, key: &SymmetricKey) -> Result<Option<SecretString>> {
        match self.record(name).await? {
            Some(record) => open(&record, key).map(Some),
            None => Ok(None),
        }
    }

    /// Seal under a one-off key derived from `passphrase` and a random salt
    pub async fn encrypt_with_passphrase(
        &self,
        name: &str,
        value: &str,
        passphrase: &str,
    ) -> Result<VaultRecord> {
        let salt = kdf::random_salt();
        let key = kdf::derive_key_async(passphrase.to_string(), salt).await?;
        let mut record = seal(value, &key)?;
        record.salt = Some(STANDARD.encode(salt));
        self.put(name, &record).await?;
        Ok(record)
    }

    /// Open a record with a passphrase, using its stored salt when it has
    /// one and the deterministic passphrase salt otherwise
    pub async fn decrypt_with_passphrase(
        &self,
        name: &str,
        passphrase: &str,
    ) -> Result<Option<SecretString>> {
        let Some(record) = self.record(name).await? else {
            return Ok(None);
        };
        let salt = match record.salt {
            Some(_) => record.salt_bytes().ok_or(Error::InvalidPassword)?,
            None => kdf::salt_from_string(passphrase),
        };
        let key = kdf::derive_key_async(passphrase.to_string(), salt).await?;
        open(&record, &key).map(Some)
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        self.store.contains(name).await
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        self.store.remove(name).await
    }

    pub async fn record(&self, name: &str) -> Result<Option<VaultRecord>> {
        match self.store.get(name).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| Error::Storage(format!("record {name} is unreadable: {e}"))),
            None => Ok(None),
        }
    }

    async fn put(&self, name: &str, record: &VaultRecord) -> Result<()> {
        self.store.set(name, serde_json::to_value(record)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::{derive_key, salt_from_string};
    use crate::storage::MemoryStore;
    use secrecy::ExposeSecret;

    const PHRASE: &str = "abandon ability able about above absent absorb abstract absurd abuse access zoo";

    fn key(passphrase: &str) -> SymmetricKey {
        derive_key(passphrase, &salt_from_string(passphrase))
    }

    #[test]
    fn seal_open_round_trip() {
        let k = key("correct-horse-battery-staple-123!");
        let record = seal(PHRASE, &k).unwrap();
        assert_eq!(open(&record, &k).unwrap().expose_secret(), PHRASE);
    }

    #[test]
    fn wrong_key_is_invalid_password() {
        let salt = salt_from_string("shared");
        let record = seal(PHRASE, &derive_key("first", &salt)).unwrap();
        let err = open(&record, &derive_key("second", &salt)).unwrap_err();
        assert!(matches!(err, Error::InvalidPassword));
    }

    #[test]
    fn tampering_is_indistinguishable_from_wrong_password() {
        let k = SymmetricKey::from_bytes([3u8; 32]);
        let mut record = seal(PHRASE, &k).unwrap();
        let mut raw = STANDARD.decode(&record.encrypted).unwrap();
        raw[0] ^= 0xff;
        record.encrypted = STANDARD.encode(raw);
        assert!(matches!(open(&record, &k), Err(Error::InvalidPassword)));

        record.iv = "not base64!".to_string();
        assert!(matches!(open(&record, &k), Err(Error::InvalidPassword)));
    }

    #[test]
    fn every_seal_uses_a_fresh_iv() {
        let k = SymmetricKey::from_bytes([9u8; 32]);
        let a = seal(PHRASE, &k).unwrap();
        let b = seal(PHRASE, &k).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.encrypted, b.encrypted);
    }

    #[test]
    fn record_wire_format() {
        let k = SymmetricKey::from_bytes([1u8; 32]);
        let value = serde_json::to_value(seal("x", &k).unwrap()).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("encrypted"));
        assert!(obj.contains_key("iv"));
        assert!(!obj.contains_key("salt"));
    }

    #[tokio::test]
    async fn vault_persists_and_checks_existence() {
        let vault = Vault::new(Arc::new(MemoryStore::new()));
        let k = SymmetricKey::from_bytes([5u8; 32]);

        assert!(!vault.exists(MNEMONIC_KEY).await.unwrap());
        assert!(vault.decrypt(MNEMONIC_KEY, &k).await.unwrap().is_none());

        vault.encrypt(MNEMONIC_KEY, PHRASE, &k).await.unwrap();
        assert!(vault.exists(MNEMONIC_KEY).await.unwrap());
        let opened = vault.decrypt(MNEMONIC_KEY, &k).await.unwrap().unwrap();
        assert_eq!(opened.expose_secret(), PHRASE);
    }

    #[tokio::test]
    async fn passphrase_sealed_records_carry_their_salt() {
        let vault = Vault::new(Arc::new(MemoryStore::new()));
        let record = vault
            .encrypt_with_passphrase("backup", PHRASE, "pw")
            .await
            .unwrap();
        assert!(record.salt.is_some());

        let opened = vault
            .decrypt_with_passphrase("backup", "pw")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(opened.expose_secret(), PHRASE);

        let err = vault
            .decrypt_with_passphrase("backup", "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPassword));
    }
}
