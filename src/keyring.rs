//! Wallet keyring
//!
//! The keyring is what the popup talks to: it creates or imports the
//! wallet, unlocks and locks the session, and hands out the decrypted
//! mnemonic for the duration of a single signing call. It never caches
//! the plaintext.

use bip39::Mnemonic;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::kdf::SymmetricKey;
use crate::session::SessionKeyManager;
use crate::storage::KeyValueStore;
use crate::vault::{Vault, MNEMONIC_KEY};
use crate::{Error, Result};

/// Word counts accepted for a stored phrase
pub const ACCEPTED_WORD_COUNTS: [usize; 2] = [12, 24];

/// Generate a fresh BIP-39 phrase with `words` words
pub fn generate_mnemonic(words: usize) -> Result<SecretString> {
    let entropy_len = match words {
        12 => 16,
        24 => 32,
        _ => {
            return Err(Error::InvalidArgument(format!(
                "unsupported word count {words}, expected 12 or 24"
            )))
        }
    };
    let mut entropy = vec![0u8; entropy_len];
    rand::thread_rng().fill_bytes(&mut entropy);
    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|e| Error::InvalidArgument(format!("mnemonic generation failed: {e}")));
    entropy.zeroize();
    Ok(SecretString::from(mnemonic?.to_string()))
}

/// Normalize and validate a user-supplied phrase
pub fn validate_mnemonic(phrase: &str) -> Result<SecretString> {
    let normalized = phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let mnemonic = Mnemonic::parse_normalized(&normalized)
        .map_err(|e| Error::InvalidArgument(format!("invalid mnemonic: {e}")))?;
    if !ACCEPTED_WORD_COUNTS.contains(&mnemonic.word_count()) {
        return Err(Error::InvalidArgument(format!(
            "mnemonic must have 12 or 24 words, got {}",
            mnemonic.word_count()
        )));
    }
    Ok(SecretString::from(normalized))
}

fn looks_like_phrase(phrase: &SecretString) -> bool {
    let words = phrase.expose_secret().split(' ').count();
    ACCEPTED_WORD_COUNTS.contains(&words)
}

#[derive(Clone)]
pub struct Keyring {
    session: Arc<SessionKeyManager>,
    vault: Vault,
    local: Arc<dyn KeyValueStore>,
}

impl Keyring {
    pub fn new(session: Arc<SessionKeyManager>, local: Arc<dyn KeyValueStore>) -> Self {
        Self {
            session,
            vault: Vault::new(local.clone()),
            local,
        }
    }

    pub fn session(&self) -> &Arc<SessionKeyManager> {
        &self.session
    }

    pub async fn has_wallet(&self) -> Result<bool> {
        self.vault.exists(MNEMONIC_KEY).await
    }

    /// Create a new wallet and return its phrase for backup
    pub async fn create(&self, passphrase: &SecretString, words: usize) -> Result<SecretString> {
        let phrase = generate_mnemonic(words)?;
        self.store_phrase(passphrase, &phrase).await?;
        info!(words = words, "Created new wallet");
        Ok(phrase)
    }

    /// Import an existing phrase, replacing any stored wallet
    pub async fn import(&self, passphrase: &SecretString, phrase: &str) -> Result<()> {
        let phrase = validate_mnemonic(phrase)?;
        self.store_phrase(passphrase, &phrase).await?;
        info!("Imported wallet");
        Ok(())
    }

    async fn store_phrase(&self, passphrase: &SecretString, phrase: &SecretString) -> Result<()> {
        self.session.unlock(passphrase).await?;
        let key = self.session.get_key().await.ok_or(Error::Locked)?;
        self.vault
            .encrypt(MNEMONIC_KEY, phrase.expose_secret(), &key)
            .await?;
        Ok(())
    }

    /// Unlock and prove the passphrase by opening the vault.
    ///
    /// A passphrase that does not open the vault leaves the session locked.
    pub async fn unlock(&self, passphrase: &SecretString) -> Result<()> {
        if !self.has_wallet().await? {
            return Err(Error::NoWallet);
        }
        self.session.unlock(passphrase).await?;
        match self.mnemonic().await {
            Ok(phrase) if looks_like_phrase(&phrase) => Ok(()),
            Ok(_) | Err(Error::InvalidPassword) => {
                self.session.lock().await?;
                warn!("Unlock rejected");
                Err(Error::InvalidPassword)
            }
            Err(e) => {
                self.session.lock().await?;
                Err(e)
            }
        }
    }

    pub async fn lock(&self) -> Result<()> {
        self.session.lock().await
    }

    pub async fn is_unlocked(&self) -> bool {
        self.live_key().await.is_some()
    }

    /// Live session key, re-hydrated from the session store after a restart.
    ///
    /// Only the session store is read here, never the vault.
    async fn live_key(&self) -> Option<SymmetricKey> {
        if let Some(key) = self.session.get_key().await {
            return Some(key);
        }
        match self.session.restore().await {
            Ok(true) => self.session.get_key().await,
            Ok(false) => None,
            Err(e) => {
                warn!(error = %e, "Failed to restore session");
                None
            }
        }
    }

    /// Decrypt the stored phrase under the live session key.
    ///
    /// Fails with `Locked` without touching the vault when there is no live
    /// session. A key that does not open the vault is discarded.
    pub async fn mnemonic(&self) -> Result<SecretString> {
        let key = self.live_key().await.ok_or(Error::Locked)?;
        match self.vault.decrypt(MNEMONIC_KEY, &key).await {
            Ok(Some(phrase)) => Ok(phrase),
            Ok(None) => Err(Error::NoWallet),
            Err(Error::InvalidPassword) => {
                self.session.lock().await?;
                Err(Error::InvalidPassword)
            }
            Err(e) => Err(e),
        }
    }

    /// Wipe the local store and lock
    pub async fn reset(&self) -> Result<()> {
        self.local.clear().await?;
        self.session.lock().await?;
        info!("Wallet data cleared");
        Ok(())
    }
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyring")
            .field("session", &self.session)
            .field("vault", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SystemClock;
    use crate::storage::MemoryStore;

    const PASSPHRASE: &str = "correct-horse-battery-staple-123!";
    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn keyring() -> Keyring {
        let session = Arc::new(SessionKeyManager::new(
            Arc::new(SystemClock),
            Some(Arc::new(MemoryStore::new())),
        ));
        Keyring::new(session, Arc::new(MemoryStore::new()))
    }

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[tokio::test]
    async fn store_lock_unlock_returns_same_phrase() {
        let keyring = keyring();
        keyring.import(&secret(PASSPHRASE), PHRASE).await.unwrap();
        keyring.lock().await.unwrap();
        assert!(!keyring.is_unlocked().await);

        keyring.unlock(&secret(PASSPHRASE)).await.unwrap();
        let phrase = keyring.mnemonic().await.unwrap();
        assert_eq!(phrase.expose_secret(), PHRASE);
    }

    #[tokio::test]
    async fn wrong_passphrase_leaves_session_locked() {
        let keyring = keyring();
        keyring.import(&secret(PASSPHRASE), PHRASE).await.unwrap();
        keyring.lock().await.unwrap();

        let err = keyring.unlock(&secret("wrong")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPassword));
        assert!(!keyring.is_unlocked().await);
    }

    #[tokio::test]
    async fn mnemonic_requires_unlock() {
        let keyring = keyring();
        keyring.import(&secret(PASSPHRASE), PHRASE).await.unwrap();
        keyring.lock().await.unwrap();
        assert!(matches!(keyring.mnemonic().await, Err(Error::Locked)));
    }

    #[tokio::test]
    async fn restarted_keyring_picks_up_persisted_session() {
        let session_store = Arc::new(MemoryStore::new());
        let local = Arc::new(MemoryStore::new());
        let first = Keyring::new(
            Arc::new(SessionKeyManager::new(
                Arc::new(SystemClock),
                Some(session_store.clone()),
            )),
            local.clone(),
        );
        first.import(&secret(PASSPHRASE), PHRASE).await.unwrap();

        let restarted = Keyring::new(
            Arc::new(SessionKeyManager::new(
                Arc::new(SystemClock),
                Some(session_store.clone()),
            )),
            local,
        );
        assert!(restarted.is_unlocked().await);
        assert_eq!(restarted.mnemonic().await.unwrap().expose_secret(), PHRASE);

        // A lock anywhere removes the persisted key for everyone else
        first.lock().await.unwrap();
        let third = Keyring::new(
            Arc::new(SessionKeyManager::new(
                Arc::new(SystemClock),
                Some(session_store),
            )),
            Arc::new(MemoryStore::new()),
        );
        assert!(matches!(third.mnemonic().await, Err(Error::Locked)));
    }

    #[tokio::test]
    async fn unlock_without_wallet() {
        let keyring = keyring();
        assert!(matches!(
            keyring.unlock(&secret(PASSPHRASE)).await,
            Err(Error::NoWallet)
        ));
    }

    #[tokio::test]
    async fn create_generates_a_valid_phrase() {
        let keyring = keyring();
        let phrase = keyring.create(&secret(PASSPHRASE), 12).await.unwrap();
        assert_eq!(phrase.expose_secret().split(' ').count(), 12);
        assert!(validate_mnemonic(phrase.expose_secret()).is_ok());
        assert!(keyring.is_unlocked().await);
        assert!(keyring.has_wallet().await.unwrap());
    }

    #[tokio::test]
    async fn import_rejects_bad_checksum() {
        let keyring = keyring();
        let err = keyring
            .import(&secret(PASSPHRASE), "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!keyring.has_wallet().await.unwrap());
    }

    #[tokio::test]
    async fn reset_wipes_wallet() {
        let keyring = keyring();
        keyring.import(&secret(PASSPHRASE), PHRASE).await.unwrap();
        keyring.reset().await.unwrap();
        assert!(!keyring.has_wallet().await.unwrap());
        assert!(!keyring.is_unlocked().await);
    }

    #[test]
    fn validate_normalizes_whitespace_and_case() {
        let messy = format!("  {}  ", PHRASE.to_uppercase().replace(' ', "   "));
        let phrase = validate_mnemonic(&messy).unwrap();
        assert_eq!(phrase.expose_secret(), PHRASE);
    }

    #[test]
    fn debug_is_redacted() {
        let keyring = keyring();
        assert!(format!("{keyring:?}").contains("[REDACTED]"));
    }
}
