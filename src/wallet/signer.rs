//! EVM signing wallet
//!
//! SECURITY: the private key lives only inside alloy's `PrivateKeySigner`.
//! - Keys are never serialized
//! - Keys are never sent across the bridge
//! - Keys are never logged

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Signature};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use secrecy::SecretString;

use super::hd::{self, ETHEREUM_PATH};
use crate::{Error, Result};

/// Account-0 EVM wallet derived from the mnemonic
pub struct SecureWallet {
    signer: PrivateKeySigner,
    /// Public address (safe to expose)
    address: Address,
}

impl SecureWallet {
    /// Derive the wallet at `m/44'/60'/0'/0/0`
    pub fn from_mnemonic(phrase: &SecretString) -> Result<Self> {
        let key = hd::derive_signing_key(phrase, ETHEREUM_PATH)?;
        Ok(Self::from_signer(PrivateKeySigner::from_signing_key(key)))
    }

    fn from_signer(signer: PrivateKeySigner) -> Self {
        let address = signer.address();
        Self { signer, address }
    }

    /// Get the public address (safe to share)
    pub fn address(&self) -> Address {
        self.address
    }

    /// Get the address as a checksummed string
    pub fn address_string(&self) -> String {
        self.address.to_checksum(None)
    }

    /// EIP-191 personal message signature
    pub fn sign_message(&self, message: &[u8]) -> Result<Signature> {
        self.signer
            .sign_message_sync(message)
            .map_err(|e| Error::Signing(format!("message signing failed: {e}")))
    }

    /// Sign a legacy transaction and return its EIP-2718 encoding
    pub fn sign_legacy_tx(&self, mut tx: TxLegacy) -> Result<Vec<u8>> {
        let signature = self
            .signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| Error::Signing(format!("transaction signing failed: {e}")))?;
        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
        tracing::debug!(tx_hash = %envelope.tx_hash(), "Signed legacy transaction");
        Ok(envelope.encoded_2718())
    }
}

/// 65-byte `r || s || v` hex with `v` in {27, 28}
pub fn signature_hex(signature: &Signature) -> String {
    alloy::hex::encode_prefixed(signature.as_bytes())
}

// Implement Debug manually to avoid exposing the signer
impl std::fmt::Debug for SecureWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureWallet")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}
