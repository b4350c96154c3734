//! Dogecoin signer
//!
//! BIP-44 coin type 3, P2PKH addresses (version byte `0x1e`), DER-encoded
//! secp256k1 ECDSA signatures.
//!
//! `sign_tx` signs double-SHA-256 of a compact inputs/outputs commitment.
//! It is not a per-input SIGHASH_ALL digest, so its output cannot be spliced
//! into a raw transaction as is.

use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::hd::{self, DOGECOIN_PATH};
use crate::{Error, Result};

pub const P2PKH_VERSION: u8 = 0x1e;
pub const P2SH_VERSION: u8 = 0x16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Previous transaction id, hex, display byte order
    pub txid: String,
    pub vout: u32,
    /// Amount in koinu
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: String,
    /// Amount in koinu
    pub value: u64,
}

/// Signature plus what a verifier needs to check it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DogeSignature {
    /// DER, hex
    pub signature: String,
    /// Compressed SEC1, hex
    pub public_key: String,
    /// Signed digest, hex
    pub digest: String,
}

pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let once = Sha256::digest(data);
    Sha256::digest(once).into()
}

/// P2PKH address for a compressed public key
pub fn p2pkh_address(pubkey: &[u8; 33]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(P2PKH_VERSION);
    payload.extend_from_slice(&hd::hash160(pubkey));
    bs58::encode(payload).with_check().into_string()
}

/// Decode a P2PKH or P2SH address to (version, hash160)
pub fn decode_address(address: &str) -> Result<(u8, [u8; 20])> {
    let raw = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|e| Error::InvalidArgument(format!("invalid dogecoin address {address}: {e}")))?;
    if raw.len() != 21 || (raw[0] != P2PKH_VERSION && raw[0] != P2SH_VERSION) {
        return Err(Error::InvalidArgument(format!(
            "invalid dogecoin address {address}"
        )));
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&raw[1..]);
    Ok((raw[0], hash))
}

fn put_compact_size(out: &mut Vec<u8>, n: usize) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        _ => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
    }
}

/// Commitment over the spend: inputs as outpoint + amount, outputs as
/// amount + version + hash160
pub fn tx_preimage(inputs: &[TxInput], outputs: &[TxOutput]) -> Result<Vec<u8>> {
    if inputs.is_empty() || outputs.is_empty() {
        return Err(Error::InvalidArgument(
            "transaction needs at least one input and one output".into(),
        ));
    }

    let mut out = Vec::new();
    put_compact_size(&mut out, inputs.len());
    for input in inputs {
        let mut txid = alloy::hex::decode(&input.txid)
            .map_err(|e| Error::InvalidArgument(format!("invalid txid {}: {e}", input.txid)))?;
        if txid.len() != 32 {
            return Err(Error::InvalidArgument(format!(
                "txid must be 32 bytes: {}",
                input.txid
            )));
        }
        txid.reverse();
        out.extend_from_slice(&txid);
        out.extend_from_slice(&input.vout.to_le_bytes());
        out.extend_from_slice(&input.value.to_le_bytes());
    }

    put_compact_size(&mut out, outputs.len());
    for output in outputs {
        let (version, hash) = decode_address(&output.address)?;
        out.extend_from_slice(&output.value.to_le_bytes());
        out.push(version);
        out.extend_from_slice(&hash);
    }
    Ok(out)
}

pub struct DogecoinSigner {
    key: SigningKey,
    pubkey: [u8; 33],
    address: String,
}

impl DogecoinSigner {
    pub fn from_mnemonic(phrase: &SecretString) -> Result<Self> {
        let key = hd::derive_signing_key(phrase, DOGECOIN_PATH)?;
        let pubkey = hd::compressed_pubkey(&key);
        let address = p2pkh_address(&pubkey);
        Ok(Self {
            key,
            pubkey,
            address,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sign SHA-256(message)
    pub fn sign_sha256(&self, message: &[u8]) -> Result<DogeSignature> {
        self.sign_digest(Sha256::digest(message).into())
    }

    /// Sign the double-SHA-256 of [`tx_preimage`]
    pub fn sign_tx(&self, inputs: &[TxInput], outputs: &[TxOutput]) -> Result<DogeSignature> {
        let preimage = tx_preimage(inputs, outputs)?;
        self.sign_digest(sha256d(&preimage))
    }

    fn sign_digest(&self, digest: [u8; 32]) -> Result<DogeSignature> {
        let signature: Signature = self
            .key
            .sign_prehash(&digest)
            .map_err(|e| Error::Signing(format!("dogecoin signing failed: {e}")))?;
        let signature = signature.normalize_s().unwrap_or(signature);
        Ok(DogeSignature {
            signature: alloy::hex::encode(signature.to_der().as_bytes()),
            public_key: alloy::hex::encode(self.pubkey),
            digest: alloy::hex::encode(digest),
        })
    }
}

impl std::fmt::Debug for DogecoinSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DogecoinSigner")
            .field("address", &self.address)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::hazmat::PrehashVerifier;
    use k256::ecdsa::VerifyingKey;

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn signer() -> DogecoinSigner {
        DogecoinSigner::from_mnemonic(&SecretString::from(PHRASE.to_string())).unwrap()
    }

    fn verify(sig: &DogeSignature) {
        let key = VerifyingKey::from_sec1_bytes(&alloy::hex::decode(&sig.public_key).unwrap()).unwrap();
        let der = alloy::hex::decode(&sig.signature).unwrap();
        let signature = Signature::from_der(&der).unwrap();
        let digest = alloy::hex::decode(&sig.digest).unwrap();
        key.verify_prehash(&digest, &signature).unwrap();
    }

    #[test]
    fn address_is_p2pkh() {
        let signer = signer();
        assert!(signer.address().starts_with('D'));
        assert_eq!(signer.address().len(), 34);
        let (version, _) = decode_address(signer.address()).unwrap();
        assert_eq!(version, P2PKH_VERSION);
    }

    #[test]
    fn sign_sha256_verifies() {
        let sig = signer().sign_sha256(b"much wow").unwrap();
        assert_eq!(sig.digest, alloy::hex::encode(Sha256::digest(b"much wow")));
        verify(&sig);
    }

    #[test]
    fn sign_tx_commits_to_outputs() {
        let signer = signer();
        let inputs = vec![TxInput {
            txid: "11".repeat(32),
            vout: 1,
            value: 100_000_000,
        }];
        let outputs = vec![TxOutput {
            address: signer.address().to_string(),
            value: 99_000_000,
        }];
        let a = signer.sign_tx(&inputs, &outputs).unwrap();
        verify(&a);

        let mut changed = outputs.clone();
        changed[0].value = 1;
        let b = signer.sign_tx(&inputs, &changed).unwrap();
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn sign_tx_rejects_bad_input() {
        let signer = signer();
        let outputs = vec![TxOutput {
            address: signer.address().to_string(),
            value: 1,
        }];
        assert!(signer.sign_tx(&[], &outputs).is_err());

        let inputs = vec![TxInput {
            txid: "abcd".into(),
            vout: 0,
            value: 1,
        }];
        assert!(matches!(
            signer.sign_tx(&inputs, &outputs),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_foreign_address_versions() {
        // Bitcoin P2PKH (version 0x00)
        assert!(decode_address("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2").is_err());
    }
}
