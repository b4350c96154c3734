//! Cosmos SDK offline signer
//!
//! Mirrors the cosmjs `OfflineDirectSigner`/`OfflineAminoSigner` shape:
//! account 0 on `m/44'/118'/0'/0/0`, bech32 address under the chain's
//! prefix, secp256k1 signatures over SHA-256 of the sign bytes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bech32::{ToBase32, Variant};
use k256::ecdsa::signature::Signer;
use k256::ecdsa::{Signature, SigningKey};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::hd::{self, COSMOS_PATH};
use crate::{Error, Result};

pub const PUBKEY_TYPE: &str = "tendermint/PubKeySecp256k1";

/// `AccountData` as returned by `getAccounts`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountData {
    pub address: String,
    pub algo: String,
    /// Base64 compressed public key
    pub pubkey: String,
}

/// Protobuf `SignDoc`, byte fields base64 on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignDoc {
    #[serde(with = "base64_bytes")]
    pub body_bytes: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub auth_info_bytes: Vec<u8>,
    pub chain_id: String,
    #[serde(
        serialize_with = "u64_as_string",
        deserialize_with = "u64_from_string_or_number"
    )]
    pub account_number: u64,
}

impl SignDoc {
    /// Canonical protobuf encoding; default-valued fields are omitted
    pub fn to_sign_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            self.body_bytes.len() + self.auth_info_bytes.len() + self.chain_id.len() + 24,
        );
        put_bytes_field(&mut out, 1, &self.body_bytes);
        put_bytes_field(&mut out, 2, &self.auth_info_bytes);
        put_bytes_field(&mut out, 3, self.chain_id.as_bytes());
        if self.account_number != 0 {
            put_varint(&mut out, 4 << 3);
            put_varint(&mut out, self.account_number);
        }
        out
    }
}

fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn put_bytes_field(out: &mut Vec<u8>, field: u64, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    put_varint(out, (field << 3) | 2);
    put_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdSignature {
    pub pub_key: PubKey,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectSignResponse {
    pub signed: SignDoc,
    pub signature: StdSignature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AminoSignResponse {
    pub signed: Value,
    pub signature: StdSignature,
}

/// Sorted, compact JSON with `<`, `>` and `&` escaped, as amino expects
pub fn serialize_sign_doc(doc: &Value) -> Result<Vec<u8>> {
    // serde_json::Map is ordered by key, so Value serializes sorted
    let json = serde_json::to_string(doc)?;
    let escaped = json
        .replace('&', "\\u0026")
        .replace('<', "\\u003c")
        .replace('>', "\\u003e");
    Ok(escaped.into_bytes())
}

/// Signer for one chain prefix
pub struct CosmosSigner {
    key: SigningKey,
    pubkey: [u8; 33],
    address: String,
}

impl CosmosSigner {
    pub fn from_mnemonic(phrase: &SecretString, prefix: &str) -> Result<Self> {
        let key = hd::derive_signing_key(phrase, COSMOS_PATH)?;
        let pubkey = hd::compressed_pubkey(&key);
        let address = bech32::encode(prefix, hd::hash160(&pubkey).to_base32(), Variant::Bech32)
            .map_err(|e| Error::Signing(format!("invalid bech32 prefix {prefix}: {e}")))?;
        Ok(Self {
            key,
            pubkey,
            address,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn accounts(&self) -> Vec<AccountData> {
        vec![AccountData {
            address: self.address.clone(),
            algo: "secp256k1".to_string(),
            pubkey: STANDARD.encode(self.pubkey),
        }]
    }

    pub fn sign_direct(&self, signer_address: &str, doc: SignDoc) -> Result<DirectSignResponse> {
        self.check_address(signer_address)?;
        let signature = self.sign_bytes(&doc.to_sign_bytes());
        Ok(DirectSignResponse {
            signed: doc,
            signature,
        })
    }

    pub fn sign_amino(&self, signer_address: &str, doc: Value) -> Result<AminoSignResponse> {
        self.check_address(signer_address)?;
        if !doc.is_object() {
            return Err(Error::InvalidArgument("amino sign doc must be an object".into()));
        }
        let signature = self.sign_bytes(&serialize_sign_doc(&doc)?);
        Ok(AminoSignResponse {
            signed: doc,
            signature,
        })
    }

    fn check_address(&self, signer_address: &str) -> Result<()> {
        if signer_address != self.address {
            return Err(Error::AddressMismatch);
        }
        Ok(())
    }

    fn sign_bytes(&self, bytes: &[u8]) -> StdSignature {
        // SHA-256 digest, RFC 6979 nonce, low-S
        let signature: Signature = self.key.sign(bytes);
        StdSignature {
            pub_key: PubKey {
                key_type: PUBKEY_TYPE.to_string(),
                value: STANDARD.encode(self.pubkey),
            },
            signature: STANDARD.encode(signature.to_bytes()),
        }
    }
}

impl std::fmt::Debug for CosmosSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosmosSigner")
            .field("address", &self.address)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

fn u64_as_string<S: Serializer>(value: &u64, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&value.to_string())
}

fn u64_from_string_or_number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => s.parse().map_err(serde::de::Error::custom),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("account number out of range")),
        other => Err(serde::de::Error::custom(format!(
            "expected account number, got {other}"
        ))),
    }
}
