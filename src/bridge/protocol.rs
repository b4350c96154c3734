//! Bridge wire format
//!
//! Requests travel as `{type, correlationId, chainId?, payload}` and come
//! back as `{type: <type>_RESPONSE, correlationId, result?, error?, errorCode?}`.
//! Inbound requests are parsed into the [`WalletRequest`] union at the
//! boundary; nothing past the relay sees an untyped payload.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ErrorCode;
use crate::wallet::cosmos::SignDoc;
use crate::wallet::dogecoin::{TxInput, TxOutput};
use crate::{Error, Result};

pub const RESPONSE_SUFFIX: &str = "_RESPONSE";

/// Request kinds understood by the background
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Enable,
    GetOfflineSigner,
    GetAccounts,
    SignDirect,
    SignAmino,
    EvmRequest,
    EvmGetSelectedAddress,
    DogeSignSha256,
    DogeSignTx,
    DogeGetAddress,
}

impl RequestType {
    pub const ALL: [RequestType; 10] = [
        RequestType::Enable,
        RequestType::GetOfflineSigner,
        RequestType::GetAccounts,
        RequestType::SignDirect,
        RequestType::SignAmino,
        RequestType::EvmRequest,
        RequestType::EvmGetSelectedAddress,
        RequestType::DogeSignSha256,
        RequestType::DogeSignTx,
        RequestType::DogeGetAddress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Enable => "ENABLE",
            RequestType::GetOfflineSigner => "GET_OFFLINE_SIGNER",
            RequestType::GetAccounts => "GET_ACCOUNTS",
            RequestType::SignDirect => "SIGN_DIRECT",
            RequestType::SignAmino => "SIGN_AMINO",
            RequestType::EvmRequest => "EVM_REQUEST",
            RequestType::EvmGetSelectedAddress => "EVM_GET_SELECTED_ADDRESS",
            RequestType::DogeSignSha256 => "DOGE_SIGN_SHA256",
            RequestType::DogeSignTx => "DOGE_SIGN_TX",
            RequestType::DogeGetAddress => "DOGE_GET_ADDRESS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    pub fn response_type(&self) -> String {
        response_type(self.as_str())
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn response_type(request_type: &str) -> String {
    format!("{request_type}{RESPONSE_SUFFIX}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl ResponseEnvelope {
    pub fn success(request_type: &str, correlation_id: &str, result: Value) -> Self {
        Self {
            kind: response_type(request_type),
            correlation_id: correlation_id.to_string(),
            result: Some(result),
            error: None,
            error_code: None,
        }
    }

    /// Failure response carrying only the public form of `err`
    pub fn failure(request_type: &str, correlation_id: &str, err: &Error) -> Self {
        Self {
            kind: response_type(request_type),
            correlation_id: correlation_id.to_string(),
            result: None,
            error: Some(err.public_message()),
            error_code: Some(err.code()),
        }
    }

    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(message) => Err(Error::from_wire(self.error_code, message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Correlation ids: a per-page random prefix plus a monotonic counter
#[derive(Debug)]
pub struct CorrelationIds {
    prefix: String,
    counter: AtomicU64,
}

impl CorrelationIds {
    pub fn new() -> Self {
        let prefix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            prefix: prefix[..12].to_string(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{n}", self.prefix)
    }
}

impl Default for CorrelationIds {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignPayload<D> {
    signer_address: String,
    sign_doc: D,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct EvmPayload {
    method: String,
    #[serde(default)]
    params: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MessagePayload {
    message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TxPayload {
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
}

/// Typed request, one variant per request type
#[derive(Debug, Clone, PartialEq)]
pub enum WalletRequest {
    Enable {
        chain_id: String,
    },
    GetOfflineSigner {
        chain_id: String,
    },
    GetAccounts {
        chain_id: String,
    },
    SignDirect {
        chain_id: String,
        signer_address: String,
        sign_doc: SignDoc,
    },
    SignAmino {
        chain_id: String,
        signer_address: String,
        sign_doc: Value,
    },
    EvmRequest {
        method: String,
        params: Vec<Value>,
    },
    EvmGetSelectedAddress,
    /// Dogecoin calls run on the explicit chain or else the active one
    DogeSignSha256 {
        chain_id: Option<String>,
        message: String,
    },
    DogeSignTx {
        chain_id: Option<String>,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
    },
    DogeGetAddress {
        chain_id: Option<String>,
    },
}

fn payload<T: serde::de::DeserializeOwned>(kind: RequestType, value: &Value) -> Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| Error::MalformedRequest(format!("{kind} payload: {e}")))
}

fn required_chain(kind: RequestType, chain_id: &Option<String>) -> Result<String> {
    match chain_id {
        Some(id) if !id.is_empty() => Ok(id.clone()),
        _ => Err(Error::MalformedRequest(format!("{kind} requires chainId"))),
    }
}

impl WalletRequest {
    pub fn request_type(&self) -> RequestType {
        match self {
            WalletRequest::Enable { .. } => RequestType::Enable,
            WalletRequest::GetOfflineSigner { .. } => RequestType::GetOfflineSigner,
            WalletRequest::GetAccounts { .. } => RequestType::GetAccounts,
            WalletRequest::SignDirect { .. } => RequestType::SignDirect,
            WalletRequest::SignAmino { .. } => RequestType::SignAmino,
            WalletRequest::EvmRequest { .. } => RequestType::EvmRequest,
            WalletRequest::EvmGetSelectedAddress => RequestType::EvmGetSelectedAddress,
            WalletRequest::DogeSignSha256 { .. } => RequestType::DogeSignSha256,
            WalletRequest::DogeSignTx { .. } => RequestType::DogeSignTx,
            WalletRequest::DogeGetAddress { .. } => RequestType::DogeGetAddress,
        }
    }

    pub fn chain_id(&self) -> Option<&str> {
        match self {
            WalletRequest::Enable { chain_id }
            | WalletRequest::GetOfflineSigner { chain_id }
            | WalletRequest::GetAccounts { chain_id }
            | WalletRequest::SignDirect { chain_id, .. }
            | WalletRequest::SignAmino { chain_id, .. } => Some(chain_id),
            WalletRequest::DogeSignSha256 { chain_id, .. }
            | WalletRequest::DogeSignTx { chain_id, .. }
            | WalletRequest::DogeGetAddress { chain_id } => chain_id.as_deref(),
            WalletRequest::EvmRequest { .. } | WalletRequest::EvmGetSelectedAddress => None,
        }
    }

    /// EVM method name, for policy and audit
    pub fn method(&self) -> Option<&str> {
        match self {
            WalletRequest::EvmRequest { method, .. } => Some(method),
            _ => None,
        }
    }

    pub fn into_envelope(self, correlation_id: String) -> Result<RequestEnvelope> {
        let kind = self.request_type().as_str().to_string();
        let chain_id = self.chain_id().map(str::to_string);
        let payload = match self {
            WalletRequest::Enable { .. }
            | WalletRequest::GetOfflineSigner { .. }
            | WalletRequest::GetAccounts { .. }
            | WalletRequest::EvmGetSelectedAddress
            | WalletRequest::DogeGetAddress { .. } => Value::Null,
            WalletRequest::SignDirect {
                signer_address,
                sign_doc,
                ..
            } => serde_json::to_value(SignPayload {
                signer_address,
                sign_doc,
            })?,
            WalletRequest::SignAmino {
                signer_address,
                sign_doc,
                ..
            } => json!({ "signerAddress": signer_address, "signDoc": sign_doc }),
            WalletRequest::EvmRequest { method, params } => {
                serde_json::to_value(EvmPayload { method, params })?
            }
            WalletRequest::DogeSignSha256 { message, .. } => {
                serde_json::to_value(MessagePayload { message })?
            }
            WalletRequest::DogeSignTx {
                inputs, outputs, ..
            } => serde_json::to_value(TxPayload { inputs, outputs })?,
        };
        Ok(RequestEnvelope {
            kind,
            correlation_id,
            chain_id,
            payload,
        })
    }

    /// Validate an inbound envelope into a typed request
    pub fn from_envelope(envelope: &RequestEnvelope) -> Result<Self> {
        let kind = RequestType::parse(&envelope.kind).ok_or_else(|| {
            Error::MalformedRequest(format!("unknown request type {}", envelope.kind))
        })?;
        let chain_id = &envelope.chain_id;
        let value = &envelope.payload;

        let request = match kind {
            RequestType::Enable => WalletRequest::Enable {
                chain_id: required_chain(kind, chain_id)?,
            },
            RequestType::GetOfflineSigner => WalletRequest::GetOfflineSigner {
                chain_id: required_chain(kind, chain_id)?,
            },
            RequestType::GetAccounts => WalletRequest::GetAccounts {
                chain_id: required_chain(kind, chain_id)?,
            },
            RequestType::SignDirect => {
                let p: SignPayload<SignDoc> = payload(kind, value)?;
                WalletRequest::SignDirect {
                    chain_id: required_chain(kind, chain_id)?,
                    signer_address: p.signer_address,
                    sign_doc: p.sign_doc,
                }
            }
            RequestType::SignAmino => {
                let p: SignPayload<Value> = payload(kind, value)?;
                if !p.sign_doc.is_object() {
                    return Err(Error::MalformedRequest(
                        "SIGN_AMINO signDoc must be an object".into(),
                    ));
                }
                WalletRequest::SignAmino {
                    chain_id: required_chain(kind, chain_id)?,
                    signer_address: p.signer_address,
                    sign_doc: p.sign_doc,
                }
            }
            RequestType::EvmRequest => {
                let p: EvmPayload = payload(kind, value)?;
                WalletRequest::EvmRequest {
                    method: p.method,
                    params: p.params,
                }
            }
            RequestType::EvmGetSelectedAddress => WalletRequest::EvmGetSelectedAddress,
            RequestType::DogeSignSha256 => {
                let p: MessagePayload = payload(kind, value)?;
                WalletRequest::DogeSignSha256 {
                    chain_id: chain_id.clone(),
                    message: p.message,
                }
            }
            RequestType::DogeSignTx => {
                let p: TxPayload = payload(kind, value)?;
                WalletRequest::DogeSignTx {
                    chain_id: chain_id.clone(),
                    inputs: p.inputs,
                    outputs: p.outputs,
                }
            }
            RequestType::DogeGetAddress => WalletRequest::DogeGetAddress {
                chain_id: chain_id.clone(),
            },
        };
        Ok(request)
    }
}
