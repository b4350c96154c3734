//! Error types for the wallet core
//!
//! Internal failures are collapsed into the public [`ErrorCode`] taxonomy
//! before they cross the bridge into the page context.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error kinds that may be shown to the untrusted page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnsupportedChain,
    Locked,
    InvalidPassword,
    WalletNotInitialized,
    Timeout,
    UnsupportedMethod,
    InvalidRequest,
    NoWallet,
    Internal,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("You need to unlock wallet first")]
    Locked,

    #[error("Incorrect password")]
    InvalidPassword,

    #[error("Wallet not initialized for chain {0}")]
    WalletNotInitialized(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Method {0} not supported")]
    UnsupportedMethod(String),

    #[error("No active chain. Please enable a chain first.")]
    NoActiveChain,

    #[error("No wallet found. Create or import one first.")]
    NoWallet,

    #[error("Address does not match the active account")]
    AddressMismatch,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Request blocked: {0}")]
    Blocked(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Chain registry error: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bridge channel closed")]
    BridgeClosed,

    /// An error reported by the other side of the bridge
    #[error("{message}")]
    Remote { code: ErrorCode, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Public taxonomy kind for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::UnsupportedChain(_) => ErrorCode::UnsupportedChain,
            Error::Locked => ErrorCode::Locked,
            Error::InvalidPassword => ErrorCode::InvalidPassword,
            Error::WalletNotInitialized(_) => ErrorCode::WalletNotInitialized,
            Error::Timeout(_) => ErrorCode::Timeout,
            Error::UnsupportedMethod(_) => ErrorCode::UnsupportedMethod,
            Error::NoWallet => ErrorCode::NoWallet,
            Error::NoActiveChain
            | Error::AddressMismatch
            | Error::InvalidArgument(_)
            | Error::MalformedRequest(_)
            | Error::Blocked(_) => ErrorCode::InvalidRequest,
            Error::Remote { code, .. } => *code,
            Error::Signing(_)
            | Error::Rpc(_)
            | Error::Storage(_)
            | Error::Registry(_)
            | Error::Config(_)
            | Error::BridgeClosed
            | Error::Network(_)
            | Error::Json(_)
            | Error::Io(_) => ErrorCode::Internal,
        }
    }

    /// Message safe to hand to the page context.
    ///
    /// Internal failures never carry their details across the bridge.
    pub fn public_message(&self) -> String {
        match self.code() {
            ErrorCode::Internal => match self {
                Error::Remote { message, .. } => message.clone(),
                _ => "Internal wallet error".to_string(),
            },
            _ => self.to_string(),
        }
    }

    /// Rebuild an error received in a response envelope
    pub fn from_wire(code: Option<ErrorCode>, message: String) -> Self {
        Error::Remote {
            code: code.unwrap_or(ErrorCode::Internal),
            message,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
