//! Relay-side request interceptors
//!
//! Every request that reaches the relay passes through this pipeline before
//! it is handed to the background. Interceptors see request metadata only
//! (type, correlation id, chain, EVM method), never payloads or results.

mod audit_log;
mod policy;

pub use audit_log::AuditLogInterceptor;
pub use policy::{MethodPolicy, PolicyInterceptor};

use async_trait::async_trait;
use serde_json::Value;

use crate::bridge::protocol::{RequestType, WalletRequest};
use crate::Result;

/// Outcome of an interceptor check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptorDecision {
    Allow,
    Block(String),
}

/// What an interceptor is allowed to know about a request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_type: RequestType,
    pub correlation_id: String,
    pub chain_id: Option<String>,
    pub method: Option<String>,
}

impl RequestContext {
    pub fn new(request: &WalletRequest, correlation_id: &str) -> Self {
        Self {
            request_type: request.request_type(),
            correlation_id: correlation_id.to_string(),
            chain_id: request.chain_id().map(str::to_string),
            method: request.method().map(str::to_string),
        }
    }
}

#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn intercept_request(&self, context: &RequestContext) -> Result<InterceptorDecision>;

    async fn on_request_complete(
        &self,
        _context: &RequestContext,
        _result: &Result<Value>,
        _duration_ms: u64,
    ) {
    }
}
