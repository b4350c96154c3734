//! Relay context
//!
//! The relay owns no wallet state. It validates inbound envelopes, runs the
//! interceptor pipeline, hands typed requests to the background and writes
//! back a response envelope. Requests are processed concurrently; each one
//! is answered exactly once.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

use super::protocol::{RequestEnvelope, ResponseEnvelope, WalletRequest, RESPONSE_SUFFIX};
use super::{MessageReceiver, MessageSender};
use crate::interceptors::{InterceptorDecision, RequestContext, RequestInterceptor};
use crate::{Error, Result};

/// The privileged side that actually serves requests
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: WalletRequest) -> Result<Value>;
}

pub struct Relay {
    handler: Arc<dyn RequestHandler>,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
}

impl Relay {
    pub fn new(handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            handler,
            interceptors: Vec::new(),
        }
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Serve `inbound` until every sender is gone
    pub async fn run(self: Arc<Self>, mut inbound: MessageReceiver, outbound: MessageSender) {
        while let Some(message) = inbound.recv().await {
            let relay = self.clone();
            let outbound = outbound.clone();
            tokio::spawn(async move {
                let Some(response) = relay.process(message).await else {
                    return;
                };
                match serde_json::to_value(&response) {
                    Ok(value) => {
                        if outbound.send(value).is_err() {
                            debug!(correlation_id = %response.correlation_id, "Page side gone, dropping response");
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to encode response"),
                }
            });
        }
        debug!("Relay inbound channel closed");
    }

    /// Handle one raw message; `None` for messages that are not requests
    pub async fn process(&self, message: Value) -> Option<ResponseEnvelope> {
        let envelope: RequestEnvelope = match serde_json::from_value(message) {
            Ok(envelope) => envelope,
            Err(_) => {
                trace!("Ignoring message without a request envelope");
                return None;
            }
        };
        if envelope.kind.ends_with(RESPONSE_SUFFIX) {
            return None;
        }

        let request = match WalletRequest::from_envelope(&envelope) {
            Ok(request) => request,
            Err(e) => {
                debug!(request_type = %envelope.kind, error = %e, "Rejected malformed request");
                return Some(ResponseEnvelope::failure(
                    &envelope.kind,
                    &envelope.correlation_id,
                    &e,
                ));
            }
        };

        let started = Instant::now();
        let context = RequestContext::new(&request, &envelope.correlation_id);
        let result = self.dispatch(&context, request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        for interceptor in &self.interceptors {
            interceptor
                .on_request_complete(&context, &result, duration_ms)
                .await;
        }

        Some(match result {
            Ok(value) => {
                ResponseEnvelope::success(&envelope.kind, &envelope.correlation_id, value)
            }
            Err(e) => {
                debug!(
                    request_type = %envelope.kind,
                    correlation_id = %envelope.correlation_id,
                    error_code = ?e.code(),
                    "Request failed"
                );
                ResponseEnvelope::failure(&envelope.kind, &envelope.correlation_id, &e)
            }
        })
    }

    async fn dispatch(&self, context: &RequestContext, request: WalletRequest) -> Result<Value> {
        for interceptor in &self.interceptors {
            if let InterceptorDecision::Block(reason) =
                interceptor.intercept_request(context).await?
            {
                warn!(request_type = %context.request_type, reason = %reason, "Request blocked");
                return Err(Error::Blocked(reason));
            }
        }
        self.handler.handle(request).await
    }
}
