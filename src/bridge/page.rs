//! Page-side end of the bridge
//!
//! Each outbound call registers one entry in the pending table, keyed by
//! its correlation id and the response type it expects. A single router
//! task reads the shared inbound channel and completes the matching entry;
//! anything else on the channel is dropped. Entries are removed on the
//! first match, on timeout, and when the calling future is dropped.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::protocol::{response_type, CorrelationIds, ResponseEnvelope, WalletRequest};
use super::{MessageReceiver, MessageSender};
use crate::{Error, Result};

/// Default bound on a round trip
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

struct PendingRequest {
    expected_type: String,
    chain_id: Option<String>,
    created_at: Instant,
    reply: oneshot::Sender<ResponseEnvelope>,
}

type PendingTable = Arc<Mutex<HashMap<String, PendingRequest>>>;

/// Removes a pending entry however the call ends
struct PendingGuard<'a> {
    table: &'a PendingTable,
    correlation_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.lock().remove(self.correlation_id);
    }
}

pub struct PageBridge {
    outbound: MessageSender,
    pending: PendingTable,
    ids: CorrelationIds,
    timeout: Duration,
    router: JoinHandle<()>,
}

impl PageBridge {
    /// Start the response router over `inbound`
    pub fn new(outbound: MessageSender, inbound: MessageReceiver, timeout: Duration) -> Self {
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let router = tokio::spawn(route_responses(inbound, pending.clone()));
        Self {
            outbound,
            pending,
            ids: CorrelationIds::new(),
            timeout,
            router,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of calls still waiting for a response
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Send `request` and wait for its correlated response
    pub async fn call(&self, request: WalletRequest) -> Result<Value> {
        let correlation_id = self.ids.next_id();
        let envelope = request.into_envelope(correlation_id.clone())?;
        let expected_type = response_type(&envelope.kind);
        let message = serde_json::to_value(&envelope)?;

        let (reply, response) = oneshot::channel();
        self.pending.lock().insert(
            correlation_id.clone(),
            PendingRequest {
                expected_type,
                chain_id: envelope.chain_id.clone(),
                created_at: Instant::now(),
                reply,
            },
        );
        let _guard = PendingGuard {
            table: &self.pending,
            correlation_id: &correlation_id,
        };

        self.outbound
            .send(message)
            .map_err(|_| Error::BridgeClosed)?;
        trace!(correlation_id = %correlation_id, request_type = %envelope.kind, "Request sent");

        match tokio::time::timeout(self.timeout, response).await {
            Ok(Ok(envelope)) => envelope.into_result(),
            Ok(Err(_)) => Err(Error::BridgeClosed),
            Err(_) => {
                warn!(
                    correlation_id = %correlation_id,
                    request_type = %envelope.kind,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Bridge call timed out"
                );
                Err(Error::Timeout(self.timeout))
            }
        }
    }
}

impl Drop for PageBridge {
    fn drop(&mut self) {
        self.router.abort();
    }
}

impl std::fmt::Debug for PageBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageBridge")
            .field("timeout", &self.timeout)
            .field("pending", &self.pending_count())
            .finish()
    }
}

async fn route_responses(mut inbound: MessageReceiver, pending: PendingTable) {
    while let Some(message) = inbound.recv().await {
        route(&pending, message);
    }
    // Channel closed: fail every waiter instead of letting it time out
    let abandoned = std::mem::take(&mut *pending.lock());
    if !abandoned.is_empty() {
        debug!(count = abandoned.len(), "Bridge closed with calls in flight");
    }
}

fn route(pending: &PendingTable, message: Value) {
    let Ok(response) = serde_json::from_value::<ResponseEnvelope>(message) else {
        trace!("Ignoring non-response message");
        return;
    };

    let mut table = pending.lock();
    let matches = table
        .get(&response.correlation_id)
        .is_some_and(|p| p.expected_type == response.kind);
    if !matches {
        trace!(
            correlation_id = %response.correlation_id,
            response_type = %response.kind,
            "Dropping unmatched message"
        );
        return;
    }

    if let Some(entry) = table.remove(&response.correlation_id) {
        trace!(
            correlation_id = %response.correlation_id,
            chain_id = ?entry.chain_id,
            elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
            "Response matched"
        );
        // The caller may have given up already
        let _ = entry.reply.send(response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::channel;
    use crate::bridge::protocol::RequestEnvelope;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn get_signer() -> WalletRequest {
        WalletRequest::GetOfflineSigner {
            chain_id: "cosmoshub-4".into(),
        }
    }

    fn parse(message: Value) -> RequestEnvelope {
        serde_json::from_value(message).unwrap()
    }

    #[tokio::test]
    async fn concurrent_calls_get_their_own_responses_out_of_order() {
        let (to_relay, mut relay_rx) = channel();
        let (to_page, page_rx) = channel();
        let bridge = Arc::new(PageBridge::new(to_relay, page_rx, DEFAULT_TIMEOUT));

        let first = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.call(get_signer()).await }
        });
        let second = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.call(get_signer()).await }
        });

        let a = parse(relay_rx.recv().await.unwrap());
        let b = parse(relay_rx.recv().await.unwrap());
        assert_ne!(a.correlation_id, b.correlation_id);
        assert_eq!(bridge.pending_count(), 2);

        // Noise: foreign id, wrong type for a live id, an echoed request
        to_page
            .send(json!({"type": "GET_OFFLINE_SIGNER_RESPONSE", "correlationId": "nope", "result": "x"}))
            .unwrap();
        to_page
            .send(json!({"type": "ENABLE_RESPONSE", "correlationId": a.correlation_id, "result": "wrong"}))
            .unwrap();
        to_page.send(serde_json::to_value(&b).unwrap()).unwrap();

        // Answer in reverse order
        for env in [&b, &a] {
            let resp = ResponseEnvelope::success(&env.kind, &env.correlation_id, json!(env.correlation_id));
            to_page.send(serde_json::to_value(resp).unwrap()).unwrap();
        }

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        let mut got = vec![first, second];
        got.sort_by_key(|v| v.as_str().unwrap().to_string());
        let mut want = vec![json!(a.correlation_id), json!(b.correlation_id)];
        want.sort_by_key(|v| v.as_str().unwrap().to_string());
        assert_eq!(got, want);
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn each_call_resolves_with_its_own_id() {
        let (to_relay, mut relay_rx) = channel();
        let (to_page, page_rx) = channel();
        let bridge = Arc::new(PageBridge::new(to_relay, page_rx, DEFAULT_TIMEOUT));

        let call = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.call(get_signer()).await }
        });
        let env = parse(relay_rx.recv().await.unwrap());
        let resp = ResponseEnvelope::success(&env.kind, &env.correlation_id, json!({"id": env.correlation_id}));
        to_page.send(serde_json::to_value(resp).unwrap()).unwrap();

        let value = call.await.unwrap().unwrap();
        assert_eq!(value["id"], json!(env.correlation_id));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_call_times_out_without_dangling_entry() {
        let (to_relay, _relay_rx) = channel();
        let (_to_page, page_rx) = channel();
        let bridge = PageBridge::new(to_relay, page_rx, Duration::from_secs(30));

        let err = bridge.call(get_signer()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(30)));
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn errors_come_back_typed() {
        let (to_relay, mut relay_rx) = channel();
        let (to_page, page_rx) = channel();
        let bridge = Arc::new(PageBridge::new(to_relay, page_rx, DEFAULT_TIMEOUT));

        let call = tokio::spawn({
            let bridge = bridge.clone();
            async move {
                bridge
                    .call(WalletRequest::GetAccounts {
                        chain_id: "cosmoshub-4".into(),
                    })
                    .await
            }
        });
        let env = parse(relay_rx.recv().await.unwrap());
        let err = Error::WalletNotInitialized("cosmoshub-4".into());
        let resp = ResponseEnvelope::failure(&env.kind, &env.correlation_id, &err);
        to_page.send(serde_json::to_value(resp).unwrap()).unwrap();

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.code(), ErrorCode::WalletNotInitialized);
    }

    #[tokio::test]
    async fn dropped_call_deregisters() {
        let (to_relay, mut relay_rx) = channel();
        let (_to_page, page_rx) = channel();
        let bridge = Arc::new(PageBridge::new(to_relay, page_rx, DEFAULT_TIMEOUT));

        let call = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.call(get_signer()).await }
        });
        relay_rx.recv().await.unwrap();
        assert_eq!(bridge.pending_count(), 1);

        call.abort();
        let _ = call.await;
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn closed_channel_fails_fast() {
        let (to_relay, relay_rx) = channel();
        let (to_page, page_rx) = channel();
        drop(relay_rx);
        drop(to_page);
        let bridge = PageBridge::new(to_relay, page_rx, DEFAULT_TIMEOUT);
        assert!(matches!(
            bridge.call(get_signer()).await,
            Err(Error::BridgeClosed)
        ));
        assert_eq!(bridge.pending_count(), 0);
    }
}
