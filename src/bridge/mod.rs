//! Bridge protocol between the page, the relay and the background
//!
//! The page never sees the mnemonic or the session key. It holds proxies
//! that serialize a request onto a shared message channel and wait for the
//! correlated response; the relay deserializes, delegates to the
//! background's [`RequestHandler`] and answers on the return channel.

pub mod page;
pub mod protocol;
pub mod relay;

pub use page::{PageBridge, DEFAULT_TIMEOUT};
pub use protocol::{RequestEnvelope, RequestType, ResponseEnvelope, WalletRequest};
pub use relay::{Relay, RequestHandler};

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One direction of the page/relay message channel
pub type MessageSender = mpsc::UnboundedSender<Value>;
pub type MessageReceiver = mpsc::UnboundedReceiver<Value>;

pub fn channel() -> (MessageSender, MessageReceiver) {
    mpsc::unbounded_channel()
}

/// Wire a page bridge to a relay running on its own task
pub fn connect(relay: Relay, timeout: Duration) -> (PageBridge, JoinHandle<()>) {
    let (to_relay, relay_inbound) = channel();
    let (to_page, page_inbound) = channel();
    let relay_task = tokio::spawn(Arc::new(relay).run(relay_inbound, to_page));
    (PageBridge::new(to_relay, page_inbound, timeout), relay_task)
}
