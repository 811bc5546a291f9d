//! Cross-unit RPC bridge.
//!
//! An isolated execution unit cannot perform every operation itself; some
//! capabilities (page fetches that must originate from the host's HTTP
//! context, for example) are owned by the host. The bridge pairs each
//! request with its response through a correlation id: the caller inserts
//! a oneshot responder into a request table, sends a typed envelope, and
//! awaits the matching reply with a timeout. Entries are removed when the
//! call settles, so the table never grows across repeated calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Default time to wait for a response before giving up.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Request envelope sent from a unit to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub channel: String,
    pub args: Value,
    pub correlation_id: Uuid,
}

/// Response envelope sent from the host back to a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub correlation_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

type PendingMap = Arc<Mutex<HashMap<Uuid, oneshot::Sender<RpcResponse>>>>;

/// Unit-side handle for invoking host capabilities.
#[derive(Clone)]
pub struct RpcBridge {
    requests: mpsc::Sender<RpcRequest>,
    pending: PendingMap,
    timeout: Duration,
}

/// Host-side handle that routes responses back to waiting callers.
#[derive(Clone)]
pub struct RpcResponder {
    pending: PendingMap,
}

impl RpcBridge {
    /// Create a bridge over a unit-to-host request channel.
    ///
    /// The returned responder must be handed to whatever task delivers
    /// host responses.
    pub fn new(requests: mpsc::Sender<RpcRequest>, timeout: Duration) -> (Self, RpcResponder) {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let bridge = Self {
            requests,
            pending: pending.clone(),
            timeout,
        };
        (bridge, RpcResponder { pending })
    }

    /// Invoke a host capability and await its typed result.
    pub async fn call(&self, channel: &str, args: Value) -> Result<Value> {
        let correlation_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().unwrap();
            pending.insert(correlation_id, tx);
        }

        let request = RpcRequest {
            channel: channel.to_string(),
            args,
            correlation_id,
        };

        if self.requests.send(request).await.is_err() {
            self.remove_pending(&correlation_id);
            return Err(Error::Rpc(format!(
                "Host is no longer listening on channel: {}",
                channel
            )));
        }

        let response = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                self.remove_pending(&correlation_id);
                return Err(Error::Rpc(format!(
                    "Response channel closed for: {}",
                    channel
                )));
            }
            Err(_) => {
                self.remove_pending(&correlation_id);
                return Err(Error::RpcTimeout(channel.to_string()));
            }
        };

        match (response.result, response.error) {
            (_, Some(error)) => Err(Error::Rpc(error)),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }

    /// Fetch a page through the host's HTTP context.
    ///
    /// Convenience wrapper over the `page.fetch` channel used by download
    /// units for detail-page resolution.
    pub async fn fetch_page(&self, url: &str) -> Result<String> {
        self.call("page.fetch", serde_json::json!({ "url": url }))
            .await?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Rpc("page.fetch returned a non-string payload".into()))
    }

    fn remove_pending(&self, id: &Uuid) {
        self.pending.lock().unwrap().remove(id);
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl RpcResponder {
    /// Deliver a host response to the caller waiting on its correlation id.
    ///
    /// Unknown ids are dropped silently; the caller may already have timed
    /// out and removed its entry.
    pub fn resolve(&self, response: RpcResponse) {
        let sender = {
            let mut pending = self.pending.lock().unwrap();
            pending.remove(&response.correlation_id)
        };
        if let Some(sender) = sender {
            let _ = sender.send(response);
        }
    }
}

/// A host capability invocable over the bridge.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn handle(&self, args: Value) -> Result<Value>;
}

/// Host-side dispatcher owning the channel-to-handler registry.
#[derive(Default)]
pub struct RpcHost {
    handlers: HashMap<String, Arc<dyn RpcHandler>>,
}

impl RpcHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a named channel.
    pub fn register(&mut self, channel: &str, handler: Arc<dyn RpcHandler>) {
        self.handlers.insert(channel.to_string(), handler);
    }

    /// Dispatch one request to its handler.
    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let Some(handler) = self.handlers.get(&request.channel) else {
            return RpcResponse {
                correlation_id: request.correlation_id,
                result: None,
                error: Some(format!("No handler for channel: {}", request.channel)),
            };
        };

        match handler.handle(request.args).await {
            Ok(result) => RpcResponse {
                correlation_id: request.correlation_id,
                result: Some(result),
                error: None,
            },
            Err(e) => RpcResponse {
                correlation_id: request.correlation_id,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Serve requests from a unit until its channel closes.
    pub async fn serve(self, mut requests: mpsc::Receiver<RpcRequest>, responder: RpcResponder) {
        while let Some(request) = requests.recv().await {
            tracing::debug!("RPC dispatch: {}", request.channel);
            let response = self.dispatch(request).await;
            responder.resolve(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl RpcHandler for EchoHandler {
        async fn handle(&self, args: Value) -> Result<Value> {
            Ok(json!({ "echo": args }))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl RpcHandler for FailingHandler {
        async fn handle(&self, _args: Value) -> Result<Value> {
            Err(Error::Rpc("handler exploded".into()))
        }
    }

    fn spawn_host(bridge_timeout: Duration) -> (RpcBridge, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(8);
        let (bridge, responder) = RpcBridge::new(tx, bridge_timeout);

        let mut host = RpcHost::new();
        host.register("echo", Arc::new(EchoHandler));
        host.register("fail", Arc::new(FailingHandler));

        let handle = tokio::spawn(host.serve(rx, responder));
        (bridge, handle)
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let (bridge, _host) = spawn_host(DEFAULT_RPC_TIMEOUT);

        let result = bridge.call("echo", json!({"x": 1})).await.unwrap();
        assert_eq!(result["echo"]["x"], 1);
        assert_eq!(bridge.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let (bridge, _host) = spawn_host(DEFAULT_RPC_TIMEOUT);

        let err = bridge.call("fail", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::Rpc(_)));
        assert_eq!(bridge.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_an_error() {
        let (bridge, _host) = spawn_host(DEFAULT_RPC_TIMEOUT);

        let err = bridge.call("nope", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::Rpc(_)));
    }

    #[tokio::test]
    async fn test_timeout_removes_pending_entry() {
        // No host serving: the call can never resolve.
        let (tx, _rx) = mpsc::channel(8);
        let (bridge, _responder) = RpcBridge::new(tx, Duration::from_millis(50));

        let err = bridge.call("echo", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::RpcTimeout(_)));
        assert_eq!(bridge.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_repeated_calls_do_not_leak() {
        let (bridge, _host) = spawn_host(DEFAULT_RPC_TIMEOUT);

        for i in 0..20 {
            bridge.call("echo", json!({ "i": i })).await.unwrap();
        }
        assert_eq!(bridge.pending_len(), 0);
    }
}
