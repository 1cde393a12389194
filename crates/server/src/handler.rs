//! Signal handling for the host bridge.
//!
//! Each input line is one JSON signal with an optional correlation `id`;
//! each signal produces exactly one reply line echoing that `id`.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use relaycache_client::{CacheWorker, Dispatched, FetchOutcome, HostAction, Network, Signal, SignalOutcome};
use relaycache_core::{ResourceClass, ResourceRequest, ResourceResponse};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::error::{BridgeError, ErrorBody};

/// A parsed input line.
#[derive(Debug)]
pub struct Envelope {
    pub id: Option<Value>,
    pub signal: Signal,
}

impl Envelope {
    /// Parse one input line.
    ///
    /// On failure the correlation id is still recovered when the line was a
    /// JSON object, so the error reply can be matched up.
    pub fn parse(line: &str) -> Result<Self, (Option<Value>, BridgeError)> {
        let mut value: Value =
            serde_json::from_str(line).map_err(|e| (None, BridgeError::InvalidInput(e.to_string())))?;

        let id = value.as_object_mut().and_then(|obj| obj.remove("id"));
        match Signal::deserialize(value) {
            Ok(signal) => Ok(Self { id, signal }),
            Err(e) => Err((id, BridgeError::InvalidInput(e.to_string()))),
        }
    }

    /// Fetches may run concurrently; everything else is processed in order.
    pub fn is_fetch(&self) -> bool {
        matches!(self.signal, Signal::Fetch { .. })
    }
}

/// How a wire body is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyEncoding {
    Utf8,
    Base64,
}

/// Response snapshot as written on the wire.
///
/// UTF-8 bodies are sent as text; anything else is base64 so the bytes
/// survive unchanged.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseView {
    pub status: u16,
    pub status_text: String,
    pub headers: std::collections::BTreeMap<String, String>,
    pub body: String,
    pub body_encoding: BodyEncoding,
}

impl From<ResourceResponse> for ResponseView {
    fn from(response: ResourceResponse) -> Self {
        let (body, body_encoding) = match std::str::from_utf8(&response.body) {
            Ok(text) => (text.to_string(), BodyEncoding::Utf8),
            Err(_) => (STANDARD.encode(&response.body), BodyEncoding::Base64),
        };

        Self { status: response.status, status_text: response.status_text, headers: response.headers, body, body_encoding }
    }
}

/// One output line.
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<HostAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Reply {
    fn success(id: Option<Value>, outcome: Value, actions: Vec<HostAction>) -> Self {
        Self { id, outcome: Some(outcome), actions, error: None }
    }

    pub fn failure(id: Option<Value>, err: BridgeError) -> Self {
        Self { id, outcome: None, actions: Vec::new(), error: Some(err.into()) }
    }

    /// Serialize to a single line.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"error":{{"code":-32603,"message":"INTERNAL_ERROR: {e}"}}}}"#)
        })
    }
}

/// Queue `reply` for the stdout writer.
///
/// Returns `false` once the writer has gone away; the reply is logged and dropped.
pub fn send_reply(tx: &mpsc::UnboundedSender<String>, reply: &Reply) -> bool {
    if tx.send(reply.to_line()).is_err() {
        tracing::warn!(id = ?reply.id, "reply writer closed, dropping reply");
        return false;
    }
    true
}

/// Routes signals to the worker and renders replies.
pub struct SignalHandler {
    worker: Arc<CacheWorker>,
    network: Arc<dyn Network>,
}

impl SignalHandler {
    pub fn new(worker: Arc<CacheWorker>, network: Arc<dyn Network>) -> Self {
        Self { worker, network }
    }

    pub async fn handle(&self, envelope: Envelope) -> Reply {
        let Envelope { id, signal } = envelope;

        let request = match &signal {
            Signal::Fetch { request } => Some(request.clone()),
            _ => None,
        };

        match self.worker.dispatch(signal).await {
            Ok(Dispatched { outcome: SignalOutcome::Fetch(FetchOutcome::Passthrough), actions }) => {
                // The worker declined; the bridge plays the host and goes to the network itself.
                match request {
                    Some(request) => self.passthrough(id, &request, actions).await,
                    None => Reply::failure(id, BridgeError::InvalidInput("passthrough without a request".into())),
                }
            }
            Ok(Dispatched { outcome, actions }) => Reply::success(id, render_outcome(outcome), actions),
            Err(err) => {
                tracing::warn!(error = %err, "signal failed");
                Reply::failure(id, err.into())
            }
        }
    }

    async fn passthrough(&self, id: Option<Value>, request: &ResourceRequest, actions: Vec<HostAction>) -> Reply {
        tracing::debug!(url = %request.url, method = %request.method, "passthrough");
        match self.network.fetch(request).await {
            Ok(response) => Reply::success(id, fetch_outcome(None, response), actions),
            Err(err) => Reply::failure(id, err.into()),
        }
    }
}

fn fetch_outcome(class: Option<ResourceClass>, response: ResourceResponse) -> Value {
    json!({
        "type": "fetch",
        "passthrough": class.is_none(),
        "class": class,
        "response": ResponseView::from(response),
    })
}

fn render_outcome(outcome: SignalOutcome) -> Value {
    match outcome {
        SignalOutcome::Installed(report) => json!({
            "type": "install",
            "seeded": report.seeded(),
            "failed": report.failed(),
            "report": report,
        }),
        SignalOutcome::Activated(report) => json!({ "type": "activate", "report": report }),
        SignalOutcome::Fetch(FetchOutcome::Respond { class, response }) => fetch_outcome(Some(class), response),
        SignalOutcome::Fetch(FetchOutcome::Passthrough) => json!({ "type": "fetch", "passthrough": true }),
        SignalOutcome::Synced(report) => json!({
            "type": "sync",
            "handled": report.is_some(),
            "delivered": report.as_ref().map(|r| r.delivered()).unwrap_or(0),
            "report": report,
        }),
        SignalOutcome::Pushed(notification) => json!({ "type": "push", "shown": notification.is_some() }),
        SignalOutcome::Clicked => json!({ "type": "notification_click" }),
    }
}
