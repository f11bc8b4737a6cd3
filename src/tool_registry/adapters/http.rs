//! HTTP driver: JSON-RPC over POST to a remote MCP endpoint.

use super::protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest};
use super::session::{McpSession, RpcTransport};
use crate::tool_registry::{
    domain::{HttpTransportConfig, McpServerName, McpTransport, ServerDescriptor},
    ports::{McpConnection, McpDriver, McpDriverError, McpDriverResult},
};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Header carrying the server-assigned session identifier.
pub const SESSION_HEADER: &str = "mcp-session-id";

const EVENT_STREAM: &str = "text/event-stream";

/// Driver for MCP servers reached over HTTP.
///
/// One pooled client is shared by every connection the driver opens.
#[derive(Debug, Clone)]
pub struct HttpMcpDriver {
    client: reqwest::Client,
}

impl HttpMcpDriver {
    /// Creates a driver with a default client.
    ///
    /// # Errors
    ///
    /// Returns [`McpDriverError::Runtime`] when the HTTP client cannot be
    /// built.
    pub fn new() -> McpDriverResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(McpDriverError::runtime)?;
        Ok(Self { client })
    }

    /// Creates a driver that reuses an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl McpDriver for HttpMcpDriver {
    async fn connect(
        &self,
        descriptor: &ServerDescriptor,
    ) -> McpDriverResult<Arc<dyn McpConnection>> {
        let McpTransport::Http(config) = descriptor.transport() else {
            return Err(McpDriverError::UnsupportedTransport {
                server: descriptor.name().clone(),
                transport: descriptor.transport().kind(),
            });
        };

        let transport = HttpTransport::new(
            self.client.clone(),
            descriptor.name(),
            config,
            descriptor.timeout(),
        )?;
        let session =
            McpSession::initialize(transport, descriptor.name().clone(), descriptor.timeout())
                .await?;
        Ok(Arc::new(session))
    }
}

struct HttpTransport {
    client: reqwest::Client,
    server: McpServerName,
    url: String,
    headers: HeaderMap,
    session_id: RwLock<Option<String>>,
    next_id: AtomicU64,
    notify_timeout: Duration,
    closed: watch::Sender<bool>,
}

impl HttpTransport {
    fn new(
        client: reqwest::Client,
        server: &McpServerName,
        config: &HttpTransportConfig,
        notify_timeout: Duration,
    ) -> McpDriverResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        for (key, value) in config.headers() {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|err| {
                McpDriverError::Connection(format!("invalid header name '{key}': {err}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|err| {
                McpDriverError::Connection(format!("invalid value for header '{key}': {err}"))
            })?;
            headers.insert(name, header_value);
        }

        let (closed, _) = watch::channel(false);
        Ok(Self {
            client,
            server: server.clone(),
            url: config.base_url().to_owned(),
            headers,
            session_id: RwLock::new(None),
            next_id: AtomicU64::new(1),
            notify_timeout,
            closed,
        })
    }

    fn current_session(&self) -> Option<String> {
        self.session_id.read().ok().and_then(|guard| guard.clone())
    }

    fn remember_session(&self, response: &reqwest::Response) {
        let Some(value) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        else {
            return;
        };
        if let Ok(mut guard) = self.session_id.write()
            && guard.as_deref() != Some(value)
        {
            debug!(server = %self.server, session = value, "MCP session id assigned");
            *guard = Some(value.to_owned());
        }
    }

    async fn post(
        &self,
        body: &impl Serialize,
        operation: &str,
        timeout: Duration,
    ) -> McpDriverResult<reqwest::Response> {
        if self.is_closed() {
            return Err(McpDriverError::Closed);
        }

        let mut request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .timeout(timeout)
            .json(body);
        if let Some(session) = self.current_session() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request
            .send()
            .await
            .map_err(|err| map_transport_error(&err, operation, timeout))?;
        self.remember_session(&response);

        let status = response.status();
        if !status.is_success() {
            return Err(McpDriverError::Connection(format!(
                "{operation} returned HTTP {status}"
            )));
        }
        Ok(response)
    }
}

fn map_transport_error(err: &reqwest::Error, operation: &str, timeout: Duration) -> McpDriverError {
    if err.is_timeout() {
        McpDriverError::timeout(operation, timeout)
    } else {
        McpDriverError::Connection(err.to_string())
    }
}

/// Extracts the `data` payload of every event in a `text/event-stream` body.
///
/// Multi-line data fields are joined with newlines.
fn event_stream_payloads(body: &str) -> Vec<String> {
    let mut payloads = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in body.lines() {
        if line.is_empty() {
            if !current.is_empty() {
                payloads.push(current.join("\n"));
                current.clear();
            }
            continue;
        }
        if let Some(data) = line.strip_prefix("data:") {
            current.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }
    if !current.is_empty() {
        payloads.push(current.join("\n"));
    }
    payloads
}

fn find_response(payloads: &[String], id: u64) -> McpDriverResult<JsonRpcMessage> {
    payloads
        .iter()
        .filter_map(|payload| serde_json::from_str::<JsonRpcMessage>(payload).ok())
        .find(|message| message.response_id() == Some(id))
        .ok_or_else(|| {
            McpDriverError::Protocol(format!("event stream carried no response for request {id}"))
        })
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> McpDriverResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let response = self
            .post(&JsonRpcRequest::new(id, method, params), method, timeout)
            .await?;

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with(EVENT_STREAM));
        let body = response
            .text()
            .await
            .map_err(|err| map_transport_error(&err, method, timeout))?;

        let message = if is_stream {
            find_response(&event_stream_payloads(&body), id)?
        } else {
            let message: JsonRpcMessage = serde_json::from_str(&body).map_err(|err| {
                McpDriverError::Protocol(format!("malformed {method} response: {err}"))
            })?;
            if message.response_id() != Some(id) {
                return Err(McpDriverError::Protocol(format!(
                    "{method} response id does not match request {id}"
                )));
            }
            message
        };
        message.into_result()
    }

    async fn notify(&self, method: &str, params: Value) -> McpDriverResult<()> {
        self.post(
            &JsonRpcNotification::new(method, params),
            method,
            self.notify_timeout,
        )
            .await
            .map(drop)
    }

    async fn shutdown(&self, timeout: Duration) -> McpDriverResult<()> {
        if let Some(session) = self.current_session() {
            let outcome = self
                .client
                .delete(&self.url)
                .headers(self.headers.clone())
                .header(SESSION_HEADER, session)
                .timeout(timeout)
                .send()
                .await;
            if let Err(err) = outcome {
                debug!(server = %self.server, error = %err, "session termination not acknowledged");
            }
        }
        self.closed.send_replace(true);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn closed(&self) {
        let mut receiver = self.closed.subscribe();
        let _closed = receiver.wait_for(|closed| *closed).await;
    }
}
