//! Transport-independent MCP session built on a JSON-RPC channel.

use super::protocol::{
    InitializeResult, METHOD_NOT_FOUND, ResourcesPage, ToolsPage, WireCallResult, decode,
    initialize_params,
};
use crate::tool_registry::{
    domain::{McpServerName, McpToolDefinition, ToolCallOutcome},
    ports::{McpConnection, McpDriverError, McpDriverResult},
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound on pages fetched for one listing.
const MAX_PAGES: usize = 100;

/// Request/response channel to one MCP server.
#[async_trait]
pub(crate) trait RpcTransport: Send + Sync {
    /// Sends a request and returns its `result` payload.
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> McpDriverResult<Value>;

    /// Sends a notification.
    async fn notify(&self, method: &str, params: Value) -> McpDriverResult<()>;

    /// Releases the channel, escalating once `timeout` elapses.
    async fn shutdown(&self, timeout: Duration) -> McpDriverResult<()>;

    /// Returns whether the channel has gone away.
    fn is_closed(&self) -> bool;

    /// Resolves once the channel goes away.
    async fn closed(&self);
}

/// Initialized MCP session over a [`RpcTransport`].
pub(crate) struct McpSession<T> {
    transport: T,
    server: McpServerName,
    timeout: Duration,
    resources_supported: bool,
}

impl<T: RpcTransport> McpSession<T> {
    /// Performs the `initialize` handshake and announces readiness.
    pub(crate) async fn initialize(
        transport: T,
        server: McpServerName,
        timeout: Duration,
    ) -> McpDriverResult<Self> {
        let raw = transport
            .request("initialize", Some(initialize_params()), timeout)
            .await?;
        let result: InitializeResult = decode("initialize", raw)?;
        transport
            .notify("notifications/initialized", json!({}))
            .await?;

        let (server_info_name, server_info_version) = result
            .server_info
            .as_ref()
            .map_or(("", ""), |info| (info.name.as_str(), info.version.as_str()));
        info!(
            server = %server,
            protocol_version = %result.protocol_version,
            remote_name = server_info_name,
            remote_version = server_info_version,
            tools_capability = result.capabilities.tools.is_some(),
            "MCP session initialized"
        );

        Ok(Self {
            transport,
            server,
            timeout,
            resources_supported: result.capabilities.resources.is_some(),
        })
    }

    async fn paginate<P>(
        &self,
        method: &str,
        mut absorb: impl FnMut(P) -> McpDriverResult<Option<String>> + Send,
    ) -> McpDriverResult<()>
    where
        P: serde::de::DeserializeOwned + Send,
    {
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();
        for _ in 0..MAX_PAGES {
            let params = cursor.as_ref().map(|value| json!({ "cursor": value }));
            let raw = self.transport.request(method, params, self.timeout).await?;
            let next = absorb(decode(method, raw)?)?;
            match next {
                None => return Ok(()),
                Some(next_cursor) => {
                    if !seen_cursors.insert(next_cursor.clone()) {
                        return Err(McpDriverError::Protocol(format!(
                            "{method} repeated cursor '{next_cursor}'"
                        )));
                    }
                    cursor = Some(next_cursor);
                }
            }
        }
        Err(McpDriverError::Protocol(format!(
            "{method} exceeded {MAX_PAGES} pages"
        )))
    }
}

#[async_trait]
impl<T: RpcTransport + 'static> McpConnection for McpSession<T> {
    async fn list_tools(&self) -> McpDriverResult<Vec<McpToolDefinition>> {
        let mut tools = Vec::new();
        self.paginate("tools/list", |page: ToolsPage| {
            for tool in page.tools {
                tools.push(McpToolDefinition::try_from(tool)?);
            }
            Ok(page.next_cursor)
        })
        .await?;
        Ok(tools)
    }

    async fn list_resources(&self) -> McpDriverResult<Vec<String>> {
        if !self.resources_supported {
            return Ok(Vec::new());
        }

        let mut uris = Vec::new();
        let listing = self
            .paginate("resources/list", |page: ResourcesPage| {
                uris.extend(page.resources.into_iter().map(|resource| resource.uri));
                Ok(page.next_cursor)
            })
            .await;
        match listing {
            Ok(()) => Ok(uris),
            Err(McpDriverError::Remote {
                code: METHOD_NOT_FOUND,
                ..
            }) => {
                debug!(server = %self.server, "resources/list not implemented; treating as empty");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> McpDriverResult<ToolCallOutcome> {
        let params = json!({ "name": name, "arguments": arguments });
        let raw = self
            .transport
            .request("tools/call", Some(params), self.timeout)
            .await?;
        let result: WireCallResult = decode("tools/call", raw)?;
        Ok(result.into())
    }

    async fn ping(&self) -> McpDriverResult<bool> {
        let reply = self.transport.request("ping", None, self.timeout).await?;
        Ok(reply.is_object())
    }

    async fn stop(&self, timeout: Duration) -> McpDriverResult<()> {
        self.transport.shutdown(timeout).await
    }

    fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    async fn closed(&self) {
        self.transport.closed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned results in order and records the requests.
    #[derive(Default)]
    struct ScriptedTransport {
        replies: Mutex<VecDeque<McpDriverResult<Value>>>,
        requests: Mutex<Vec<(String, Option<Value>)>>,
    }

    impl ScriptedTransport {
        fn with_replies(replies: impl IntoIterator<Item = McpDriverResult<Value>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn methods(&self) -> Vec<String> {
            self.requests
                .lock()
                .expect("requests lock")
                .iter()
                .map(|(method, _)| method.clone())
                .collect()
        }
    }

    #[async_trait]
    impl RpcTransport for ScriptedTransport {
        async fn request(
            &self,
            method: &str,
            params: Option<Value>,
            _timeout: Duration,
        ) -> McpDriverResult<Value> {
            self.requests
                .lock()
                .expect("requests lock")
                .push((method.to_owned(), params));
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or(Err(McpDriverError::Closed))
        }

        async fn notify(&self, _method: &str, _params: Value) -> McpDriverResult<()> {
            Ok(())
        }

        async fn shutdown(&self, _timeout: Duration) -> McpDriverResult<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }

        async fn closed(&self) {
            std::future::pending::<()>().await;
        }
    }

    fn init_reply(capabilities: Value) -> McpDriverResult<Value> {
        Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": capabilities,
            "serverInfo": {"name": "fixture", "version": "1.0.0"}
        }))
    }

    async fn session(
        replies: impl IntoIterator<Item = McpDriverResult<Value>>,
    ) -> McpSession<ScriptedTransport> {
        McpSession::initialize(
            ScriptedTransport::with_replies(replies),
            McpServerName::new("linear").expect("valid name"),
            Duration::from_secs(5),
        )
        .await
        .expect("initialize should succeed")
    }

    #[tokio::test]
    async fn tools_are_collected_across_pages() {
        let session = session([
            init_reply(json!({"tools": {}})),
            Ok(json!({"tools": [{"name": "createIssue"}], "nextCursor": "p2"})),
            Ok(json!({"tools": [{"name": "getIssues"}]})),
        ])
        .await;

        let tools = session.list_tools().await.expect("listing should succeed");
        let names: Vec<_> = tools.iter().map(McpToolDefinition::name).collect();
        assert_eq!(names, ["createIssue", "getIssues"]);

        let requests = session.transport.requests.lock().expect("requests lock");
        let cursor = requests.last().and_then(|(_, params)| params.clone());
        assert_eq!(cursor, Some(json!({"cursor": "p2"})));
    }

    #[tokio::test]
    async fn repeated_cursor_is_a_protocol_error() {
        let session = session([
            init_reply(json!({"tools": {}})),
            Ok(json!({"tools": [], "nextCursor": "same"})),
            Ok(json!({"tools": [], "nextCursor": "same"})),
        ])
        .await;

        let result = session.list_tools().await;
        assert!(matches!(result, Err(McpDriverError::Protocol(_))));
    }

    #[tokio::test]
    async fn resources_are_skipped_without_capability() {
        let session = session([init_reply(json!({"tools": {}}))]).await;

        let resources = session.list_resources().await.expect("listing should succeed");
        assert!(resources.is_empty());
        assert_eq!(session.transport.methods(), ["initialize"]);
    }

    #[tokio::test]
    async fn method_not_found_means_no_resources() {
        let session = session([
            init_reply(json!({"resources": {}})),
            Err(McpDriverError::Remote {
                code: METHOD_NOT_FOUND,
                message: String::from("Method not found"),
            }),
        ])
        .await;

        let resources = session.list_resources().await.expect("listing should succeed");
        assert!(resources.is_empty());
    }

    #[tokio::test]
    async fn tool_call_maps_error_flag() {
        let session = session([
            init_reply(json!({"tools": {}})),
            Ok(json!({"content": [{"type": "text", "text": "boom"}], "isError": true})),
        ])
        .await;

        let outcome = session
            .call_tool("createIssue", json!({"title": "x"}))
            .await
            .expect("call should succeed");
        assert!(outcome.is_error);
        assert_eq!(outcome.joined_text(), "boom");
    }
}
