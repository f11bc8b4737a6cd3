//! STDIO driver: spawns an MCP server and speaks line-delimited JSON-RPC.

use super::protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, reply_to_server_request};
use super::session::{McpSession, RpcTransport};
use crate::tool_registry::{
    domain::{McpServerName, McpTransport, ServerDescriptor, StdioTransportConfig},
    ports::{McpConnection, McpDriver, McpDriverError, McpDriverResult},
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcMessage>>>>;
type SharedStdin = Arc<Mutex<Option<ChildStdin>>>;

/// Driver for MCP servers launched as local subprocesses.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioMcpDriver;

impl StdioMcpDriver {
    /// Creates the driver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl McpDriver for StdioMcpDriver {
    async fn connect(
        &self,
        descriptor: &ServerDescriptor,
    ) -> McpDriverResult<Arc<dyn McpConnection>> {
        let McpTransport::Stdio(config) = descriptor.transport() else {
            return Err(McpDriverError::UnsupportedTransport {
                server: descriptor.name().clone(),
                transport: descriptor.transport().kind(),
            });
        };

        let transport = StdioTransport::spawn(descriptor.name(), config)?;
        let session =
            McpSession::initialize(transport, descriptor.name().clone(), descriptor.timeout())
                .await?;
        Ok(Arc::new(session))
    }
}

/// JSON-RPC channel over a child process's standard streams.
struct StdioTransport {
    server: McpServerName,
    child: Mutex<Child>,
    stdin: SharedStdin,
    pending: PendingMap,
    next_id: AtomicU64,
    closed: watch::Receiver<bool>,
    closed_signal: Arc<watch::Sender<bool>>,
    background: Vec<JoinHandle<()>>,
}

impl StdioTransport {
    fn spawn(server: &McpServerName, config: &StdioTransportConfig) -> McpDriverResult<Self> {
        let mut command = Command::new(config.command());
        command
            .args(config.args())
            .envs(config.env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(directory) = config.working_directory() {
            command.current_dir(directory);
        }

        let mut child = command.spawn().map_err(|err| McpDriverError::Spawn {
            command: config.command().to_owned(),
            message: err.to_string(),
        })?;
        debug!(server = %server, pid = child.id(), "spawned MCP server process");

        let child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpDriverError::Connection(String::from("stdin not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpDriverError::Connection(String::from("stdout not captured")))?;
        let stderr = child.stderr.take();

        let stdin: SharedStdin = Arc::new(Mutex::new(Some(child_stdin)));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (closed_tx, closed_rx) = watch::channel(false);
        let closed_signal = Arc::new(closed_tx);

        let mut background = vec![tokio::spawn(read_stdout(
            server.clone(),
            stdout,
            Arc::clone(&stdin),
            Arc::clone(&pending),
            Arc::clone(&closed_signal),
        ))];
        if let Some(stream) = stderr {
            let stderr_server = server.clone();
            background.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stream).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %stderr_server, line = %line, "MCP server stderr");
                }
            }));
        }

        Ok(Self {
            server: server.clone(),
            child: Mutex::new(child),
            stdin,
            pending,
            next_id: AtomicU64::new(1),
            closed: closed_rx,
            closed_signal,
            background,
        })
    }

    async fn write_line(&self, line: &str) -> McpDriverResult<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(McpDriverError::Closed)?;
        write_frame(stdin, line)
            .await
            .map_err(|err| McpDriverError::Connection(format!("failed to write to stdin: {err}")))
    }
}

async fn write_frame(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

/// Routes stdout lines to waiting requests until the stream ends.
async fn read_stdout(
    server: McpServerName,
    stdout: ChildStdout,
    stdin: SharedStdin,
    pending: PendingMap,
    closed: Arc<watch::Sender<bool>>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                route_message(&server, trimmed, &stdin, &pending).await;
            }
            Ok(None) => {
                debug!(server = %server, "MCP server stdout closed");
                break;
            }
            Err(err) => {
                warn!(server = %server, error = %err, "failed reading MCP server stdout");
                break;
            }
        }
    }

    closed.send_replace(true);
    pending.lock().await.clear();
}

async fn route_message(server: &McpServerName, line: &str, stdin: &SharedStdin, pending: &PendingMap) {
    let message = match serde_json::from_str::<JsonRpcMessage>(line) {
        Ok(message) => message,
        Err(err) => {
            debug!(server = %server, line = %line, error = %err, "ignoring non JSON-RPC output");
            return;
        }
    };

    if let Some(id) = message.response_id() {
        let waiter = pending.lock().await.remove(&id);
        match waiter {
            Some(sender) => {
                if sender.send(message).is_err() {
                    debug!(server = %server, id, "response arrived after the caller gave up");
                }
            }
            None => debug!(server = %server, id, "response for unknown request id"),
        }
        return;
    }

    match (message.id.as_ref(), message.method.as_deref()) {
        (Some(id), Some(method)) => {
            let reply = reply_to_server_request(id, method).to_string();
            let mut guard = stdin.lock().await;
            if let Some(handle) = guard.as_mut()
                && let Err(err) = write_frame(handle, &reply).await
            {
                debug!(server = %server, method, error = %err, "failed to answer server request");
            }
        }
        (None, Some(method)) => {
            debug!(server = %server, method, "ignoring server notification");
        }
        _ => {
            debug!(server = %server, line = %line, "ignoring unroutable message");
        }
    }
}

#[async_trait]
impl RpcTransport for StdioTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> McpDriverResult<Value> {
        if self.is_closed() {
            return Err(McpDriverError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = serde_json::to_string(&JsonRpcRequest::new(id, method, params))
            .map_err(McpDriverError::runtime)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(err) = self.write_line(&frame).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(message)) => message.into_result(),
            Ok(Err(_)) => Err(McpDriverError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpDriverError::timeout(method, timeout))
            }
        }
    }

    async fn notify(&self, method: &str, params: Value) -> McpDriverResult<()> {
        let frame = serde_json::to_string(&JsonRpcNotification::new(method, params))
            .map_err(McpDriverError::runtime)?;
        self.write_line(&frame).await
    }

    async fn shutdown(&self, timeout: Duration) -> McpDriverResult<()> {
        // Closing stdin is the polite request to exit.
        drop(self.stdin.lock().await.take());

        let mut child = self.child.lock().await;
        terminate(&mut child);

        let outcome = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(server = %self.server, %status, "MCP server exited");
                Ok(())
            }
            Ok(Err(err)) => Err(McpDriverError::runtime(err)),
            Err(_) => {
                warn!(
                    server = %self.server,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "MCP server ignored shutdown; killing"
                );
                child.kill().await.map_err(McpDriverError::runtime)
            }
        };

        self.closed_signal.send_replace(true);
        outcome
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn closed(&self) {
        let mut receiver = self.closed.clone();
        let _closed = receiver.wait_for(|closed| *closed).await;
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        for task in &self.background {
            task.abort();
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(raw_pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(err) = signal::kill(Pid::from_raw(raw_pid), Signal::SIGTERM) {
        debug!(pid = raw_pid, error = %err, "SIGTERM not delivered");
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        debug!(error = %err, "kill not delivered");
    }
}
