//! In-memory MCP driver for deterministic supervision tests.

use crate::tool_registry::{
    domain::{McpServerName, McpToolDefinition, ServerDescriptor, ToolCallOutcome},
    ports::{McpConnection, McpDriver, McpDriverError, McpDriverResult},
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// In-memory MCP driver.
///
/// This driver models connections without spawning processes or opening
/// sockets. Catalogs, failures, crashes, and slow operations are scripted
/// per server name, which makes it suitable for unit and integration tests
/// and for local deterministic supervision flows.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMcpDriver {
    state: Arc<RwLock<InMemoryDriverState>>,
}

#[derive(Debug, Default)]
struct InMemoryDriverState {
    catalogs: HashMap<McpServerName, ScriptedCatalog>,
    pending_connect_failures: HashMap<McpServerName, u32>,
    always_failing: HashSet<McpServerName>,
    failing_discovery: HashSet<McpServerName>,
    unhealthy: HashSet<McpServerName>,
    connect_delays: HashMap<McpServerName, Duration>,
    stop_delays: HashMap<McpServerName, Duration>,
    connect_log: HashMap<McpServerName, Vec<Instant>>,
    stop_calls: HashMap<McpServerName, u32>,
    live: HashMap<McpServerName, Vec<watch::Sender<bool>>>,
}

#[derive(Debug, Clone, Default)]
struct ScriptedCatalog {
    tools: Vec<McpToolDefinition>,
    resources: Vec<String>,
}

fn lock_error(err: impl std::fmt::Display) -> McpDriverError {
    McpDriverError::runtime(std::io::Error::other(err.to_string()))
}

impl InMemoryMcpDriver {
    /// Creates an empty in-memory driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn write<T>(&self, apply: impl FnOnce(&mut InMemoryDriverState) -> T) -> McpDriverResult<T> {
        let mut state = self.state.write().map_err(lock_error)?;
        Ok(apply(&mut state))
    }

    fn read<T>(&self, inspect: impl FnOnce(&InMemoryDriverState) -> T) -> McpDriverResult<T> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(inspect(&state))
    }

    /// Associates a tool and resource catalog with a server name.
    ///
    /// Existing catalog entries are replaced. Live connections observe the
    /// new catalog on their next listing.
    ///
    /// # Errors
    ///
    /// Returns driver runtime errors when lock acquisition fails.
    pub fn set_catalog(
        &self,
        server: McpServerName,
        tools: Vec<McpToolDefinition>,
        resources: Vec<String>,
    ) -> McpDriverResult<()> {
        self.write(|state| {
            state
                .catalogs
                .insert(server, ScriptedCatalog { tools, resources });
        })
    }

    /// Makes the next `count` connection attempts for `server` fail.
    ///
    /// # Errors
    ///
    /// Returns driver runtime errors when lock acquisition fails.
    pub fn fail_next_connects(&self, server: McpServerName, count: u32) -> McpDriverResult<()> {
        self.write(|state| {
            state.pending_connect_failures.insert(server, count);
        })
    }

    /// Makes every connection attempt for `server` fail until cleared.
    ///
    /// # Errors
    ///
    /// Returns driver runtime errors when lock acquisition fails.
    pub fn set_always_failing(&self, server: McpServerName, failing: bool) -> McpDriverResult<()> {
        self.write(|state| {
            if failing {
                state.always_failing.insert(server);
            } else {
                state.always_failing.remove(&server);
            }
        })
    }

    /// Makes tool listing for `server` answer with a protocol error.
    ///
    /// # Errors
    ///
    /// Returns driver runtime errors when lock acquisition fails.
    pub fn set_discovery_failing(
        &self,
        server: McpServerName,
        failing: bool,
    ) -> McpDriverResult<()> {
        self.write(|state| {
            if failing {
                state.failing_discovery.insert(server);
            } else {
                state.failing_discovery.remove(&server);
            }
        })
    }

    /// Makes pings to the live connection of `server` report unhealthy.
    ///
    /// The flag is cleared by the next successful connect.
    ///
    /// # Errors
    ///
    /// Returns driver runtime errors when lock acquisition fails.
    pub fn set_unhealthy(&self, server: McpServerName) -> McpDriverResult<()> {
        self.write(|state| {
            state.unhealthy.insert(server);
        })
    }

    /// Delays every connection attempt for `server`.
    ///
    /// # Errors
    ///
    /// Returns driver runtime errors when lock acquisition fails.
    pub fn set_connect_delay(&self, server: McpServerName, delay: Duration) -> McpDriverResult<()> {
        self.write(|state| {
            state.connect_delays.insert(server, delay);
        })
    }

    /// Delays every stop of a `server` connection.
    ///
    /// # Errors
    ///
    /// Returns driver runtime errors when lock acquisition fails.
    pub fn set_stop_delay(&self, server: McpServerName, delay: Duration) -> McpDriverResult<()> {
        self.write(|state| {
            state.stop_delays.insert(server, delay);
        })
    }

    /// Simulates the server going away on its own.
    ///
    /// # Errors
    ///
    /// Returns driver runtime errors when lock acquisition fails.
    pub fn crash(&self, server: &McpServerName) -> McpDriverResult<()> {
        self.write(|state| {
            if let Some(connections) = state.live.get(server) {
                for connection in connections {
                    connection.send_replace(true);
                }
            }
        })
    }

    /// Returns how many connection attempts `server` has seen.
    ///
    /// # Errors
    ///
    /// Returns driver runtime errors when lock acquisition fails.
    pub fn connect_attempts(&self, server: &McpServerName) -> McpDriverResult<usize> {
        self.read(|state| state.connect_log.get(server).map_or(0, Vec::len))
    }

    /// Returns when each connection attempt for `server` began.
    ///
    /// # Errors
    ///
    /// Returns driver runtime errors when lock acquisition fails.
    pub fn connect_instants(&self, server: &McpServerName) -> McpDriverResult<Vec<Instant>> {
        self.read(|state| state.connect_log.get(server).cloned().unwrap_or_default())
    }

    /// Returns how many times a `server` connection was asked to stop.
    ///
    /// # Errors
    ///
    /// Returns driver runtime errors when lock acquisition fails.
    pub fn stop_calls(&self, server: &McpServerName) -> McpDriverResult<u32> {
        self.read(|state| state.stop_calls.get(server).copied().unwrap_or(0))
    }

    /// Returns how many connections to `server` are still open.
    ///
    /// # Errors
    ///
    /// Returns driver runtime errors when lock acquisition fails.
    pub fn open_connections(&self, server: &McpServerName) -> McpDriverResult<usize> {
        self.read(|state| {
            state.live.get(server).map_or(0, |connections| {
                connections
                    .iter()
                    .filter(|connection| !*connection.borrow())
                    .count()
            })
        })
    }
}

#[async_trait]
impl McpDriver for InMemoryMcpDriver {
    async fn connect(
        &self,
        descriptor: &ServerDescriptor,
    ) -> McpDriverResult<Arc<dyn McpConnection>> {
        let server = descriptor.name().clone();
        let delay = self.write(|state| {
            state
                .connect_log
                .entry(server.clone())
                .or_default()
                .push(Instant::now());
            state.connect_delays.get(&server).copied()
        })?;

        if let Some(wait) = delay {
            tokio::time::sleep(wait).await;
        }

        let closed = self.write(|state| {
            if state.always_failing.contains(&server) {
                return Err(McpDriverError::Connection(format!(
                    "scripted connect failure for {server}"
                )));
            }
            if let Some(remaining) = state.pending_connect_failures.get_mut(&server)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(McpDriverError::Connection(format!(
                    "scripted connect failure for {server}"
                )));
            }

            state.unhealthy.remove(&server);
            let (closed, _) = watch::channel(false);
            let connections = state.live.entry(server.clone()).or_default();
            connections.retain(|connection| !*connection.borrow());
            connections.push(closed.clone());
            Ok(closed)
        })??;

        Ok(Arc::new(InMemoryConnection {
            server,
            state: Arc::clone(&self.state),
            closed,
        }))
    }
}

/// Connection handed out by [`InMemoryMcpDriver`].
#[derive(Debug)]
struct InMemoryConnection {
    server: McpServerName,
    state: Arc<RwLock<InMemoryDriverState>>,
    closed: watch::Sender<bool>,
}

impl InMemoryConnection {
    fn ensure_open(&self) -> McpDriverResult<()> {
        if *self.closed.borrow() {
            return Err(McpDriverError::Closed);
        }
        Ok(())
    }

    fn catalog(&self) -> McpDriverResult<ScriptedCatalog> {
        self.ensure_open()?;
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.catalogs.get(&self.server).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl McpConnection for InMemoryConnection {
    async fn list_tools(&self) -> McpDriverResult<Vec<McpToolDefinition>> {
        let failing = {
            let state = self.state.read().map_err(lock_error)?;
            state.failing_discovery.contains(&self.server)
        };
        if failing {
            return Err(McpDriverError::Protocol(format!(
                "scripted malformed tools/list from {}",
                self.server
            )));
        }
        Ok(self.catalog()?.tools)
    }

    async fn list_resources(&self) -> McpDriverResult<Vec<String>> {
        Ok(self.catalog()?.resources)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> McpDriverResult<ToolCallOutcome> {
        let catalog = self.catalog()?;
        if !catalog.tools.iter().any(|tool| tool.name() == name) {
            return Err(McpDriverError::Remote {
                code: -32602,
                message: format!("unknown tool '{name}'"),
            });
        }
        Ok(ToolCallOutcome::text(format!("{name} {arguments}")))
    }

    async fn ping(&self) -> McpDriverResult<bool> {
        self.ensure_open()?;
        let state = self.state.read().map_err(lock_error)?;
        Ok(!state.unhealthy.contains(&self.server))
    }

    async fn stop(&self, _timeout: Duration) -> McpDriverResult<()> {
        let delay = {
            let mut state = self.state.write().map_err(lock_error)?;
            *state.stop_calls.entry(self.server.clone()).or_default() += 1;
            state.stop_delays.get(&self.server).copied()
        };
        if let Some(wait) = delay {
            tokio::time::sleep(wait).await;
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
