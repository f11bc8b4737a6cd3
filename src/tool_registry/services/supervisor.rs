//! Per-server lifecycle supervision.

use super::ServerHandle;
use crate::tool_registry::{
    domain::{
        CatalogFingerprint, Discovery, McpServerName, McpToolDefinition, ServerDescriptor,
        ServerRuntimeState, ServerStatus, SupervisionConfig,
    },
    ports::{McpConnection, McpDriver, McpDriverError, McpDriverResult, McpServerConfigStore},
};
use mockable::Clock;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Owns the lifecycle of one MCP server.
///
/// Transitions are serialized behind an internal lock; readers observe
/// published [`ServerHandle`] snapshots and never wait for a transition.
/// Retries and health monitoring run as tasks owned by the supervisor, so
/// one server's timing never affects another's.
pub struct ServerSupervisor<S, D, C>
where
    S: McpServerConfigStore + 'static,
    D: McpDriver + 'static,
    C: Clock + Send + Sync + 'static,
{
    name: McpServerName,
    store: Arc<S>,
    driver: Arc<D>,
    clock: Arc<C>,
    config: SupervisionConfig,
    lifecycle: Mutex<Lifecycle>,
    snapshot: watch::Sender<ServerHandle>,
    self_ref: Weak<Self>,
}

/// Mutable supervision state guarded by the transition lock.
struct Lifecycle {
    descriptor: Arc<ServerDescriptor>,
    state: ServerRuntimeState,
    connection: Option<Arc<dyn McpConnection>>,
    tools: Arc<[McpToolDefinition]>,
    fingerprint: Option<CatalogFingerprint>,
    retry_task: Option<JoinHandle<()>>,
    monitor_task: Option<JoinHandle<()>>,
    // Bumped whenever the current connection is replaced or dropped so
    // stale retry and monitor tasks can recognise themselves.
    generation: u64,
}

impl Lifecycle {
    fn abort_retry(&mut self) {
        if let Some(task) = self.retry_task.take() {
            task.abort();
        }
    }

    fn abort_monitor(&mut self) {
        if let Some(task) = self.monitor_task.take() {
            task.abort();
        }
    }

    fn snapshot(&self) -> ServerHandle {
        let connection = if self.state.status().accepts_dispatch() {
            self.connection.clone()
        } else {
            None
        };
        ServerHandle::new(
            Arc::clone(&self.descriptor),
            self.state.clone(),
            Arc::clone(&self.tools),
            connection,
        )
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.abort_retry();
        self.abort_monitor();
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn bounded<T>(
    operation: &str,
    timeout: Duration,
    future: impl Future<Output = McpDriverResult<T>>,
) -> McpDriverResult<T> {
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| McpDriverError::timeout(operation, timeout))?
}

async fn discover(
    connection: &Arc<dyn McpConnection>,
    timeout: Duration,
) -> McpDriverResult<Discovery> {
    let tools = bounded("tools/list", timeout, connection.list_tools()).await?;
    let resources = bounded("resources/list", timeout, connection.list_resources()).await?;
    Ok(Discovery::new(tools, resources))
}

fn periodic(period: Option<Duration>) -> Option<Interval> {
    period.map(|every| {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    })
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(active) => {
            active.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl<S, D, C> ServerSupervisor<S, D, C>
where
    S: McpServerConfigStore + 'static,
    D: McpDriver + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a supervisor in the `stopped` state. Nothing is started.
    #[must_use]
    pub fn new(
        descriptor: ServerDescriptor,
        store: Arc<S>,
        driver: Arc<D>,
        clock: Arc<C>,
        config: SupervisionConfig,
    ) -> Arc<Self> {
        let lifecycle = Lifecycle {
            descriptor: Arc::new(descriptor),
            state: ServerRuntimeState::new(),
            connection: None,
            tools: Arc::from(Vec::new()),
            fingerprint: None,
            retry_task: None,
            monitor_task: None,
            generation: 0,
        };
        let (snapshot, _) = watch::channel(lifecycle.snapshot());
        let name = lifecycle.descriptor.name().clone();

        Arc::new_cyclic(|self_ref| Self {
            name,
            store,
            driver,
            clock,
            config,
            lifecycle: Mutex::new(lifecycle),
            snapshot,
            self_ref: self_ref.clone(),
        })
    }

    /// Returns the supervised server's name.
    #[must_use]
    pub const fn name(&self) -> &McpServerName {
        &self.name
    }

    /// Returns the latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ServerHandle {
        self.snapshot.borrow().clone()
    }

    /// Returns the latest published runtime state.
    #[must_use]
    pub fn state(&self) -> ServerRuntimeState {
        self.snapshot.borrow().state().clone()
    }

    /// Subscribes to snapshot updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ServerHandle> {
        self.snapshot.subscribe()
    }

    /// Starts the server unless it is already `starting` or `running`.
    ///
    /// An explicit start restores the full retry budget. The transition
    /// completes even if the caller stops waiting.
    pub async fn request_start(&self) -> ServerRuntimeState {
        self.run_detached(|supervisor| async move {
            let mut lifecycle = supervisor.lifecycle.lock().await;
            if lifecycle.state.status().is_active() {
                debug!(server = %supervisor.name, status = %lifecycle.state.status(), "start ignored");
                return lifecycle.state.clone();
            }
            if !lifecycle.descriptor.enabled() {
                debug!(server = %supervisor.name, "start ignored for disabled server");
                return lifecycle.state.clone();
            }
            lifecycle.abort_retry();
            lifecycle.state.reset_retry_budget();
            supervisor.start_locked(&mut lifecycle).await;
            lifecycle.state.clone()
        })
        .await
        .unwrap_or_else(|| self.state())
    }

    /// Stops the server. A server that is already `stopped` is left alone.
    ///
    /// Completes within the server timeout plus the configured grace
    /// period, even when the server does not acknowledge.
    pub async fn request_stop(&self) -> ServerRuntimeState {
        self.run_detached(|supervisor| async move {
            let mut lifecycle = supervisor.lifecycle.lock().await;
            supervisor.stop_locked(&mut lifecycle).await;
            lifecycle.state.clone()
        })
        .await
        .unwrap_or_else(|| self.state())
    }

    /// Stops the server if needed, then starts it with a full retry budget.
    pub async fn request_restart(&self) -> ServerRuntimeState {
        self.run_detached(|supervisor| async move {
            let mut lifecycle = supervisor.lifecycle.lock().await;
            supervisor.stop_locked(&mut lifecycle).await;
            if lifecycle.descriptor.enabled() {
                lifecycle.state.reset_retry_budget();
                supervisor.start_locked(&mut lifecycle).await;
            }
            lifecycle.state.clone()
        })
        .await
        .unwrap_or_else(|| self.state())
    }

    /// Adopts an updated descriptor.
    ///
    /// Launch changes restart a live server, any change retries a server in
    /// `error` when it auto-starts, and turning `auto_start` on starts a
    /// stopped server. Other changes only refresh the published snapshot.
    pub async fn apply_descriptor(&self, descriptor: ServerDescriptor) -> ServerRuntimeState {
        self.run_detached(move |supervisor| async move {
            let mut lifecycle = supervisor.lifecycle.lock().await;
            if *lifecycle.descriptor == descriptor {
                return lifecycle.state.clone();
            }

            let previous = Arc::clone(&lifecycle.descriptor);
            lifecycle.descriptor = Arc::new(descriptor);
            let status = lifecycle.state.status();
            let relaunch = previous.requires_reconnect(&lifecycle.descriptor);
            let auto_start = lifecycle.descriptor.auto_start();

            if relaunch && status != ServerStatus::Stopped {
                info!(server = %supervisor.name, "launch settings changed; restarting MCP server");
                supervisor.stop_locked(&mut lifecycle).await;
                lifecycle.state.reset_retry_budget();
                supervisor.start_locked(&mut lifecycle).await;
            } else if status == ServerStatus::Error && auto_start {
                lifecycle.abort_retry();
                lifecycle.state.reset_retry_budget();
                supervisor.start_locked(&mut lifecycle).await;
            } else if status == ServerStatus::Stopped && auto_start && !previous.auto_start() {
                supervisor.start_locked(&mut lifecycle).await;
            }
            supervisor.publish(&lifecycle);
            lifecycle.state.clone()
        })
        .await
        .unwrap_or_else(|| self.state())
    }

    /// Moves a `running` server whose connection has already closed into
    /// `error`. Returns whether it did.
    pub async fn reap_if_closed(&self) -> bool {
        if self.snapshot.borrow().status() != ServerStatus::Running {
            return false;
        }
        self.run_detached(|supervisor| async move {
            let mut lifecycle = supervisor.lifecycle.lock().await;
            let closed = lifecycle.state.status() == ServerStatus::Running
                && lifecycle
                    .connection
                    .as_ref()
                    .is_some_and(|connection| connection.is_closed());
            if closed {
                lifecycle.abort_monitor();
                warn!(server = %supervisor.name, "MCP server connection closed");
                supervisor
                    .fail_locked(&mut lifecycle, "connection closed")
                    .await;
            }
            closed
        })
        .await
        .unwrap_or(false)
    }

    /// Runs a transition on its own task so it is not abandoned halfway
    /// when the caller is cancelled. Returns `None` if the task did not
    /// complete.
    async fn run_detached<T, F, Fut>(&self, transition: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let supervisor = self.self_ref.upgrade()?;
        match tokio::spawn(transition(supervisor)).await {
            Ok(value) => Some(value),
            Err(err) => {
                error!(server = %self.name, error = %err, "supervisor transition task failed");
                None
            }
        }
    }

    fn publish(&self, lifecycle: &Lifecycle) {
        self.snapshot.send_replace(lifecycle.snapshot());
    }

    async fn audit(&self, state: &ServerRuntimeState) {
        let timeout = self.config.status_write_timeout();
        match tokio::time::timeout(timeout, self.store.write_runtime_status(&self.name, state))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(server = %self.name, error = %err, "runtime status write failed");
            }
            Err(_) => {
                warn!(
                    server = %self.name,
                    timeout_ms = millis(timeout),
                    "runtime status write timed out"
                );
            }
        }
    }

    async fn connect_and_discover(
        &self,
        descriptor: &ServerDescriptor,
    ) -> McpDriverResult<(Arc<dyn McpConnection>, Discovery)> {
        let timeout = descriptor.timeout();
        let connection = bounded("connect", timeout, self.driver.connect(descriptor)).await?;
        match discover(&connection, timeout).await {
            Ok(discovery) => Ok((connection, discovery)),
            Err(err) => {
                self.release(&connection, descriptor).await;
                Err(err)
            }
        }
    }

    async fn release(&self, connection: &Arc<dyn McpConnection>, descriptor: &ServerDescriptor) {
        let stop_timeout = descriptor.timeout();
        let bound = stop_timeout + self.config.stop_grace();
        match tokio::time::timeout(bound, connection.stop(stop_timeout)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(server = %self.name, error = %err, "MCP server stop reported an error");
            }
            Err(_) => {
                warn!(
                    server = %self.name,
                    timeout_ms = millis(bound),
                    "MCP server stop timed out; abandoning connection"
                );
            }
        }
    }

    async fn start_locked(&self, lifecycle: &mut Lifecycle) {
        if let Err(err) = lifecycle.state.begin_start() {
            debug!(server = %self.name, error = %err, "start skipped");
            return;
        }
        self.publish(lifecycle);
        debug!(
            server = %self.name,
            attempt = lifecycle.state.connection_attempts(),
            "starting MCP server"
        );

        let descriptor = Arc::clone(&lifecycle.descriptor);
        match self.connect_and_discover(&descriptor).await {
            Ok((connection, discovery)) => {
                if let Err(err) = lifecycle.state.mark_running(&discovery, &*self.clock) {
                    self.release(&connection, &descriptor).await;
                    self.fail_locked(lifecycle, &err.to_string()).await;
                    return;
                }
                lifecycle.fingerprint = Some(discovery.fingerprint());
                let (tools, _) = discovery.into_parts();
                lifecycle.tools = Arc::from(tools);
                lifecycle.generation = lifecycle.generation.wrapping_add(1);
                lifecycle.monitor_task =
                    Some(self.spawn_monitor(Arc::clone(&connection), lifecycle.generation));
                lifecycle.connection = Some(connection);

                info!(
                    server = %self.name,
                    tools = lifecycle.state.tools_discovered().len(),
                    resources = lifecycle.state.resources_discovered().len(),
                    discovery_version = lifecycle.state.discovery_version(),
                    "MCP server running"
                );
                self.publish(lifecycle);
                self.audit(&lifecycle.state).await;
            }
            Err(err) => {
                self.fail_locked(lifecycle, &err.to_string()).await;
            }
        }
    }

    async fn fail_locked(&self, lifecycle: &mut Lifecycle, message: &str) {
        lifecycle.abort_monitor();
        lifecycle.generation = lifecycle.generation.wrapping_add(1);
        if let Some(connection) = lifecycle.connection.take() {
            let descriptor = Arc::clone(&lifecycle.descriptor);
            self.release(&connection, &descriptor).await;
        }

        let failures = match lifecycle.state.mark_failed(message) {
            Ok(failures) => failures,
            Err(err) => {
                debug!(server = %self.name, error = %err, "failure ignored");
                return;
            }
        };
        self.publish(lifecycle);
        self.audit(&lifecycle.state).await;

        let budget = lifecycle.descriptor.max_retries();
        if failures <= budget {
            let delay = self.config.backoff().delay_for(failures);
            warn!(
                server = %self.name,
                error = message,
                failures,
                max_retries = budget,
                delay_ms = millis(delay),
                "MCP server failed; retry scheduled"
            );
            lifecycle.retry_task = Some(self.spawn_retry(delay, lifecycle.generation));
        } else {
            error!(
                server = %self.name,
                error = message,
                failures,
                "MCP server retry budget exhausted"
            );
        }
    }

    async fn stop_locked(&self, lifecycle: &mut Lifecycle) {
        lifecycle.abort_retry();
        lifecycle.abort_monitor();
        if let Err(err) = lifecycle.state.begin_stop() {
            debug!(server = %self.name, error = %err, "stop skipped");
            return;
        }
        lifecycle.generation = lifecycle.generation.wrapping_add(1);
        self.publish(lifecycle);

        if let Some(connection) = lifecycle.connection.take() {
            let descriptor = Arc::clone(&lifecycle.descriptor);
            self.release(&connection, &descriptor).await;
        }

        if let Err(err) = lifecycle.state.mark_stopped(&*self.clock) {
            warn!(server = %self.name, error = %err, "stop transition rejected");
            return;
        }
        info!(server = %self.name, "MCP server stopped");
        self.publish(lifecycle);
        self.audit(&lifecycle.state).await;
    }

    fn spawn_retry(&self, delay: Duration, generation: u64) -> JoinHandle<()> {
        let supervisor = self.self_ref.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(active) = supervisor.upgrade() {
                active.retry(generation).await;
            }
        })
    }

    async fn retry(&self, generation: u64) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.generation != generation || lifecycle.state.status() != ServerStatus::Error {
            return;
        }
        // This task is the retry; detach rather than abort it.
        drop(lifecycle.retry_task.take());
        self.start_locked(&mut lifecycle).await;
    }

    fn spawn_monitor(&self, connection: Arc<dyn McpConnection>, generation: u64) -> JoinHandle<()> {
        let supervisor = self.self_ref.clone();
        let mut health = periodic(self.config.health_check_interval());
        let mut rediscovery = periodic(self.config.rediscovery_interval());
        let ping_timeout = self.config.ping_timeout();

        tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    () = connection.closed() => break String::from("connection closed"),
                    () = next_tick(&mut health) => {
                        match tokio::time::timeout(ping_timeout, connection.ping()).await {
                            Ok(Ok(true)) => {}
                            Ok(Ok(false)) => break String::from("ping reported unhealthy"),
                            Ok(Err(err)) => break format!("ping failed: {err}"),
                            Err(_) => break format!("ping timed out after {}ms", millis(ping_timeout)),
                        }
                    }
                    () = next_tick(&mut rediscovery) => {
                        let Some(active) = supervisor.upgrade() else { return };
                        if !active.rediscover(generation).await {
                            return;
                        }
                    }
                }
            };

            if let Some(active) = supervisor.upgrade() {
                active.connection_lost(generation, &reason).await;
            }
        })
    }

    async fn connection_lost(&self, generation: u64, reason: &str) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.generation != generation || lifecycle.state.status() != ServerStatus::Running {
            return;
        }
        // Called from the monitor itself; detach rather than abort it.
        drop(lifecycle.monitor_task.take());
        warn!(server = %self.name, reason, "MCP server health check failed");
        self.fail_locked(&mut lifecycle, reason).await;
    }

    /// Re-runs discovery on a healthy server. Returns whether monitoring
    /// should continue.
    async fn rediscover(&self, generation: u64) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.generation != generation || lifecycle.state.status() != ServerStatus::Running {
            return false;
        }
        let Some(connection) = lifecycle.connection.clone() else {
            return false;
        };

        match discover(&connection, lifecycle.descriptor.timeout()).await {
            Ok(discovery) => {
                let fingerprint = discovery.fingerprint();
                if lifecycle.fingerprint == Some(fingerprint) {
                    return true;
                }
                if let Err(err) = lifecycle.state.record_rediscovery(&discovery) {
                    debug!(server = %self.name, error = %err, "rediscovery discarded");
                    return true;
                }
                lifecycle.fingerprint = Some(fingerprint);
                let (tools, _) = discovery.into_parts();
                lifecycle.tools = Arc::from(tools);
                info!(
                    server = %self.name,
                    tools = lifecycle.state.tools_discovered().len(),
                    discovery_version = lifecycle.state.discovery_version(),
                    "MCP server catalog changed"
                );
                self.publish(&lifecycle);
                self.audit(&lifecycle.state).await;
                true
            }
            Err(err) => {
                drop(lifecycle.monitor_task.take());
                self.fail_locked(&mut lifecycle, &format!("rediscovery failed: {err}"))
                    .await;
                false
            }
        }
    }
}
