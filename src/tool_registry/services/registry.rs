//! Registry of supervised MCP servers and agent assignments.

use super::{ServerHandle, ServerSupervisor};
use crate::tool_registry::{
    domain::{
        AgentName, AssignmentSet, McpServerName, ServerDescriptor, ServerRuntimeState,
        SupervisionConfig,
    },
    ports::{McpDriver, McpServerConfigStore},
};
use mockable::Clock;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Errors returned by registry management operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No supervisor exists for the server.
    #[error("MCP server {0} is not supervised")]
    UnknownServer(McpServerName),
}

/// Result type for registry management operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

type Supervisors<S, D, C> = BTreeMap<McpServerName, Arc<ServerSupervisor<S, D, C>>>;

/// Registry of supervised MCP servers.
///
/// Holds one [`ServerSupervisor`] per enabled descriptor and the current
/// agent-to-server assignments. Queries read published snapshots, so a
/// server that is mid-transition never blocks them.
pub struct McpServerRegistry<S, D, C>
where
    S: McpServerConfigStore + 'static,
    D: McpDriver + 'static,
    C: Clock + Send + Sync + 'static,
{
    store: Arc<S>,
    driver: Arc<D>,
    clock: Arc<C>,
    config: SupervisionConfig,
    supervisors: RwLock<Supervisors<S, D, C>>,
    assignments: RwLock<AssignmentSet>,
}

impl<S, D, C> McpServerRegistry<S, D, C>
where
    S: McpServerConfigStore + 'static,
    D: McpDriver + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new(store: Arc<S>, driver: Arc<D>, clock: Arc<C>, config: SupervisionConfig) -> Self {
        Self {
            store,
            driver,
            clock,
            config,
            supervisors: RwLock::new(BTreeMap::new()),
            assignments: RwLock::new(AssignmentSet::new()),
        }
    }

    /// Returns the configuration store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the supervision settings shared by every server.
    #[must_use]
    pub const fn config(&self) -> &SupervisionConfig {
        &self.config
    }

    /// Assigns a server to an agent. Returns `false` if already assigned.
    pub async fn assign_server(&self, agent: AgentName, server: McpServerName) -> bool {
        self.assignments.write().await.assign(agent, server)
    }

    /// Removes an assignment. Returns `false` if it did not exist.
    pub async fn unassign_server(&self, agent: &AgentName, server: &McpServerName) -> bool {
        self.assignments.write().await.unassign(agent, server)
    }

    /// Returns a copy of the current assignments.
    pub async fn assignments(&self) -> AssignmentSet {
        self.assignments.read().await.clone()
    }

    /// Returns the running, enabled servers assigned to `agent`, highest
    /// priority first and then by name.
    pub async fn servers_for(&self, agent: &AgentName) -> Vec<ServerHandle> {
        let names = self.assignments.read().await.servers_for(agent);
        let supervisors = self.supervisors.read().await;
        let mut handles: Vec<ServerHandle> = names
            .iter()
            .filter_map(|name| supervisors.get(name))
            .map(|supervisor| supervisor.snapshot())
            .filter(|handle| handle.status().accepts_dispatch() && handle.descriptor().enabled())
            .collect();
        handles.sort_by(|left, right| {
            (Reverse(left.descriptor().priority()), left.name())
                .cmp(&(Reverse(right.descriptor().priority()), right.name()))
        });
        handles
    }

    /// Returns the latest snapshot of a supervised server, whatever its
    /// status.
    pub async fn get_server(&self, name: &McpServerName) -> Option<ServerHandle> {
        self.supervisors
            .read()
            .await
            .get(name)
            .map(|supervisor| supervisor.snapshot())
    }

    /// Returns the names of every supervised server.
    pub async fn supervised_names(&self) -> Vec<McpServerName> {
        self.supervisors.read().await.keys().cloned().collect()
    }

    /// Returns the runtime state of a supervised server.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownServer`] when the server is not
    /// supervised.
    pub async fn status(&self, name: &McpServerName) -> RegistryResult<ServerRuntimeState> {
        Ok(self.supervisor_or_error(name).await?.state())
    }

    /// Starts a supervised server with a full retry budget.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownServer`] when the server is not
    /// supervised.
    pub async fn request_start(&self, name: &McpServerName) -> RegistryResult<ServerRuntimeState> {
        let supervisor = self.supervisor_or_error(name).await?;
        Ok(supervisor.request_start().await)
    }

    /// Stops a supervised server. The server stays supervised and stays
    /// stopped until started again.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownServer`] when the server is not
    /// supervised.
    pub async fn request_stop(&self, name: &McpServerName) -> RegistryResult<ServerRuntimeState> {
        let supervisor = self.supervisor_or_error(name).await?;
        Ok(supervisor.request_stop().await)
    }

    /// Restarts a supervised server.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownServer`] when the server is not
    /// supervised.
    pub async fn request_restart(
        &self,
        name: &McpServerName,
    ) -> RegistryResult<ServerRuntimeState> {
        let supervisor = self.supervisor_or_error(name).await?;
        Ok(supervisor.request_restart().await)
    }

    /// Begins supervising `descriptor` in the `stopped` state.
    ///
    /// An existing supervisor for the same name is kept and handed back.
    pub async fn supervise(
        &self,
        descriptor: ServerDescriptor,
    ) -> Arc<ServerSupervisor<S, D, C>> {
        let mut supervisors = self.supervisors.write().await;
        if let Some(existing) = supervisors.get(descriptor.name()) {
            return Arc::clone(existing);
        }
        let name = descriptor.name().clone();
        let supervisor = ServerSupervisor::new(
            descriptor,
            Arc::clone(&self.store),
            Arc::clone(&self.driver),
            Arc::clone(&self.clock),
            self.config,
        );
        supervisors.insert(name.clone(), Arc::clone(&supervisor));
        debug!(server = %name, "supervising MCP server");
        supervisor
    }

    /// Returns the supervisor for `name`, if any.
    pub async fn supervisor(&self, name: &McpServerName) -> Option<Arc<ServerSupervisor<S, D, C>>> {
        self.supervisors.read().await.get(name).cloned()
    }

    /// Drops the supervisor for `name` from the registry without stopping
    /// it, handing it back to the caller.
    pub async fn withdraw(&self, name: &McpServerName) -> Option<Arc<ServerSupervisor<S, D, C>>> {
        self.supervisors.write().await.remove(name)
    }

    /// Replaces every assignment at once.
    pub async fn replace_assignments(&self, assignments: AssignmentSet) {
        *self.assignments.write().await = assignments;
    }

    /// Moves assigned servers whose connection has already closed into
    /// `error` so they are excluded from the next query.
    pub async fn reap_closed_for(&self, agent: &AgentName) {
        let names = self.assignments.read().await.servers_for(agent);
        let candidates: Vec<_> = {
            let supervisors = self.supervisors.read().await;
            names
                .iter()
                .filter_map(|name| supervisors.get(name).cloned())
                .collect()
        };
        for supervisor in candidates {
            supervisor.reap_if_closed().await;
        }
    }

    /// Stops and drops every supervised server concurrently.
    pub async fn shutdown_all(&self) {
        let drained: Vec<_> = {
            let mut supervisors = self.supervisors.write().await;
            std::mem::take(&mut *supervisors).into_values().collect()
        };
        let stops: Vec<_> = drained
            .into_iter()
            .map(|supervisor| tokio::spawn(async move { supervisor.request_stop().await }))
            .collect();
        for stop in stops {
            if let Err(err) = stop.await {
                warn!(error = %err, "MCP server shutdown task failed");
            }
        }
    }

    async fn supervisor_or_error(
        &self,
        name: &McpServerName,
    ) -> RegistryResult<Arc<ServerSupervisor<S, D, C>>> {
        self.supervisor(name)
            .await
            .ok_or_else(|| RegistryError::UnknownServer(name.clone()))
    }
}
