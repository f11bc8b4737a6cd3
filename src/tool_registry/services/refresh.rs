//! Per-turn reconciliation of the registry against the configuration store.

use super::{McpServerRegistry, ServerHandle};
use crate::tool_registry::{
    domain::{AgentAssignment, AgentName, AssignmentSet, McpServerName, ServerDescriptor},
    ports::{ConfigStoreError, McpDriver, McpServerConfigStore},
};
use mockable::Clock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of refreshing one agent's view of the registry.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// Running servers assigned to the agent, highest priority first.
    pub servers: Vec<ServerHandle>,
    /// Whether the set of servers or any of their catalogs differs from the
    /// previous refresh for the same agent.
    pub changed: bool,
    /// Whether the store could not be read and cached state was served.
    pub degraded: bool,
}

/// Identity of one agent's tool view: server names and catalog versions.
type ViewIdentity = Vec<(McpServerName, u64)>;

/// Records already reported as invalid, so each is logged once until it
/// changes.
#[derive(Debug, Default)]
struct RejectionMemo {
    descriptors: HashMap<String, String>,
    assignments: HashSet<(String, String)>,
}

/// Reconciles the registry with the configuration store before each agent
/// turn and reports whether the agent's tool view changed.
///
/// Reconciliation passes are serialized. Refreshes for the same agent are
/// serialized too; different agents refresh concurrently.
pub struct RefreshCoordinator<S, D, C>
where
    S: McpServerConfigStore + 'static,
    D: McpDriver + 'static,
    C: Clock + Send + Sync + 'static,
{
    registry: Arc<McpServerRegistry<S, D, C>>,
    reconcile: Mutex<RejectionMemo>,
    views: Mutex<HashMap<AgentName, Arc<Mutex<Option<ViewIdentity>>>>>,
}

impl<S, D, C> RefreshCoordinator<S, D, C>
where
    S: McpServerConfigStore + 'static,
    D: McpDriver + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a coordinator for `registry`.
    #[must_use]
    pub fn new(registry: Arc<McpServerRegistry<S, D, C>>) -> Self {
        Self {
            registry,
            reconcile: Mutex::new(RejectionMemo::default()),
            views: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the registry this coordinator maintains.
    #[must_use]
    pub const fn registry(&self) -> &Arc<McpServerRegistry<S, D, C>> {
        &self.registry
    }

    /// Reconciles the registry and returns the agent's current servers.
    ///
    /// Store failures never fail the refresh: the cached registry state is
    /// served with `degraded` set and `changed` cleared. The first refresh
    /// for an agent always reports `changed`.
    pub async fn refresh(&self, agent: &AgentName) -> RefreshOutcome {
        let view = self.view_for(agent).await;
        let mut previous = view.lock().await;

        let degraded = match self.reconcile(agent).await {
            Ok(()) => false,
            Err(err) => {
                warn!(agent = %agent, error = %err, "configuration store unavailable; serving cached registry");
                true
            }
        };

        self.registry.reap_closed_for(agent).await;
        let servers = self.registry.servers_for(agent).await;
        let identity: ViewIdentity = servers
            .iter()
            .map(|handle| (handle.name().clone(), handle.discovery_version()))
            .collect();

        let changed = if degraded {
            false
        } else {
            let changed = previous.as_ref() != Some(&identity);
            *previous = Some(identity);
            changed
        };

        debug!(
            agent = %agent,
            servers = servers.len(),
            changed,
            degraded,
            "MCP registry refreshed"
        );
        RefreshOutcome {
            servers,
            changed,
            degraded,
        }
    }

    /// Stops every supervised server.
    pub async fn shutdown(&self) {
        self.registry.shutdown_all().await;
    }

    async fn view_for(&self, agent: &AgentName) -> Arc<Mutex<Option<ViewIdentity>>> {
        let mut views = self.views.lock().await;
        Arc::clone(views.entry(agent.clone()).or_default())
    }

    async fn reconcile(&self, agent: &AgentName) -> Result<(), ConfigStoreError> {
        let mut memo = self.reconcile.lock().await;
        let store = self.registry.store();
        let records = store.list_descriptors().await?;
        let rows = store.list_assignments().await?;

        let mut desired: BTreeMap<McpServerName, ServerDescriptor> = BTreeMap::new();
        let mut rejected = HashMap::new();
        for record in records {
            let raw_name = record.name.clone();
            match ServerDescriptor::from_persisted(record) {
                Ok(descriptor) => {
                    desired.insert(descriptor.name().clone(), descriptor);
                }
                Err(err) => {
                    let message = err.to_string();
                    if memo.descriptors.get(&raw_name) != Some(&message) {
                        warn!(server = %raw_name, error = %err, "rejecting invalid MCP server descriptor");
                    }
                    rejected.insert(raw_name, message);
                }
            }
        }
        memo.descriptors = rejected;

        let mut invalid_rows = HashSet::new();
        let assignments: AssignmentSet = rows
            .into_iter()
            .filter_map(|row| {
                let key = (row.agent_name.clone(), row.server_name.clone());
                match AgentAssignment::from_persisted(row) {
                    Ok(assignment) => Some(assignment),
                    Err(err) => {
                        if !memo.assignments.contains(&key) {
                            warn!(agent = %key.0, server = %key.1, error = %err, "ignoring invalid assignment");
                        }
                        invalid_rows.insert(key);
                        None
                    }
                }
            })
            .collect();
        memo.assignments = invalid_rows;

        let mut transitions: Vec<(McpServerName, JoinHandle<()>)> = Vec::new();
        for name in self.registry.supervised_names().await {
            let keep = desired
                .get(&name)
                .is_some_and(ServerDescriptor::enabled);
            if keep {
                continue;
            }
            if let Some(supervisor) = self.registry.withdraw(&name).await {
                let retired = name.clone();
                transitions.push((
                    name,
                    tokio::spawn(async move {
                        supervisor.request_stop().await;
                        info!(server = %retired, "MCP server retired");
                    }),
                ));
            }
        }

        for (name, descriptor) in desired {
            if !descriptor.enabled() {
                continue;
            }
            if let Some(supervisor) = self.registry.supervisor(&name).await {
                if *supervisor.snapshot().descriptor() == descriptor {
                    continue;
                }
                transitions.push((
                    name,
                    tokio::spawn(async move {
                        supervisor.apply_descriptor(descriptor).await;
                    }),
                ));
                continue;
            }
            let auto_start = descriptor.auto_start();
            let supervisor = self.registry.supervise(descriptor).await;
            if auto_start {
                transitions.push((
                    name,
                    tokio::spawn(async move {
                        supervisor.request_start().await;
                    }),
                ));
            }
        }

        let mut relevant: HashSet<McpServerName> =
            self.registry.assignments().await.servers_for(agent).into_iter().collect();
        relevant.extend(assignments.servers_for(agent));
        self.registry.replace_assignments(assignments).await;

        // Other agents' servers finish their transitions in the background.
        for (name, transition) in transitions {
            if !relevant.contains(&name) {
                continue;
            }
            if let Err(err) = transition.await {
                warn!(server = %name, error = %err, "reconciliation task failed");
            }
        }
        Ok(())
    }
}
