//! Many-to-many mapping between agents and the MCP servers they may use.

use super::{AgentName, McpServerName, ToolRegistryDomainError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Grant allowing one agent to use one MCP server.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentAssignment {
    agent: AgentName,
    server: McpServerName,
}

impl AgentAssignment {
    /// Creates an assignment.
    #[must_use]
    pub const fn new(agent: AgentName, server: McpServerName) -> Self {
        Self { agent, server }
    }

    /// Validates and converts a persisted assignment row.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] when either name is invalid.
    pub fn from_persisted(record: PersistedAssignment) -> Result<Self, ToolRegistryDomainError> {
        Ok(Self::new(
            AgentName::new(record.agent_name)?,
            McpServerName::new(record.server_name)?,
        ))
    }

    /// Returns the agent.
    #[must_use]
    pub const fn agent(&self) -> &AgentName {
        &self.agent
    }

    /// Returns the server.
    #[must_use]
    pub const fn server(&self) -> &McpServerName {
        &self.server
    }
}

/// Assignment row as stored by the configuration store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAssignment {
    /// Agent name.
    pub agent_name: String,
    /// Server name.
    pub server_name: String,
}

impl PersistedAssignment {
    /// Creates a persisted assignment row.
    #[must_use]
    pub fn new(agent_name: impl Into<String>, server_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            server_name: server_name.into(),
        }
    }
}

/// Set of unique agent-server assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentSet {
    entries: BTreeSet<AgentAssignment>,
}

impl AssignmentSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an assignment. Returns `true` when the set changed.
    pub fn assign(&mut self, agent: AgentName, server: McpServerName) -> bool {
        self.entries.insert(AgentAssignment::new(agent, server))
    }

    /// Removes an assignment. Returns `true` when the set changed.
    pub fn unassign(&mut self, agent: &AgentName, server: &McpServerName) -> bool {
        self.entries
            .remove(&AgentAssignment::new(agent.clone(), server.clone()))
    }

    /// Returns whether `agent` may use `server`.
    #[must_use]
    pub fn contains(&self, agent: &AgentName, server: &McpServerName) -> bool {
        self.entries
            .contains(&AgentAssignment::new(agent.clone(), server.clone()))
    }

    /// Returns the servers assigned to `agent`, in name order.
    #[must_use]
    pub fn servers_for(&self, agent: &AgentName) -> Vec<McpServerName> {
        self.entries
            .iter()
            .filter(|entry| entry.agent() == agent)
            .map(|entry| entry.server().clone())
            .collect()
    }

    /// Returns the agents assigned to `server`, in name order.
    #[must_use]
    pub fn agents_for(&self, server: &McpServerName) -> Vec<AgentName> {
        self.entries
            .iter()
            .filter(|entry| entry.server() == server)
            .map(|entry| entry.agent().clone())
            .collect()
    }

    /// Returns the number of assignments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether there are no assignments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates assignments in (agent, server) order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentAssignment> {
        self.entries.iter()
    }
}

impl FromIterator<AgentAssignment> for AssignmentSet {
    fn from_iter<I: IntoIterator<Item = AgentAssignment>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
