//! In-memory configuration store for MCP server descriptors.

use crate::tool_registry::{
    domain::{McpServerName, PersistedAssignment, PersistedServerDescriptor, ServerRuntimeState},
    ports::{ConfigStoreError, ConfigStoreResult, McpServerConfigStore},
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory configuration store.
///
/// Descriptors are kept in name order. Runtime status writes are appended to
/// a per-server history so tests can inspect the audit trail.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMcpServerConfigStore {
    state: Arc<RwLock<InMemoryStoreState>>,
}

#[derive(Debug, Default)]
struct InMemoryStoreState {
    descriptors: BTreeMap<String, PersistedServerDescriptor>,
    assignments: Vec<PersistedAssignment>,
    status_history: HashMap<McpServerName, Vec<ServerRuntimeState>>,
    unavailable: bool,
    failing_status_writes: bool,
}

fn lock_error(err: impl std::fmt::Display) -> ConfigStoreError {
    ConfigStoreError::persistence(io::Error::other(err.to_string()))
}

fn offline() -> ConfigStoreError {
    ConfigStoreError::unavailable(io::Error::new(
        io::ErrorKind::ConnectionRefused,
        "configuration store is offline",
    ))
}

impl InMemoryMcpServerConfigStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn write<T>(&self, apply: impl FnOnce(&mut InMemoryStoreState) -> T) -> ConfigStoreResult<T> {
        let mut state = self.state.write().map_err(lock_error)?;
        Ok(apply(&mut state))
    }

    fn read<T>(&self, inspect: impl FnOnce(&InMemoryStoreState) -> T) -> ConfigStoreResult<T> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(inspect(&state))
    }

    /// Inserts or replaces a descriptor, keyed by its name.
    ///
    /// # Errors
    ///
    /// Returns persistence errors when lock acquisition fails.
    pub fn upsert_descriptor(&self, descriptor: PersistedServerDescriptor) -> ConfigStoreResult<()> {
        self.write(|state| {
            state
                .descriptors
                .insert(descriptor.name.clone(), descriptor);
        })
    }

    /// Removes a descriptor. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns persistence errors when lock acquisition fails.
    pub fn remove_descriptor(&self, name: &str) -> ConfigStoreResult<bool> {
        self.write(|state| state.descriptors.remove(name).is_some())
    }

    /// Records an assignment. Duplicate rows are ignored.
    ///
    /// # Errors
    ///
    /// Returns persistence errors when lock acquisition fails.
    pub fn assign(&self, agent: &str, server: &str) -> ConfigStoreResult<()> {
        let row = PersistedAssignment::new(agent, server);
        self.write(|state| {
            if !state.assignments.contains(&row) {
                state.assignments.push(row);
            }
        })
    }

    /// Deletes an assignment row.
    ///
    /// # Errors
    ///
    /// Returns persistence errors when lock acquisition fails.
    pub fn unassign(&self, agent: &str, server: &str) -> ConfigStoreResult<()> {
        let row = PersistedAssignment::new(agent, server);
        self.write(|state| state.assignments.retain(|existing| *existing != row))
    }

    /// Simulates losing or regaining connectivity to the store.
    ///
    /// # Errors
    ///
    /// Returns persistence errors when lock acquisition fails.
    pub fn set_unavailable(&self, unavailable: bool) -> ConfigStoreResult<()> {
        self.write(|state| state.unavailable = unavailable)
    }

    /// Makes runtime status writes fail while reads keep working.
    ///
    /// # Errors
    ///
    /// Returns persistence errors when lock acquisition fails.
    pub fn set_status_writes_failing(&self, failing: bool) -> ConfigStoreResult<()> {
        self.write(|state| state.failing_status_writes = failing)
    }

    /// Returns every runtime state written for `server`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns persistence errors when lock acquisition fails.
    pub fn status_history(&self, server: &McpServerName) -> ConfigStoreResult<Vec<ServerRuntimeState>> {
        self.read(|state| {
            state
                .status_history
                .get(server)
                .cloned()
                .unwrap_or_default()
        })
    }
}

#[async_trait]
impl McpServerConfigStore for InMemoryMcpServerConfigStore {
    async fn list_descriptors(&self) -> ConfigStoreResult<Vec<PersistedServerDescriptor>> {
        self.read(|state| {
            if state.unavailable {
                return Err(offline());
            }
            Ok(state.descriptors.values().cloned().collect())
        })?
    }

    async fn list_assignments(&self) -> ConfigStoreResult<Vec<PersistedAssignment>> {
        self.read(|state| {
            if state.unavailable {
                return Err(offline());
            }
            Ok(state.assignments.clone())
        })?
    }

    async fn write_runtime_status(
        &self,
        server: &McpServerName,
        runtime: &ServerRuntimeState,
    ) -> ConfigStoreResult<()> {
        self.write(|state| {
            if state.unavailable {
                return Err(offline());
            }
            if state.failing_status_writes {
                return Err(ConfigStoreError::persistence(io::Error::other(
                    "runtime status table is read-only",
                )));
            }
            state
                .status_history
                .entry(server.clone())
                .or_default()
                .push(runtime.clone());
            Ok(())
        })?
    }
}
