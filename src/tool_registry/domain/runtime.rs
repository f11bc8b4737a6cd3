//! Observed runtime state of a supervised MCP server.

use super::{Discovery, ServerStatus, ToolRegistryDomainError};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Runtime state owned and mutated by exactly one supervisor.
///
/// Discovery results survive transitions to `error` and `stopped` so the
/// last known catalog stays visible for diagnostics; they are only
/// authoritative while the server is `running`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRuntimeState {
    status: ServerStatus,
    started_at: Option<DateTime<Utc>>,
    last_stopped: Option<DateTime<Utc>>,
    error_count: u32,
    connection_attempts: u32,
    last_error: Option<String>,
    tools_discovered: Vec<String>,
    resources_discovered: Vec<String>,
    discovery_version: u64,
}

impl ServerRuntimeState {
    /// Creates the initial `stopped` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> ServerStatus {
        self.status
    }

    /// Returns when the current or last run became `running`.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns when the server last reached `stopped`.
    #[must_use]
    pub const fn last_stopped(&self) -> Option<DateTime<Utc>> {
        self.last_stopped
    }

    /// Returns consecutive failures since the last successful start.
    #[must_use]
    pub const fn error_count(&self) -> u32 {
        self.error_count
    }

    /// Returns start attempts since the last successful start.
    #[must_use]
    pub const fn connection_attempts(&self) -> u32 {
        self.connection_attempts
    }

    /// Returns the most recent failure message.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the tool names from the last successful discovery.
    #[must_use]
    pub fn tools_discovered(&self) -> &[String] {
        &self.tools_discovered
    }

    /// Returns the resource URIs from the last successful discovery.
    #[must_use]
    pub fn resources_discovered(&self) -> &[String] {
        &self.resources_discovered
    }

    /// Returns the catalog version, bumped on every new catalog.
    #[must_use]
    pub const fn discovery_version(&self) -> u64 {
        self.discovery_version
    }

    /// Enters `starting` and counts the attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidLifecycleTransition`] unless
    /// the server is `stopped` or in `error`.
    pub fn begin_start(&mut self) -> Result<(), ToolRegistryDomainError> {
        self.transition_to(ServerStatus::Starting)?;
        self.connection_attempts = self.connection_attempts.saturating_add(1);
        Ok(())
    }

    /// Enters `running` with a freshly discovered catalog.
    ///
    /// Failure counters and the last error are cleared.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidLifecycleTransition`] unless
    /// the server is `starting`.
    pub fn mark_running(
        &mut self,
        discovery: &Discovery,
        clock: &impl Clock,
    ) -> Result<(), ToolRegistryDomainError> {
        self.transition_to(ServerStatus::Running)?;
        self.started_at = Some(clock.utc());
        self.error_count = 0;
        self.connection_attempts = 0;
        self.last_error = None;
        self.store_catalog(discovery);
        Ok(())
    }

    /// Enters `error`, recording the failure.
    ///
    /// Returns the updated consecutive failure count.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidLifecycleTransition`] unless
    /// the server is `starting` or `running`.
    pub fn mark_failed(
        &mut self,
        message: impl Into<String>,
    ) -> Result<u32, ToolRegistryDomainError> {
        self.transition_to(ServerStatus::Error)?;
        self.error_count = self.error_count.saturating_add(1);
        self.last_error = Some(message.into());
        Ok(self.error_count)
    }

    /// Enters `stopping`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidLifecycleTransition`] unless
    /// the server is `starting`, `running`, or in `error`.
    pub fn begin_stop(&mut self) -> Result<(), ToolRegistryDomainError> {
        self.transition_to(ServerStatus::Stopping)
    }

    /// Enters `stopped`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidLifecycleTransition`] unless
    /// the server is `stopping`.
    pub fn mark_stopped(&mut self, clock: &impl Clock) -> Result<(), ToolRegistryDomainError> {
        self.transition_to(ServerStatus::Stopped)?;
        self.last_stopped = Some(clock.utc());
        Ok(())
    }

    /// Forgets earlier failures so automatic retries get a full budget again.
    pub const fn reset_retry_budget(&mut self) {
        self.error_count = 0;
        self.connection_attempts = 0;
    }

    /// Replaces the catalog of a `running` server after rediscovery.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidLifecycleTransition`] when
    /// the server is not `running`.
    pub fn record_rediscovery(&mut self, discovery: &Discovery) -> Result<(), ToolRegistryDomainError> {
        if self.status != ServerStatus::Running {
            return Err(ToolRegistryDomainError::InvalidLifecycleTransition {
                from: self.status,
                to: ServerStatus::Running,
            });
        }
        self.store_catalog(discovery);
        Ok(())
    }

    fn store_catalog(&mut self, discovery: &Discovery) {
        self.tools_discovered = discovery.tool_names();
        self.resources_discovered = discovery.resources().to_vec();
        self.discovery_version = self.discovery_version.saturating_add(1);
    }

    fn transition_to(&mut self, target: ServerStatus) -> Result<(), ToolRegistryDomainError> {
        if !self.status.can_transition_to(target) {
            return Err(ToolRegistryDomainError::InvalidLifecycleTransition {
                from: self.status,
                to: target,
            });
        }

        self.status = target;
        Ok(())
    }
}
