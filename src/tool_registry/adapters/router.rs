//! Driver that dispatches to a per-transport driver.

use super::{HttpMcpDriver, StdioMcpDriver};
use crate::tool_registry::{
    domain::{ServerDescriptor, TransportKind},
    ports::{McpConnection, McpDriver, McpDriverError, McpDriverResult},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Routes `connect` to the driver registered for the descriptor's
/// transport kind.
#[derive(Clone, Default)]
pub struct TransportRouter {
    drivers: HashMap<TransportKind, Arc<dyn McpDriver>>,
}

impl TransportRouter {
    /// Creates a router with no drivers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a router wired with the stdio and HTTP drivers.
    ///
    /// # Errors
    ///
    /// Returns [`McpDriverError::Runtime`] when the HTTP client cannot be
    /// built.
    pub fn with_default_drivers() -> McpDriverResult<Self> {
        Ok(Self::new()
            .with_driver(TransportKind::Stdio, Arc::new(StdioMcpDriver::new()))
            .with_driver(TransportKind::Http, Arc::new(HttpMcpDriver::new()?)))
    }

    /// Registers `driver` for `kind`, replacing any previous one.
    #[must_use]
    pub fn with_driver(mut self, kind: TransportKind, driver: Arc<dyn McpDriver>) -> Self {
        self.drivers.insert(kind, driver);
        self
    }
}

impl std::fmt::Debug for TransportRouter {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.drivers.keys().map(|kind| kind.as_str()).collect();
        kinds.sort_unstable();
        formatter
            .debug_struct("TransportRouter")
            .field("drivers", &kinds)
            .finish()
    }
}

#[async_trait]
impl McpDriver for TransportRouter {
    async fn connect(
        &self,
        descriptor: &ServerDescriptor,
    ) -> McpDriverResult<Arc<dyn McpConnection>> {
        let kind = descriptor.transport().kind();
        let driver = self
            .drivers
            .get(&kind)
            .ok_or_else(|| McpDriverError::UnsupportedTransport {
                server: descriptor.name().clone(),
                transport: kind,
            })?;
        driver.connect(descriptor).await
    }
}
