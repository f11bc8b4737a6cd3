//! Lifecycle status of a supervised MCP server.

use super::ParseServerStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a supervised MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    /// Not running; the initial state and the result of a stop request.
    #[default]
    Stopped,
    /// A connection attempt is in flight.
    Starting,
    /// Connected and discovered; the only state offered to agents.
    Running,
    /// The last start or health check failed.
    Error,
    /// A stop request is in flight.
    Stopping,
}

impl ServerStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Error => "error",
            Self::Stopping => "stopping",
        }
    }

    /// Returns whether handles in this state may forward tool calls.
    #[must_use]
    pub const fn accepts_dispatch(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns whether a start request should be ignored in this state.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    /// Returns whether transition to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Stopped | Self::Error, Self::Starting)
                | (Self::Starting, Self::Running)
                | (Self::Starting | Self::Running, Self::Error)
                | (Self::Starting | Self::Running | Self::Error, Self::Stopping)
                | (Self::Stopping, Self::Stopped)
        )
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ServerStatus {
    type Error = ParseServerStatusError;

    fn try_from(value: &str) -> Result<Self, ParseServerStatusError> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "stopped" => Ok(Self::Stopped),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "error" => Ok(Self::Error),
            "stopping" => Ok(Self::Stopping),
            _ => Err(ParseServerStatusError(value.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ServerStatus;
    use rstest::rstest;

    #[rstest]
    #[case(ServerStatus::Stopped, ServerStatus::Starting, true)]
    #[case(ServerStatus::Starting, ServerStatus::Running, true)]
    #[case(ServerStatus::Starting, ServerStatus::Error, true)]
    #[case(ServerStatus::Starting, ServerStatus::Stopping, true)]
    #[case(ServerStatus::Running, ServerStatus::Error, true)]
    #[case(ServerStatus::Running, ServerStatus::Stopping, true)]
    #[case(ServerStatus::Error, ServerStatus::Starting, true)]
    #[case(ServerStatus::Error, ServerStatus::Stopping, true)]
    #[case(ServerStatus::Stopping, ServerStatus::Stopped, true)]
    #[case(ServerStatus::Stopped, ServerStatus::Running, false)]
    #[case(ServerStatus::Stopped, ServerStatus::Stopping, false)]
    #[case(ServerStatus::Running, ServerStatus::Starting, false)]
    #[case(ServerStatus::Running, ServerStatus::Stopped, false)]
    #[case(ServerStatus::Error, ServerStatus::Running, false)]
    #[case(ServerStatus::Stopping, ServerStatus::Starting, false)]
    fn transition_matrix(
        #[case] from: ServerStatus,
        #[case] to: ServerStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[rstest]
    #[case(ServerStatus::Stopped, false)]
    #[case(ServerStatus::Starting, false)]
    #[case(ServerStatus::Running, true)]
    #[case(ServerStatus::Error, false)]
    #[case(ServerStatus::Stopping, false)]
    fn only_running_accepts_dispatch(#[case] status: ServerStatus, #[case] expected: bool) {
        assert_eq!(status.accepts_dispatch(), expected);
    }

    #[test]
    fn status_round_trips_through_storage_string() {
        for status in [
            ServerStatus::Stopped,
            ServerStatus::Starting,
            ServerStatus::Running,
            ServerStatus::Error,
            ServerStatus::Stopping,
        ] {
            assert_eq!(ServerStatus::try_from(status.as_str()), Ok(status));
        }
        assert!(ServerStatus::try_from("paused").is_err());
    }
}
