//! Session identity and lifecycle results.

use std::fmt;
use std::net::SocketAddr;

/// Who a running handler is: the server it belongs to and its client id.
///
/// Handlers receive this explicitly (through their
/// [`SessionPort`](crate::application::port::SessionPort)) rather than
/// from task-local state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionContext {
    pub server: String,
    /// Per-server id, starting at 1 and never reused.
    pub client_id: u64,
}

impl SessionContext {
    pub fn new(server: impl Into<String>, client_id: u64) -> Self {
        Self {
            server: server.into(),
            client_id,
        }
    }
}

impl fmt::Display for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.server, self.client_id)
    }
}

/// Registry marker for a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub server: String,
    pub client_id: u64,
    pub peer: SocketAddr,
}

/// How a handler finished when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The handler returned on its own (e.g. the user quit).
    Completed,
    /// The peer went away; an orderly end, not an error.
    Disconnected,
}

/// Final result of one session, as seen by the session task.
#[derive(Debug)]
pub enum SessionOutcome {
    Completed,
    Disconnected,
    Failed(anyhow::Error),
}

impl From<SessionEnd> for SessionOutcome {
    fn from(end: SessionEnd) -> Self {
        match end {
            SessionEnd::Completed => SessionOutcome::Completed,
            SessionEnd::Disconnected => SessionOutcome::Disconnected,
        }
    }
}

/// Result of stopping a server by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotFound,
}

impl StopOutcome {
    /// Keyword-style label (`stopped` / `not-found`) used in session output.
    pub fn label(self) -> &'static str {
        match self {
            StopOutcome::Stopped => "stopped",
            StopOutcome::NotFound => "not-found",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_context_display() {
        let ctx = SessionContext::new("admin", 3);
        assert_eq!(ctx.to_string(), "admin#3");
    }

    #[test]
    fn test_session_end_maps_to_outcome() {
        assert!(matches!(
            SessionOutcome::from(SessionEnd::Completed),
            SessionOutcome::Completed
        ));
        assert!(matches!(
            SessionOutcome::from(SessionEnd::Disconnected),
            SessionOutcome::Disconnected
        ));
    }

    #[test]
    fn test_stop_outcome_labels() {
        assert_eq!(StopOutcome::Stopped.label(), "stopped");
        assert_eq!(StopOutcome::NotFound.label(), "not-found");
    }
}
