//! Error taxonomy for sockrepl-server.
//!
//! | error             | raised by                         | reaches                |
//! |-------------------|-----------------------------------|------------------------|
//! | `ConfigError`     | option validation (core crate)    | caller of `start`      |
//! | `ResolutionError` | address resolution                | caller of `start`      |
//! | `TransportError`  | connection read/write/close       | handler, or `stop`     |
//! | `HandlerError`    | handler lookup at connection time | session log            |
//!
//! A peer disconnecting is not an error: handlers report it as
//! [`SessionEnd::Disconnected`](super::session::SessionEnd).

use std::io;
use std::net::SocketAddr;

use sockrepl_core::ConfigError;
use thiserror::Error;
use uuid::Uuid;

/// A host string could not be turned into a bindable address.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("failed to resolve host {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("host {0} resolved to no addresses")]
    NoAddress(String),
}

/// A send, receive, or close on a connection or listener failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection I/O error: {0}")]
    Io(#[from] io::Error),

    /// The accept loop ended without its listener being closed.
    #[error("accept loop for listener {0} is gone")]
    ListenerGone(Uuid),
}

impl TransportError {
    /// Returns `true` for failures that mean "the peer went away".
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::Io(e) => is_disconnect_kind(e.kind()),
            TransportError::ListenerGone(_) => false,
        }
    }
}

fn is_disconnect_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}

/// Returns `true` if any error in the chain is a disconnect-class transport
/// failure.
pub fn is_disconnect(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        if let Some(transport) = cause.downcast_ref::<TransportError>() {
            transport.is_disconnect()
        } else if let Some(io) = cause.downcast_ref::<io::Error>() {
            is_disconnect_kind(io.kind())
        } else {
            false
        }
    })
}

/// Errors from server lifecycle operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors resolving the handler for a new connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("no session handler registered as {0}")]
    Unresolved(String),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_reset_and_broken_pipe_are_disconnects() {
        let reset = TransportError::from(io::Error::from(io::ErrorKind::ConnectionReset));
        let pipe = TransportError::from(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(reset.is_disconnect());
        assert!(pipe.is_disconnect());
    }

    #[test]
    fn test_other_io_errors_are_not_disconnects() {
        let denied = TransportError::from(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!denied.is_disconnect());
        assert!(!TransportError::ListenerGone(Uuid::nil()).is_disconnect());
    }

    #[test]
    fn test_is_disconnect_looks_through_context() {
        let error = Err::<(), _>(TransportError::from(io::Error::from(
            io::ErrorKind::ConnectionAborted,
        )))
        .context("writing prompt")
        .unwrap_err();
        assert!(is_disconnect(&error));
        assert!(!is_disconnect(&anyhow::anyhow!("plain failure")));
    }

    #[test]
    fn test_server_error_wraps_config_error_transparently() {
        let err = ServerError::from(ConfigError::MissingOption("port"));
        assert_eq!(err.to_string(), "missing required option: port");
    }
}
