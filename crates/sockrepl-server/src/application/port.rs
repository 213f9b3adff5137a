//! The seam between session handlers and the connection they serve.
//!
//! Handlers never touch sockets or the server manager directly.  They talk to
//! a [`SessionPort`], which the infrastructure layer implements over a real
//! connection and tests implement in memory.

use async_trait::async_trait;

use crate::domain::error::{ServerError, TransportError};
use crate::domain::session::{SessionContext, SessionEnd, StopOutcome};

/// Everything a handler may do with its session.
#[async_trait]
pub trait SessionPort: Send + Sync {
    /// Identity of this session.
    fn context(&self) -> &SessionContext;

    /// The `args` the server was started with.
    fn args(&self) -> &[String];

    /// Bytes up to and including the next `\n`; empty at end of stream.
    async fn read_line(&mut self) -> Result<Vec<u8>, TransportError>;

    /// `true` when the input is positioned at the start of a line.
    fn at_line_start(&self) -> bool;

    /// Writes to the session's output stream.
    async fn write_out(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Writes to the session's error stream (the connection, unless the
    /// server routes errors to the process).
    async fn write_err(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    async fn flush(&mut self) -> Result<(), TransportError>;

    /// Names of every registered server, sorted.
    fn server_names(&self) -> Vec<String>;

    /// Stops the named server.
    async fn stop_server(&self, name: &str) -> Result<StopOutcome, ServerError>;
}

/// Per-connection logic, looked up by name each time a connection arrives.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// Serves one session until it ends.
    ///
    /// # Errors
    ///
    /// Any error is reported by the session task; the connection is closed
    /// and the session deregistered either way.
    async fn handle(&self, port: &mut dyn SessionPort) -> anyhow::Result<SessionEnd>;
}
