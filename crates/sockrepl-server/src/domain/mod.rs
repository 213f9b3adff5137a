//! Domain layer for sockrepl-server.
//!
//! Pure types with no sockets, tasks, or file I/O:
//!
//! - Session identity and the records the registry stores
//! - The error taxonomy shared by every layer
//! - The on-disk configuration schema

pub mod config;
pub mod error;
pub mod session;

pub use config::AppConfig;
pub use error::{HandlerError, ResolutionError, ServerError, TransportError};
pub use session::{SessionContext, SessionEnd, SessionOutcome, SessionRecord, StopOutcome};
