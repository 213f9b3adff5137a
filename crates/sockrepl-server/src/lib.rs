//! sockrepl-server library crate.
//!
//! Listens on named TCP servers, runs one interactive session per accepted
//! connection, and keeps a registry of servers and live sessions.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! [sockrepl-server]
//!   ├── domain/           Session identity, records, errors, config-file schema
//!   ├── application/      Registry, handler catalog, REPL session handlers
//!   └── infrastructure/
//!         ├── resolver/   Host string → bindable address
//!         ├── stream/     Byte-stream adapters over a connection
//!         ├── session/    One task per connection, guaranteed cleanup
//!         ├── listener/   One accept loop per server
//!         └── server/     ServerManager: start / stop / stop-all / start-all
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `application` depends on `domain` and `sockrepl-core`; handlers see a
//!   connection only through the [`SessionPort`](application::port::SessionPort)
//!   trait, so they are testable without sockets.
//! - `infrastructure` depends on all other layers plus `tokio`.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: registry, handlers, and REPL hooks.
pub mod application;

/// Infrastructure layer: sockets, tasks, and lifecycle.
pub mod infrastructure;

pub use application::catalog::{HandlerCatalog, PREPL_HANDLER, REPL_HANDLER};
pub use application::port::{SessionHandler, SessionPort};
pub use application::registry::{ListenerHandle, ServerRecord, ServerRegistry};
pub use domain::error::{HandlerError, ResolutionError, ServerError, TransportError};
pub use domain::session::{SessionContext, SessionEnd, SessionOutcome, SessionRecord, StopOutcome};
pub use infrastructure::server::ServerManager;
