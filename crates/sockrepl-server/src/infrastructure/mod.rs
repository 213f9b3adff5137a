//! Infrastructure layer for sockrepl-server.
//!
//! Contains the socket-facing adapters: address resolution, byte-stream
//! adapters over a connection, the per-connection session task, the
//! per-server accept loop, and the [`server::ServerManager`] that ties them
//! to the registry.
//!
//! **Dependency rule**: this layer may depend on `application`, `domain`, and
//! `sockrepl_core`, but MUST NOT be imported by the `application` or domain
//! layers.

pub mod listener;
pub mod resolver;
pub mod server;
pub mod session;
pub mod stream;
