//! Application layer for sockrepl-server.
//!
//! Everything here is connection-agnostic: handlers reach their connection
//! through [`port::SessionPort`], and the registry is plain data plus an
//! atomic update rule.
//!
//! - **`registry`** – server name → listener handle and live sessions
//! - **`catalog`** – handler name → [`port::SessionHandler`]
//! - **`repl`** / **`prepl`** – the built-in session handlers
//! - **`evaluator`** – what a form typed into a session evaluates to

pub mod catalog;
pub mod evaluator;
pub mod port;
pub mod prepl;
pub mod registry;
pub mod repl;

#[cfg(test)]
pub(crate) mod testing;
