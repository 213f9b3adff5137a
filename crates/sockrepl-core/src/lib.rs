//! # sockrepl-core
//!
//! Shared library for sockrepl containing the datum model, the server option
//! schema, and the generic read-eval-print engine.
//!
//! This crate has zero dependencies on sockets or an async runtime.  The
//! server crate (`sockrepl-server`) supplies all I/O through the hook trait
//! defined in [`repl`].
//!
//! # Architecture overview
//!
//! - **`datum`** – The small data language sessions exchange: numbers,
//!   strings, keywords, symbols, lists, vectors, and maps.  The reader turns
//!   text into [`Datum`] values; `Display` prints them back readably.
//!
//! - **`options`** – The options a server is started with, their validation
//!   rules, and parsing of `<prefix>.server.<name>` bootstrap properties.
//!
//! - **`repl`** – [`ReplEngine`], a connection-agnostic loop whose every
//!   step (init, prompt, read, eval, print, error handling) is a hook on the
//!   [`ReplHooks`] trait.

pub mod datum;
pub mod options;
pub mod repl;

// Re-export the most-used types at the crate root so callers can write
// `sockrepl_core::Datum` instead of `sockrepl_core::datum::Datum`.
pub use datum::reader::{read_all, read_datum, ParseError};
pub use datum::Datum;
pub use options::properties::server_options_from_properties;
pub use options::{ConfigError, ServerConfig, ServerOptions};
pub use repl::engine::{ReplEngine, ReplSummary};
pub use repl::history::{CaughtError, History};
pub use repl::{ReadOutcome, ReplHooks};
