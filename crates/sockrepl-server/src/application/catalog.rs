//! HandlerCatalog: name → session handler, resolved per connection.
//!
//! A server's `accept` option names a handler.  The name is looked up each
//! time a connection is accepted, so re-registering a name swaps the handler
//! for every later connection without restarting the server.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::port::SessionHandler;
use super::prepl::PreplHandler;
use super::repl::ReplHandler;
use crate::domain::error::HandlerError;

/// Built-in interactive REPL handler.
pub const REPL_HANDLER: &str = "sockrepl.server/repl";

/// Built-in structured (JSON-lines) REPL handler.
pub const PREPL_HANDLER: &str = "sockrepl.server/prepl";

/// Registered session handlers.
pub struct HandlerCatalog {
    handlers: RwLock<HashMap<String, Arc<dyn SessionHandler>>>,
}

impl Default for HandlerCatalog {
    /// A catalog with the built-in handlers registered.
    fn default() -> Self {
        let catalog = Self::empty();
        catalog.register(REPL_HANDLER, Arc::new(ReplHandler));
        catalog.register(PREPL_HANDLER, Arc::new(PreplHandler));
        catalog
    }
}

impl HandlerCatalog {
    /// A catalog with no handlers at all.
    pub fn empty() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `handler` under `name`, returning the handler it replaced.
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn SessionHandler>,
    ) -> Option<Arc<dyn SessionHandler>> {
        self.handlers.write().insert(name.into(), handler)
    }

    /// Looks up the handler currently registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Unresolved`] if nothing is registered.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn SessionHandler>, HandlerError> {
        self.handlers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| HandlerError::Unresolved(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
