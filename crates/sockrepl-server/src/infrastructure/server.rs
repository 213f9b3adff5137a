//! ServerManager: start, stop, stop-all, and start-all over one registry.
//!
//! # Lifecycle of a server
//!
//! ```text
//! start(options)
//!   validate ─► resolve ─► bind ─► insert record ─► spawn accept loop ─► handle
//!
//! stop(name)
//!   remove record ─► close handle ─► accept loop exits, drops the socket
//! ```
//!
//! Sessions already running when their server stops are left alone; they end
//! when their handler returns or their connection fails.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use sockrepl_core::{server_options_from_properties, ServerOptions};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::listener::run_listener;
use super::resolver::resolve;
use crate::application::catalog::HandlerCatalog;
use crate::application::registry::{ListenerHandle, ServerRecord, ServerRegistry};
use crate::domain::error::ServerError;
use crate::domain::session::{SessionContext, SessionRecord, StopOutcome};

struct Inner {
    registry: ServerRegistry,
    catalog: HandlerCatalog,
    /// Live sessions of servers started with `client-daemon = false`.
    pinned_sessions: AtomicUsize,
}

/// Owns a server registry and the handler catalog its sessions resolve from.
///
/// Cloning is cheap and every clone manages the same servers.
#[derive(Clone)]
pub struct ServerManager {
    inner: Arc<Inner>,
}

impl Default for ServerManager {
    fn default() -> Self {
        Self::with_catalog(HandlerCatalog::default())
    }
}

impl ServerManager {
    /// A manager whose catalog holds the built-in handlers.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: HandlerCatalog) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: ServerRegistry::new(),
                catalog,
                pinned_sessions: AtomicUsize::new(0),
            }),
        }
    }

    pub fn catalog(&self) -> &HandlerCatalog {
        &self.inner.catalog
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.inner.registry
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Starts a server and returns its handle once it is listening.
    ///
    /// A server already registered under the same name is replaced in the
    /// registry but its listener is not closed.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Config`] for a missing option or an out-of-range port.
    /// - [`ServerError::Resolution`] when the address cannot be resolved.
    /// - [`ServerError::Bind`] when the socket cannot be bound.
    pub async fn start(&self, options: ServerOptions) -> Result<ListenerHandle, ServerError> {
        let config = options.validate()?;
        let addr = resolve(config.address.as_deref(), config.port).await?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let handle = ListenerHandle::new(local_addr);
        // Taken before spawning so `stop` can never observe a loop that has
        // not started yet as already released.
        let token = handle.accept_loop_token();
        let mut record = ServerRecord::new(&config.name, handle.clone());
        record.server_daemon = config.server_daemon;
        record.client_daemon = config.client_daemon;

        if let Some(previous) = self.inner.registry.insert_server(record) {
            warn!(
                server = %config.name,
                previous = %previous.handle.local_addr(),
                "replaced a running server; its listener stays open"
            );
        }
        info!(
            server = %config.name,
            addr = %local_addr,
            accept = %config.accept,
            "server listening"
        );

        // The accept loop runs detached; the handle is the only way to stop it.
        tokio::spawn(run_listener(
            listener,
            handle.clone(),
            token,
            Arc::new(config),
            self.clone(),
        ));
        Ok(handle)
    }

    /// Stops the named server.
    ///
    /// Returns once the accept loop has released the socket, so the port can
    /// be bound again straight away.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] if the server's accept loop had
    /// already died; the record is removed regardless.
    pub async fn stop(&self, name: &str) -> Result<StopOutcome, ServerError> {
        let Some(record) = self.inner.registry.remove_server(name) else {
            debug!(server = name, "stop: no such server");
            return Ok(StopOutcome::NotFound);
        };
        record.handle.close()?;
        // The close signal wakes the loop's `select!`; wait until it has
        // dropped the socket and its token.
        record.handle.released().await;
        info!(server = name, addr = %record.handle.local_addr(), "server stopped");
        Ok(StopOutcome::Stopped)
    }

    /// Stops the server the given session belongs to.
    ///
    /// # Errors
    ///
    /// As for [`stop`](Self::stop).
    pub async fn stop_session_server(
        &self,
        context: &SessionContext,
    ) -> Result<StopOutcome, ServerError> {
        self.stop(&context.server).await
    }

    /// Stops every registered server concurrently.  Individual failures are
    /// logged and otherwise ignored.
    pub async fn stop_all(&self) {
        let names = self.server_names();
        // `join_all` polls every stop future on this task, so the servers
        // shut down concurrently without spawning.
        let results = join_all(names.iter().map(|name| self.stop(name))).await;
        for (name, result) in names.iter().zip(results) {
            if let Err(e) = result {
                warn!(server = %name, error = %e, "stop failed during stop-all");
            }
        }
    }

    /// Starts one server per `<prefix>.server.<name>` property, in key order.
    ///
    /// # Errors
    ///
    /// Stops at the first entry that cannot be parsed or started; servers
    /// started before it keep running.
    pub async fn start_all<I, K, V>(
        &self,
        properties: I,
        prefix: &str,
    ) -> Result<Vec<ListenerHandle>, ServerError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let all = server_options_from_properties(properties, prefix)?;
        let mut handles = Vec::with_capacity(all.len());
        for options in all {
            handles.push(self.start(options).await?);
        }
        Ok(handles)
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    /// Registered server names, sorted.
    pub fn server_names(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    /// Live sessions of `name`, ordered by client id.
    pub fn sessions(&self, name: &str) -> Vec<SessionRecord> {
        self.inner
            .registry
            .get(name)
            .map(|record| record.sessions.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn session_count(&self, name: &str) -> usize {
        self.inner
            .registry
            .get(name)
            .map_or(0, |record| record.sessions.len())
    }

    pub fn local_addr(&self, name: &str) -> Option<SocketAddr> {
        self.inner
            .registry
            .get(name)
            .map(|record| record.handle.local_addr())
    }

    /// `true` while any registered server was started with
    /// `server-daemon = false`.
    pub fn has_non_daemon_servers(&self) -> bool {
        self.inner
            .registry
            .snapshot()
            .values()
            .any(|record| !record.server_daemon)
    }

    /// Live sessions that should delay process exit.
    pub fn pinned_sessions(&self) -> usize {
        self.inner.pinned_sessions.load(Ordering::SeqCst)
    }

    /// Counts one session as pinned until the returned token is dropped.
    pub(crate) fn pin_session(&self) -> SessionPin {
        self.inner.pinned_sessions.fetch_add(1, Ordering::SeqCst);
        SessionPin {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// One pinned session; see [`ServerManager::pinned_sessions`].
///
/// Taken when the connection is accepted, so a session that is queued but
/// not yet running already delays process exit.
pub(crate) struct SessionPin {
    inner: Arc<Inner>,
}

impl Drop for SessionPin {
    fn drop(&mut self) {
        self.inner.pinned_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
