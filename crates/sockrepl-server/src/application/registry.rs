//! ServerRegistry: server name → listener handle and live sessions.
//!
//! # Update model
//!
//! The registry is an immutable snapshot (`im::HashMap`, cheap to clone)
//! behind an `Arc`.  Readers clone the current `Arc` and work on that
//! snapshot without further coordination.  Writers:
//!
//! 1. load the current snapshot,
//! 2. compute the next snapshot with a pure function,
//! 3. install it only if the current snapshot is still the one they loaded
//!    (pointer identity), otherwise retry from step 1.
//!
//! The mutex only guards the pointer load and the compare-and-swap; no update
//! function runs while it is held.
//!
//! # Ownership of key paths
//!
//! A server's record is written by `start` (insert), `stop` (remove), and its
//! own accept loop (remove on exit).  A session record is written only by its
//! own session task.  Both kinds of writes carry the listener's id and only
//! apply to the record that listener owns, so an accept loop or session of a
//! replaced server never touches its successor's record.

use std::net::SocketAddr;
use std::sync::Arc;

use im::{HashMap as ImHashMap, OrdMap};
use parking_lot::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::error::TransportError;
use crate::domain::session::SessionRecord;

// ── Listener handle ───────────────────────────────────────────────────────────

/// Opaque handle to a listening server.
///
/// Cloning the handle is cheap; all clones control the same listener.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    id: Uuid,
    local_addr: SocketAddr,
    /// Close signal, observed by the accept loop and any outside waiter.
    closed: watch::Sender<bool>,
    /// Liveness of the accept loop: its only receiver is the loop's token.
    alive: watch::Sender<()>,
}

/// Held by an accept loop for as long as it owns its socket.
///
/// Dropping the token tells the handle the socket has been released.
#[derive(Debug)]
pub(crate) struct AcceptLoopToken {
    _alive: watch::Receiver<()>,
}

impl ListenerHandle {
    pub fn new(local_addr: SocketAddr) -> Self {
        // Receivers are created on demand, so the initial ones are dropped.
        let (closed, _) = watch::channel(false);
        let (alive, _) = watch::channel(());
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                local_addr,
                closed,
                alive,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The address the listener is bound to (with the real port when the
    /// server was started on port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn is_open(&self) -> bool {
        !*self.inner.closed.borrow()
    }

    /// Closes the listener: its accept loop stops accepting and exits.
    ///
    /// Closing an already-closed handle is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ListenerGone`] if the accept loop had
    /// already terminated without the handle being closed.
    pub fn close(&self) -> Result<(), TransportError> {
        let was_closed = self.inner.closed.send_replace(true);
        if !was_closed && self.inner.alive.receiver_count() == 0 {
            return Err(TransportError::ListenerGone(self.inner.id));
        }
        Ok(())
    }

    /// A token whose lifetime marks the accept loop as alive.
    pub(crate) fn accept_loop_token(&self) -> AcceptLoopToken {
        AcceptLoopToken {
            _alive: self.inner.alive.subscribe(),
        }
    }

    /// Resolves once the handle is closed.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        // The sender lives as long as `self`, so this only returns on close.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Resolves once the accept loop has exited and dropped its socket.
    ///
    /// Resolves immediately if no accept loop holds a token.
    pub async fn released(&self) {
        // `Sender::closed` completes when the last receiver is dropped.
        self.inner.alive.closed().await;
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

/// One registered server.
#[derive(Debug, Clone)]
pub struct ServerRecord {
    pub name: String,
    pub handle: ListenerHandle,
    pub sessions: OrdMap<u64, SessionRecord>,
    pub server_daemon: bool,
    pub client_daemon: bool,
}

impl ServerRecord {
    pub fn new(name: impl Into<String>, handle: ListenerHandle) -> Self {
        Self {
            name: name.into(),
            handle,
            sessions: OrdMap::new(),
            server_daemon: true,
            client_daemon: true,
        }
    }

    fn owned_by(&self, listener_id: Uuid) -> bool {
        self.handle.id() == listener_id
    }
}

type Snapshot = ImHashMap<String, ServerRecord>;

// ── Registry ──────────────────────────────────────────────────────────────────

/// Registry of named servers and their sessions.
///
/// Each [`ServerManager`](crate::ServerManager) owns its own registry; there
/// is no process-global instance.
pub struct ServerRegistry {
    current: Mutex<Arc<Snapshot>>,
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self {
            current: Mutex::new(Arc::new(Snapshot::new())),
        }
    }
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<ImHashMap<String, ServerRecord>> {
        Arc::clone(&self.current.lock())
    }

    fn compare_and_set(&self, expected: &Arc<Snapshot>, next: Snapshot) -> bool {
        let mut current = self.current.lock();
        if Arc::ptr_eq(&current, expected) {
            *current = Arc::new(next);
            true
        } else {
            false
        }
    }

    /// Applies `f` atomically, retrying on concurrent modification.
    ///
    /// `f` may run several times and must not have side effects.  Returning
    /// `None` as the next snapshot leaves the registry untouched.
    fn update<R>(&self, mut f: impl FnMut(&Snapshot) -> (Option<Snapshot>, R)) -> R {
        loop {
            let current = self.snapshot();
            let (next, out) = f(&current);
            match next {
                None => return out,
                Some(next) => {
                    if self.compare_and_set(&current, next) {
                        return out;
                    }
                    // Lost the race with another writer; recompute.
                }
            }
        }
    }

    /// Inserts `record`, replacing (and returning) any record with the same
    /// name.  The replaced record's listener is not closed.
    pub fn insert_server(&self, record: ServerRecord) -> Option<ServerRecord> {
        self.update(|snap| {
            let previous = snap.get(&record.name).cloned();
            (Some(snap.update(record.name.clone(), record.clone())), previous)
        })
    }

    /// Removes the record for `name`, whoever owns it.
    pub fn remove_server(&self, name: &str) -> Option<ServerRecord> {
        self.update(|snap| match snap.get(name) {
            Some(record) => (Some(snap.without(name)), Some(record.clone())),
            None => (None, None),
        })
    }

    /// Removes the record for `name` only if it belongs to `listener_id`.
    pub fn remove_server_owned(&self, name: &str, listener_id: Uuid) -> bool {
        self.update(|snap| match snap.get(name) {
            Some(record) if record.owned_by(listener_id) => (Some(snap.without(name)), true),
            _ => (None, false),
        })
    }

    /// Adds a session to its server's record.
    ///
    /// Returns `false` (and changes nothing) when the server's record is
    /// gone or belongs to another listener.
    pub fn add_session(&self, listener_id: Uuid, session: SessionRecord) -> bool {
        self.update(|snap| match snap.get(&session.server) {
            Some(record) if record.owned_by(listener_id) => {
                let mut record = record.clone();
                record.sessions.insert(session.client_id, session.clone());
                (Some(snap.update(session.server.clone(), record)), true)
            }
            _ => (None, false),
        })
    }

    /// Removes a session from its server's record, if present.
    pub fn remove_session(
        &self,
        listener_id: Uuid,
        server: &str,
        client_id: u64,
    ) -> Option<SessionRecord> {
        self.update(|snap| match snap.get(server) {
            Some(record) if record.owned_by(listener_id) => {
                match record.sessions.get(&client_id) {
                    Some(session) => {
                        let removed = session.clone();
                        let mut record = record.clone();
                        record.sessions.remove(&client_id);
                        (Some(snap.update(server.to_string(), record)), Some(removed))
                    }
                    None => (None, None),
                }
            }
            _ => (None, None),
        })
    }

    pub fn get(&self, name: &str) -> Option<ServerRecord> {
        self.snapshot().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.snapshot().contains_key(name)
    }

    /// Registered server names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.snapshot().keys().cloned().collect();
        names.sort();
        names
    }

    /// Client ids of live sessions on `name`, ascending.
    pub fn session_ids(&self, name: &str) -> Vec<u64> {
        self.get(name)
            .map(|record| record.sessions.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
