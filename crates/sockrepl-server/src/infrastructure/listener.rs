//! ListenerLoop: one accept loop per server.
//!
//! The loop accepts until its [`ListenerHandle`] is closed.  Each accepted
//! connection gets the next client id (1, 2, 3, … per server, never reused)
//! and its own session task; spawning never waits for the session.
//!
//! When the loop ends, for whatever reason, it removes its server's record
//! from the registry, but only if that record is still the one created for
//! this listener.  A server restarted under the same name keeps its new
//! record.

use std::sync::Arc;
use std::time::Duration;

use sockrepl_core::ServerConfig;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::server::ServerManager;
use super::session::{run_session, Session};
use super::stream::{ConnectionReader, ConnectionWriter};
use crate::application::registry::{AcceptLoopToken, ListenerHandle};
use crate::domain::session::SessionContext;

/// Pause after a failed `accept()` before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Deregisters the server when the accept loop ends, even by panic.
struct ListenerGuard {
    manager: ServerManager,
    server: String,
    listener_id: Uuid,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if self
            .manager
            .registry()
            .remove_server_owned(&self.server, self.listener_id)
        {
            debug!(server = %self.server, "accept loop removed its server record");
        }
    }
}

/// Accepts connections on `listener` until `handle` is closed.
///
/// `token` must be taken from `handle` before this task is spawned; it is
/// dropped last, after the socket, to tell the handle the port is free.
pub(crate) async fn run_listener(
    listener: TcpListener,
    handle: ListenerHandle,
    token: AcceptLoopToken,
    config: Arc<ServerConfig>,
    manager: ServerManager,
) {
    let guard = ListenerGuard {
        manager: manager.clone(),
        server: config.name.clone(),
        listener_id: handle.id(),
    };
    let mut next_client_id: u64 = 0;

    loop {
        // `select!` races the close signal against the next connection.
        // `biased` polls the close branch first, so a closed handle never
        // accepts one more connection that happened to be ready.
        let accepted = tokio::select! {
            biased;
            () = handle.closed() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                next_client_id += 1;
                let context = SessionContext::new(&config.name, next_client_id);
                debug!(session = %context, %peer, "connection accepted");

                // Pin here rather than inside the task: a session that is
                // queued but not yet polled must already hold the process.
                let pin = (!config.client_daemon).then(|| manager.pin_session());

                // `into_split` gives owned halves, so reader and writer can be
                // moved into the session without borrowing the stream.
                let (read_half, write_half) = stream.into_split();
                let session = Session::new(
                    context,
                    Arc::clone(&config),
                    ConnectionReader::new(read_half),
                    ConnectionWriter::new(write_half),
                    manager.clone(),
                );

                // `tokio::spawn` queues the session and returns immediately,
                // so the loop is back in `accept()` without waiting for it.
                tokio::spawn(run_session(session, handle.id(), peer, pin));
            }
            Err(e) => {
                // Usually transient (e.g. too many open file descriptors).
                // Back off so a persistent error does not spin the loop.
                warn!(server = %config.name, error = %e, "accept failed; continuing");
                if !pause_after_accept_error(&handle).await {
                    break;
                }
            }
        }
    }

    info!(
        server = %config.name,
        addr = %handle.local_addr(),
        accepted = next_client_id,
        "accept loop stopped"
    );
    // Order matters: release the port, deregister, then report released.
    drop(listener);
    drop(guard);
    drop(token);
}

/// Waits out [`ACCEPT_ERROR_BACKOFF`].  Returns `false` if the handle was
/// closed meanwhile.
async fn pause_after_accept_error(handle: &ListenerHandle) -> bool {
    tokio::select! {
        biased;
        () = handle.closed() => false,
        () = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
