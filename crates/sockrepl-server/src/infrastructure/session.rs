//! ConnectionSession: one task per accepted connection.
//!
//! A [`Session`] owns the connection's adapters and identity and is the
//! [`SessionPort`] its handler talks to.  [`run_session`] registers the
//! session, resolves and runs the handler, and cleans up.
//!
//! Cleanup is tied to a guard rather than to the happy path, so the session
//! record disappears even if the handler panics.  The connection is shut down
//! once after the handler returns; on a panic it is closed when the halves
//! are dropped.
//!
//! A session of a `client-daemon = false` server arrives with a
//! [`SessionPin`] taken by the accept loop.  The guard owns it from then on
//! and releases it with the session record.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use sockrepl_core::ServerConfig;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, warn};
use uuid::Uuid;

use super::server::{ServerManager, SessionPin};
use super::stream::{ConnectionReader, ConnectionWriter};
use crate::application::port::SessionPort;
use crate::domain::error::{is_disconnect, ServerError, TransportError};
use crate::domain::session::{SessionContext, SessionOutcome, SessionRecord, StopOutcome};

// ── Session ───────────────────────────────────────────────────────────────────

/// One accepted connection and everything its handler may use.
pub struct Session<R = OwnedReadHalf, W = OwnedWriteHalf> {
    context: SessionContext,
    config: Arc<ServerConfig>,
    reader: ConnectionReader<R>,
    writer: ConnectionWriter<W>,
    manager: ServerManager,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    pub fn new(
        context: SessionContext,
        config: Arc<ServerConfig>,
        reader: ConnectionReader<R>,
        writer: ConnectionWriter<W>,
        manager: ServerManager,
    ) -> Self {
        Self {
            context,
            config,
            reader,
            writer,
            manager,
        }
    }

    /// Resolves the server's handler by name and runs it to completion.
    async fn invoke_handler(&mut self) -> SessionOutcome {
        let handler = match self.manager.catalog().resolve(&self.config.accept) {
            Ok(handler) => handler,
            Err(e) => return SessionOutcome::Failed(e.into()),
        };
        match handler.handle(self).await {
            Ok(end) => end.into(),
            Err(e) if is_disconnect(&e) => SessionOutcome::Disconnected,
            Err(e) => SessionOutcome::Failed(e),
        }
    }

    /// Shuts the connection's write side down.  Safe to call more than once.
    async fn close(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            // The peer is usually already gone by now.
            debug!(session = %self.context, error = %e, "connection shutdown failed");
        }
    }
}

#[async_trait]
impl<R, W> SessionPort for Session<R, W>
where
    R: AsyncRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    fn context(&self) -> &SessionContext {
        &self.context
    }

    fn args(&self) -> &[String] {
        &self.config.args
    }

    async fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        self.reader.read_line().await
    }

    fn at_line_start(&self) -> bool {
        self.reader.at_line_start()
    }

    async fn write_out(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.writer.write(bytes).await
    }

    async fn write_err(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.config.bind_err {
            return self.writer.write(bytes).await;
        }
        // Unbound error output goes to the process, not to the peer.
        let mut stderr = tokio::io::stderr();
        stderr.write_all(bytes).await?;
        stderr.flush().await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        self.writer.flush().await
    }

    fn server_names(&self) -> Vec<String> {
        self.manager.server_names()
    }

    async fn stop_server(&self, name: &str) -> Result<StopOutcome, ServerError> {
        self.manager.stop(name).await
    }
}

// ── Registration guard ────────────────────────────────────────────────────────

/// Keeps a session registered (and pinned, if it was) for as long as it
/// lives.
struct SessionGuard {
    manager: ServerManager,
    listener_id: Uuid,
    context: SessionContext,
    // Dropped after `drop` below has removed the record.
    _pin: Option<SessionPin>,
}

impl SessionGuard {
    fn register(
        manager: &ServerManager,
        listener_id: Uuid,
        record: SessionRecord,
        pin: Option<SessionPin>,
    ) -> Self {
        let context = SessionContext::new(&record.server, record.client_id);
        if !manager.registry().add_session(listener_id, record) {
            // The server was stopped or replaced between accept and here.
            debug!(session = %context, "server record gone; session not registered");
        }
        Self {
            manager: manager.clone(),
            listener_id,
            context,
            _pin: pin,
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.manager.registry().remove_session(
            self.listener_id,
            &self.context.server,
            self.context.client_id,
        );
    }
}

// ── Task body ─────────────────────────────────────────────────────────────────

/// Serves one connection from registration to cleanup.
///
/// `pin` is released together with the session record, on every exit.
pub(crate) async fn run_session<R, W>(
    mut session: Session<R, W>,
    listener_id: Uuid,
    peer: SocketAddr,
    pin: Option<SessionPin>,
) -> SessionOutcome
where
    R: AsyncRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    let record = SessionRecord {
        server: session.context.server.clone(),
        client_id: session.context.client_id,
        peer,
    };
    // Held until the end of this function, including on panic unwind.
    let _guard = SessionGuard::register(&session.manager, listener_id, record, pin);
    debug!(session = %session.context, %peer, accept = %session.config.accept, "session started");

    let outcome = session.invoke_handler().await;
    session.close().await;

    match &outcome {
        SessionOutcome::Completed => debug!(session = %session.context, "session completed"),
        SessionOutcome::Disconnected => {
            debug!(session = %session.context, "peer disconnected")
        }
        SessionOutcome::Failed(e) => {
            warn!(session = %session.context, error = %format!("{e:#}"), "session failed")
        }
    }
    outcome
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::port::SessionHandler;
    use crate::application::registry::{ListenerHandle, ServerRecord};
    use crate::domain::session::SessionEnd;
    use crate::HandlerCatalog;
    use sockrepl_core::ServerOptions;
    use tokio::io::{duplex, split, AsyncReadExt, DuplexStream, ReadHalf, WriteHalf};

    /// Echoes one line back, then ends the way it was built to.
    struct EchoOnce(Result<SessionEnd, &'static str>);

    #[async_trait]
    impl SessionHandler for EchoOnce {
        async fn handle(&self, port: &mut dyn SessionPort) -> anyhow::Result<SessionEnd> {
            let line = port.read_line().await?;
            port.write_out(&line).await?;
            port.write_err(b"err\n").await?;
            self.0.map_err(|msg| anyhow::anyhow!(msg))
        }
    }

    /// Fails with a disconnect-class error.
    struct Vanishing;

    #[async_trait]
    impl SessionHandler for Vanishing {
        async fn handle(&self, _port: &mut dyn SessionPort) -> anyhow::Result<SessionEnd> {
            Err(TransportError::from(std::io::Error::from(
                std::io::ErrorKind::ConnectionReset,
            ))
            .into())
        }
    }

    type TestSession = Session<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    struct Fixture {
        manager: ServerManager,
        handle: ListenerHandle,
        client: DuplexStream,
        session: TestSession,
        pin: Option<SessionPin>,
    }

    fn fixture(accept: &str, bind_err: bool, handler: Arc<dyn SessionHandler>) -> Fixture {
        let catalog = HandlerCatalog::empty();
        catalog.register("test/handler", handler);
        let manager = ServerManager::with_catalog(catalog);
        let handle = ListenerHandle::new("127.0.0.1:0".parse().unwrap());
        manager
            .registry()
            .insert_server(ServerRecord::new("srv", handle.clone()));

        let mut options = ServerOptions::new("srv", 0, accept);
        options.bind_err = Some(bind_err);
        options.client_daemon = Some(false);
        let config = Arc::new(options.validate().unwrap());

        let (client, server) = duplex(1024);
        let (r, w) = split(server);
        let session = Session::new(
            SessionContext::new("srv", 1),
            config,
            ConnectionReader::new(r),
            ConnectionWriter::new(w),
            manager.clone(),
        );
        // The server is `client-daemon = false`, so the accept loop would pin.
        let pin = Some(manager.pin_session());
        Fixture {
            manager,
            handle,
            client,
            session,
            pin,
        }
    }

    /// Asserts that the session left nothing behind and its connection is
    /// closed from the client's point of view.
    async fn assert_cleaned_up(manager: &ServerManager, client: &mut DuplexStream) {
        assert!(manager.registry().session_ids("srv").is_empty());
        assert_eq!(manager.pinned_sessions(), 0);
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_completed_session_echoes_and_deregisters() {
        // Arrange
        let mut f = fixture("test/handler", true, Arc::new(EchoOnce(Ok(SessionEnd::Completed))));
        f.client.write_all(b"hello\n").await.unwrap();

        // Act
        let outcome = run_session(f.session, f.handle.id(), peer(), f.pin).await;

        // Assert
        assert!(matches!(outcome, SessionOutcome::Completed));
        let mut received = String::new();
        f.client.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "hello\nerr\n");
        assert!(f.manager.registry().session_ids("srv").is_empty());
        assert_eq!(f.manager.pinned_sessions(), 0);
    }

    #[tokio::test]
    async fn test_session_is_registered_while_handler_runs() {
        // Arrange: the handler blocks on input until the test writes it.
        let f = fixture("test/handler", true, Arc::new(EchoOnce(Ok(SessionEnd::Completed))));
        let Fixture {
            manager,
            handle,
            mut client,
            session,
            pin,
        } = f;
        let task = tokio::spawn(run_session(session, handle.id(), peer(), pin));

        // Act
        let registered = wait_until(|| manager.registry().session_ids("srv") == vec![1]).await;
        let pinned = manager.pinned_sessions();
        client.write_all(b"x\n").await.unwrap();
        task.await.unwrap();

        // Assert
        assert!(registered);
        assert_eq!(pinned, 1);
        assert!(manager.registry().session_ids("srv").is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_is_failed_and_still_cleaned_up() {
        let mut f = fixture("test/handler", true, Arc::new(EchoOnce(Err("bad"))));
        f.client.write_all(b"x\n").await.unwrap();

        let outcome = run_session(f.session, f.handle.id(), peer(), f.pin).await;

        assert!(matches!(outcome, SessionOutcome::Failed(ref e) if e.to_string() == "bad"));
        assert_cleaned_up(&f.manager, &mut f.client).await;
    }

    #[tokio::test]
    async fn test_disconnect_error_is_absorbed_and_cleaned_up() {
        // Arrange
        let mut f = fixture("test/handler", true, Arc::new(Vanishing));
        assert_eq!(f.manager.pinned_sessions(), 1);

        // Act
        let outcome = run_session(f.session, f.handle.id(), peer(), f.pin).await;

        // Assert
        assert!(matches!(outcome, SessionOutcome::Disconnected));
        assert_cleaned_up(&f.manager, &mut f.client).await;
    }

    #[tokio::test]
    async fn test_unknown_handler_fails_session_and_cleans_up() {
        // Arrange
        let mut f = fixture("missing/handler", true, Arc::new(Vanishing));

        // Act
        let outcome = run_session(f.session, f.handle.id(), peer(), f.pin).await;

        // Assert
        assert!(
            matches!(outcome, SessionOutcome::Failed(ref e) if e.to_string().contains("missing/handler"))
        );
        assert_cleaned_up(&f.manager, &mut f.client).await;
    }

    #[tokio::test]
    async fn test_session_dropped_before_running_releases_pin() {
        // Arrange: a spawned session that never gets polled.
        let f = fixture("test/handler", true, Arc::new(Vanishing));
        let queued = run_session(f.session, f.handle.id(), peer(), f.pin);
        assert_eq!(f.manager.pinned_sessions(), 1);

        // Act
        drop(queued);

        // Assert
        assert_eq!(f.manager.pinned_sessions(), 0);
    }

    #[tokio::test]
    async fn test_unbound_error_stream_skips_connection() {
        let mut f = fixture("test/handler", false, Arc::new(EchoOnce(Ok(SessionEnd::Completed))));
        f.client.write_all(b"hi\n").await.unwrap();

        run_session(f.session, f.handle.id(), peer(), f.pin).await;

        let mut received = String::new();
        f.client.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "hi\n");
    }

    async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        false
    }
}
