//! The structured REPL handler: no prompt, one JSON object per result.
//!
//! ```text
//! → (session)
//! ← {"tag":"ret","val":"{:server \"tools\", :client 1}","ns":"user","ms":0,"form":"(session)"}
//! → (throw "boom")
//! ← {"tag":"ret","val":"boom","ns":"user","ms":0,"form":"(throw \"boom\")","exception":true}
//! → )
//! ← {"tag":"err","val":"reading form: unexpected ')' at offset 0","ns":"user","ms":0,"form":")","exception":true}
//! ```
//!
//! `ret` answers a form that was read; `err` reports input that could not be
//! read at all.
//!
//! Input handling (multi-line forms, `:repl/quit`, end of input) is the same
//! as the interactive handler's.  Every message goes to the output stream.

use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use sockrepl_core::{Datum, History, ReadOutcome, ReplEngine, ReplHooks};
use tracing::debug;

use super::port::{SessionHandler, SessionPort};
use super::repl::SessionRepl;
use crate::domain::session::SessionEnd;

const NAMESPACE: &str = "user";

/// One line of prepl output.
#[derive(Debug, Serialize)]
struct Message<'a> {
    tag: &'static str,
    val: String,
    ns: &'static str,
    ms: u64,
    form: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    exception: bool,
}

/// [`ReplHooks`] that wrap [`SessionRepl`] input with JSON output.
struct PreplHooks<'a> {
    repl: SessionRepl<'a>,
    started: Option<Instant>,
}

impl PreplHooks<'_> {
    fn elapsed_ms(&self) -> u64 {
        self.started
            .map_or(0, |t| u64::try_from(t.elapsed().as_millis()).unwrap_or(u64::MAX))
    }

    /// Writes one message.  The form stops being in flight only once its
    /// message is out, so a failed `ret` is still reported as `ret`.
    async fn emit(&mut self, tag: &'static str, val: String, exception: bool) -> anyhow::Result<()> {
        let ms = self.elapsed_ms();
        let message = Message {
            tag,
            val,
            ns: NAMESPACE,
            ms,
            form: self.repl.last_source().trim(),
            exception,
        };
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        self.repl.write_out(&line).await?;
        self.started = None;
        ReplHooks::flush(&mut self.repl).await
    }
}

#[async_trait]
impl ReplHooks for PreplHooks<'_> {
    type Value = Datum;

    fn need_prompt(&mut self) -> bool {
        false
    }

    async fn read(&mut self) -> anyhow::Result<ReadOutcome<Datum>> {
        self.started = None;
        let outcome = self.repl.read().await?;
        if matches!(outcome, ReadOutcome::Form(_)) {
            self.started = Some(Instant::now());
        }
        Ok(outcome)
    }

    async fn eval(&mut self, form: Datum, history: &History<Datum>) -> anyhow::Result<Datum> {
        self.repl.eval(form, history).await
    }

    async fn print(&mut self, value: &Datum) -> anyhow::Result<()> {
        self.emit("ret", value.to_string(), false).await
    }

    async fn caught(&mut self, error: &anyhow::Error) -> anyhow::Result<()> {
        debug!(session = %self.repl.port().context(), error = %format!("{error:#}"), "form failed");
        // A form in flight means eval or print failed; otherwise read did.
        let tag = if self.started.is_some() { "ret" } else { "err" };
        self.emit(tag, format!("{error:#}"), true).await
    }
}

// ── Handler ───────────────────────────────────────────────────────────────────

/// Machine-oriented REPL emitting JSON lines.
pub struct PreplHandler;

#[async_trait]
impl SessionHandler for PreplHandler {
    async fn handle(&self, port: &mut dyn SessionPort) -> anyhow::Result<SessionEnd> {
        let mut hooks = PreplHooks {
            repl: SessionRepl::new(port),
            started: None,
        };
        let summary = ReplEngine::new().run(&mut hooks).await;
        debug!(
            evaluated = summary.evaluated,
            caught = summary.caught,
            "prepl session ended"
        );
        hooks.repl.finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::FakePort;
    use serde_json::Value;

    fn messages(port: &FakePort) -> Vec<Value> {
        port.out_text()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_results_are_json_lines_without_prompt() {
        // Arrange
        let mut port = FakePort::new("42\n(session)\n");

        // Act
        let end = PreplHandler.handle(&mut port).await.unwrap();

        // Assert
        assert_eq!(end, SessionEnd::Completed);
        assert!(!port.out_text().contains("user=>"));
        let msgs = messages(&port);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["tag"], "ret");
        assert_eq!(msgs[0]["val"], "42");
        assert_eq!(msgs[0]["form"], "42");
        assert_eq!(msgs[0]["ns"], "user");
        assert!(msgs[0].get("exception").is_none());
        assert_eq!(msgs[1]["val"], "{:server \"test\", :client 1}");
    }

    #[tokio::test]
    async fn test_errors_are_flagged_as_exceptions() {
        let mut port = FakePort::new("(throw \"boom\")\n");
        PreplHandler.handle(&mut port).await.unwrap();
        let msgs = messages(&port);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["val"], "boom");
        assert_eq!(msgs[0]["exception"], true);
        assert_eq!(msgs[0]["form"], "(throw \"boom\")");
        assert!(port.err_text().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_input_is_tagged_err() {
        let mut port = FakePort::new(")\n:ok\n");
        PreplHandler.handle(&mut port).await.unwrap();
        let msgs = messages(&port);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["tag"], "err");
        assert_eq!(msgs[0]["form"], ")");
        assert_eq!(msgs[0]["exception"], true);
        assert_eq!(msgs[1]["tag"], "ret");
        assert_eq!(msgs[1]["val"], ":ok");
    }

    #[tokio::test]
    async fn test_failed_result_write_is_reported_as_ret() {
        // Arrange: the first result line cannot be written.
        let mut port = FakePort::new("42\n").failing_next_write(std::io::ErrorKind::Other);

        // Act
        PreplHandler.handle(&mut port).await.unwrap();

        // Assert: the failure is about an evaluated form, not unreadable input.
        let msgs = messages(&port);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["tag"], "ret");
        assert_eq!(msgs[0]["form"], "42");
        assert_eq!(msgs[0]["exception"], true);
    }

    #[tokio::test]
    async fn test_blank_lines_and_quit_produce_no_output() {
        let mut port = FakePort::new("\n\n:repl/quit\n1\n");
        PreplHandler.handle(&mut port).await.unwrap();
        assert!(port.out_text().is_empty());
    }
}
