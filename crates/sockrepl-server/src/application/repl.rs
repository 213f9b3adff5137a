//! The interactive REPL handler and the line-oriented hooks it runs on.
//!
//! Input is read a line at a time into a pending buffer and forms are read
//! from the front of that buffer, so:
//!
//! - several forms on one line are evaluated in turn with a single prompt
//!   after the last one,
//! - a form may span lines (an open bracket or string keeps reading),
//! - a blank line only produces a fresh prompt,
//! - `:repl/quit` or the end of input ends the session.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use sockrepl_core::datum::reader::is_whitespace;
use sockrepl_core::{read_datum, Datum, History, ParseError, ReadOutcome, ReplEngine, ReplHooks};
use tracing::debug;

use super::evaluator::evaluate;
use super::port::{SessionHandler, SessionPort};
use crate::domain::error::TransportError;
use crate::domain::session::SessionEnd;

pub const DEFAULT_PROMPT: &str = "user=> ";

/// Typing this keyword ends the session.
pub const QUIT_KEYWORD: &str = "repl/quit";

// ── Hooks ─────────────────────────────────────────────────────────────────────

/// [`ReplHooks`] over a [`SessionPort`].
pub struct SessionRepl<'a> {
    port: &'a mut dyn SessionPort,
    prompt: &'static str,
    pending: String,
    /// Source text of the most recently read form.
    last_source: String,
    disconnected: bool,
    /// A read failure that ends the session.
    read_failure: Option<anyhow::Error>,
}

impl<'a> SessionRepl<'a> {
    pub fn new(port: &'a mut dyn SessionPort) -> Self {
        Self {
            port,
            prompt: DEFAULT_PROMPT,
            pending: String::new(),
            last_source: String::new(),
            disconnected: false,
            read_failure: None,
        }
    }

    /// How the session ended, once the engine has returned.
    ///
    /// # Errors
    ///
    /// Returns the input failure that stopped the loop, if any.
    pub fn finish(self) -> anyhow::Result<SessionEnd> {
        match self.read_failure {
            Some(error) => Err(error),
            None if self.disconnected => Ok(SessionEnd::Disconnected),
            None => Ok(SessionEnd::Completed),
        }
    }

    fn input_closed(&self) -> bool {
        self.disconnected || self.read_failure.is_some()
    }

    /// `true` once the peer has gone away.
    pub fn disconnected(&self) -> bool {
        self.disconnected
    }

    pub fn last_source(&self) -> &str {
        &self.last_source
    }

    pub fn port(&mut self) -> &mut dyn SessionPort {
        &mut *self.port
    }

    /// Ends the session quietly when a write fails because the peer left.
    fn note_transport(&mut self, result: Result<(), TransportError>) -> anyhow::Result<()> {
        match result {
            Err(e) if e.is_disconnect() => {
                self.disconnected = true;
                Ok(())
            }
            other => Ok(other?),
        }
    }

    pub(crate) async fn write_out(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        if self.disconnected {
            return Ok(());
        }
        let result = self.port.write_out(bytes).await;
        self.note_transport(result)
    }

    pub(crate) async fn write_err(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        if self.disconnected {
            return Ok(());
        }
        let mut result = self.port.write_err(bytes).await;
        if result.is_ok() {
            result = self.port.flush().await;
        }
        self.note_transport(result)
    }

    /// Appends the next input line.  Returns `false` when there is no more
    /// input, including when the connection failed.
    async fn fill(&mut self) -> bool {
        let line = match self.port.read_line().await {
            Ok(line) => line,
            Err(e) if e.is_disconnect() => {
                self.disconnected = true;
                return false;
            }
            Err(e) => {
                self.read_failure = Some(anyhow::Error::from(e).context("reading input"));
                return false;
            }
        };
        if line.is_empty() {
            return false;
        }
        self.pending.push_str(&String::from_utf8_lossy(&line));
        true
    }

    /// Drops leading whitespace and comments.  Returns `true` if a newline
    /// was among them.
    fn skip_blank(&mut self) -> bool {
        let mut saw_newline = false;
        let mut in_comment = false;
        let mut end = self.pending.len();
        for (i, c) in self.pending.char_indices() {
            if c == '\n' {
                saw_newline = true;
                in_comment = false;
            } else if in_comment {
                continue;
            } else if c == ';' {
                in_comment = true;
            } else if !is_whitespace(c) {
                end = i;
                break;
            }
        }
        self.pending.drain(..end);
        saw_newline
    }

    /// After a form, consumes the rest of its line if only whitespace is
    /// left on it.
    fn skip_to_eol(&mut self) {
        let mut end = None;
        for (i, c) in self.pending.char_indices() {
            if c == '\n' {
                end = Some(i + 1);
                break;
            }
            if !is_whitespace(c) {
                break;
            }
        }
        if let Some(end) = end {
            self.pending.drain(..end);
        }
    }
}

#[async_trait]
impl ReplHooks for SessionRepl<'_> {
    type Value = Datum;

    fn need_prompt(&mut self) -> bool {
        !self.disconnected && self.pending.is_empty() && self.port.at_line_start()
    }

    async fn prompt(&mut self) -> anyhow::Result<()> {
        let prompt = self.prompt;
        self.write_out(prompt.as_bytes()).await
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        if self.disconnected {
            return Ok(());
        }
        let result = self.port.flush().await;
        self.note_transport(result)
    }

    async fn read(&mut self) -> anyhow::Result<ReadOutcome<Datum>> {
        loop {
            if self.input_closed() {
                return Ok(ReadOutcome::RequestExit);
            }
            let saw_newline = self.skip_blank();
            if self.pending.is_empty() {
                if saw_newline {
                    return Ok(ReadOutcome::RequestPrompt);
                }
                if !self.fill().await {
                    return Ok(ReadOutcome::RequestExit);
                }
                continue;
            }

            match read_datum(&self.pending) {
                Ok((form, end)) => {
                    self.last_source = self.pending[..end].to_string();
                    self.pending.drain(..end);
                    self.skip_to_eol();
                    if form.is_keyword(QUIT_KEYWORD) {
                        return Ok(ReadOutcome::RequestExit);
                    }
                    return Ok(ReadOutcome::Form(form));
                }
                Err(ParseError::Incomplete) => {
                    if !self.fill().await {
                        self.last_source = std::mem::take(&mut self.pending);
                        if self.input_closed() {
                            return Ok(ReadOutcome::RequestExit);
                        }
                        return Err(anyhow!("EOF while reading form"));
                    }
                }
                Err(e) => {
                    self.last_source = std::mem::take(&mut self.pending);
                    return Err(e).context("reading form");
                }
            }
        }
    }

    async fn eval(&mut self, form: Datum, history: &History<Datum>) -> anyhow::Result<Datum> {
        evaluate(form, history, &mut *self.port).await
    }

    async fn print(&mut self, value: &Datum) -> anyhow::Result<()> {
        self.write_out(format!("{value}\n").as_bytes()).await
    }

    async fn caught(&mut self, error: &anyhow::Error) -> anyhow::Result<()> {
        debug!(session = %self.port.context(), error = %format!("{error:#}"), "form failed");
        self.write_err(format!("Error: {error:#}\n").as_bytes()).await
    }
}

// ── Handler ───────────────────────────────────────────────────────────────────

/// Prompted, human-oriented REPL.
pub struct ReplHandler;

#[async_trait]
impl SessionHandler for ReplHandler {
    async fn handle(&self, port: &mut dyn SessionPort) -> anyhow::Result<SessionEnd> {
        let mut hooks = SessionRepl::new(port);
        let summary = ReplEngine::new().run(&mut hooks).await;
        debug!(
            evaluated = summary.evaluated,
            caught = summary.caught,
            "repl session ended"
        );
        hooks.finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
