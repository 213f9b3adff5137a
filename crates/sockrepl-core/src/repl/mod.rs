//! The hook-driven read-eval-print loop.
//!
//! [`ReplEngine`](engine::ReplEngine) owns the control flow; everything that
//! touches input, output, or evaluation is a method on [`ReplHooks`].  Each
//! hook has a default except `read` and `print`, so an implementor overrides
//! exactly the steps it cares about.
//!
//! # Control flow
//!
//! ```text
//! init ─► prompt+flush ─► read ─┬─ RequestExit ──► done
//!                       ▲       ├─ RequestPrompt ─► prompt+flush ─┐
//!                       │       └─ Form(v) ─► eval ─► print ─┐    │
//!                       │                 need_prompt()? prompt+flush
//!                       └────────────────────────────────────┴────┘
//! ```
//!
//! Errors raised by any step of one iteration are handed to `caught` and the
//! loop moves on to the next read.  Only `RequestExit` ends the loop.

use async_trait::async_trait;
use tracing::warn;

use self::history::History;

pub mod engine;
pub mod history;

/// What the `read` hook produced.
///
/// The two non-`Form` variants are the loop's sentinels: they can never be
/// confused with a value the user typed.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<V> {
    /// An input form to evaluate.
    Form(V),
    /// Nothing to evaluate; prompt again (e.g. a blank line).
    RequestPrompt,
    /// Leave the loop (end of stream or an explicit quit).
    RequestExit,
}

/// Per-step customisation points of the [`ReplEngine`](engine::ReplEngine).
///
/// Errors are opaque [`anyhow::Error`]s: hooks report whatever failed and the
/// engine routes it to [`caught`](ReplHooks::caught).
#[async_trait]
pub trait ReplHooks: Send {
    /// The value type flowing from `read` through `eval` to `print`.
    type Value: Clone + Send + Sync + 'static;

    /// Runs once before the first prompt.
    async fn init(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Decides whether to prompt after an evaluated form or a caught error.
    ///
    /// Implementors reading from a line-oriented stream usually answer
    /// "is the reader at the start of a line", so several forms typed on one
    /// line produce one prompt.
    fn need_prompt(&mut self) -> bool {
        true
    }

    /// Emits the prompt text.
    async fn prompt(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Flushes output written so far.
    async fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Obtains the next input form or a sentinel.
    async fn read(&mut self) -> anyhow::Result<ReadOutcome<Self::Value>>;

    /// Evaluates a form.  `history` holds the last three results and the last
    /// caught error of this engine run.  Defaults to identity.
    async fn eval(
        &mut self,
        form: Self::Value,
        _history: &History<Self::Value>,
    ) -> anyhow::Result<Self::Value> {
        Ok(form)
    }

    /// Displays an evaluation result.
    async fn print(&mut self, value: &Self::Value) -> anyhow::Result<()>;

    /// Handles an error raised by a step of the current iteration.
    async fn caught(&mut self, error: &anyhow::Error) -> anyhow::Result<()> {
        warn!(error = %format!("{error:#}"), "repl iteration failed");
        Ok(())
    }
}
