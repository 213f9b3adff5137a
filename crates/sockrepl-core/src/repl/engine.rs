//! [`ReplEngine`]: runs a [`ReplHooks`] implementation until it asks to exit.

use tracing::{debug, warn};

use super::history::History;
use super::{ReadOutcome, ReplHooks};

/// Counters describing one finished engine run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplSummary {
    /// Forms that were read and evaluated successfully.
    pub evaluated: u64,
    /// Errors handed to the `caught` hook.
    pub caught: u64,
}

enum Step {
    Continue,
    Exit,
}

/// A reusable read-eval-print loop.
///
/// The engine holds no I/O of its own; it only sequences hook calls and keeps
/// the rolling [`History`].  The history belongs to one [`run`](Self::run) and
/// is cleared at the start of the next.
#[derive(Debug)]
pub struct ReplEngine<V> {
    history: History<V>,
}

impl<V> Default for ReplEngine<V> {
    fn default() -> Self {
        Self {
            history: History::new(),
        }
    }
}

impl<V> ReplEngine<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// The history of the current (or most recent) run.
    pub fn history(&self) -> &History<V> {
        &self.history
    }

    /// Runs the loop until `read` returns [`ReadOutcome::RequestExit`].
    ///
    /// No hook error ends the loop: each one is recorded as the last error
    /// and passed to `caught`.  If `caught` itself fails, that failure is
    /// passed to `caught` once more; a second failure is only logged.
    pub async fn run<H>(&mut self, hooks: &mut H) -> ReplSummary
    where
        H: ReplHooks<Value = V> + ?Sized,
    {
        self.history.reset();
        let mut summary = ReplSummary::default();

        if let Err(error) = hooks.init().await {
            self.report(hooks, error, &mut summary).await;
        }
        if let Err(error) = prompt_and_flush(hooks).await {
            self.report(hooks, error, &mut summary).await;
        }

        loop {
            match self.step(hooks, &mut summary).await {
                Ok(Step::Exit) => break,
                Ok(Step::Continue) => {}
                Err(error) => {
                    self.report(hooks, error, &mut summary).await;
                    if hooks.need_prompt() {
                        if let Err(error) = prompt_and_flush(hooks).await {
                            self.report(hooks, error, &mut summary).await;
                        }
                    }
                }
            }
        }

        debug!(
            evaluated = summary.evaluated,
            caught = summary.caught,
            "repl finished"
        );
        summary
    }

    /// One read → eval → print iteration.
    async fn step<H>(&mut self, hooks: &mut H, summary: &mut ReplSummary) -> anyhow::Result<Step>
    where
        H: ReplHooks<Value = V> + ?Sized,
    {
        match hooks.read().await? {
            ReadOutcome::RequestExit => Ok(Step::Exit),
            ReadOutcome::RequestPrompt => {
                prompt_and_flush(hooks).await?;
                Ok(Step::Continue)
            }
            ReadOutcome::Form(form) => {
                let value = hooks.eval(form, &self.history).await?;
                // Recorded before printing so a print failure still leaves
                // the value reachable as *1.
                self.history.push_result(value.clone());
                summary.evaluated += 1;
                hooks.print(&value).await?;
                if hooks.need_prompt() {
                    prompt_and_flush(hooks).await?;
                }
                Ok(Step::Continue)
            }
        }
    }

    async fn report<H>(&mut self, hooks: &mut H, error: anyhow::Error, summary: &mut ReplSummary)
    where
        H: ReplHooks<Value = V> + ?Sized,
    {
        summary.caught += 1;
        self.history.record_error(&error);
        if let Err(secondary) = hooks.caught(&error).await {
            if let Err(tertiary) = hooks.caught(&secondary).await {
                warn!(
                    error = %format!("{error:#}"),
                    handler_error = %format!("{tertiary:#}"),
                    "caught hook failed twice; continuing"
                );
            }
        }
    }
}

async fn prompt_and_flush<H>(hooks: &mut H) -> anyhow::Result<()>
where
    H: ReplHooks + ?Sized,
{
    hooks.prompt().await?;
    hooks.flush().await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
