//! Rolling result history of one engine run (`*1`, `*2`, `*3`, `*e`).

use std::collections::VecDeque;

/// How many results are remembered.
pub const DEPTH: usize = 3;

/// The last caught error, flattened to text so it outlives the error value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaughtError {
    /// Top-level message.
    pub message: String,
    /// The error followed by each underlying cause, outermost first.
    pub trace: Vec<String>,
}

impl From<&anyhow::Error> for CaughtError {
    fn from(error: &anyhow::Error) -> Self {
        Self {
            message: error.to_string(),
            trace: error.chain().map(ToString::to_string).collect(),
        }
    }
}

/// The last [`DEPTH`] evaluation results, newest first, plus the last error.
#[derive(Debug, Clone)]
pub struct History<V> {
    results: VecDeque<V>,
    last_error: Option<CaughtError>,
}

impl<V> Default for History<V> {
    fn default() -> Self {
        Self {
            results: VecDeque::with_capacity(DEPTH),
            last_error: None,
        }
    }
}

impl<V> History<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the `n`th most recent result, 1-based (`get(1)` is `*1`).
    pub fn get(&self, n: usize) -> Option<&V> {
        n.checked_sub(1).and_then(|i| self.results.get(i))
    }

    pub fn last_error(&self) -> Option<&CaughtError> {
        self.last_error.as_ref()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub(crate) fn push_result(&mut self, value: V) {
        if self.results.len() == DEPTH {
            self.results.pop_back();
        }
        self.results.push_front(value);
    }

    pub(crate) fn record_error(&mut self, error: &anyhow::Error) {
        self.last_error = Some(CaughtError::from(error));
    }

    pub(crate) fn reset(&mut self) {
        self.results.clear();
        self.last_error = None;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_results_roll_after_three() {
        let mut history = History::new();
        for n in 1..=4 {
            history.push_result(n);
        }
        assert_eq!(history.get(1), Some(&4));
        assert_eq!(history.get(2), Some(&3));
        assert_eq!(history.get(3), Some(&2));
        assert_eq!(history.get(4), None);
        assert_eq!(history.len(), DEPTH);
    }

    #[test]
    fn test_get_zero_is_none() {
        let mut history = History::new();
        history.push_result("x");
        assert_eq!(history.get(0), None);
    }

    #[test]
    fn test_record_error_keeps_cause_chain() {
        // Arrange
        let error = Err::<(), _>(anyhow::anyhow!("disk full"))
            .context("saving session")
            .unwrap_err();
        let mut history: History<i32> = History::new();
        // Act
        history.record_error(&error);
        // Assert
        let caught = history.last_error().unwrap();
        assert_eq!(caught.message, "saving session");
        assert_eq!(caught.trace, vec!["saving session", "disk full"]);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut history = History::new();
        history.push_result(1);
        history.record_error(&anyhow::anyhow!("boom"));
        history.reset();
        assert!(history.is_empty());
        assert!(history.last_error().is_none());
    }
}
