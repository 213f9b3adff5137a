//! In-memory [`SessionPort`] for handler tests.

use std::collections::VecDeque;
use std::io;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::port::SessionPort;
use crate::domain::error::{ServerError, TransportError};
use crate::domain::session::{SessionContext, StopOutcome};

/// Serves scripted input lines and records everything written.
pub(crate) struct FakePort {
    context: SessionContext,
    args: Vec<String>,
    lines: VecDeque<Vec<u8>>,
    /// Error returned once the scripted lines run out, instead of EOF.
    fail_with: Option<io::ErrorKind>,
    /// Error returned by the next `write_out`, once.
    fail_next_write: Option<io::ErrorKind>,
    at_line_start: bool,
    pub out: Vec<u8>,
    pub err: Vec<u8>,
    pub servers: Vec<String>,
    pub stopped: Mutex<Vec<String>>,
}

impl FakePort {
    /// A port whose input is `input`, split after every `\n`.
    pub fn new(input: &str) -> Self {
        let mut lines = VecDeque::new();
        let mut rest = input.as_bytes();
        while !rest.is_empty() {
            let end = rest
                .iter()
                .position(|b| *b == b'\n')
                .map_or(rest.len(), |i| i + 1);
            lines.push_back(rest[..end].to_vec());
            rest = &rest[end..];
        }
        Self {
            context: SessionContext::new("test", 1),
            args: Vec::new(),
            lines,
            fail_with: None,
            fail_next_write: None,
            at_line_start: true,
            out: Vec::new(),
            err: Vec::new(),
            servers: vec!["test".to_string()],
            stopped: Mutex::new(Vec::new()),
        }
    }

    pub fn with_args(mut self, args: &[&str]) -> Self {
        self.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn failing_with(mut self, kind: io::ErrorKind) -> Self {
        self.fail_with = Some(kind);
        self
    }

    pub fn failing_next_write(mut self, kind: io::ErrorKind) -> Self {
        self.fail_next_write = Some(kind);
        self
    }

    pub fn out_text(&self) -> String {
        String::from_utf8_lossy(&self.out).into_owned()
    }

    pub fn err_text(&self) -> String {
        String::from_utf8_lossy(&self.err).into_owned()
    }
}

#[async_trait]
impl SessionPort for FakePort {
    fn context(&self) -> &SessionContext {
        &self.context
    }

    fn args(&self) -> &[String] {
        &self.args
    }

    async fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        match self.lines.pop_front() {
            Some(line) => {
                self.at_line_start = line.last() == Some(&b'\n');
                Ok(line)
            }
            None => match self.fail_with {
                Some(kind) => Err(io::Error::from(kind).into()),
                None => Ok(Vec::new()),
            },
        }
    }

    fn at_line_start(&self) -> bool {
        self.at_line_start
    }

    async fn write_out(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if let Some(kind) = self.fail_next_write.take() {
            return Err(io::Error::from(kind).into());
        }
        self.out.extend_from_slice(bytes);
        Ok(())
    }

    async fn write_err(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.err.extend_from_slice(bytes);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn server_names(&self) -> Vec<String> {
        self.servers.clone()
    }

    async fn stop_server(&self, name: &str) -> Result<StopOutcome, ServerError> {
        if self.servers.iter().any(|s| s == name) {
            self.stopped.lock().push(name.to_string());
            Ok(StopOutcome::Stopped)
        } else {
            Ok(StopOutcome::NotFound)
        }
    }
}
