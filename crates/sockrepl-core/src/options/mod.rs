//! Server start options and their validation.
//!
//! [`ServerOptions`] is the loose, user-facing shape: every field is optional
//! so it can be deserialised from TOML, built from an options literal such as
//! `{:port 5555 :accept sockrepl.server/repl}`, or assembled in code.
//! [`ServerOptions::validate`] turns it into a [`ServerConfig`] whose required
//! fields are guaranteed present and in range.
//!
//! | option          | type            | default      |
//! |-----------------|-----------------|--------------|
//! | `name`          | string          | required     |
//! | `port`          | integer 0–65534 | required     |
//! | `accept`        | handler name    | required     |
//! | `address`       | host string     | loopback     |
//! | `args`          | list of strings | empty        |
//! | `bind-err`      | bool            | `true`       |
//! | `server-daemon` | bool            | `true`       |
//! | `client-daemon` | bool            | `true`       |

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::datum::reader::{read_all, read_datum, ParseError};
use crate::datum::Datum;

pub mod properties;

/// Exclusive upper bound for the `port` option.
pub const PORT_LIMIT: i64 = 65535;

/// Error type for invalid or missing start options.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A required option was not supplied.
    #[error("missing required option: {0}")]
    MissingOption(&'static str),

    /// The port is outside `0 ≤ port < 65535`.
    #[error("invalid port: {0}, must be between 0 and 65534")]
    PortOutOfRange(i64),

    /// An option has a value of the wrong shape.
    #[error("invalid value for option {key}: {reason}")]
    InvalidOption { key: String, reason: String },

    /// An options literal could not be read.
    #[error("invalid options literal: {0}")]
    Literal(#[from] ParseError),
}

/// Options a server is started with, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerOptions {
    /// Registry key for the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Host to bind; absent means loopback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Kept signed so out-of-range input is reported rather than rejected
    /// by the deserialiser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    /// Name of the session handler, resolved at each connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<String>,
    /// Arguments passed to the handler.
    #[serde(default)]
    pub args: Vec<String>,
    /// Route error output to the connection (`true`) or the process stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_err: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_daemon: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_daemon: Option<bool>,
}

/// Validated server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub address: Option<String>,
    pub port: u16,
    pub accept: String,
    pub args: Vec<String>,
    pub bind_err: bool,
    /// Lifecycle hint: a non-daemon server keeps the hosting process alive.
    pub server_daemon: bool,
    /// Lifecycle hint: the hosting process waits for non-daemon sessions on exit.
    pub client_daemon: bool,
}

impl ServerOptions {
    /// Creates options with the three required fields set.
    pub fn new(name: impl Into<String>, port: i64, accept: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            port: Some(port),
            accept: Some(accept.into()),
            ..Self::default()
        }
    }

    /// Fills in `name` if the options do not already carry one.
    pub fn with_default_name(mut self, name: &str) -> Self {
        self.name.get_or_insert_with(|| name.to_string());
        self
    }

    /// Checks required options and the port range.
    ///
    /// Required options are checked in the order `name`, `port`, `accept`;
    /// the first missing one is reported.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingOption`] naming the missing key.
    /// - [`ConfigError::PortOutOfRange`] unless `0 ≤ port < 65535`.
    pub fn validate(self) -> Result<ServerConfig, ConfigError> {
        let name = self.name.ok_or(ConfigError::MissingOption("name"))?;
        let port = self.port.ok_or(ConfigError::MissingOption("port"))?;
        let accept = self.accept.ok_or(ConfigError::MissingOption("accept"))?;
        if !(0..PORT_LIMIT).contains(&port) {
            return Err(ConfigError::PortOutOfRange(port));
        }
        Ok(ServerConfig {
            name,
            address: self.address,
            // In range checked above.
            port: port as u16,
            accept,
            args: self.args,
            bind_err: self.bind_err.unwrap_or(true),
            server_daemon: self.server_daemon.unwrap_or(true),
            client_daemon: self.client_daemon.unwrap_or(true),
        })
    }

    /// Parses an options literal.
    ///
    /// Two entry styles are accepted and may be mixed:
    ///
    /// ```text
    /// {:port 5555 :accept sockrepl.server/repl :args ["a"]}
    /// {port:5555, accept:sockrepl.server/repl, args: ["a"]}
    /// ```
    ///
    /// Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Literal`] for unreadable text and
    /// [`ConfigError::InvalidOption`] for malformed entries or values.
    pub fn from_literal(text: &str) -> Result<Self, ConfigError> {
        let trimmed = text.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or_else(|| ConfigError::InvalidOption {
                key: "<literal>".to_string(),
                reason: format!("expected a {{...}} map, got {trimmed:?}"),
            })?;

        let mut options = Self::default();
        let mut items = read_all(inner)?.into_iter();
        while let Some(item) = items.next() {
            let (key, value) = match item {
                Datum::Keyword(key) => {
                    let value = items.next().ok_or_else(|| missing_value(&key))?;
                    (key, value)
                }
                Datum::Symbol(sym) => match sym.split_once(':') {
                    Some((key, "")) => {
                        let value = items.next().ok_or_else(|| missing_value(key))?;
                        (key.to_string(), value)
                    }
                    Some((key, rest)) => (key.to_string(), read_datum(rest)?.0),
                    None => return Err(missing_value(&sym)),
                },
                other => {
                    return Err(ConfigError::InvalidOption {
                        key: other.to_string(),
                        reason: "option keys must be keywords or `key:` symbols".to_string(),
                    })
                }
            };
            options.set(&key, value)?;
        }
        Ok(options)
    }

    fn set(&mut self, key: &str, value: Datum) -> Result<(), ConfigError> {
        match key {
            "name" => self.name = Some(name_value(key, &value)?),
            "address" => self.address = Some(name_value(key, &value)?),
            "accept" => self.accept = Some(name_value(key, &value)?),
            "port" => match value {
                Datum::Int(port) => self.port = Some(port),
                other => return Err(wrong_type(key, "an integer", &other)),
            },
            "args" => match value {
                Datum::Vector(items) | Datum::List(items) => {
                    self.args = items
                        .into_iter()
                        .map(|item| match item {
                            Datum::Str(s) => s,
                            other => other.to_string(),
                        })
                        .collect();
                }
                other => return Err(wrong_type(key, "a vector", &other)),
            },
            "bind-err" => self.bind_err = Some(bool_value(key, &value)?),
            "server-daemon" => self.server_daemon = Some(bool_value(key, &value)?),
            "client-daemon" => self.client_daemon = Some(bool_value(key, &value)?),
            unknown => debug!(key = unknown, "ignoring unknown server option"),
        }
        Ok(())
    }
}

fn missing_value(key: &str) -> ConfigError {
    ConfigError::InvalidOption {
        key: key.to_string(),
        reason: "missing value".to_string(),
    }
}

fn wrong_type(key: &str, expected: &str, got: &Datum) -> ConfigError {
    ConfigError::InvalidOption {
        key: key.to_string(),
        reason: format!("expected {expected}, got {}", got.type_name()),
    }
}

fn name_value(key: &str, value: &Datum) -> Result<String, ConfigError> {
    value
        .as_name()
        .map(str::to_string)
        .ok_or_else(|| wrong_type(key, "a string or symbol", value))
}

fn bool_value(key: &str, value: &Datum) -> Result<bool, ConfigError> {
    match value {
        Datum::Bool(b) => Ok(*b),
        other => Err(wrong_type(key, "a boolean", other)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
