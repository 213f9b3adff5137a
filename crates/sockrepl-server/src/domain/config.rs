//! TOML configuration file schema for the `sockrepl` binary.
//!
//! ```toml
//! [general]
//! log_level = "debug"
//! prefix = "sockrepl"
//!
//! # Bootstrap properties, same shape as `-D key=value` on the command line.
//! [properties]
//! "sockrepl.server.admin" = "{:port 5555 :accept sockrepl.server/repl}"
//!
//! # Servers declared directly; the table name is the default server name.
//! [servers.tools]
//! port = 5556
//! accept = "sockrepl.server/prepl"
//! bind-err = false
//! ```
//!
//! Every section is optional, so an empty file is a valid configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sockrepl_core::ServerOptions;
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub servers: BTreeMap<String, ServerOptions>,
}

/// Process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Property prefix for `<prefix>.server.<name>` keys.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_prefix() -> String {
    "sockrepl".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prefix: default_prefix(),
        }
    }
}

impl AppConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Parse`] for malformed TOML or fields of the
    /// wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigFileError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Io`] if the file cannot be read, or
    /// [`ConfigFileError::Parse`] if it is not valid configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Server options declared under `[servers.<name>]`, each defaulting its
    /// name to the table name.
    pub fn declared_servers(&self) -> Vec<ServerOptions> {
        self.servers
            .iter()
            .map(|(name, options)| options.clone().with_default_name(name))
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.general.log_level, "info");
        assert_eq!(cfg.general.prefix, "sockrepl");
    }

    #[test]
    fn test_full_file_parses_every_section() {
        // Arrange
        let text = r#"
            [general]
            log_level = "debug"
            prefix = "acme"

            [properties]
            "acme.server.admin" = "{:port 5555 :accept sockrepl.server/repl}"

            [servers.tools]
            port = 5556
            accept = "sockrepl.server/prepl"
            args = ["verbose"]
            bind-err = false
            client-daemon = false
        "#;

        // Act
        let cfg = AppConfig::from_toml_str(text).unwrap();

        // Assert
        assert_eq!(cfg.general.log_level, "debug");
        assert_eq!(cfg.general.prefix, "acme");
        assert_eq!(cfg.properties.len(), 1);
        let tools = &cfg.servers["tools"];
        assert_eq!(tools.port, Some(5556));
        assert_eq!(tools.accept.as_deref(), Some("sockrepl.server/prepl"));
        assert_eq!(tools.args, vec!["verbose"]);
        assert_eq!(tools.bind_err, Some(false));
        assert_eq!(tools.client_daemon, Some(false));
        assert_eq!(tools.server_daemon, None);
    }

    #[test]
    fn test_declared_servers_take_table_name() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [servers.alpha]
            port = 1
            accept = "x"

            [servers.beta]
            name = "renamed"
            port = 2
            accept = "x"
            "#,
        )
        .unwrap();

        let names: Vec<_> = cfg
            .declared_servers()
            .into_iter()
            .map(|o| o.name.unwrap())
            .collect();
        assert_eq!(names, vec!["alpha", "renamed"]);
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let err = AppConfig::from_toml_str("[servers.a]\nport = \"high\"").unwrap_err();
        assert!(matches!(err, ConfigFileError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = AppConfig::load(Path::new("/nonexistent/sockrepl.toml")).unwrap_err();
        assert!(matches!(err, ConfigFileError::Io { .. }));
    }
}
