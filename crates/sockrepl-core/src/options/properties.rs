//! Bootstrap properties: `<prefix>.server.<name> = <options literal>`.
//!
//! A host process collects key/value properties (from the command line, a
//! config file, or the environment) and hands them here.  Every key of the
//! form `<prefix>.server.<name>` yields one [`ServerOptions`]; all other keys
//! are ignored.
//!
//! ```text
//! sockrepl.server.admin = {:port 5555 :accept sockrepl.server/repl}
//! sockrepl.server.tools = {port:5556, accept:sockrepl.server/prepl}
//! sockrepl.log          = ignored
//! ```

use super::{ConfigError, ServerOptions};

/// Extracts server options from bootstrap properties.
///
/// The `<name>` part of the key is merged into the options as the server
/// name, overriding any `name` the literal carries.  Results are ordered by key so start-up
/// order does not depend on the property source's iteration order.
///
/// # Errors
///
/// Returns the first [`ConfigError`] raised by a matching entry's literal.
pub fn server_options_from_properties<I, K, V>(
    properties: I,
    prefix: &str,
) -> Result<Vec<ServerOptions>, ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let marker = format!("{prefix}.server.");
    let mut matching: Vec<(String, String)> = properties
        .into_iter()
        .filter_map(|(key, value)| {
            let name = key.as_ref().strip_prefix(&marker)?;
            (!name.is_empty()).then(|| (name.to_string(), value.as_ref().to_string()))
        })
        .collect();
    matching.sort();

    matching
        .into_iter()
        .map(|(name, literal)| {
            ServerOptions::from_literal(&literal).map(|mut options| {
                options.name = Some(name);
                options
            })
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
