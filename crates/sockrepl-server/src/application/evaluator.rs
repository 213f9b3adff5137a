//! What a form typed into a session evaluates to.
//!
//! Sessions do not host a general-purpose language.  Most forms evaluate to
//! themselves; a handful of symbols and list forms reach into the session and
//! the server registry:
//!
//! | form                    | value                                       |
//! |-------------------------|---------------------------------------------|
//! | `*1` `*2` `*3`          | recent results, `nil` when absent           |
//! | `*e`                    | `{:message "…" :trace […]}` or `nil`        |
//! | `(session)`             | `{:server "name" :client 3}`                |
//! | `(servers)`             | vector of registered server names           |
//! | `(args)`                | vector of the server's `args`               |
//! | `(stop-server)`         | stops this session's server                 |
//! | `(stop-server name)`    | `:stopped` or `:not-found`                  |
//! | `(throw "message")`     | raises an error with that message           |

use anyhow::{anyhow, bail};
use sockrepl_core::{Datum, History};

use super::port::SessionPort;

/// Evaluates `form` for the session behind `port`.
///
/// # Errors
///
/// Fails for `(throw …)`, for built-ins called with the wrong arguments, and
/// when stopping a server fails.
pub async fn evaluate(
    form: Datum,
    history: &History<Datum>,
    port: &mut dyn SessionPort,
) -> anyhow::Result<Datum> {
    if let Some(value) = form.as_symbol().and_then(|name| history_symbol(name, history)) {
        return Ok(value);
    }
    if let Datum::List(items) = &form {
        if let Some((Datum::Symbol(op), rest)) = items.split_first() {
            if let Some(value) = call(op, rest, history, port).await? {
                return Ok(value);
            }
        }
    }
    Ok(form)
}

/// Resolves `*1`..`*3` and `*e`; `None` for any other symbol.
fn history_symbol(name: &str, history: &History<Datum>) -> Option<Datum> {
    let n = match name {
        "*1" => 1,
        "*2" => 2,
        "*3" => 3,
        "*e" => {
            return Some(history.last_error().map_or(Datum::Nil, |e| {
                Datum::Map(vec![
                    (Datum::keyword("message"), Datum::string(&e.message)),
                    (
                        Datum::keyword("trace"),
                        Datum::Vector(e.trace.iter().map(Datum::string).collect()),
                    ),
                ])
            }))
        }
        _ => return None,
    };
    Some(history.get(n).cloned().unwrap_or(Datum::Nil))
}

/// Arguments may refer to history (`(stop-server *1)`).
fn argument(arg: &Datum, history: &History<Datum>) -> Datum {
    match arg.as_symbol() {
        Some(name) => history_symbol(name, history).unwrap_or_else(|| arg.clone()),
        None => arg.clone(),
    }
}

/// Runs a built-in.  `Ok(None)` means `op` is not a built-in.
async fn call(
    op: &str,
    args: &[Datum],
    history: &History<Datum>,
    port: &mut dyn SessionPort,
) -> anyhow::Result<Option<Datum>> {
    let value = match op {
        "session" => {
            expect_arity(op, args, 0)?;
            let ctx = port.context();
            Datum::Map(vec![
                (Datum::keyword("server"), Datum::string(&ctx.server)),
                (Datum::keyword("client"), Datum::Int(client_id(ctx.client_id))),
            ])
        }
        "servers" => {
            expect_arity(op, args, 0)?;
            Datum::Vector(port.server_names().into_iter().map(Datum::Str).collect())
        }
        "args" => {
            expect_arity(op, args, 0)?;
            Datum::Vector(port.args().iter().map(Datum::string).collect())
        }
        "stop-server" => {
            let name = match args {
                [] => port.context().server.clone(),
                [arg] => {
                    let arg = argument(arg, history);
                    arg.as_name()
                        .ok_or_else(|| {
                            anyhow!("stop-server expects a server name, got {}", arg.type_name())
                        })?
                        .to_string()
                }
                _ => bail!("stop-server takes at most 1 argument, got {}", args.len()),
            };
            let outcome = port.stop_server(&name).await?;
            Datum::keyword(outcome.label())
        }
        "throw" => {
            expect_arity(op, args, 1)?;
            match argument(&args[0], history) {
                Datum::Str(message) => bail!(message),
                other => bail!("{other}"),
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn expect_arity(op: &str, args: &[Datum], n: usize) -> anyhow::Result<()> {
    if args.len() != n {
        bail!("{op} takes {n} argument(s), got {}", args.len());
    }
    Ok(())
}

fn client_id(id: u64) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
