//! The datum model: values read from and printed to a session.
//!
//! # Syntax
//!
//! ```text
//! nil  true  false          literals
//! 42  -7  3.5  1e3          numbers (i64 / f64)
//! "text\n"                  strings with \" \\ \n \t \r escapes
//! :repl/quit                keywords
//! foo.bar/baz  *1  +        symbols
//! (a b)  [1 2]  {:k v}      lists, vectors, maps
//! ; comment                 skipped to end of line
//! ```
//!
//! Commas count as whitespace, so `{:port 1, :name "a"}` reads the same as
//! `{:port 1 :name "a"}`.

use std::fmt;

pub mod reader;

/// A value read from a session or produced by evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Keyword name without the leading `:`.
    Keyword(String),
    Symbol(String),
    List(Vec<Datum>),
    Vector(Vec<Datum>),
    /// Entries in source order.  Duplicate keys are kept as written.
    Map(Vec<(Datum, Datum)>),
}

impl Datum {
    pub fn keyword(name: impl Into<String>) -> Self {
        Datum::Keyword(name.into())
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Datum::Symbol(name.into())
    }

    pub fn string(text: impl Into<String>) -> Self {
        Datum::Str(text.into())
    }

    /// Returns `true` if this is the keyword `:name`.
    pub fn is_keyword(&self, name: &str) -> bool {
        matches!(self, Datum::Keyword(k) if k == name)
    }

    /// Returns the symbol name, if this is a symbol.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Datum::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the text of a string, symbol, or keyword.
    ///
    /// Used wherever a name may be written either quoted or bare
    /// (`"admin"` or `admin`).
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Datum::Str(s) | Datum::Symbol(s) | Datum::Keyword(s) => Some(s),
            _ => None,
        }
    }

    /// Looks up `key` in a map datum.  Returns `None` for non-maps.
    pub fn get(&self, key: &Datum) -> Option<&Datum> {
        match self {
            Datum::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Short type label used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Datum::Nil => "nil",
            Datum::Bool(_) => "boolean",
            Datum::Int(_) => "integer",
            Datum::Float(_) => "float",
            Datum::Str(_) => "string",
            Datum::Keyword(_) => "keyword",
            Datum::Symbol(_) => "symbol",
            Datum::List(_) => "list",
            Datum::Vector(_) => "vector",
            Datum::Map(_) => "map",
        }
    }
}

/// Prints the datum readably: reading the output yields an equal datum
/// (except for non-finite floats, which have no literal syntax).
impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Nil => f.write_str("nil"),
            Datum::Bool(b) => write!(f, "{b}"),
            Datum::Int(n) => write!(f, "{n}"),
            Datum::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Datum::Float(x) => write!(f, "{x}"),
            Datum::Str(s) => write_escaped(f, s),
            Datum::Keyword(k) => write!(f, ":{k}"),
            Datum::Symbol(s) => f.write_str(s),
            Datum::List(items) => write_seq(f, "(", items, ")"),
            Datum::Vector(items) => write_seq(f, "[", items, "]"),
            Datum::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k} {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, open: &str, items: &[Datum], close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(close)
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            other => write!(f, "{other}")?,
        }
    }
    f.write_str("\"")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_scalars() {
        assert_eq!(Datum::Nil.to_string(), "nil");
        assert_eq!(Datum::Bool(true).to_string(), "true");
        assert_eq!(Datum::Int(-42).to_string(), "-42");
        assert_eq!(Datum::keyword("repl/quit").to_string(), ":repl/quit");
        assert_eq!(Datum::symbol("foo.bar").to_string(), "foo.bar");
    }

    #[test]
    fn test_display_integral_float_keeps_decimal_point() {
        // "2" would read back as an integer.
        assert_eq!(Datum::Float(2.0).to_string(), "2.0");
        assert_eq!(Datum::Float(2.5).to_string(), "2.5");
    }

    #[test]
    fn test_display_string_escapes_quotes_and_newlines() {
        let d = Datum::string("say \"hi\"\n");
        assert_eq!(d.to_string(), r#""say \"hi\"\n""#);
    }

    #[test]
    fn test_display_nested_collections() {
        let d = Datum::Map(vec![
            (Datum::keyword("server"), Datum::string("admin")),
            (
                Datum::keyword("ids"),
                Datum::Vector(vec![Datum::Int(1), Datum::List(vec![Datum::Int(2)])]),
            ),
        ]);
        assert_eq!(d.to_string(), r#"{:server "admin", :ids [1 (2)]}"#);
    }

    #[test]
    fn test_get_finds_map_entry() {
        let d = Datum::Map(vec![(Datum::keyword("port"), Datum::Int(5555))]);
        assert_eq!(d.get(&Datum::keyword("port")), Some(&Datum::Int(5555)));
        assert_eq!(d.get(&Datum::keyword("name")), None);
        assert_eq!(Datum::Nil.get(&Datum::keyword("port")), None);
    }

    #[test]
    fn test_as_name_accepts_string_symbol_and_keyword() {
        assert_eq!(Datum::string("a").as_name(), Some("a"));
        assert_eq!(Datum::symbol("b").as_name(), Some("b"));
        assert_eq!(Datum::keyword("c").as_name(), Some("c"));
        assert_eq!(Datum::Int(1).as_name(), None);
    }
}
