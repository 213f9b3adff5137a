//! Datum reader: text → [`Datum`].
//!
//! The reader is pure and synchronous.  It reports [`ParseError::Incomplete`]
//! when the input ends in the middle of a datum (an open bracket or an
//! unterminated string), which lets a line-oriented caller append the next
//! line and try again.

use thiserror::Error;

use super::Datum;

/// Errors produced while reading a datum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The input ended before a complete datum was read.
    #[error("unexpected end of input")]
    Incomplete,

    /// A character that cannot start or continue a datum here.
    #[error("unexpected '{ch}' at offset {offset}")]
    Unexpected { ch: char, offset: usize },

    /// A token that starts like a number but is not one.
    #[error("invalid number: {0}")]
    InvalidNumber(String),

    /// A map literal with an odd number of forms.
    #[error("map literal must contain an even number of forms")]
    MapArity,
}

/// Returns `true` for characters the reader skips between data.
pub fn is_whitespace(c: char) -> bool {
    c.is_whitespace() || c == ','
}

/// Reads one datum from the start of `src`.
///
/// Leading whitespace and comments are skipped.  On success returns the
/// datum and the byte offset just past it; trailing input is left untouched.
///
/// # Errors
///
/// Returns [`ParseError::Incomplete`] if `src` holds no complete datum
/// (including when it holds only whitespace).
pub fn read_datum(src: &str) -> Result<(Datum, usize), ParseError> {
    let mut parser = Parser { src, pos: 0 };
    let datum = parser.datum()?;
    Ok((datum, parser.pos))
}

/// Reads every datum in `src`.
///
/// # Errors
///
/// Returns the first [`ParseError`] encountered.
pub fn read_all(src: &str) -> Result<Vec<Datum>, ParseError> {
    let mut parser = Parser { src, pos: 0 };
    let mut out = Vec::new();
    loop {
        parser.skip_whitespace();
        if parser.peek().is_none() {
            return Ok(out);
        }
        out.push(parser.datum()?);
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if is_whitespace(c) {
                self.bump();
            } else if c == ';' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn datum(&mut self) -> Result<Datum, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        match self.bump() {
            None => Err(ParseError::Incomplete),
            Some('(') => Ok(Datum::List(self.seq(')')?)),
            Some('[') => Ok(Datum::Vector(self.seq(']')?)),
            Some('{') => {
                let items = self.seq('}')?;
                if items.len() % 2 != 0 {
                    return Err(ParseError::MapArity);
                }
                let mut entries = Vec::with_capacity(items.len() / 2);
                let mut iter = items.into_iter();
                while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                    entries.push((k, v));
                }
                Ok(Datum::Map(entries))
            }
            Some(ch @ (')' | ']' | '}')) => Err(ParseError::Unexpected { ch, offset: start }),
            Some('"') => self.string(),
            Some(':') => {
                let name = self.token();
                if name.is_empty() {
                    return Err(ParseError::Unexpected {
                        ch: ':',
                        offset: start,
                    });
                }
                Ok(Datum::Keyword(name.to_string()))
            }
            Some(_) => {
                self.pos = start;
                let token = self.token();
                atom(token)
            }
        }
    }

    fn seq(&mut self, close: char) -> Result<Vec<Datum>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(ParseError::Incomplete),
                Some(c) if c == close => {
                    self.bump();
                    return Ok(items);
                }
                Some(_) => items.push(self.datum()?),
            }
        }
    }

    fn string(&mut self) -> Result<Datum, ParseError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::Incomplete),
                Some('"') => return Ok(Datum::Str(out)),
                Some('\\') => match self.bump() {
                    None => return Err(ParseError::Incomplete),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(other) => out.push(other),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn token(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_whitespace(c) || is_delimiter(c) {
                break;
            }
            self.bump();
        }
        &self.src[start..self.pos]
    }
}

fn is_delimiter(c: char) -> bool {
    matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';')
}

fn atom(token: &str) -> Result<Datum, ParseError> {
    match token {
        "nil" => return Ok(Datum::Nil),
        "true" => return Ok(Datum::Bool(true)),
        "false" => return Ok(Datum::Bool(false)),
        _ => {}
    }
    if looks_numeric(token) {
        if let Ok(n) = token.parse::<i64>() {
            return Ok(Datum::Int(n));
        }
        return token
            .parse::<f64>()
            .map(Datum::Float)
            .map_err(|_| ParseError::InvalidNumber(token.to_string()));
    }
    Ok(Datum::Symbol(token.to_string()))
}

fn looks_numeric(token: &str) -> bool {
    let digits = token.strip_prefix(['+', '-']).unwrap_or(token);
    digits.starts_with(|c: char| c.is_ascii_digit())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
