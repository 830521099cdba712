//! S-expression codec for the structured wire format.
//!
//! Values are either atoms or lists. The textual form accepts bare atoms,
//! single- or double-quoted strings with backslash escapes, and `;` line
//! comments. Serialization quotes an atom only when the bare form would not
//! read back as the same atom.
//!
//! # Wire format
//!
//! ```text
//! (vm (name test1) (memory 64) (image "linux kernel"))
//! ```

use std::fmt::{self, Write as _};
use std::io;
use std::iter::Peekable;
use std::str::Chars;

/// Canonical media type for structured responses.
pub const MIME_TYPE: &str = "application/sxp";

/// A parsed S-expression value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sxp {
    /// A string-valued leaf.
    Atom(String),
    /// An ordered sequence of values.
    List(Vec<Sxp>),
}

/// Failure to read a value from text.
///
/// Line and column are 1-based and point at the character where parsing
/// stopped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Sxp {
    /// Builds an atom.
    pub fn atom(value: impl Into<String>) -> Self {
        Self::Atom(value.into())
    }

    /// Builds a list from any sequence of values.
    pub fn list(items: impl IntoIterator<Item = Sxp>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Builds the common `(key value)` pair.
    pub fn pair(key: &str, value: impl ToString) -> Self {
        Self::List(vec![Self::atom(key), Self::atom(value.to_string())])
    }

    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    #[must_use]
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Self::Atom(value) => Some(value),
            Self::List(_) => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Sxp]> {
        match self {
            Self::List(items) => Some(items),
            Self::Atom(_) => None,
        }
    }

    /// Returns the leading atom of a list, which names the list's kind.
    #[must_use]
    pub fn head(&self) -> Option<&str> {
        self.as_list()?.first()?.as_atom()
    }

    /// Returns the first sub-list whose head is `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Sxp> {
        self.as_list()?
            .iter()
            .skip(1)
            .find(|item| item.head() == Some(name))
    }

    /// Returns the atom following `name` in the first `(name value ...)` child.
    #[must_use]
    pub fn child_value(&self, name: &str) -> Option<&str> {
        self.child(name)?.as_list()?.get(1)?.as_atom()
    }

    /// Writes the textual form of this value to `out`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the writer.
    pub fn write_to<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{self}")
    }
}

impl fmt::Display for Sxp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(value) => write_atom(f, value),
            Self::List(items) => {
                f.write_char('(')?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_char(' ')?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_char(')')
            }
        }
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"' | '\'' | ';')
}

fn write_atom(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    let bare = !value.is_empty() && !value.chars().any(|c| is_delimiter(c) || c == '\\');
    if bare {
        return f.write_str(value);
    }
    f.write_char('"')?;
    for c in value.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

/// Parses exactly one value from `text`.
///
/// Leading and trailing whitespace and comments are ignored; anything else
/// after the first value is an error.
///
/// # Errors
///
/// Returns a [`ParseError`] for empty input, unbalanced parentheses,
/// unterminated strings, or trailing values.
pub fn parse(text: &str) -> Result<Sxp, ParseError> {
    let mut reader = Reader::new(text);
    reader.skip_trivia();
    if reader.peek().is_none() {
        return Err(reader.error("no value in input"));
    }
    let value = reader.value()?;
    reader.skip_trivia();
    if reader.peek().is_some() {
        return Err(reader.error("unexpected input after the first value"));
    }
    Ok(value)
}

struct Reader<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Reader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some(';') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn value(&mut self) -> Result<Sxp, ParseError> {
        match self.peek() {
            Some('(') => self.list(),
            Some(')') => Err(self.error("unexpected ')'")),
            Some(quote @ ('"' | '\'')) => self.string(quote),
            Some(_) => Ok(self.bare_atom()),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn list(&mut self) -> Result<Sxp, ParseError> {
        let (line, column) = (self.line, self.column);
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(')') => {
                    self.bump();
                    return Ok(Sxp::List(items));
                }
                Some(_) => items.push(self.value()?),
                None => {
                    return Err(self.error(format!(
                        "unexpected end of input: list opened at line {line}, column {column} is not closed"
                    )));
                }
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<Sxp, ParseError> {
        let (line, column) = (self.line, self.column);
        let unterminated = |reader: &Self| {
            reader.error(format!(
                "unterminated string opened at line {line}, column {column}"
            ))
        };
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(Sxp::Atom(value)),
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some(other) => value.push(other),
                    None => return Err(unterminated(self)),
                },
                Some(c) => value.push(c),
                None => return Err(unterminated(self)),
            }
        }
    }

    fn bare_atom(&mut self) -> Sxp {
        let mut value = String::new();
        while let Some(c) = self.peek() {
            if is_delimiter(c) {
                break;
            }
            value.push(c);
            self.bump();
        }
        Sxp::Atom(value)
    }
}
