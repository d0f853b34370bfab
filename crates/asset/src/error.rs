//! Parse errors and non-fatal diagnostics shared by the OBJ and MTL parsers.

use std::fmt;

use thiserror::Error;

/// Which vertex pool a face reference points into.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Pool {
    Position,
    Texcoord,
    Normal,
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pool::Position => "position",
            Pool::Texcoord => "texcoord",
            Pool::Normal => "normal",
        })
    }
}

/// Structural defect that aborts parsing of one document. Line numbers are 1-based.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("line {line}: malformed {field} for `{keyword}`: '{text}'")]
    MalformedNumericField {
        line: usize,
        keyword: String,
        field: String,
        text: String,
    },
    #[error("line {line}: {pool} index {index} out of bounds (pool has {len} entries): '{text}'")]
    DanglingFaceReference {
        line: usize,
        pool: Pool,
        index: i64,
        len: usize,
        text: String,
    },
    #[error("line {line}: `{keyword}` appears before any `newmtl`: '{text}'")]
    PropertyOutsideMaterial {
        line: usize,
        keyword: String,
        text: String,
    },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::MalformedNumericField { line, .. }
            | ParseError::DanglingFaceReference { line, .. }
            | ParseError::PropertyOutsideMaterial { line, .. } => *line,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Anomaly that was skipped; parsing continued.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Diagnostic {
    UnrecognizedKeyword { line: usize, keyword: String },
    /// Face with fewer than three vertex references.
    ShortFace { line: usize, count: usize },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnrecognizedKeyword { line, keyword } => {
                write!(f, "line {line}: unhandled keyword `{keyword}`")
            }
            Diagnostic::ShortFace { line, count } => {
                write!(f, "line {line}: face has {count} vertices, need at least 3")
            }
        }
    }
}

/// Split a trimmed line into its keyword and the remaining argument text.
pub(crate) fn split_keyword(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim_start()),
        None => (line, ""),
    }
}

/// Iterate non-blank, non-comment lines as `(1-based line number, trimmed text)`.
pub(crate) fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Parse a required float field, naming it in the error.
pub(crate) fn parse_f32(
    value: Option<&str>,
    line: usize,
    keyword: &str,
    field: &str,
    text: &str,
) -> ParseResult<f32> {
    value
        .and_then(|token| token.parse::<f32>().ok())
        .ok_or_else(|| ParseError::MalformedNumericField {
            line,
            keyword: keyword.to_string(),
            field: field.to_string(),
            text: text.to_string(),
        })
}
