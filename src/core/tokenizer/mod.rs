//! Per-line key extraction.
//!
//! A [`Tokenizer`] is handed one line at a time and reports zero or more
//! `(key, offset_within_line)` pairs to an [`IndexSink`]. The variant set is
//! closed: regular expressions, delimited fields, or an external filter
//! process.

pub mod external;
pub mod field;
pub mod regex;

pub use external::ExternalTokenizer;
pub use field::FieldTokenizer;
pub use regex::RegexTokenizer;

use thiserror::Error;

/// Per-line failures. The builder wraps these with the line number and content.
#[derive(Debug, Error)]
pub enum TokenizeError
{
    #[error("capture group {group} did not match")]
    MissingGroup
    {
        group: usize,
    },

    #[error(
        "expected exactly one match (or one capture group - use a capture or key template if the pattern has several groups)"
    )]
    AmbiguousGroups,

    #[error("non-numeric key '{0}'")]
    NonNumericKey(String),

    #[error("key offset {offset} lies outside the line ({len} bytes)")]
    OffsetOutOfRange
    {
        offset: usize,
        len: usize,
    },

    #[error("error handling index match '{key}': {source}")]
    Match
    {
        key: String,
        #[source]
        source: Box<TokenizeError>,
    },

    #[error("external indexer protocol violation: {0}")]
    Protocol(String),

    #[error("external indexer I/O error: {0}")]
    ExternalIo(#[from] std::io::Error),
}

/// Destination for keys found in a line.
pub trait IndexSink
{
    /// Add a key; `offset` is the key's byte offset within the line.
    fn add(
        &mut self,
        key: &[u8],
        offset: usize,
    ) -> Result<(), TokenizeError>;
}

/// The closed set of tokenizer kinds.
#[derive(Debug)]
pub enum Tokenizer
{
    Regex(RegexTokenizer),
    Field(FieldTokenizer),
    External(ExternalTokenizer),
}

impl Tokenizer
{
    /// Extract all keys from `line` into `sink`.
    pub fn index(
        &mut self,
        sink: &mut dyn IndexSink,
        line: &[u8],
    ) -> Result<(), TokenizeError>
    {
        match self
        {
            Tokenizer::Regex(t) => t.index(sink, line),
            Tokenizer::Field(t) => t.index(sink, line),
            Tokenizer::External(t) => t.index(sink, line),
        }
    }

    /// Human-readable description stored alongside the index.
    pub fn describe(&self) -> String
    {
        match self
        {
            Tokenizer::Regex(t) => t.describe(),
            Tokenizer::Field(t) => t.describe(),
            Tokenizer::External(t) => t.describe(),
        }
    }
}

impl From<RegexTokenizer> for Tokenizer
{
    fn from(t: RegexTokenizer) -> Self
    {
        Tokenizer::Regex(t)
    }
}

impl From<FieldTokenizer> for Tokenizer
{
    fn from(t: FieldTokenizer) -> Self
    {
        Tokenizer::Field(t)
    }
}

impl From<ExternalTokenizer> for Tokenizer
{
    fn from(t: ExternalTokenizer) -> Self
    {
        Tokenizer::External(t)
    }
}

/// Parse a numeric key: optional leading '-', then one or more ASCII digits.
pub fn parse_numeric_key(key: &[u8]) -> Result<i64, TokenizeError>
{
    let digits = key
        .strip_prefix(b"-")
        .unwrap_or(key);
    let well_formed = !digits.is_empty()
        && digits
            .iter()
            .all(u8::is_ascii_digit);

    let text = String::from_utf8_lossy(key);
    if !well_formed
    {
        return Err(TokenizeError::NonNumericKey(text.into_owned()));
    }
    // Overflow is reported the same way as a malformed key.
    match text.parse::<i64>()
    {
        Ok(value) => Ok(value),
        Err(_) => Err(TokenizeError::NonNumericKey(text.into_owned())),
    }
}
