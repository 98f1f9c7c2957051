//! Error taxonomy for the build and query pipelines.
//!
//! Per-line problems surface as [`TokenizeError`] and are wrapped into a
//! [`BuildError::Line`] carrying the line number and its content. Everything
//! else aborts the whole build or query.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::inflate::InflateError;
use crate::core::tokenizer::TokenizeError;

/// Failures while building an index. All of them abort the build.
#[derive(Debug, Error)]
pub enum BuildError
{
    #[error("I/O error on {}: {source}", path.display())]
    Io
    {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Inflate(#[from] InflateError),

    #[error("error indexing line {line} '{content}': {source}")]
    Line
    {
        line: u64,
        content: String,
        #[source]
        source: TokenizeError,
    },

    #[error("duplicate key '{key}' in unique index '{index}' at line {line} '{content}'")]
    DuplicateKey
    {
        index: String,
        key: String,
        line: u64,
        content: String,
    },

    #[error("invalid index name '{0}': only ASCII letters, digits and '_' are allowed")]
    InvalidIndexName(String),

    #[error("index '{0}' declared more than once")]
    DuplicateIndex(String),

    #[error("index store error: {0}")]
    Store(#[from] rusqlite::Error),
}

/// Failures while loading or querying an index.
#[derive(Debug, Error)]
pub enum QueryError
{
    #[error("I/O error on {}: {source}", path.display())]
    Io
    {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Inflate(#[from] InflateError),

    #[error("{} is not a usable index: {reason}", path.display())]
    NotAnIndex
    {
        path: PathBuf,
        reason: String,
    },

    #[error(
        "index is stale: {field} of {} is {actual}, index recorded {expected} (use --force to load anyway)",
        path.display()
    )]
    Stale
    {
        path: PathBuf,
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("no index named '{0}'")]
    UnknownIndex(String),

    #[error("invalid key '{key}' for numeric index '{index}'")]
    InvalidKey
    {
        index: String,
        key: String,
    },

    #[error("index store error: {0}")]
    Store(#[from] rusqlite::Error),
}
