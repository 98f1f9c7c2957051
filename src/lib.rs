//! **zindex** - Random-access line queries over gzip-compressed text files
//!
//! One pass over the compressed stream records resumable access points and
//! line offsets, and extracts per-line keys into SQLite-backed indexes.
//! Queries resume decompression at the nearest access point instead of
//! inflating the whole file.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Subcommand handlers
pub mod cli_ext {
    /// Build an index from a compressed file
    pub mod build_cmd;

    /// Look up lines and print them with context
    pub mod query_cmd;

    /// Describe an existing index
    pub mod info_cmd;
}

/// Core pipeline - inflate, scan, tokenize, persist and query
pub mod core {
    /// Resumable gzip/zlib inflate with block-boundary stops
    pub mod inflate;
    pub use inflate::{Framing, InflateError, InflateStream, ResumePoint};

    /// Newline scanner over a stream of blocks
    pub mod line_finder;
    pub use line_finder::{LineFinder, LineRecord, LineSink};

    /// Per-line key extraction (regex, field, external process)
    pub mod tokenizer;
    pub use tokenizer::{IndexSink, TokenizeError, Tokenizer};

    /// Single-pass access point recording
    pub mod checkpoint;
    pub use checkpoint::{AccessPoint, CheckpointBuilder, DEFAULT_INDEX_EVERY};

    /// Index construction into a SQLite file
    pub mod builder;
    pub use builder::{BuildReport, IndexBuilder, IndexDefinition};

    /// Point queries with a locality cache
    pub mod index;
    pub use index::Index;

    /// Context windows around matched lines
    pub mod range;
    pub use range::{RangeEvent, RangeFetcher};

    /// Build and query error types
    pub mod error;
    pub use error::{BuildError, QueryError};
}

/// Infrastructure - configuration, storage and small helpers
pub mod infra {
    /// Configuration management with TOML support
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// JSON index definition files
    pub mod index_file;
    pub use index_file::{IndexFile, IndexSpec};

    /// File identity and index path helpers
    pub mod io;
    pub use io::{FileIdentity, default_index_path};

    /// SQLite schema and statements
    pub mod store;

    /// Utility functions and helpers for common operations
    pub mod utils;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use core::{BuildError, Index, IndexBuilder, IndexDefinition, QueryError, RangeFetcher, Tokenizer};
pub use infra::{Config, load_config};
