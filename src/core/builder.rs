//! Index construction: one pass over the compressed file producing access
//! points, line offsets and key indexes in a single SQLite file.
//!
//! The store is written to a temporary file next to the destination inside
//! one transaction and renamed into place only once everything succeeded.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bstr::ByteSlice;
use tracing::{debug, info};

use crate::core::checkpoint::{CheckpointBuilder, DEFAULT_INDEX_EVERY, ScanSink};
use crate::core::error::BuildError;
use crate::core::line_finder::{LineRecord, LineSink};
use crate::core::tokenizer::{IndexSink, TokenizeError, Tokenizer, parse_numeric_key};
use crate::infra::io::{FileIdentity, canonical};
use crate::infra::store::{KeyValue, Store, is_constraint_violation};

/// On-disk format version written to `Metadata`.
pub const INDEX_VERSION: &str = "1";

/// Declared properties of one key index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition
{
    pub name: String,
    /// Stored description; defaults to the tokenizer's own description.
    pub creation: Option<String>,
    pub numeric: bool,
    pub unique: bool,
    /// Also index the `line` column.
    pub index_line: bool,
}

impl IndexDefinition
{
    pub fn new(name: impl Into<String>) -> Self
    {
        Self {
            name: name.into(),
            creation: None,
            numeric: false,
            unique: false,
            index_line: false,
        }
    }

    pub fn numeric(
        mut self,
        numeric: bool,
    ) -> Self
    {
        self.numeric = numeric;
        self
    }

    pub fn unique(
        mut self,
        unique: bool,
    ) -> Self
    {
        self.unique = unique;
        self
    }

    pub fn index_line(
        mut self,
        index_line: bool,
    ) -> Self
    {
        self.index_line = index_line;
        self
    }

    pub fn creation(
        mut self,
        creation: impl Into<String>,
    ) -> Self
    {
        self.creation = Some(creation.into());
        self
    }
}

/// Index names end up in table names, so they are restricted.
pub fn is_valid_index_name(name: &str) -> bool
{
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Summary of a finished build.
#[derive(Debug, Clone)]
pub struct BuildReport
{
    pub index_path: PathBuf,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub num_lines: u64,
    pub access_points: usize,
    /// Rows added per index, in declaration order.
    pub keys: Vec<(String, u64)>,
    pub elapsed: Duration,
}

type ProgressFn = Box<dyn FnMut(u64, u64)>;

pub struct IndexBuilder
{
    compressed: PathBuf,
    output: PathBuf,
    indexes: Vec<(IndexDefinition, Tokenizer)>,
    index_every: u64,
    sparse: bool,
    sparse_line_offsets: bool,
    progress: Option<ProgressFn>,
}

impl IndexBuilder
{
    pub fn new(
        compressed: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self
    {
        Self {
            compressed: compressed.into(),
            output: output.into(),
            indexes: Vec::new(),
            index_every: DEFAULT_INDEX_EVERY,
            sparse: false,
            sparse_line_offsets: false,
            progress: None,
        }
    }

    pub fn add_index(
        mut self,
        definition: IndexDefinition,
        tokenizer: impl Into<Tokenizer>,
    ) -> Self
    {
        self.indexes
            .push((definition, tokenizer.into()));
        self
    }

    /// Uncompressed bytes between checkpoints.
    pub fn index_every(
        mut self,
        bytes: u64,
    ) -> Self
    {
        self.index_every = bytes.max(1);
        self
    }

    /// Only record offsets of lines that produced at least one key.
    pub fn sparse(
        mut self,
        sparse: bool,
    ) -> Self
    {
        self.sparse = sparse;
        self
    }

    /// Sparse, and let queries recover unrecorded lines by scanning.
    pub fn sparse_line_offsets(
        mut self,
        enabled: bool,
    ) -> Self
    {
        self.sparse_line_offsets = enabled;
        self
    }

    /// Called with `(compressed bytes consumed, compressed size)`.
    pub fn on_progress(
        mut self,
        progress: impl FnMut(u64, u64) + 'static,
    ) -> Self
    {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn build(mut self) -> Result<BuildReport, BuildError>
    {
        let started = Instant::now();
        self.validate()?;
        let sparse = self.sparse || self.sparse_line_offsets;

        let file = File::open(&self.compressed).map_err(|e| io_error(&self.compressed, e))?;
        let identity = FileIdentity::of(&file).map_err(|e| io_error(&self.compressed, e))?;

        let tmp = temp_beside(&self.output)?;
        debug!(tmp = %tmp.path().display(), "building index");
        let store = Store::create(tmp.path())?;
        store.begin()?;

        for (def, tokenizer) in &self.indexes
        {
            let creation = def
                .creation
                .clone()
                .unwrap_or_else(|| tokenizer.describe());
            store.create_key_index(&def.name, &creation, def.numeric, def.unique)?;
        }

        let (scan, key_counts) = {
            let mut sink = BuildSink {
                store: &store,
                keys: vec![0; self.indexes.len()],
                indexes: &mut self.indexes,
                sparse,
                progress: self.progress.as_mut(),
                compressed_size: identity.size,
                scratch: KeyCollector::default(),
            };
            let scan = CheckpointBuilder::new(file, self.index_every)?.run(&mut sink)?;
            (scan, sink.keys)
        };

        for point in &scan.points
        {
            store.insert_access_point(point)?;
        }
        for (def, _) in &self.indexes
        {
            store.finish_key_index(&def.name, def.unique, def.index_line)?;
        }

        let source = canonical(&self.compressed);
        let metadata = [
            ("version", INDEX_VERSION.to_string()),
            ("compressedFile", source.display().to_string()),
            ("compressedSize", identity.size.to_string()),
            ("compressedModTime", identity.mod_time.to_string()),
            ("sparse", sparse.to_string()),
            ("sparseLineOffsets", self.sparse_line_offsets.to_string()),
            ("uncompressedSize", scan.uncompressed_size.to_string()),
            ("numLines", scan.num_lines.to_string()),
            ("indexEvery", self.index_every.to_string()),
        ];
        for (key, value) in &metadata
        {
            store.set_metadata(key, value)?;
        }
        store.commit()?;
        drop(store);

        tmp.persist(&self.output)
            .map_err(|e| io_error(&self.output, e.error))?;

        let report = BuildReport {
            index_path: self.output.clone(),
            compressed_size: identity.size,
            uncompressed_size: scan.uncompressed_size,
            num_lines: scan.num_lines,
            access_points: scan.points.len(),
            keys: self
                .indexes
                .iter()
                .map(|(def, _)| def.name.clone())
                .zip(key_counts)
                .collect(),
            elapsed: started.elapsed(),
        };
        info!(
            index = %report.index_path.display(),
            lines = report.num_lines,
            uncompressed = report.uncompressed_size,
            access_points = report.access_points,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "index built"
        );
        Ok(report)
    }

    fn validate(&self) -> Result<(), BuildError>
    {
        for (i, (def, _)) in self
            .indexes
            .iter()
            .enumerate()
        {
            if !is_valid_index_name(&def.name)
            {
                return Err(BuildError::InvalidIndexName(def.name.clone()));
            }
            if self.indexes[..i]
                .iter()
                .any(|(other, _)| other.name == def.name)
            {
                return Err(BuildError::DuplicateIndex(def.name.clone()));
            }
        }
        Ok(())
    }
}

fn io_error(
    path: &Path,
    source: std::io::Error,
) -> BuildError
{
    BuildError::Io { path: path.to_path_buf(), source }
}

/// Temporary file in the destination's directory so the final rename stays
/// on one filesystem.
fn temp_beside(output: &Path) -> Result<tempfile::NamedTempFile, BuildError>
{
    let dir = match output.parent()
    {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tempfile::Builder::new()
        .prefix(".zindex-")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(|e| io_error(&dir, e))
}

#[derive(Debug)]
enum OwnedKey
{
    Numeric(i64),
    Text(Vec<u8>),
}

impl OwnedKey
{
    fn as_value(&self) -> KeyValue<'_>
    {
        match self
        {
            OwnedKey::Numeric(v) => KeyValue::Numeric(*v),
            OwnedKey::Text(b) => KeyValue::Text(b),
        }
    }

    fn display(&self) -> String
    {
        match self
        {
            OwnedKey::Numeric(v) => v.to_string(),
            OwnedKey::Text(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

/// Gathers and validates the keys of one line for one index.
#[derive(Default)]
struct KeyCollector
{
    numeric: bool,
    line_len: usize,
    keys: Vec<(OwnedKey, usize)>,
}

impl IndexSink for KeyCollector
{
    fn add(
        &mut self,
        key: &[u8],
        offset: usize,
    ) -> Result<(), TokenizeError>
    {
        if offset > self.line_len
        {
            return Err(TokenizeError::OffsetOutOfRange { offset, len: self.line_len });
        }
        let key = if self.numeric
        {
            OwnedKey::Numeric(parse_numeric_key(key)?)
        }
        else
        {
            OwnedKey::Text(key.to_vec())
        };
        self.keys
            .push((key, offset));
        Ok(())
    }
}

struct BuildSink<'a>
{
    store: &'a Store,
    indexes: &'a mut Vec<(IndexDefinition, Tokenizer)>,
    keys: Vec<u64>,
    sparse: bool,
    progress: Option<&'a mut ProgressFn>,
    compressed_size: u64,
    scratch: KeyCollector,
}

impl LineSink for BuildSink<'_>
{
    type Error = BuildError;

    fn on_line(
        &mut self,
        number: u64,
        _offset: u64,
        line: &[u8],
    ) -> Result<bool, BuildError>
    {
        let mut matched = false;
        for (slot, (def, tokenizer)) in self
            .indexes
            .iter_mut()
            .enumerate()
        {
            self.scratch
                .keys
                .clear();
            self.scratch
                .numeric = def.numeric;
            self.scratch
                .line_len = line.len();

            tokenizer
                .index(&mut self.scratch, line)
                .map_err(|source| BuildError::Line {
                    line: number,
                    content: line.as_bstr().to_string(),
                    source,
                })?;

            for (key, offset) in &self
                .scratch
                .keys
            {
                match self
                    .store
                    .insert_key(&def.name, key.as_value(), number, *offset)
                {
                    Ok(()) => {}
                    Err(e) if def.unique && is_constraint_violation(&e) =>
                    {
                        return Err(BuildError::DuplicateKey {
                            index: def.name.clone(),
                            key: key.display(),
                            line: number,
                            content: line.as_bstr().to_string(),
                        });
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            let found = self
                .scratch
                .keys
                .len() as u64;
            self.keys[slot] += found;
            matched |= found > 0;
        }
        Ok(!self.sparse || matched)
    }
}

impl ScanSink for BuildSink<'_>
{
    fn on_records(
        &mut self,
        records: std::vec::Drain<'_, LineRecord>,
        compressed_pos: u64,
    ) -> Result<(), BuildError>
    {
        for record in records
        {
            self.store
                .insert_line(&record)?;
        }
        if let Some(progress) = self
            .progress
            .as_mut()
        {
            progress(compressed_pos, self.compressed_size);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn index_names()
    {
        assert!(is_valid_index_name("default"));
        assert!(is_valid_index_name("user_id2"));
        assert!(!is_valid_index_name(""));
        assert!(!is_valid_index_name("bad-name"));
        assert!(!is_valid_index_name("x; DROP TABLE Metadata"));
    }

    #[test]
    fn collector_validates_keys()
    {
        let mut c = KeyCollector { numeric: true, line_len: 4, keys: Vec::new() };
        c.add(b"12", 0)
            .unwrap();
        assert!(matches!(c.add(b"x", 0), Err(TokenizeError::NonNumericKey(_))));
        assert!(matches!(c.add(b"1", 9), Err(TokenizeError::OffsetOutOfRange { offset: 9, len: 4 })));
        assert_eq!(c.keys.len(), 1);
    }
}
