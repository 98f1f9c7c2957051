//! Point queries against a built index.
//!
//! An [`Index`] pairs the compressed source with its SQLite store. Lines are
//! reconstructed by resuming decompression at the access point whose span
//! holds the line, and the last decompressor is kept around so that a run of
//! ascending queries in one span never re-inflates from the checkpoint.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::builder::INDEX_VERSION;
use crate::core::checkpoint::AccessPoint;
use crate::core::error::QueryError;
use crate::core::inflate::{Framing, InflateError, InflateStream, decompress_window};
use crate::core::line_finder::LineRecord;
use crate::core::tokenizer::parse_numeric_key;
use crate::infra::io::FileIdentity;
use crate::infra::store::{IndexInfo, KeyValue, Store};

/// A decompressor parked after the last successful read.
struct Cached
{
    span: usize,
    stream: InflateStream<File>,
}

pub struct Index
{
    compressed: PathBuf,
    path: PathBuf,
    store: Store,
    metadata: BTreeMap<String, String>,
    /// Access points without their windows; those are fetched on resume.
    points: Vec<AccessPoint>,
    framing: Framing,
    indexes: Vec<IndexInfo>,
    num_lines: u64,
    uncompressed_size: u64,
    sparse_line_offsets: bool,
    cache: Option<Cached>,
    idle: Option<File>,
}

impl std::fmt::Debug for Index
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result
    {
        f.debug_struct("Index")
            .field("compressed", &self.compressed)
            .field("path", &self.path)
            .field("access_points", &self.points.len())
            .field("num_lines", &self.num_lines)
            .finish()
    }
}

impl Index
{
    /// Open `index_path` for the compressed file `compressed`.
    ///
    /// The recorded size and modification time of the source must match
    /// unless `force` is set.
    pub fn load(
        compressed: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
        force: bool,
    ) -> Result<Self, QueryError>
    {
        let compressed = compressed
            .as_ref()
            .to_path_buf();
        let path = index_path
            .as_ref()
            .to_path_buf();

        std::fs::metadata(&path).map_err(|source| QueryError::Io { path: path.clone(), source })?;
        let store = Store::open(&path)?;
        let metadata = store
            .metadata()
            .map_err(|e| not_an_index(&path, e.to_string()))?;

        match metadata
            .get("version")
            .map(String::as_str)
        {
            Some(INDEX_VERSION) => {}
            Some(other) => return Err(not_an_index(&path, format!("unsupported version '{other}'"))),
            None => return Err(not_an_index(&path, "no version recorded".to_string())),
        }

        let mut file = File::open(&compressed)
            .map_err(|source| QueryError::Io { path: compressed.clone(), source })?;
        let identity = FileIdentity::of(&file)
            .map_err(|source| QueryError::Io { path: compressed.clone(), source })?;
        check_identity(&compressed, &metadata, &identity, force)?;

        let mut magic = [0u8; 2];
        file.read_exact(&mut magic)
            .map_err(|source| QueryError::Io { path: compressed.clone(), source })?;
        let framing = Framing::detect(&magic).ok_or_else(|| {
            QueryError::Inflate(InflateError::BadHeader {
                offset: 0,
                reason: "neither gzip nor zlib framing".to_string(),
            })
        })?;

        let points = store.access_points(false)?;
        if points.is_empty()
        {
            return Err(not_an_index(&path, "no access points".to_string()));
        }
        let num_lines = required_number(&path, &metadata, "numLines")?;
        let uncompressed_size = required_number(&path, &metadata, "uncompressedSize")?;
        let sparse_line_offsets = metadata
            .get("sparseLineOffsets")
            .is_some_and(|v| v == "true");
        let indexes = store.indexes()?;

        debug!(
            index = %path.display(),
            access_points = points.len(),
            lines = num_lines,
            "index loaded"
        );
        Ok(Self {
            compressed,
            path,
            store,
            metadata,
            points,
            framing,
            indexes,
            num_lines,
            uncompressed_size,
            sparse_line_offsets,
            cache: None,
            idle: Some(file),
        })
    }

    /// Line `n` (1-based) without its terminator, or `None` when the index
    /// cannot produce it.
    pub fn get_line(
        &mut self,
        n: u64,
    ) -> Result<Option<Vec<u8>>, QueryError>
    {
        if n == 0 || n > self.num_lines
        {
            return Ok(None);
        }
        match self
            .store
            .line(n)?
        {
            Some(record) => self
                .read_record(&record)
                .map(Some),
            None if self.sparse_line_offsets => self.scan_to_line(n),
            None => Ok(None),
        }
    }

    /// Line numbers holding `key` in index `name`, ascending and distinct.
    pub fn query_index(
        &self,
        name: &str,
        key: &str,
    ) -> Result<Vec<u64>, QueryError>
    {
        let info = self.index_info(name)?;
        if info.numeric
        {
            let value = parse_numeric_key(key.as_bytes()).map_err(|_| QueryError::InvalidKey {
                index: name.to_string(),
                key: key.to_string(),
            })?;
            Ok(self
                .store
                .lines_for_key(&info.name, KeyValue::Numeric(value))?)
        }
        else
        {
            Ok(self
                .store
                .lines_for_key(&info.name, KeyValue::Text(key.as_bytes()))?)
        }
    }

    /// Union of [`Index::query_index`] over several keys.
    pub fn query_index_multi<S: AsRef<str>>(
        &self,
        name: &str,
        keys: &[S],
    ) -> Result<Vec<u64>, QueryError>
    {
        let mut lines = BTreeSet::new();
        for key in keys
        {
            lines.extend(self.query_index(name, key.as_ref())?);
        }
        Ok(lines
            .into_iter()
            .collect())
    }

    /// Run raw SQL against the store; the first column must be a line number.
    pub fn query_raw(
        &self,
        sql: &str,
    ) -> Result<Vec<u64>, QueryError>
    {
        Ok(self
            .store
            .query_raw(sql)?)
    }

    /// Call `f` for each resolvable line in `lines`, in order. Returns how many
    /// lines were delivered.
    pub fn for_each_line<F>(
        &mut self,
        lines: &[u64],
        mut f: F,
    ) -> Result<usize, QueryError>
    where
        F: FnMut(u64, &[u8]),
    {
        let mut delivered = 0;
        for &n in lines
        {
            if let Some(line) = self.get_line(n)?
            {
                f(n, &line);
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Resolve several line numbers at once, skipping those that do not exist.
    pub fn lines(
        &mut self,
        lines: &[u64],
    ) -> Result<Vec<(u64, Vec<u8>)>, QueryError>
    {
        let mut out = Vec::with_capacity(lines.len());
        self.for_each_line(lines, |n, line| out.push((n, line.to_vec())))?;
        Ok(out)
    }

    pub fn index_names(&self) -> Vec<String>
    {
        self.indexes
            .iter()
            .map(|i| i.name.clone())
            .collect()
    }

    pub fn index_infos(&self) -> &[IndexInfo]
    {
        &self.indexes
    }

    /// Number of rows in index `name`.
    pub fn index_size(
        &self,
        name: &str,
    ) -> Result<u64, QueryError>
    {
        let info = self.index_info(name)?;
        Ok(self
            .store
            .index_size(&info.name)?)
    }

    pub fn num_lines(&self) -> u64
    {
        self.num_lines
    }

    pub fn uncompressed_size(&self) -> u64
    {
        self.uncompressed_size
    }

    pub fn access_points(&self) -> &[AccessPoint]
    {
        &self.points
    }

    pub fn metadata(&self) -> &BTreeMap<String, String>
    {
        &self.metadata
    }

    pub fn compressed_path(&self) -> &Path
    {
        &self.compressed
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    fn index_info(
        &self,
        name: &str,
    ) -> Result<&IndexInfo, QueryError>
    {
        self.indexes
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| QueryError::UnknownIndex(name.to_string()))
    }

    /// Index of the access point whose span holds `offset`.
    fn span_of(
        &self,
        offset: u64,
    ) -> usize
    {
        self.points
            .partition_point(|p| p.uncompressed_offset <= offset)
            .saturating_sub(1)
    }

    fn read_record(
        &mut self,
        record: &LineRecord,
    ) -> Result<Vec<u8>, QueryError>
    {
        let span = self.span_of(record.offset);
        debug_assert!(self.points[span].covers(record.offset));
        let mut stream = self.stream_at(span, record.offset)?;
        stream.skip(record.offset - stream.position())?;

        let mut line = Vec::with_capacity(record.length as usize);
        stream.read_into(record.length as usize, &mut line)?;
        if line.last() == Some(&b'\n')
        {
            line.pop();
        }
        self.cache = Some(Cached { span, stream });
        Ok(line)
    }

    /// Recover an unrecorded line by counting lines forward from the nearest
    /// known position before it.
    fn scan_to_line(
        &mut self,
        n: u64,
    ) -> Result<Option<Vec<u8>>, QueryError>
    {
        // The line at a mid-line checkpoint is partial, so the first whole
        // line after it is `line_num + 2`.
        let idx = self
            .points
            .iter()
            .rposition(|p| p.uncompressed_offset == 0 || p.line_num + 2 <= n)
            .unwrap_or(0);
        let point = self.points[idx].clone();

        let (start, mut line_no, from_point) = match self
            .store
            .line_before(n)?
        {
            Some(r) if r.offset + r.length > point.uncompressed_offset =>
            {
                (r.offset + r.length, r.line + 1, false)
            }
            _ => (point.uncompressed_offset, point.line_num + 1, point.uncompressed_offset != 0),
        };
        if start >= self.uncompressed_size
        {
            return Ok(None);
        }

        let span = self.span_of(start);
        let mut stream = self.stream_at(span, start)?;
        stream.skip(start - stream.position())?;

        let mut buf = Vec::new();
        if from_point
        {
            let window = decompress_window(
                &self
                    .store
                    .window(point.uncompressed_offset)?,
            )?;
            if window.last() != Some(&b'\n')
            {
                stream.read_line(&mut buf)?;
                line_no += 1;
            }
        }
        debug!(target_line = n, from_line = line_no, offset = stream.position(), "scanning for line");

        loop
        {
            buf.clear();
            if !stream.read_line(&mut buf)?
            {
                return Ok(None);
            }
            if line_no == n
            {
                if buf.last() == Some(&b'\n')
                {
                    buf.pop();
                }
                self.cache = Some(Cached { span, stream });
                return Ok(Some(buf));
            }
            line_no += 1;
        }
    }

    /// A decompressor positioned at or before `target` within span `span`.
    fn stream_at(
        &mut self,
        span: usize,
        target: u64,
    ) -> Result<InflateStream<File>, QueryError>
    {
        if let Some(cached) = self
            .cache
            .take()
        {
            if cached.span == span
                && cached
                    .stream
                    .position()
                    <= target
            {
                return Ok(cached.stream);
            }
            self.idle = Some(
                cached
                    .stream
                    .into_inner(),
            );
        }

        let file = match self
            .idle
            .take()
        {
            Some(file) => file,
            None => File::open(&self.compressed)
                .map_err(|source| QueryError::Io { path: self.compressed.clone(), source })?,
        };
        let point = &self.points[span];
        let window = decompress_window(
            &self
                .store
                .window(point.uncompressed_offset)?,
        )?;
        debug!(
            uncompressed = point.uncompressed_offset,
            compressed = point.compressed_offset,
            bits = point.bit_offset,
            "resuming at access point"
        );
        Ok(InflateStream::resume(file, point.resume_point(), &window, self.framing)?)
    }
}

fn not_an_index(
    path: &Path,
    reason: String,
) -> QueryError
{
    QueryError::NotAnIndex { path: path.to_path_buf(), reason }
}

fn required_number(
    path: &Path,
    metadata: &BTreeMap<String, String>,
    key: &str,
) -> Result<u64, QueryError>
{
    metadata
        .get(key)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| not_an_index(path, format!("missing or malformed '{key}'")))
}

fn check_identity(
    compressed: &Path,
    metadata: &BTreeMap<String, String>,
    identity: &FileIdentity,
    force: bool,
) -> Result<(), QueryError>
{
    let checks = [
        ("compressedSize", "size", identity.size.to_string()),
        ("compressedModTime", "modification time", identity.mod_time.to_string()),
    ];
    for (key, field, actual) in checks
    {
        let expected = metadata
            .get(key)
            .cloned()
            .unwrap_or_default();
        if expected == actual
        {
            continue;
        }
        if !force
        {
            return Err(QueryError::Stale {
                path: compressed.to_path_buf(),
                field,
                expected,
                actual,
            });
        }
        warn!(
            file = %compressed.display(),
            field,
            expected = %expected,
            actual = %actual,
            "index is stale, loading anyway"
        );
    }
    Ok(())
}
