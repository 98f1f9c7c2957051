//! SQLite persistence for access points, line offsets, key indexes and metadata.
//!
//! Table layout
//! - `AccessPoints`: one row per checkpoint, window stored compressed.
//! - `LineOffsets`: one row per kept line.
//! - `Indexes`: name, creation string and numeric flag of every key index.
//! - `index_<name>`: `(key, line, offset)` rows for one key index.
//! - `Metadata`: string key/value pairs describing the source file.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, OpenFlags, OptionalExtension, ToSql, params};

use crate::core::checkpoint::AccessPoint;
use crate::core::line_finder::LineRecord;

const SCHEMA: &str = r#"
CREATE TABLE AccessPoints(
    uncompressedOffset INTEGER PRIMARY KEY,
    uncompressedEndOffset INTEGER,
    compressedOffset INTEGER,
    bitOffset INTEGER,
    window BLOB,
    lineNum INTEGER
);
CREATE TABLE LineOffsets(
    line INTEGER PRIMARY KEY,
    offset INTEGER,
    length INTEGER
);
CREATE TABLE Indexes(
    name TEXT PRIMARY KEY,
    creationString TEXT,
    isNumeric INTEGER
);
CREATE TABLE Metadata(
    key TEXT PRIMARY KEY,
    value TEXT
);
"#;

/// A key as bound into an `index_<name>` table.
#[derive(Debug, Clone, Copy)]
pub enum KeyValue<'a>
{
    Numeric(i64),
    Text(&'a [u8]),
}

impl ToSql for KeyValue<'_>
{
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>>
    {
        Ok(match *self
        {
            KeyValue::Numeric(v) => ToSqlOutput::from(v),
            KeyValue::Text(bytes) => ToSqlOutput::Borrowed(ValueRef::Text(bytes)),
        })
    }
}

/// One row of the `Indexes` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo
{
    pub name: String,
    pub creation: String,
    pub numeric: bool,
}

pub struct Store
{
    conn: Connection,
}

impl Store
{
    /// Create a fresh store at `path` with the fixed tables in place.
    pub fn create(path: &Path) -> rusqlite::Result<Self>
    {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA synchronous = OFF;
             PRAGMA journal_mode = MEMORY;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Open an existing store for querying.
    pub fn open(path: &Path) -> rusqlite::Result<Self>
    {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    pub fn begin(&self) -> rusqlite::Result<()>
    {
        self.conn
            .execute_batch("BEGIN")
    }

    pub fn commit(&self) -> rusqlite::Result<()>
    {
        self.conn
            .execute_batch("COMMIT")
    }

    // ---- build side ----

    /// Register a key index and create its table.
    ///
    /// A unique index on `key` is created up front so a duplicate fails on
    /// the offending insert; `name` must already be validated.
    pub fn create_key_index(
        &self,
        name: &str,
        creation: &str,
        numeric: bool,
        unique: bool,
    ) -> rusqlite::Result<()>
    {
        self.conn
            .execute(
                "INSERT INTO Indexes(name, creationString, isNumeric) VALUES(?1, ?2, ?3)",
                params![name, creation, numeric],
            )?;
        let key_type = if numeric { "INTEGER" } else { "TEXT" };
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE index_{name}(key {key_type}, line INTEGER, offset INTEGER);"
            ))?;
        if unique
        {
            self.conn
                .execute_batch(&format!(
                    "CREATE UNIQUE INDEX index_{name}_key_idx ON index_{name}(key);"
                ))?;
        }
        Ok(())
    }

    /// Secondary indexes that are cheaper to build once the rows are loaded.
    pub fn finish_key_index(
        &self,
        name: &str,
        unique: bool,
        index_line: bool,
    ) -> rusqlite::Result<()>
    {
        if !unique
        {
            self.conn
                .execute_batch(&format!("CREATE INDEX index_{name}_key_idx ON index_{name}(key);"))?;
        }
        if index_line
        {
            self.conn
                .execute_batch(&format!(
                    "CREATE INDEX index_{name}_line_idx ON index_{name}(line);"
                ))?;
        }
        Ok(())
    }

    pub fn insert_key(
        &self,
        name: &str,
        key: KeyValue<'_>,
        line: u64,
        offset: usize,
    ) -> rusqlite::Result<()>
    {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("INSERT INTO index_{name}(key, line, offset) VALUES(?1, ?2, ?3)"))?;
        stmt.execute(params![key, line as i64, offset as i64])?;
        Ok(())
    }

    pub fn insert_line(
        &self,
        record: &LineRecord,
    ) -> rusqlite::Result<()>
    {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO LineOffsets(line, offset, length) VALUES(?1, ?2, ?3)")?;
        stmt.execute(params![record.line as i64, record.offset as i64, record.length as i64])?;
        Ok(())
    }

    pub fn insert_access_point(
        &self,
        point: &AccessPoint,
    ) -> rusqlite::Result<()>
    {
        let mut stmt = self
            .conn
            .prepare_cached(
                "INSERT INTO AccessPoints(uncompressedOffset, uncompressedEndOffset, \
                 compressedOffset, bitOffset, window, lineNum) VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
        stmt.execute(params![
            point.uncompressed_offset as i64,
            point.uncompressed_end_offset as i64,
            point.compressed_offset as i64,
            point.bit_offset,
            point.window,
            point.line_num as i64,
        ])?;
        Ok(())
    }

    pub fn set_metadata(
        &self,
        key: &str,
        value: &str,
    ) -> rusqlite::Result<()>
    {
        self.conn
            .execute("INSERT INTO Metadata(key, value) VALUES(?1, ?2)", params![key, value])?;
        Ok(())
    }

    // ---- query side ----

    pub fn metadata(&self) -> rusqlite::Result<BTreeMap<String, String>>
    {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM Metadata")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        rows.collect()
    }

    /// All access points in offset order. Windows are only read when asked for.
    pub fn access_points(
        &self,
        with_windows: bool,
    ) -> rusqlite::Result<Vec<AccessPoint>>
    {
        let sql = if with_windows
        {
            "SELECT uncompressedOffset, uncompressedEndOffset, compressedOffset, bitOffset, \
             lineNum, window FROM AccessPoints ORDER BY uncompressedOffset"
        }
        else
        {
            "SELECT uncompressedOffset, uncompressedEndOffset, compressedOffset, bitOffset, \
             lineNum, NULL FROM AccessPoints ORDER BY uncompressedOffset"
        };
        let mut stmt = self
            .conn
            .prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(AccessPoint {
                uncompressed_offset: row.get::<_, i64>(0)? as u64,
                uncompressed_end_offset: row.get::<_, i64>(1)? as u64,
                compressed_offset: row.get::<_, i64>(2)? as u64,
                bit_offset: row.get(3)?,
                line_num: row.get::<_, i64>(4)? as u64,
                window: row
                    .get::<_, Option<Vec<u8>>>(5)?
                    .unwrap_or_default(),
            })
        })?;
        rows.collect()
    }

    /// Compressed window of the access point starting at `offset`.
    pub fn window(
        &self,
        uncompressed_offset: u64,
    ) -> rusqlite::Result<Vec<u8>>
    {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT window FROM AccessPoints WHERE uncompressedOffset = ?1")?;
        stmt.query_row([uncompressed_offset as i64], |row| row.get(0))
    }

    pub fn line(
        &self,
        line: u64,
    ) -> rusqlite::Result<Option<LineRecord>>
    {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT line, offset, length FROM LineOffsets WHERE line = ?1")?;
        stmt.query_row([line as i64], line_record)
            .optional()
    }

    /// The closest recorded line strictly before `line`.
    pub fn line_before(
        &self,
        line: u64,
    ) -> rusqlite::Result<Option<LineRecord>>
    {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT line, offset, length FROM LineOffsets WHERE line < ?1 \
                 ORDER BY line DESC LIMIT 1",
            )?;
        stmt.query_row([line as i64], line_record)
            .optional()
    }

    pub fn indexes(&self) -> rusqlite::Result<Vec<IndexInfo>>
    {
        let mut stmt = self
            .conn
            .prepare("SELECT name, creationString, isNumeric FROM Indexes ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(IndexInfo {
                name: row.get(0)?,
                creation: row.get(1)?,
                numeric: row.get(2)?,
            })
        })?;
        rows.collect()
    }

    /// Ascending, distinct line numbers having `key` in index `name`.
    pub fn lines_for_key(
        &self,
        name: &str,
        key: KeyValue<'_>,
    ) -> rusqlite::Result<Vec<u64>>
    {
        let mut stmt = self
            .conn
            .prepare_cached(&format!(
                "SELECT DISTINCT line FROM index_{name} WHERE key = ?1 ORDER BY line"
            ))?;
        let rows = stmt.query_map([key], |row| row.get::<_, i64>(0))?;
        rows.map(|r| r.map(|line| line as u64))
            .collect()
    }

    pub fn index_size(
        &self,
        name: &str,
    ) -> rusqlite::Result<u64>
    {
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM index_{name}"), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
    }

    /// Run arbitrary SQL; the first column of each row is read as a line number.
    pub fn query_raw(
        &self,
        sql: &str,
    ) -> rusqlite::Result<Vec<u64>>
    {
        let mut stmt = self
            .conn
            .prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        rows.map(|r| r.map(|line| line as u64))
            .collect()
    }
}

fn line_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<LineRecord>
{
    Ok(LineRecord {
        line: row.get::<_, i64>(0)? as u64,
        offset: row.get::<_, i64>(1)? as u64,
        length: row.get::<_, i64>(2)? as u64,
    })
}

/// Whether an error is a UNIQUE constraint violation.
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool
{
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn scratch() -> (tempfile::TempDir, Store)
    {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::create(&dir.path().join("t.zindex")).unwrap();
        (dir, store)
    }

    #[test]
    fn lines_and_neighbours()
    {
        let (_dir, store) = scratch();
        for (line, offset) in [(1u64, 0u64), (4, 30), (9, 80)]
        {
            store
                .insert_line(&LineRecord { line, offset, length: 10 })
                .unwrap();
        }
        assert_eq!(store.line(4).unwrap().map(|r| r.offset), Some(30));
        assert_eq!(store.line(5).unwrap(), None);
        assert_eq!(store.line_before(9).unwrap().map(|r| r.line), Some(4));
        assert_eq!(store.line_before(1).unwrap(), None);
    }

    #[test]
    fn unique_index_rejects_duplicates()
    {
        let (_dir, store) = scratch();
        store
            .create_key_index("ids", "^(\\d+)", true, true)
            .unwrap();
        store
            .insert_key("ids", KeyValue::Numeric(7), 1, 0)
            .unwrap();
        let err = store
            .insert_key("ids", KeyValue::Numeric(7), 2, 0)
            .unwrap_err();
        assert!(is_constraint_violation(&err));
        assert_eq!(store.index_size("ids").unwrap(), 1);
    }

    #[test]
    fn text_keys_and_distinct_lines()
    {
        let (_dir, store) = scratch();
        store
            .create_key_index("words", "\\w+", false, false)
            .unwrap();
        for (key, line) in [("b", 3u64), ("a", 1), ("b", 2), ("b", 3)]
        {
            store
                .insert_key("words", KeyValue::Text(key.as_bytes()), line, 0)
                .unwrap();
        }
        store
            .finish_key_index("words", false, true)
            .unwrap();

        let lines = store
            .lines_for_key("words", KeyValue::Text(b"b"))
            .unwrap();
        assert_eq!(lines, vec![2, 3]);
        assert_eq!(store.index_size("words").unwrap(), 4);
        assert_eq!(
            store.indexes().unwrap(),
            vec![IndexInfo { name: "words".into(), creation: "\\w+".into(), numeric: false }]
        );
    }

    #[test]
    fn access_points_round_trip_without_windows()
    {
        let (_dir, store) = scratch();
        let point = AccessPoint {
            uncompressed_offset: 0,
            uncompressed_end_offset: 99,
            compressed_offset: 10,
            bit_offset: 3,
            window: vec![1, 2, 3],
            line_num: 0,
        };
        store
            .insert_access_point(&point)
            .unwrap();

        let full = store
            .access_points(true)
            .unwrap();
        assert_eq!(full, vec![point.clone()]);
        let bare = store
            .access_points(false)
            .unwrap();
        assert!(bare[0].window.is_empty());
        assert_eq!(store.window(0).unwrap(), vec![1, 2, 3]);
    }
}
