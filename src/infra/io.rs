use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Size and modification time of a compressed source, as recorded in an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity
{
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub mod_time: u64,
}

impl FileIdentity
{
    pub fn of(file: &File) -> std::io::Result<Self>
    {
        let meta = file.metadata()?;
        let mod_time = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Ok(Self { size: meta.len(), mod_time })
    }
}

/// Canonical absolute form of `path`, without `\\?\` prefixes on Windows.
/// Falls back to the path as given when it cannot be resolved.
pub fn canonical(path: &Path) -> PathBuf
{
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Default index location: the compressed file name with `.zindex` appended.
pub fn default_index_path(compressed: &Path) -> PathBuf
{
    let mut name = compressed
        .as_os_str()
        .to_os_string();
    name.push(".zindex");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn index_path_appends_suffix()
    {
        assert_eq!(
            default_index_path(Path::new("logs/app.log.gz")),
            PathBuf::from("logs/app.log.gz.zindex")
        );
    }

    #[test]
    fn identity_reports_size()
    {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut tmp, b"12345").unwrap();
        let id = FileIdentity::of(tmp.as_file()).unwrap();
        assert_eq!(id.size, 5);
        assert!(id.mod_time > 0);
    }
}
