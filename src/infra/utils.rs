//! Utility helpers organized by small, focused structs.
//! All functions are associated fns to keep call sites
//! ergonomic, testable, and discoverable.

use std::path::PathBuf;

/// Human-readable byte counts
pub struct SizeUtils;

impl SizeUtils
{
    /// "1 byte", "N bytes", then two decimals of KiB, MiB or GiB
    pub fn pretty_bytes(bytes: u64) -> String
    {
        const KIB: f64 = 1024.0;
        const MIB: f64 = KIB * 1024.0;
        const GIB: f64 = MIB * 1024.0;

        let b = bytes as f64;
        match bytes
        {
            1 => "1 byte".to_string(),
            n if b < KIB => format!("{n} bytes"),
            _ if b < MIB => format!("{:.2} KiB", b / KIB),
            _ if b < GIB => format!("{:.2} MiB", b / MIB),
            _ => format!("{:.2} GiB", b / GIB),
        }
    }
}

/// User-supplied path helpers
pub struct PathUtils;

impl PathUtils
{
    /// Expand `~` and `$VARS`; leaves the input untouched when expansion fails
    pub fn expand(raw: &str) -> PathBuf
    {
        match shellexpand::full(raw)
        {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(_) => PathBuf::from(raw),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn pretty_bytes_units()
    {
        assert_eq!(SizeUtils::pretty_bytes(0), "0 bytes");
        assert_eq!(SizeUtils::pretty_bytes(1), "1 byte");
        assert_eq!(SizeUtils::pretty_bytes(1023), "1023 bytes");
        assert_eq!(SizeUtils::pretty_bytes(1024), "1.00 KiB");
        assert_eq!(SizeUtils::pretty_bytes(1536), "1.50 KiB");
        assert_eq!(SizeUtils::pretty_bytes(5 * 1024 * 1024), "5.00 MiB");
        assert_eq!(SizeUtils::pretty_bytes(3 * 1024 * 1024 * 1024), "3.00 GiB");
    }

    #[test]
    fn expand_leaves_plain_paths()
    {
        assert_eq!(PathUtils::expand("logs/app.gz"), PathBuf::from("logs/app.gz"));
    }
}
