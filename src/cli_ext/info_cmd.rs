//! `zindex info`: describe an index.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tabled::{Table, Tabled};

use crate::cli::{AppContext, InfoArgs};
use crate::core::index::Index;
use crate::infra::io::default_index_path;
use crate::infra::utils::{PathUtils, SizeUtils};

#[derive(Tabled)]
struct MetadataRow
{
    key: String,
    value: String,
}

#[derive(Tabled)]
struct IndexRow
{
    name: String,
    numeric: bool,
    keys: u64,
    creation: String,
}

#[derive(Tabled)]
struct AccessPointRow
{
    uncompressed: u64,
    end: u64,
    compressed: u64,
    bits: u8,
    line: u64,
}

pub fn run(
    args: InfoArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let input = PathUtils::expand(&args.file);
    let index_path = args
        .index
        .as_deref()
        .map(PathUtils::expand)
        .unwrap_or_else(|| default_index_path(&input));
    let index = Index::load(&input, &index_path, args.force)
        .with_context(|| format!("Failed to load index {}", index_path.display()))?;

    let title = format!(
        "Index {} for {}",
        index
            .path()
            .display(),
        index
            .compressed_path()
            .display()
    );
    if ctx.no_color
    {
        println!("{title}");
    }
    else
    {
        println!("{}", title.bold());
    }
    println!(
        "{} lines, {} uncompressed, {} access points",
        index.num_lines(),
        SizeUtils::pretty_bytes(index.uncompressed_size()),
        index
            .access_points()
            .len()
    );

    let metadata: Vec<MetadataRow> = index
        .metadata()
        .iter()
        .map(|(key, value)| MetadataRow { key: key.clone(), value: value.clone() })
        .collect();
    println!("{}", Table::new(metadata));

    let mut rows = Vec::new();
    for info in index.index_infos()
    {
        rows.push(IndexRow {
            name: info
                .name
                .clone(),
            numeric: info.numeric,
            keys: index.index_size(&info.name)?,
            creation: info
                .creation
                .clone(),
        });
    }
    if rows.is_empty()
    {
        println!("No key indexes");
    }
    else
    {
        println!("{}", Table::new(rows));
    }

    if args.access_points
    {
        let points: Vec<AccessPointRow> = index
            .access_points()
            .iter()
            .map(|p| AccessPointRow {
                uncompressed: p.uncompressed_offset,
                end: p.uncompressed_end_offset,
                compressed: p.compressed_offset,
                bits: p.bit_offset,
                line: p.line_num,
            })
            .collect();
        println!("{}", Table::new(points));
    }
    Ok(())
}
