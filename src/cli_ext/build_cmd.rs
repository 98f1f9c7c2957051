//! `zindex build`: index a compressed file.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use crate::cli::{AppContext, BuildArgs};
use crate::core::builder::IndexBuilder;
use crate::infra::config::load_config;
use crate::infra::index_file::{IndexFile, IndexSpec, TokenizerSpec};
use crate::infra::io::default_index_path;
use crate::infra::utils::{PathUtils, SizeUtils};

pub fn run(
    args: BuildArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config = load_config()?;
    let input = PathUtils::expand(&args.file);
    let output = args
        .output
        .as_deref()
        .map(PathUtils::expand)
        .unwrap_or_else(|| default_index_path(&input));

    let specs = index_specs(&args)?;
    let sparse = args.sparse
        || config
            .build
            .sparse
        || specs
            .iter()
            .any(|s| s.sparse);
    let index_lines = args.index_lines
        || config
            .build
            .index_lines;

    let mut builder = IndexBuilder::new(&input, &output)
        .index_every(
            args.index_every
                .unwrap_or(config.build.index_every),
        )
        .sparse(sparse)
        .sparse_line_offsets(args.sparse_line_offsets || config.build.sparse_line_offsets);

    for spec in &specs
    {
        let (def, tokenizer) = spec.instantiate()?;
        let def = if index_lines { def.index_line(true) } else { def };
        builder = builder.add_index(def, tokenizer);
    }

    // No bar when quiet, or when debug logs would draw over it
    let progress = if ctx.quiet || ctx.verbose
    {
        ProgressBar::hidden()
    }
    else
    {
        let size = std::fs::metadata(&input).map_or(0, |m| m.len());
        let pb = ProgressBar::new(size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                )
                .context("progress bar template")?
                .progress_chars("#>-"),
        );
        pb
    };
    let ticker = progress.clone();
    builder = builder.on_progress(move |done, _total| ticker.set_position(done));

    let result = builder.build();
    progress.finish_and_clear();
    let report = result.with_context(|| format!("Failed to index {}", input.display()))?;

    if !ctx.quiet
    {
        let mark = if ctx.no_color { "✓".to_string() } else { "✓".green().to_string() };
        println!(
            "{} Indexed {} lines of {} ({} compressed) into {} in {:.2?}",
            mark,
            report.num_lines,
            SizeUtils::pretty_bytes(report.uncompressed_size),
            SizeUtils::pretty_bytes(report.compressed_size),
            report
                .index_path
                .display(),
            report.elapsed
        );
        println!("  {} access points", report.access_points);
        for (name, keys) in &report.keys
        {
            println!("  index '{name}': {keys} keys");
        }
    }
    Ok(())
}

/// Indexes declared by a JSON file, by the tokenizer flags, or none at all.
fn index_specs(args: &BuildArgs) -> Result<Vec<IndexSpec>>
{
    if let Some(path) = &args.config
    {
        return Ok(IndexFile::load(&PathUtils::expand(path))?.indexes);
    }

    let kind = if let Some(regex) = &args.regex
    {
        TokenizerSpec::Regex {
            regex: regex.clone(),
            capture: args.capture,
            template: args
                .template
                .clone(),
        }
    }
    else if let Some(field_num) = args.field
    {
        TokenizerSpec::Field {
            delimiter: args
                .delimiter
                .clone(),
            field_num,
        }
    }
    else if let Some(command) = &args.pipe
    {
        TokenizerSpec::Pipe {
            command: command.clone(),
            delimiter: args
                .delimiter
                .clone(),
        }
    }
    else
    {
        return Ok(Vec::new());
    };

    Ok(vec![IndexSpec {
        name: args
            .name
            .clone(),
        numeric: args.numeric,
        unique: args.unique,
        sparse: false,
        index_lines: args.index_lines,
        kind,
    }])
}
