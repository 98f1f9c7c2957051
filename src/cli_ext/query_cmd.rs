//! `zindex query`: print lines by key, line number or SQL.

use std::collections::BTreeSet;
use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use tracing::debug;

use crate::cli::{AppContext, QueryArgs};
use crate::core::index::Index;
use crate::core::range::{RangeEvent, RangeFetcher};
use crate::infra::config::load_config;
use crate::infra::io::default_index_path;
use crate::infra::utils::PathUtils;

pub fn run(
    args: QueryArgs,
    _ctx: &AppContext,
) -> Result<()>
{
    let config = load_config()?;
    let input = PathUtils::expand(&args.file);
    let index_path = args
        .index
        .as_deref()
        .map(PathUtils::expand)
        .unwrap_or_else(|| default_index_path(&input));

    let mut index = Index::load(&input, &index_path, args.force)
        .with_context(|| format!("Failed to load index {}", index_path.display()))?;

    let matches = if args.raw
    {
        index.query_raw(&args.queries.join(" "))?
    }
    else if args.line_mode
    {
        args.queries
            .iter()
            .map(|q| {
                q.parse::<u64>()
                    .with_context(|| format!("Invalid line number: {q}"))
            })
            .collect::<Result<Vec<_>>>()?
    }
    else
    {
        index.query_index_multi(&args.index_name, &args.queries)?
    };
    debug!(matches = matches.len(), "query resolved");

    let before = args
        .before
        .or(args.context)
        .unwrap_or(config.query.before);
    let after = args
        .after
        .or(args.context)
        .unwrap_or(config.query.after);
    let numbered = args.line_numbers || config.query.line_numbers;
    let separators = before + after > 0;
    let matched: BTreeSet<u64> = matches
        .iter()
        .copied()
        .collect();

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut fetcher = RangeFetcher::new(before, after);
    let mut events = Vec::new();

    for &line in &matches
    {
        events.clear();
        fetcher.fetch(line, |e| events.push(e));

        for event in &events
        {
            match *event
            {
                RangeEvent::Separator if separators => writeln!(out, "--")?,
                RangeEvent::Separator => {}
                RangeEvent::Line(n) =>
                {
                    // Context may run past the end of the file.
                    let Some(text) = index.get_line(n)?
                    else
                    {
                        break;
                    };
                    if numbered
                    {
                        let mark = if matched.contains(&n) { ':' } else { '-' };
                        write!(out, "{n}{mark}")?;
                    }
                    out.write_all(&text)?;
                    out.write_all(b"\n")?;
                }
            }
        }
    }

    out.flush()?;
    Ok(())
}
