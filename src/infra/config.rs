use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::checkpoint::DEFAULT_INDEX_EVERY;

/// Config file names, first match wins
const CONFIG_FILES: [&str; 2] = ["zindex.toml", ".zindex.toml"];

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Default build settings
    pub build: BuildConfig,

    /// Default query settings
    pub query: QueryConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig
{
    /// Uncompressed bytes between access points
    pub index_every: u64,

    /// Record offsets only for lines that produced keys
    pub sparse: bool,

    /// Let queries recover unrecorded lines by scanning
    pub sparse_line_offsets: bool,

    /// Also index the line column of every key index
    pub index_lines: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig
{
    /// Lines of context before each match
    pub before: u64,

    /// Lines of context after each match
    pub after: u64,

    /// Prefix output lines with their line number
    pub line_numbers: bool,
}

impl Default for BuildConfig
{
    fn default() -> Self
    {
        Self {
            index_every: DEFAULT_INDEX_EVERY,
            sparse: false,
            sparse_line_offsets: false,
            index_lines: false,
        }
    }
}

pub fn load_config() -> Result<Config>
{
    load_config_from(Path::new("."))
}

/// Layer the first config file found in `dir` and `ZINDEX__*` variables over defaults
pub fn load_config_from(dir: &Path) -> Result<Config>
{
    let mut builder = config::Config::builder();

    for name in CONFIG_FILES
    {
        let path = dir.join(name);
        if path.exists()
        {
            builder = builder.add_source(config::File::from(path));
            break;
        }
    }

    // Double underscore so that snake_case keys survive, e.g. ZINDEX_BUILD__INDEX_EVERY
    builder = builder.add_source(
        config::Environment::with_prefix("ZINDEX")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join(CONFIG_FILES[0]);

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
