use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub verbose: bool,  // global --verbose
}

#[derive(Parser)]
#[command(name = "zindex")]
#[command(about = "Index gzip-compressed text files for random access and value lookups")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress bars and non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log debug details to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build an index for a compressed file
    Build(BuildArgs),

    /// Look up lines by key, line number or SQL
    Query(QueryArgs),

    /// Show what an index contains
    Info(InfoArgs),

    /// Initialize a zindex.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("tokenizer").args(["regex", "field", "pipe"])))]
pub struct BuildArgs {
    /// Compressed input file (gzip or zlib)
    pub file: String,

    /// Index file to write (default: <file>.zindex)
    #[arg(short, long)]
    pub output: Option<String>,

    /// JSON file declaring the indexes to build
    #[arg(short, long, conflicts_with = "tokenizer")]
    pub config: Option<String>,

    /// Index every match of this regular expression
    #[arg(short, long)]
    pub regex: Option<String>,

    /// Capture group of --regex to index
    #[arg(long, requires = "regex", conflicts_with = "template")]
    pub capture: Option<usize>,

    /// Key template for --regex, e.g. "{2}-{1}"
    #[arg(long, requires = "regex")]
    pub template: Option<String>,

    /// Index the N-th (1-based) delimited field
    #[arg(short, long, value_name = "N")]
    pub field: Option<usize>,

    /// Pipe each line through this command and index its output
    #[arg(short, long, value_name = "COMMAND")]
    pub pipe: Option<String>,

    /// Delimiter for --field and --pipe
    #[arg(short, long, default_value = " ")]
    pub delimiter: String,

    /// Name of the index built from the flags above
    #[arg(short, long, default_value = "default")]
    pub name: String,

    /// Keys are integers
    #[arg(long)]
    pub numeric: bool,

    /// Keys must be unique; duplicates abort the build
    #[arg(short, long)]
    pub unique: bool,

    /// Also index the line column
    #[arg(long)]
    pub index_lines: bool,

    /// Record offsets only for lines that produced keys
    #[arg(long)]
    pub sparse: bool,

    /// Sparse, but let queries recover other lines by scanning
    #[arg(long)]
    pub sparse_line_offsets: bool,

    /// Uncompressed bytes between access points (default from config)
    #[arg(long, value_name = "BYTES")]
    pub index_every: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct QueryArgs {
    /// Compressed file that was indexed
    pub file: String,

    /// Keys to look up (line numbers with --line-mode, SQL with --raw)
    #[arg(value_name = "QUERY", required = true)]
    pub queries: Vec<String>,

    /// Index file to read (default: <file>.zindex)
    #[arg(long)]
    pub index: Option<String>,

    /// Name of the key index to search
    #[arg(short = 'i', long, default_value = "default")]
    pub index_name: String,

    /// Treat queries as line numbers
    #[arg(short = 'L', long, conflicts_with = "raw")]
    pub line_mode: bool,

    /// Treat the query as SQL returning line numbers
    #[arg(long)]
    pub raw: bool,

    /// Lines of context after each match
    #[arg(short = 'A', long, value_name = "N")]
    pub after: Option<u64>,

    /// Lines of context before each match
    #[arg(short = 'B', long, value_name = "N")]
    pub before: Option<u64>,

    /// Lines of context around each match
    #[arg(short = 'C', long, value_name = "N")]
    pub context: Option<u64>,

    /// Prefix lines with their line number
    #[arg(short = 'n', long)]
    pub line_numbers: bool,

    /// Load the index even if the file changed since it was built
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Compressed file that was indexed
    pub file: String,

    /// Index file to read (default: <file>.zindex)
    #[arg(long)]
    pub index: Option<String>,

    /// List every access point
    #[arg(long)]
    pub access_points: bool,

    /// Load the index even if the file changed since it was built
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn query_flags() {
        let cli = Cli::try_parse_from([
            "zindex", "query", "app.log.gz", "-i", "ids", "-C", "2", "-n", "42", "43",
        ])
        .unwrap();
        let Commands::Query(args) = cli.command else {
            panic!("expected query");
        };
        assert_eq!(args.index_name, "ids");
        assert_eq!(args.context, Some(2));
        assert!(args.line_numbers);
        assert_eq!(args.queries, vec!["42", "43"]);
    }

    #[test]
    fn build_tokenizers_are_exclusive() {
        let both = Cli::try_parse_from(["zindex", "build", "f.gz", "--regex", "x", "--field", "2"]);
        assert!(both.is_err());
        let with_config = Cli::try_parse_from(["zindex", "build", "f.gz", "-c", "i.json", "-r", "x"]);
        assert!(with_config.is_err());
    }
}
