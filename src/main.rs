use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use zindex::cli::{AppContext, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise --verbose picks the default level
    let default_level = if cli.verbose { "zindex=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(!cli.no_color)
        .init();

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Build(args) => zindex::cli_ext::build_cmd::run(args, &ctx),
        Commands::Query(args) => zindex::cli_ext::query_cmd::run(args, &ctx),
        Commands::Info(args) => zindex::cli_ext::info_cmd::run(args, &ctx),
        Commands::Init(args) => zindex::infra::config::init(args, &ctx),
        Commands::Completions(args) => zindex::completion::run(args, &ctx),
    }
}
