use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use pakflow::config::Settings;
use pakflow::TaskKind;

mod cli;

use cli::run::CliOptions;

#[derive(Parser)]
#[command(name = "pakflow")]
#[command(about = "Streaming task execution engine for package-manager front ends")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.pakflow/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ExecArgs {
    /// Package ids, executed in order
    #[arg(required = true)]
    ids: Vec<String>,

    /// Suppress installer UI where supported
    #[arg(long)]
    silent: bool,

    /// Hand control to the installer's own UI
    #[arg(long)]
    interactive: bool,

    /// Force the operation past backend safety checks
    #[arg(long)]
    force: bool,

    /// Skip installer hash verification
    #[arg(long)]
    ignore_hash: bool,

    /// Proxy URL passed to the backend
    #[arg(long)]
    proxy: Option<String>,

    /// Extra flags appended verbatim (whitespace-separated)
    #[arg(long)]
    flags: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install packages by id
    Install(ExecArgs),

    /// Uninstall packages by id
    Uninstall {
        #[command(flatten)]
        args: ExecArgs,

        /// Remove residual data
        #[arg(long)]
        purge: bool,
    },

    /// Upgrade packages by id
    Upgrade {
        #[command(flatten)]
        args: ExecArgs,

        /// Include packages with unknown installed versions
        #[arg(long)]
        include_unknown: bool,
    },

    /// Download package installers by id
    Download {
        #[command(flatten)]
        args: ExecArgs,

        /// Directory to download into
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Initialize a new ~/.pakflow/config.toml configuration file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn cli_options(args: &ExecArgs) -> CliOptions {
    CliOptions {
        silent: args.silent,
        interactive: args.interactive,
        force: args.force,
        ignore_hash: args.ignore_hash,
        proxy: args.proxy.clone(),
        extra_flags: args.flags.clone(),
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    // Init runs before settings loading: its target file may not exist yet
    if let Commands::Init { force } = cli.command {
        return cli::init::init_command(cli.config, force).await;
    }

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };

    match cli.command {
        Commands::Install(args) => {
            let options = cli_options(&args);
            cli::run::run_command(TaskKind::Install, args.ids, options, settings).await?;
        }
        Commands::Uninstall { args, purge } => {
            let mut options = cli_options(&args);
            options.purge = purge;
            cli::run::run_command(TaskKind::Uninstall, args.ids, options, settings).await?;
        }
        Commands::Upgrade {
            args,
            include_unknown,
        } => {
            let mut options = cli_options(&args);
            options.include_unknown = include_unknown;
            cli::run::run_command(TaskKind::Upgrade, args.ids, options, settings).await?;
        }
        Commands::Download { args, dir } => {
            let mut options = cli_options(&args);
            options.dir = dir;
            cli::run::run_command(TaskKind::Download, args.ids, options, settings).await?;
        }
        Commands::Init { .. } => unreachable!("handled before settings loading"),
    }

    Ok(())
}
