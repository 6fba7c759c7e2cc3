use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wsync::{Config, GitHubClient, RemoteSource, SyncEngine, SyncOutcome, SyncSummary};

#[derive(Parser)]
#[command(name = "wsync")]
#[command(about = "Audit local git working copies and mirror hosted repositories and gists")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify and fast-forward every working copy in a workspace
    Audit {
        /// Workspace root (defaults to the current directory)
        path: Option<PathBuf>,
    },

    /// Clone or update every repository and gist of the account
    Mirror {
        /// Target directory, created if absent (defaults to the current directory)
        path: Option<PathBuf>,

        /// Skip gists
        #[arg(long)]
        no_gists: bool,
    },

    /// List the repositories and gists that would be mirrored
    List {
        /// Skip gists
        #[arg(long)]
        no_gists: bool,
    },

    /// Write the default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
}

const EXIT_FAILURE: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.logging.level);
    info!("Starting wsync v{}", env!("CARGO_PKG_VERSION"));

    // Dropping the command future on Ctrl-C kills any running git child
    let result = tokio::select! {
        result = run(cli.command, &config) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match result {
        Some(result) => result,
        None => {
            warn!("Interrupted");
            eprintln!("Interrupted");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
    }
}

async fn run(command: Commands, config: &Config) -> Result<ExitCode> {
    match command {
        Commands::Audit { path } => cmd_audit(path, config).await,
        Commands::Mirror { path, no_gists } => cmd_mirror(path, no_gists, config).await,
        Commands::List { no_gists } => cmd_list(no_gists, config).await,
        Commands::Init { force } => cmd_init(force, config),
    }
}

/// Initialize logging; `RUST_LOG` wins over both flag and config
fn init_logging(verbose: bool, level: &str) {
    let default_level = if verbose { "debug" } else { level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs go to stderr so stdout only carries the per-target report
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(),
    }
}

/// Resolved at each invocation, never cached
fn root_or_cwd(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| PathBuf::from("."))
}

fn print_outcome(outcome: &SyncOutcome) {
    println!("{}", outcome.report());
}

fn finish(summary: &SyncSummary) -> ExitCode {
    println!();
    println!("{}", summary.totals_line());

    if summary.has_failures() {
        println!();
        println!("Failed:");
        for failure in summary.failures() {
            println!("  {}", failure.target);
            for line in failure.detail.lines().filter(|l| !l.trim().is_empty()) {
                println!("    {}", line);
            }
        }
        ExitCode::from(EXIT_FAILURE)
    } else {
        ExitCode::SUCCESS
    }
}

async fn cmd_audit(path: Option<PathBuf>, config: &Config) -> Result<ExitCode> {
    let root = root_or_cwd(path);
    let engine = SyncEngine::new(config);

    let summary = engine
        .audit(&root, print_outcome)
        .await
        .with_context(|| format!("Audit of {} failed", root.display()))?;

    Ok(finish(&summary))
}

async fn cmd_mirror(path: Option<PathBuf>, no_gists: bool, config: &Config) -> Result<ExitCode> {
    let root = root_or_cwd(path);
    let include_gists = config.github.include_gists && !no_gists;

    let client = GitHubClient::from_config(config)
        .await
        .context("GitHub authentication failed")?;
    let engine = SyncEngine::new(config);

    let summary = engine
        .mirror(&root, &client, include_gists, print_outcome)
        .await
        .with_context(|| format!("Mirror into {} failed", root.display()))?;

    Ok(finish(&summary))
}

async fn cmd_list(no_gists: bool, config: &Config) -> Result<ExitCode> {
    let client = GitHubClient::from_config(config)
        .await
        .context("GitHub authentication failed")?;

    let repos = client
        .list_repositories()
        .await
        .context("Failed to list repositories")?;
    println!("Repositories ({}):", repos.len());
    for repo in &repos {
        println!("  {:<40} {}", repo.identifier, repo.clone_url);
    }

    if config.github.include_gists && !no_gists {
        let gists = client.list_gists().await.context("Failed to list gists")?;
        println!("Gists ({}):", gists.len());
        for gist in &gists {
            println!("  {:<40} {}", gist.identifier, gist.clone_url);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_init(force: bool, config: &Config) -> Result<ExitCode> {
    let config_path = Config::default_config_path()?;

    if config_path.exists() && !force {
        println!("Configuration already exists: {}", config_path.display());
        println!("Use --force to overwrite it");
        return Ok(ExitCode::SUCCESS);
    }

    config.save(&config_path)?;
    info!("Configuration saved to: {:?}", config_path);
    println!("Configuration written to {}", config_path.display());

    Ok(ExitCode::SUCCESS)
}
