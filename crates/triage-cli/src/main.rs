mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::do_action::DoSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "triage",
    about = "Rule-driven triage of GitHub issues and pull requests",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every task of a config file against the open targets
    Run {
        /// Path to the config file
        config: PathBuf,
    },

    /// Check the syntax of a config file
    Check {
        /// Path to the config file
        config: PathBuf,
    },

    /// Perform a single action against one target
    Do {
        /// Target number (default: the number from the triggering event)
        #[arg(long, global = true)]
        number: Option<u64>,

        #[command(subcommand)]
        subcommand: DoSubcommand,
    },

    /// Generate a config skeleton
    Init {
        /// Config name; writes <NAME>.yml
        name: String,

        /// Also generate a GitHub Actions workflow
        #[arg(long)]
        workflow: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::Do { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run { config } => cmd::run::run(&config, cli.json),
        Commands::Check { config } => cmd::check::run(&config, cli.json),
        Commands::Do { number, subcommand } => cmd::do_action::run(number, subcommand),
        Commands::Init { name, workflow } => cmd::init::run(&name, workflow),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
