use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "prdforge")]
#[command(version, about = "Decompose PRDs into specialist work, execute, merge and verify")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Decomposition flags shared by every PRD command.
#[derive(Args, Clone, Debug, Default)]
pub struct SplitArgs {
    /// Strategy: domain, complexity or dependency
    #[arg(long)]
    pub split_by: Option<String>,

    /// Maximum stories per sub-PRD
    #[arg(long = "max-stories")]
    pub max_stories: Option<usize>,
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Run sub-PRDs one at a time
    #[arg(long)]
    pub sequential: bool,

    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Per-unit worker timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Specialist worker command (receives the sub-PRD as JSON on stdin)
    #[arg(long)]
    pub worker_cmd: Option<String>,

    /// Test command (merged files are listed in PRDFORGE_MERGED_FILES)
    #[arg(long)]
    pub test_cmd: Option<String>,

    /// strict or last_writer_wins
    #[arg(long)]
    pub merge_mode: Option<String>,

    /// serialize or advisory
    #[arg(long)]
    pub conflict_policy: Option<String>,

    /// UI mode: full, minimal or json
    #[arg(long, default_value = "full")]
    pub ui: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a PRD into sub-PRDs and print them
    Decompose {
        prd: PathBuf,
        #[command(flatten)]
        split: SplitArgs,
        #[arg(long)]
        json: bool,
    },
    /// Report file conflicts and the work estimate for a PRD
    Analyze {
        prd: PathBuf,
        #[command(flatten)]
        split: SplitArgs,
        #[arg(long)]
        json: bool,
    },
    /// Decompose, execute, merge and verify a PRD
    Run {
        prd: PathBuf,
        #[command(flatten)]
        split: SplitArgs,
        #[command(flatten)]
        run: RunArgs,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Validate configuration
    Validate,
    /// Create .prdforge/prdforge.toml with defaults
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    prdforge::telemetry::init_tracing(cli.verbose, cli.log_json);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Decompose { prd, split, json } => {
            cmd::cmd_decompose(&project_dir, prd, split, *json)?
        }
        Commands::Analyze { prd, split, json } => {
            cmd::cmd_analyze(&project_dir, prd, split, *json)?
        }
        Commands::Run { prd, split, run } => {
            cmd::cmd_run(&project_dir, prd, split, run, cli.verbose).await?
        }
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
