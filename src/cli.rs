//! Command-line interface for dripfeed.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dripfeed")]
#[command(about = "Paced, rule-aware referral posting with a full audit trail", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a posting run
    Run(RunArgs),

    /// Print comment variations without posting anything
    Render(RenderArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run configuration (TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Template pools (TOML); built-in pools when omitted
    #[arg(short, long)]
    pub pools: Option<PathBuf>,

    /// Static subreddit rules (TOML); fetched live when omitted and a token is set
    #[arg(short, long)]
    pub rules: Option<PathBuf>,

    /// Candidate threads as a JSON array
    #[arg(long, conflicts_with = "search", required_unless_present = "search")]
    pub candidates: Option<PathBuf>,

    /// Discover candidate threads through Reddit search
    #[arg(long)]
    pub search: bool,

    /// Write the audit log as CSV
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Write the audit log as JSON lines
    #[arg(long)]
    pub jsonl: Option<PathBuf>,

    /// Queue comments instead of posting them
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub credentials: Credentials,
}

#[derive(Args, Debug)]
pub struct Credentials {
    /// OAuth bearer token with the `submit` and `read` scopes
    #[arg(long, env = "REDDIT_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    #[arg(long, env = "REDDIT_USER_AGENT", default_value = "dripfeed/0.1")]
    pub user_agent: String,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Run configuration (TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Template pools (TOML); built-in pools when omitted
    #[arg(short, long)]
    pub pools: Option<PathBuf>,

    /// Number of variations to print
    #[arg(short = 'n', long, default_value = "3")]
    pub count: u64,

    /// Render as if every comment went to one subreddit
    #[arg(long)]
    pub subreddit: Option<String>,
}
