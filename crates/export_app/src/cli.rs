use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Overrides;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Export brokerage orders and positions into a flat local dataset."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Dataset,

    /// RON configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log destination: terminal, file or both.
    #[arg(long, global = true, default_value = "terminal")]
    pub log: String,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Dataset {
    /// Every order in the account history.
    Orders,
    /// Currently held positions.
    Positions,
}

impl Dataset {
    pub fn name(self) -> &'static str {
        match self {
            Dataset::Orders => "orders",
            Dataset::Positions => "positions",
        }
    }
}

#[derive(Debug, Args)]
pub struct OverrideArgs {
    /// API root, e.g. https://api.robinhood.com/
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Bearer token.
    #[arg(long, global = true, env = "PORTFOLIO_EXPORT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Maximum number of detail requests in flight.
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Directory receiving the dataset and its manifest.
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,
}

impl From<OverrideArgs> for Overrides {
    fn from(args: OverrideArgs) -> Self {
        Overrides {
            base_url: args.base_url,
            token: args.token,
            max_concurrency: args.concurrency,
            output_dir: args.output,
        }
    }
}
