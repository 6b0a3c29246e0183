//! Flexibility Score CLI
//!
//! Reads the metrics and snapshots written by the agent and prints windowed
//! account scores, organization scores and account rankings.

mod commands;
mod output;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::{scores, snapshot, DateRange};
use flex_lib::backends::LocalLayout;
use flex_lib::orchestrator::{DEFAULT_BUCKET, DEFAULT_NAMESPACE};
use flex_lib::aggregate::DEFAULT_RANK_COUNT;
use std::path::PathBuf;

/// Flexibility Score CLI
#[derive(Parser)]
#[command(name = "flexscore")]
#[command(author, version, about = "CLI for the Flexibility Score", long_about = None)]
pub struct Cli {
    /// Data directory written by the agent
    #[arg(long, env = "FLEX_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Metric namespace
    #[arg(long, env = "FLEX_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Snapshot bucket
    #[arg(long, env = "FLEX_BUCKET", default_value = DEFAULT_BUCKET)]
    pub bucket: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Windowed scores per account
    Scores {
        #[command(flatten)]
        range: DateRange,

        /// Only these accounts (repeatable); all accounts when omitted
        #[arg(long = "account", short)]
        accounts: Vec<String>,
    },

    /// Windowed organization scores
    Org {
        #[command(flatten)]
        range: DateRange,
    },

    /// Accounts with the highest and lowest Flexibility Score
    Rank {
        #[command(flatten)]
        range: DateRange,

        /// Accounts listed at each end
        #[arg(long, short, default_value_t = DEFAULT_RANK_COUNT)]
        count: usize,
    },

    /// Archived daily snapshots
    #[command(subcommand)]
    Snapshot(SnapshotCommands),
}

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// List snapshot keys
    List(ListArgs),

    /// Show a snapshot (the latest when no key is given)
    Show {
        /// Snapshot key, e.g. 2024/03/11/040000.json
        key: Option<String>,
    },
}

#[derive(Args)]
pub struct ListArgs {
    /// Key prefix, e.g. 2024/03
    #[arg(long, default_value = "")]
    pub prefix: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let layout = LocalLayout::new(&cli.data_dir);

    match cli.command {
        Commands::Scores { range, accounts } => {
            let source = layout.metric_store();
            scores::show_scores(&source, &cli.namespace, &range.window()?, &accounts, cli.format)
                .await?;
        }
        Commands::Org { range } => {
            let source = layout.metric_store();
            scores::show_org(&source, &cli.namespace, &range.window()?, cli.format).await?;
        }
        Commands::Rank { range, count } => {
            let source = layout.metric_store();
            scores::show_ranking(&source, &cli.namespace, &range.window()?, count, cli.format)
                .await?;
        }
        Commands::Snapshot(snapshot_cmd) => {
            let store = layout.object_store();
            match snapshot_cmd {
                SnapshotCommands::List(args) => {
                    snapshot::list_snapshots(&store, &cli.bucket, &args.prefix, cli.format).await?;
                }
                SnapshotCommands::Show { key } => {
                    snapshot::show_snapshot(&store, &cli.bucket, key, cli.format).await?;
                }
            }
        }
    }

    Ok(())
}
