use std::path::PathBuf;

use clap::{Parser, Subcommand};

use matchday_core::{LeagueSeasonKey, SnapshotId};

#[derive(Parser, Debug)]
#[command(
    name = "matchday-automation",
    version,
    about = "Automatic league table recalculation",
    long_about = "Runs the recalculation queue against the match store, or performs one-off operator actions"
)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "MATCHDAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Postgres connection string; in-memory stores are used when absent
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Log format [json, pretty]
    #[arg(long, global = true, env = "MATCHDAY_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the worker pool until Ctrl-C (default)
    Serve,

    /// Recalculate one table now
    Recalculate {
        /// LEAGUE_ID/SEASON_ID
        table: LeagueSeasonKey,
        /// Reason recorded on the job
        #[arg(long)]
        description: Option<String>,
    },

    /// Recalculate every known table now
    RecalculateAll {
        #[arg(long)]
        description: Option<String>,
    },

    /// Snapshot operations
    #[command(subcommand)]
    Snapshot(SnapshotCommands),
}

#[derive(Subcommand, Debug)]
pub enum SnapshotCommands {
    /// Capture the live table
    Create {
        table: LeagueSeasonKey,
        #[arg(long)]
        description: Option<String>,
    },
    /// List snapshots of a table, newest first
    List { table: LeagueSeasonKey },
    /// Compare a snapshot with the live table
    Diff { id: SnapshotId },
    /// Make a snapshot the live table again
    Restore { id: SnapshotId },
}
