use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use billsync_core::{SyncConfig, TargetConfig};

/// Longest window `sync --days` accepts, roughly a century.
pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "billsync")]
#[command(
    author,
    version,
    about = "Reconcile Unanet billing reports into a Dataverse table"
)]
#[command(after_help = "Examples:
  billsync sync
  billsync sync --csv reports/unanet_report_2025-06-30.csv --days 90
  billsync delete-range --start 2025-01-01 --end 2025-03-31
  billsync preview-delete 2025-06-01")]
pub struct Config {
    #[command(flatten)]
    pub dataverse: DataverseArgs,

    #[command(flatten)]
    pub unanet: UnanetArgs,

    /// Maximum create operations per batch request
    #[arg(long, env = "BATCH_SIZE", default_value = "500", global = true)]
    pub batch_size: usize,

    /// Directory holding downloaded reports
    #[arg(long, env = "REPORTS_DIR", default_value = "./reports", global = true)]
    pub reports_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Dataverse environment and credentials
#[derive(Args, Debug)]
pub struct DataverseArgs {
    /// Dataverse environment URL
    #[arg(
        long,
        env = "DATAVERSE_URL",
        default_value = "https://org4bd86d49.crm.dynamics.com",
        global = true
    )]
    pub dataverse_url: String,

    /// Account used for the password grant
    #[arg(long, env = "DATAVERSE_USERNAME", default_value = "", hide_default_value = true, global = true)]
    pub dataverse_username: String,

    #[arg(long, env = "DATAVERSE_PASSWORD", default_value = "", hide_default_value = true, hide_env_values = true, global = true)]
    pub dataverse_password: String,

    /// Publisher prefix of the target table and its columns
    #[arg(long, env = "TABLE_PREFIX", default_value = "cr834", global = true)]
    pub table_prefix: String,

    /// Entity set name, defaults to <prefix>_eacdataraws
    #[arg(long, env = "TABLE_NAME", global = true)]
    pub table_name: Option<String>,
}

/// Source system settings, used by the external report downloader
#[derive(Args, Debug)]
pub struct UnanetArgs {
    #[arg(long, env = "UNANET_URL", global = true)]
    pub unanet_url: Option<String>,

    #[arg(long, env = "UNANET_USERNAME", global = true)]
    pub unanet_username: Option<String>,

    #[arg(long, env = "UNANET_PASSWORD", hide_env_values = true, global = true)]
    pub unanet_password: Option<String>,

    #[arg(long, env = "UNANET_REPORT_ID", default_value = "R_91", global = true)]
    pub unanet_report_id: String,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replace the trailing window in Dataverse with the report's rows
    #[command(after_help = "Examples:
  billsync sync                        # Today's cached report, last 365 days
  billsync sync --csv report.csv       # Explicit report file
  billsync sync --days 30              # Shorter window")]
    Sync {
        /// Report file; defaults to today's cached report
        #[arg(long, value_name = "PATH")]
        csv: Option<PathBuf>,
        /// Length of the window ending today
        #[arg(long, default_value = "365", value_parser = clap::value_parser!(i64).range(0..=MAX_WINDOW_DAYS))]
        days: i64,
    },
    /// Upload report rows without deleting anything
    Upload {
        #[arg(long, value_name = "PATH")]
        csv: PathBuf,
        /// Only rows dated on or after this day (YYYY-MM-DD)
        #[arg(long, requires = "end")]
        start: Option<String>,
        /// Only rows dated on or before this day (YYYY-MM-DD)
        #[arg(long, requires = "start")]
        end: Option<String>,
    },
    /// Delete remote records dated inside a range
    DeleteRange {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// Delete remote records dated after a day
    #[command(after_help = "Example: billsync delete-after 2025-06-01 --yes")]
    DeleteAfter {
        /// Cutoff day (YYYY-MM-DD); the day itself is kept
        date: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show what delete-after would remove, without deleting
    PreviewDelete {
        /// Cutoff day (YYYY-MM-DD)
        date: String,
    },
    /// Upload the first rows of a report one request at a time
    UploadSample {
        #[arg(long, value_name = "PATH")]
        csv: PathBuf,
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

impl Config {
    pub fn target(&self) -> TargetConfig {
        let args = &self.dataverse;
        let target = TargetConfig::new(&args.dataverse_url, &args.table_prefix)
            .with_credentials(&args.dataverse_username, &args.dataverse_password);
        match &args.table_name {
            Some(name) if !name.trim().is_empty() => target.with_table_name(name.trim()),
            _ => target,
        }
    }

    pub fn sync(&self) -> SyncConfig {
        SyncConfig {
            batch_size: self.batch_size.max(1),
            ..SyncConfig::default()
        }
    }
}
