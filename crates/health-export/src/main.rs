use std::path::PathBuf;

use clap::{Parser, Subcommand};
use health_export::aggregate::Granularity;
use health_export::cli::{commands, OutputFormat};
use health_export::import::DEFAULT_BATCH_SIZE;
use health_export::models::MetricId;
use health_export::{logging, storage};

#[derive(Parser)]
#[command(name = "health")]
#[command(author, version, about = "Import and summarize Apple Health exports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    /// Database file
    #[arg(long, global = true, env = "HEALTH_EXPORT_DB")]
    db: Option<PathBuf>,

    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Import an export.xml or export.zip
    Import {
        /// Path to the export
        path: PathBuf,

        /// Records written per batch
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Summarize a metric per day, week or month
    Summary {
        /// Metric id, e.g. steps or heart_rate (see `health metrics`)
        metric: MetricId,

        /// Bucket size
        #[arg(long, default_value = "day")]
        by: Granularity,

        /// IANA timezone for bucket boundaries
        #[arg(long, default_value = "UTC")]
        tz: String,

        /// First local date (YYYY-MM-DD), inclusive
        #[arg(long)]
        from: Option<String>,

        /// Last local date (YYYY-MM-DD), inclusive
        #[arg(long)]
        to: Option<String>,

        /// Sum record durations instead of values (hours slept)
        #[arg(long)]
        durations: bool,

        /// Sleep only: leave out in-bed and awake intervals
        #[arg(long)]
        asleep: bool,
    },
    /// List stored metrics
    Metrics,
    /// Show daily Activity ring totals
    Activity {
        /// First day (YYYY-MM-DD), inclusive
        #[arg(long)]
        from: Option<String>,

        /// Last day (YYYY-MM-DD), inclusive
        #[arg(long)]
        to: Option<String>,
    },
    /// Delete all imported records
    Reset {
        /// Remove the database file itself
        #[arg(long)]
        hard: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init_with_level(logging::level_for_verbosity(cli.verbose));

    let db_path = match cli.db {
        Some(path) => Ok(path),
        None => storage::default_db_path(),
    };

    let result = db_path.and_then(|db_path| match cli.command {
        Commands::Import { path, batch_size } => {
            commands::import(&db_path, &path, batch_size, cli.format)
        }
        Commands::Summary {
            metric,
            by,
            tz,
            from,
            to,
            durations,
            asleep,
        } => commands::summary(
            &db_path,
            commands::SummaryArgs {
                metric,
                by,
                tz,
                from,
                to,
                durations,
                asleep,
            },
            cli.format,
        ),
        Commands::Metrics => commands::metrics(&db_path, cli.format),
        Commands::Activity { from, to } => {
            commands::activity(&db_path, from.as_deref(), to.as_deref(), cli.format)
        }
        Commands::Reset { hard } => commands::reset(&db_path, hard),
    });

    if let Err(e) = result {
        eprintln!("Error: {}", health_export::error::format_user_error(&e));
        std::process::exit(1);
    }
}
