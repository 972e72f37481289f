//! Harvester CLI.
//!
//! Creates, runs, schedules and inspects collection jobs against the local
//! store. `daemon` keeps the scheduler running until interrupted.
//!
//! Commands that change state take an exclusive lock on the data directory.
//! Inspection commands read the persisted state without it, so they can be
//! used while a daemon runs.

mod commands;
mod output;

use std::path::PathBuf;

use chrono::{NaiveTime, Weekday};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

use harvester::{JobKind, JobPriority, JobStatus};

#[derive(Parser)]
#[command(name = "harvester")]
#[command(about = "Run and schedule recurring collection jobs")]
#[command(version)]
struct Cli {
    /// Configuration file (JSON or YAML)
    #[arg(short, long, env = "HARVESTER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a job
    Create(CreateArgs),

    /// List jobs, highest priority first
    List {
        #[arg(long)]
        status: Option<JobStatus>,

        #[arg(long)]
        kind: Option<JobKind>,

        #[arg(long)]
        priority: Option<JobPriority>,
    },

    /// Show one job
    Show { job_id: String },

    /// Delete a job, cancelling it if it is running
    Delete { job_id: String },

    /// Execute a job and follow it until it finishes (Ctrl-C cancels)
    Run { job_id: String },

    /// Execution history, newest first
    History {
        /// Only executions of this job
        #[arg(long)]
        job: Option<String>,

        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Aggregate job and execution statistics
    Stats,

    /// Attach a schedule to a job, replacing any previous one
    Schedule {
        job_id: String,

        #[command(subcommand)]
        rule: ScheduleRule,
    },

    /// Remove a job's schedule
    Unschedule { job_id: String },

    /// List scheduled jobs
    Schedules,

    /// Run the scheduler in the foreground until Ctrl-C
    Daemon,
}

#[derive(Args)]
struct CreateArgs {
    /// Display name
    name: String,

    /// Target URL; repeat for several targets, processed in order
    #[arg(short, long = "target", required = true)]
    targets: Vec<String>,

    #[arg(short, long, default_value = "custom")]
    kind: JobKind,

    #[arg(short, long, default_value = "medium")]
    priority: JobPriority,

    /// Cron expression (5 or 6 fields, UTC)
    #[arg(long)]
    cron: Option<String>,

    /// Pause between targets in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Per-target timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long)]
    max_payload_bytes: Option<u64>,

    /// Metadata as key=value; values that parse as JSON are stored as JSON
    #[arg(short, long = "meta", value_parser = parse_key_value)]
    metadata: Vec<(String, String)>,
}

#[derive(Subcommand)]
enum ScheduleRule {
    /// Every N minutes
    Interval { minutes: u32 },

    /// Every day at HH:MM (UTC)
    Daily {
        #[arg(value_parser = parse_time)]
        time: NaiveTime,
    },

    /// Every week on the given day at HH:MM (UTC)
    Weekly {
        #[arg(value_parser = parse_weekday)]
        weekday: Weekday,

        #[arg(value_parser = parse_time)]
        time: NaiveTime,
    },

    /// Cron expression (5 or 6 fields, UTC)
    Cron { expression: String },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| format!("expected HH:MM, got '{}'", raw))
}

fn parse_weekday(raw: &str) -> Result<Weekday, String> {
    raw.parse::<Weekday>()
        .map_err(|_| format!("unknown weekday '{}'", raw))
}

fn init_logging(json: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so command output on stdout stays parseable
    let json_layer = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs)?;

    let mut config = harvester::load_or_default(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_directory = data_dir;
    }
    log::debug!("Using data directory {}", config.data_directory.display());

    let manager = if cli.command.is_read_only() {
        harvester::JobManager::open_read_only(config)?
    } else {
        open_exclusive(config)?
    };
    let out = output::Printer::new(cli.json);

    match cli.command {
        Commands::Create(args) => commands::create(&manager, args, &out),
        Commands::List {
            status,
            kind,
            priority,
        } => {
            let filter = harvester::JobFilter {
                status,
                kind,
                priority,
            };
            commands::list(&manager, &filter, &out)
        }
        Commands::Show { job_id } => commands::show(&manager, &job_id, &out),
        Commands::Delete { job_id } => commands::delete(&manager, &job_id, &out),
        Commands::Run { job_id } => commands::run(&manager, &job_id, &out).await,
        Commands::History { job, limit } => {
            commands::history(&manager, job.as_deref(), limit, &out)
        }
        Commands::Stats => commands::stats(&manager, &out),
        Commands::Schedule { job_id, rule } => {
            commands::schedule(&manager, &job_id, rule.into_spec(), &out)
        }
        Commands::Unschedule { job_id } => commands::unschedule(&manager, &job_id, &out),
        Commands::Schedules => commands::schedules(&manager, &out),
        Commands::Daemon => commands::daemon(&manager).await,
    }
}

/// Opens the manager that owns the data directory. Only one such manager
/// (usually `daemon`) can run at a time.
fn open_exclusive(config: harvester::EngineConfig) -> anyhow::Result<harvester::JobManager> {
    use harvester::{HarvesterError, StoreError};

    match harvester::JobManager::open(config) {
        Ok(manager) => Ok(manager),
        Err(HarvesterError::Store(e @ StoreError::Locked(_))) => Err(anyhow::Error::new(e)
            .context("another harvester process (such as `harvester daemon`) owns the data directory; stop it or use a read-only command")),
        Err(e) => Err(e.into()),
    }
}

impl Commands {
    /// Commands that only inspect state and may run next to a daemon.
    fn is_read_only(&self) -> bool {
        matches!(
            self,
            Commands::List { .. }
                | Commands::Show { .. }
                | Commands::History { .. }
                | Commands::Stats
                | Commands::Schedules
        )
    }
}

impl ScheduleRule {
    fn into_spec(self) -> harvester::ScheduleSpec {
        use harvester::ScheduleSpec;
        match self {
            ScheduleRule::Interval { minutes } => ScheduleSpec::Interval { minutes },
            ScheduleRule::Daily { time } => ScheduleSpec::Daily { time },
            ScheduleRule::Weekly { weekday, time } => ScheduleSpec::Weekly { weekday, time },
            ScheduleRule::Cron { expression } => ScheduleSpec::Cron { expression },
        }
    }
}
