use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use human_bytes::human_bytes;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::{error, info, warn};
use twelf::Layer;

use backup_monitor::conf::ENV_PREFIX;
use backup_monitor::utils::format_timestamp;
use backup_monitor::{collect, CollectError, CollectionOutcome, Config, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "backup-monitor", version, about = "Collects backup runs from a remote backup server")]
struct Args {
    /// TOML config file; BACKUP_MONITOR_* environment variables are read as well
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Overrides the configured database path
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one collection against the configured server
    Collect {
        /// Extra attempts after a failed invocation (never for config or auth errors)
        #[arg(long, default_value_t = 0)]
        retries: usize,
        #[arg(long, default_value_t = 5000)]
        retry_delay_ms: u64,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored machines
    Machines,
    /// List stored runs of one machine
    Runs {
        machine_id: String,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, CollectError> {
    let mut layers = Vec::new();
    if let Some(path) = path {
        layers.push(Layer::Toml(path.clone()));
    }
    layers.push(Layer::Env(Some(ENV_PREFIX.to_string())));
    Config::with_layers(&layers)
        .map_err(|e| CollectError::Configuration(format!("Failed to load config: {e}")))
}

async fn run_collect(
    config: &Config,
    store: &SqliteStore,
    retries: usize,
    retry_delay_ms: u64,
    json: bool,
) -> Result<(), CollectError> {
    let settings = config.target_settings();
    let password = config.get_password().unwrap_or_default().to_string();

    let strategy = FixedInterval::from_millis(retry_delay_ms).take(retries);
    let outcome = RetryIf::spawn(
        strategy,
        || collect(&settings, &password, store),
        |e: &CollectError| {
            let retryable = e.is_retryable();
            if retryable && retries > 0 {
                warn!("Collection attempt failed: {}", e);
            }
            retryable
        },
    )
    .await?;

    if json {
        let text = serde_json::to_string_pretty(&outcome)
            .map_err(|e| CollectError::Protocol(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }
    match outcome {
        CollectionOutcome::NoBackups { machine } => {
            println!("No backups found on {} ({})", machine.name, machine.id);
        }
        CollectionOutcome::Completed(result) => {
            println!(
                "processed={} skipped={} errors={}",
                result.processed_count, result.skipped_count, result.error_count
            );
        }
    }
    Ok(())
}

async fn run_machines(store: &SqliteStore) -> Result<(), CollectError> {
    let machines = store.list_machines().await?;
    if machines.is_empty() {
        println!("No machines stored yet");
    }
    for machine in machines {
        println!(
            "{}\t{}\truns={}\tlast_run={}\tlast_seen={}",
            machine.id,
            machine.name,
            machine.run_count,
            machine.last_run_start.as_deref().unwrap_or("-"),
            machine.last_seen_at
        );
    }
    Ok(())
}

async fn run_runs(store: &SqliteStore, machine_id: &str) -> Result<(), CollectError> {
    if store.get_machine(machine_id).await?.is_none() {
        return Err(CollectError::Configuration(format!(
            "unknown machine {:?}",
            machine_id
        )));
    }
    for run in store.list_backup_runs(machine_id).await? {
        println!(
            "{}\t{}\t{}\t{}s\tuploaded={}",
            format_timestamp(&run.start_time),
            run.backup_name,
            run.status,
            run.duration_seconds,
            human_bytes(run.sizes.uploaded_bytes.max(0) as f64)
        );
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), CollectError> {
    let config = load_config(args.config.as_ref())?;
    let database = args
        .database
        .clone()
        .unwrap_or_else(|| config.get_database().clone());
    let store = SqliteStore::open(&database)?;

    match args.command.unwrap_or(Command::Collect {
        retries: 0,
        retry_delay_ms: 5000,
        json: false,
    }) {
        Command::Collect {
            retries,
            retry_delay_ms,
            json,
        } => run_collect(&config, &store, retries, retry_delay_ms, json).await,
        Command::Machines => run_machines(&store).await,
        Command::Runs { machine_id } => run_runs(&store, &machine_id).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!("backup-monitor {} started", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
