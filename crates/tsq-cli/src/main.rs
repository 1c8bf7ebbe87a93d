mod tasks;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use tsq_core::{Settings, StoreKind, TaskQueue};

#[derive(Parser, Debug)]
#[command(name = "tsq")]
#[command(version)]
#[command(about = "In-process task queue with demo tasks")]
struct Args {
    /// TOML settings file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Job store backend
    #[arg(long, value_enum)]
    store: Option<StoreArg>,

    /// SQLite database path (sqlite store only)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Capacity of the submit queue
    #[arg(long)]
    queue_length: Option<usize>,

    /// Seconds between cleanup sweeps
    #[arg(long)]
    clean_interval_secs: Option<u64>,

    /// Finished jobs older than this many seconds are cleaned
    #[arg(long)]
    max_age_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StoreArg {
    Memory,
    Sqlite,
}

impl From<StoreArg> for StoreKind {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::Memory => StoreKind::Memory,
            StoreArg::Sqlite => StoreKind::Sqlite,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List defined tasks
    Tasks,

    /// Submit a job and print it
    Submit {
        /// Task name
        name: String,

        /// Job arguments as JSON
        #[arg(long, default_value = "null")]
        args: String,

        /// Wait up to this many seconds for the job to finish
        #[arg(long)]
        wait: Option<u64>,
    },

    /// List stored jobs
    Jobs,
}

impl Args {
    fn settings(&self) -> Result<Settings, tsq_core::ConfigError> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        if let Some(store) = self.store {
            settings.store = store.into();
        }
        if let Some(db) = &self.db {
            settings.sqlite_path = db.clone();
        }
        if let Some(queue_length) = self.queue_length {
            settings.queue_length = queue_length;
        }
        if let Some(secs) = self.clean_interval_secs {
            settings.clean_interval_secs = secs;
        }
        if let Some(secs) = self.max_age_secs {
            settings.max_age_secs = secs;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout は JSON 出力用、ログは stderr へ
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = args.settings()?;
    let queue = tasks::define_demo_tasks(settings.builder()).build()?;

    match args.command {
        Commands::Tasks => {
            for name in queue.defined_tasks() {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Submit { name, args, wait } => {
            let arguments: Value = serde_json::from_str(&args)?;
            // drain: nothing else will pick the job up once this process exits
            with_started(&queue, Finish::Drain, async {
                let job = queue.submit(&name, arguments).await?;
                let job = match wait {
                    Some(secs) => queue.wait_for_job(&job.id, Duration::from_secs(secs)).await?,
                    None => job,
                };
                println!("{}", serde_json::to_string_pretty(&job)?);
                Ok::<_, Box<dyn std::error::Error>>(())
            })
            .await
        }
        Commands::Jobs => {
            with_started(&queue, Finish::Stop, async {
                let jobs = queue.get_jobs().await?;
                println!("{}", serde_json::to_string_pretty(&jobs)?);
                let counts = queue.counts().await?;
                tracing::info!(
                    pending = counts.pending,
                    running = counts.running,
                    success = counts.success,
                    failure = counts.failure,
                    "job counts"
                );
                Ok::<_, Box<dyn std::error::Error>>(())
            })
            .await
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Finish {
    Stop,
    Drain,
}

/// Run `body` on a started queue, then shut it down even when `body` fails.
async fn with_started<F>(
    queue: &TaskQueue,
    finish: Finish,
    body: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: std::future::Future<Output = Result<(), Box<dyn std::error::Error>>>,
{
    queue.start().await?;
    let outcome = body.await;
    match finish {
        Finish::Stop => queue.stop().await?,
        Finish::Drain => queue.drain().await?,
    }
    outcome
}
