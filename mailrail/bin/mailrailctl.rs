//! Command-line utility for operating mailrail queues
//!
//! - Submitting mail-merge specs as jobs
//! - Processing a single job in the foreground
//! - Checking specs offline before they are submitted
//! - Inspecting a job's progress

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use mailrail::{Config, Worker, ops};
use mailrail_common::logging;
use mailrail_delivery::{Mangler, ProcessMode};
use mailrail_queue::{FileQueue, JobName};

/// Command-line utility for operating mailrail queues
#[derive(Parser, Debug)]
#[command(name = "mailrailctl")]
#[command(about = "Manage mailrail job queues", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a spec file as a new job
    Submit {
        /// Queue directory
        queue: PathBuf,
        /// JSON spec file
        spec: PathBuf,
    },
    /// Submit a spec file, then process one job in the foreground
    Standalone {
        /// Queue directory
        queue: PathBuf,
        /// JSON spec file
        spec: PathBuf,
    },
    /// Check a spec file without sending anything
    Validate {
        /// JSON spec file
        spec: PathBuf,
    },
    /// Show how many recipients of a job have been confirmed
    Checkpoint {
        /// Queue directory
        queue: PathBuf,
        /// Job name
        job: String,
    },
}

async fn read_spec(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read spec from {}", path.display()))
}

async fn cmd_submit(queue: &Path, spec: &Path) -> anyhow::Result<()> {
    let spec = read_spec(spec).await?;
    let queue = FileQueue::open(queue).await?;

    let name = ops::submit(&queue, &spec).await?;
    println!("{name}");

    Ok(())
}

async fn cmd_standalone(queue: &Path, spec: &Path) -> anyhow::Result<()> {
    let spec = read_spec(spec).await?;
    let config = Config::load()?;
    let worker =
        Worker::from_config(config, Mangler::PassThrough, Some(queue.to_path_buf())).await?;

    let name = ops::submit(worker.queue().as_ref(), &spec).await?;
    println!("{name}");

    let stats = worker.run(ProcessMode::One).await?;
    println!("{stats}");

    Ok(())
}

async fn cmd_validate(spec: &Path) -> anyhow::Result<()> {
    let spec = read_spec(spec).await?;
    let mailing = ops::validate(&spec, &Mangler::PassThrough)?;

    println!("OK: {} recipients", mailing.len());
    Ok(())
}

async fn cmd_checkpoint(queue: &Path, job: &str) -> anyhow::Result<()> {
    let name: JobName = job.parse()?;
    let queue = FileQueue::open(queue).await?;

    let confirmed = ops::checkpoint(&queue, &name).await?;
    println!("{confirmed}");

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    match cli.command {
        Commands::Submit { queue, spec } => cmd_submit(&queue, &spec).await,
        Commands::Standalone { queue, spec } => cmd_standalone(&queue, &spec).await,
        Commands::Validate { spec } => cmd_validate(&spec).await,
        Commands::Checkpoint { queue, job } => cmd_checkpoint(&queue, &job).await,
    }
}
