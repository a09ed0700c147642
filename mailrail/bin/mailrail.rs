#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use mailrail::{Config, Worker};
use mailrail_common::logging;
use mailrail_delivery::{Mangler, ProcessMode};

/// Deliver queued mail-merge jobs
#[derive(Parser, Debug)]
#[command(name = "mailrail", version, about, long_about = None)]
#[command(group(ArgGroup::new("mangler").args(["donotsend", "simulator", "sendto"])))]
struct Cli {
    /// Resolve every message but send nothing
    #[arg(long)]
    donotsend: bool,

    /// Send every message to the SES mailbox simulator
    #[arg(long)]
    simulator: bool,

    /// Send every message to ADDR instead of its recipient
    #[arg(long, value_name = "ADDR")]
    sendto: Option<String>,

    /// How many jobs to process: forever, all, or one
    #[arg(long, default_value_t = ProcessMode::Forever)]
    mode: ProcessMode,

    /// Queue directory, overriding the configured queue
    #[arg(value_name = "QUEUE-DIR")]
    queue_dir: Option<PathBuf>,
}

impl Cli {
    fn mangler(&self) -> Mangler {
        if self.donotsend {
            Mangler::SuppressSend
        } else if self.simulator {
            Mangler::RedirectToSimulator
        } else if let Some(addr) = &self.sendto {
            Mangler::redirect_to(addr.as_str())
        } else {
            Mangler::PassThrough
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let config = Config::load()?;
    let worker = Worker::from_config(config, cli.mangler(), cli.queue_dir).await?;

    let stats = worker.run(cli.mode).await?;
    tracing::info!("{stats}");

    Ok(())
}
