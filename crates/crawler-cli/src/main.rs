mod logging;

use std::process::ExitCode;
use std::sync::mpsc;

use clap::Parser;
use crawler_worker::{CrawlConfig, CrawlCoordinator};
use shared_config::{CliOverrides, CrawlerConfig};
use tracing::{error, info};

/// Crawls a heterogeneous Cisco/Arista fleet over SSH, discovering
/// topology via CDP/LLDP starting from one seed address.
#[derive(Parser, Debug)]
#[command(name = "crawler", version, about)]
struct Args {
    /// Address of the first device to crawl.
    #[arg(long)]
    seed: Option<String>,

    /// SSH username shared by every device.
    #[arg(long)]
    username: Option<String>,

    /// SSH password shared by every device.
    #[arg(long)]
    password: Option<String>,

    /// Number of concurrent worker threads.
    #[arg(long)]
    workers: Option<usize>,

    /// Path to the SQLite store.
    #[arg(long = "db-path")]
    db_path: Option<String>,

    /// Maximum retries for a device stuck in ERROR before it is abandoned.
    #[arg(long = "max-retries")]
    max_retries: Option<i64>,

    /// Raise the log level to debug.
    #[arg(long)]
    debug: bool,
}

impl From<Args> for CliOverrides {
    fn from(args: Args) -> Self {
        CliOverrides {
            seed: args.seed,
            username: args.username,
            password: args.password,
            workers: args.workers,
            db_path: args.db_path,
            max_retries: args.max_retries,
            debug: if args.debug { Some(true) } else { None },
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match CrawlerConfig::load(args.into()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    let _logging_guard = logging::init_logging(config.debug, None).unwrap_or_else(|e| {
        eprintln!("failed to initialize logging: {e}");
        None
    });

    let crawl_config = CrawlConfig {
        seed: config.seed.clone(),
        username: config.username.clone(),
        password: config.password.clone(),
        workers: config.workers,
        db_path: config.db_path.clone(),
        max_retries: config.max_retries,
        debug: config.debug,
    };

    if let Err(e) = crawl_config.validate() {
        eprintln!("configuration error: {e}");
        return ExitCode::from(1);
    }

    let mut coordinator = match CrawlCoordinator::new(&crawl_config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to open store");
            eprintln!("store error: {e}");
            return ExitCode::from(2);
        }
    };

    coordinator.start(&crawl_config);
    info!(seed = %crawl_config.seed, workers = crawl_config.workers, "crawl running, press Ctrl-C to stop");

    let (tx, rx) = mpsc::channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = tx.send(());
    }) {
        error!(error = %e, "failed to install signal handler");
    }

    // Blocks until SIGINT/SIGTERM.
    let _ = rx.recv();
    info!("shutdown signal received");

    coordinator.stop();
    ExitCode::from(0)
}
