use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::RunArgs;
use crate::common::setup_logging;
use crate::gateway::{ProcessGateway, ProcessGatewayConfig};
use crate::ratelimit::{RateLimitConfig, RateLimiter};
use crate::store::{SqliteStore, Store};
use crate::worker::{Worker, WorkerConfig};

/// Run the harvesting worker until `--max-jobs` is reached or the process is stopped
pub fn run_worker(args: RunArgs) -> Result<()> {
    setup_logging(&args.log_level)?;

    info!("Starting harvesting worker");
    info!("Store: {}", args.store);
    info!("Provider: {} {}/{}", args.command, args.wd, args.runner);
    info!("Rate limit: one request per {}s on key '{}'", args.separation, args.rate_key);

    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(Path::new(&args.store))
            .with_context(|| format!("Failed to open store: {}", args.store))?,
    );

    let limiter = RateLimiter::new(
        Arc::clone(&store),
        RateLimitConfig {
            rate_key: args.rate_key.clone(),
            separation: args.separation,
            lock_timeout: Duration::from_secs(args.lock_timeout),
            poll_interval: Duration::from_millis(args.poll_interval_ms),
        },
    );

    let gateway = ProcessGateway::new(ProcessGatewayConfig {
        command: args.command.clone(),
        wd: PathBuf::from(&args.wd),
        search_runner: args.runner.clone(),
        contentproviders_runner: args.contentproviders_runner.clone(),
    });

    let worker = Worker::new(
        store,
        limiter,
        gateway,
        WorkerConfig {
            queue: args.queue.clone(),
            output_queue: args.output_queue.clone(),
            service: args.service.clone(),
            pop_timeout: Duration::from_secs(args.pop_timeout),
            max_jobs: args.max_jobs,
        },
    );
    worker.run();

    Ok(())
}
