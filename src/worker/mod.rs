//! The harvesting loop: rate gate, dequeue, provider call, dedup, enrich, publish.

pub mod enrich;
pub mod job;

pub use enrich::{enrich_metadata, text_rows, ContentProviderMap, MetadataRow, TextRow};
pub use job::{Endpoint, Job};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::common::{format_elapsed, RawRecord};
use crate::dedup::filter_duplicates;
use crate::gateway::{ProviderOutcome, SearchProvider};
use crate::ratelimit::RateLimiter;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Inbound job queue
    pub queue: String,
    /// Downstream queue for successful searches
    pub output_queue: String,
    /// Stamped onto every job's params
    pub service: String,
    /// Longest single wait on an empty inbound queue
    pub pop_timeout: Duration,
    /// Stop after this many jobs; `None` runs until the process is stopped
    pub max_jobs: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: "base".to_string(),
            output_queue: "input_data".to_string(),
            service: "base".to_string(),
            pop_timeout: Duration::from_secs(5),
            max_jobs: None,
        }
    }
}

/// How a single job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Search result pushed to the downstream queue
    Queued,
    /// Result written to the job's own output slot
    Stored,
    /// Job failed; the failure was logged
    Failed,
    /// Job could not be interpreted and was dropped
    Skipped,
}

/// Downstream payload of a search: canonical metadata and text tables as JSON record lists
#[derive(Debug, Clone, Serialize)]
pub struct InputData {
    pub metadata: String,
    pub text: String,
}

/// Dedup, truncate and enrich provider rows into the downstream tables
pub fn build_input_data(
    records: Vec<RawRecord>,
    list_size: usize,
    providers: &ContentProviderMap,
) -> Result<InputData> {
    let mut canonical = filter_duplicates(records)?;
    canonical.truncate(list_size);
    let rows = enrich_metadata(canonical, providers);
    let text = text_rows(&rows);
    Ok(InputData {
        metadata: serde_json::to_string(&rows).context("Failed to encode metadata")?,
        text: serde_json::to_string(&text).context("Failed to encode text")?,
    })
}

/// Load the content-provider map; any failure leaves it empty
pub fn load_content_providers<P: SearchProvider>(provider: &P) -> ContentProviderMap {
    match provider.content_providers() {
        Ok(ProviderOutcome::Success(records)) => {
            let map = ContentProviderMap::from_records(&records);
            info!("Loaded {} content providers", map.len());
            map
        }
        Ok(ProviderOutcome::Failed(payload)) => {
            error!("Content-provider listing returned an error: {}", payload);
            ContentProviderMap::default()
        }
        Err(e) => {
            error!("Failed to load content providers: {:#}", e);
            ContentProviderMap::default()
        }
    }
}

pub struct Worker<P: SearchProvider> {
    store: Arc<dyn Store>,
    limiter: RateLimiter,
    provider: P,
    content_providers: ContentProviderMap,
    config: WorkerConfig,
}

impl<P: SearchProvider> Worker<P> {
    pub fn new(store: Arc<dyn Store>, limiter: RateLimiter, provider: P, config: WorkerConfig) -> Self {
        let content_providers = load_content_providers(&provider);
        Self::with_content_providers(store, limiter, provider, content_providers, config)
    }

    pub fn with_content_providers(
        store: Arc<dyn Store>,
        limiter: RateLimiter,
        provider: P,
        content_providers: ContentProviderMap,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            limiter,
            provider,
            content_providers,
            config,
        }
    }

    pub fn content_providers(&self) -> &ContentProviderMap {
        &self.content_providers
    }

    /// Process jobs until `max_jobs` is reached; per-job and per-cycle failures are logged, never fatal
    pub fn run(&self) {
        info!(
            "Worker listening on '{}', publishing to '{}'",
            self.config.queue, self.config.output_queue
        );
        let mut processed = 0usize;
        loop {
            match self.run_once() {
                Ok(Some(_)) => processed += 1,
                Ok(None) => {}
                Err(e) => {
                    error!("Worker cycle failed: {:#}", e);
                    thread::sleep(self.limiter.config().poll_interval);
                }
            }
            if self.config.max_jobs.is_some_and(|max| processed >= max) {
                info!("Processed {} jobs, stopping", processed);
                break;
            }
        }
    }

    /// One cycle: wait for a rate-limit slot, then take and process at most one job
    pub fn run_once(&self) -> Result<Option<JobOutcome>> {
        self.limiter.wait()?;
        let payload = self
            .store
            .pop(&self.config.queue, self.config.pop_timeout)
            .with_context(|| format!("Failed to pop from queue {}", self.config.queue))?;
        Ok(payload.map(|payload| self.process(&payload)))
    }

    /// Handle one raw queue payload
    pub fn process(&self, payload: &str) -> JobOutcome {
        let start = Instant::now();
        let job = match Job::parse(payload, &self.config.service) {
            Ok(job) => job,
            Err(e) => {
                error!("Dropping job: {:#}", e);
                return JobOutcome::Skipped;
            }
        };
        debug!("Job {}: {:?}", job.id, job.params);

        let outcome = match job.endpoint {
            Endpoint::Search => self.handle_search(&job).unwrap_or_else(|e| {
                error!("Exception during data retrieval for job {}: {:#}", job.id, e);
                error!("params: {:?}", job.params);
                JobOutcome::Failed
            }),
            Endpoint::ContentProviders => self.handle_content_providers(&job).unwrap_or_else(|e| {
                error!("Exception during retrieval of contentproviders for job {}: {:#}", job.id, e);
                JobOutcome::Failed
            }),
            Endpoint::Unknown => {
                warn!("Skipping job {} with unsupported endpoint", job.id);
                JobOutcome::Skipped
            }
        };

        info!(
            "Job {} finished as {:?} in {}",
            job.id,
            outcome,
            format_elapsed(start.elapsed())
        );
        outcome
    }

    fn handle_search(&self, job: &Job) -> Result<JobOutcome> {
        let records = match self.provider.search(&job.params)? {
            ProviderOutcome::Success(records) => records,
            ProviderOutcome::Failed(payload) => {
                self.store_result(job, payload)?;
                return Ok(JobOutcome::Stored);
            }
        };

        let fetched = records.len();
        let input_data = build_input_data(records, job.params.list_size, &self.content_providers)?;
        let result = json!({
            "input_data": input_data,
            "params": job.params,
            "id": job.id,
        });
        debug!("Job {}: provider returned {} records", job.id, fetched);

        if job.params.raw {
            self.store_result(job, result)?;
            return Ok(JobOutcome::Stored);
        }

        let queue = &self.config.output_queue;
        self.store
            .push(queue, &result.to_string())
            .with_context(|| format!("Failed to push result to {}", queue))?;
        let queue_len = self.store.len(queue)?;
        info!("Queue length: {} {} {}", queue, queue_len, job.id);
        Ok(JobOutcome::Queued)
    }

    fn handle_content_providers(&self, job: &Job) -> Result<JobOutcome> {
        let result = match self.provider.content_providers()? {
            ProviderOutcome::Success(records) => json!({
                "contentproviders": serde_json::to_string(&records)?,
            }),
            ProviderOutcome::Failed(payload) => payload,
        };
        self.store_result(job, result)?;
        Ok(JobOutcome::Stored)
    }

    /// Write a result object, tagged with the job id, to the job's output slot
    fn store_result(&self, job: &Job, mut result: Value) -> Result<()> {
        if let Some(map) = result.as_object_mut() {
            map.insert("id".to_string(), Value::from(job.id.clone()));
        } else {
            result = json!({ "result": result, "id": job.id });
        }
        let key = job.output_key();
        self.store
            .set(&key, &result.to_string())
            .with_context(|| format!("Failed to write {}", key))?;
        Ok(())
    }
}
