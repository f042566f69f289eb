use anyhow::{Context, Result};
use log::info;
use serde_json::json;
use std::path::Path;
use uuid::Uuid;

use crate::cli::EnqueueArgs;
use crate::common::setup_logging;
use crate::store::{SqliteStore, Store};

/// Build the queue payload for a job
pub fn job_payload(args: &EnqueueArgs, id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "endpoint": args.endpoint.as_str(),
        "params": {
            "q": args.q,
            "list_size": args.list_size,
            "raw": args.raw,
        },
    })
}

/// Push one job and return its id; the result appears under `<id>_output` or downstream
pub fn run_enqueue(args: EnqueueArgs) -> Result<String> {
    setup_logging(&args.log_level)?;

    let id = args
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let store = SqliteStore::open(Path::new(&args.store))
        .with_context(|| format!("Failed to open store: {}", args.store))?;

    let payload = job_payload(&args, &id);
    store
        .push(&args.queue, &payload.to_string())
        .with_context(|| format!("Failed to push job to {}", args.queue))?;
    info!(
        "Queued {} job {} on '{}' ({} waiting)",
        args.endpoint.as_str(),
        id,
        args.queue,
        store.len(&args.queue)?
    );
    println!("{}", id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::JobEndpoint;
    use crate::worker::{Endpoint, Job};

    #[test]
    fn test_job_payload_is_a_valid_job() {
        let args = EnqueueArgs {
            store: "unused.db".to_string(),
            queue: "base".to_string(),
            endpoint: JobEndpoint::Search,
            q: "peatland".to_string(),
            list_size: 20,
            raw: true,
            id: None,
            log_level: "OFF".to_string(),
        };

        let payload = job_payload(&args, "job-1").to_string();
        let job = Job::parse(&payload, "base").unwrap();

        assert_eq!(job.id, "job-1");
        assert_eq!(job.endpoint, Endpoint::Search);
        assert_eq!(job.params.q, "peatland");
        assert_eq!(job.params.list_size, 20);
        assert!(job.params.raw);
    }
}
