use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metadata_harvester::common::{RawRecord, SearchParams};
use metadata_harvester::gateway::{ProviderOutcome, SearchProvider};
use metadata_harvester::ratelimit::{RateLimitConfig, RateLimiter};
use metadata_harvester::store::{MemoryStore, Store};
use metadata_harvester::worker::{JobOutcome, Worker, WorkerConfig};

type SearchResponse = Result<ProviderOutcome<Vec<RawRecord>>>;

/// Scripted provider: hands out queued search responses in order
#[derive(Default)]
struct FakeProvider {
    searches: Mutex<VecDeque<SearchResponse>>,
    seen: Mutex<Vec<SearchParams>>,
    listing: Option<Vec<Value>>,
    listing_calls: AtomicUsize,
}

impl FakeProvider {
    fn with_listing(listing: Vec<Value>) -> Self {
        Self {
            listing: Some(listing),
            ..Default::default()
        }
    }

    fn push_search(&self, response: SearchResponse) {
        self.searches.lock().unwrap().push_back(response);
    }
}

impl SearchProvider for FakeProvider {
    fn search(&self, params: &SearchParams) -> SearchResponse {
        self.seen.lock().unwrap().push(params.clone());
        self.searches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted response")))
    }

    fn content_providers(&self) -> Result<ProviderOutcome<Vec<Value>>> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        match &self.listing {
            Some(listing) => Ok(ProviderOutcome::Success(listing.clone())),
            None => Err(anyhow!("listing script missing")),
        }
    }
}

fn listing() -> Vec<Value> {
    vec![
        json!({"name": "ftzenodo", "internal_name": "Zenodo"}),
        json!({"name": "ftarxiv", "internal_name": "arXiv.org e-Print Archive"}),
    ]
}

fn record(id: &str, provider: &str) -> RawRecord {
    RawRecord {
        content_provider: provider.to_string(),
        dctypenorm: "14".to_string(),
        title: format!("Title {}", id),
        authors: "Doe, Jane".to_string(),
        ..RawRecord::with_id(id)
    }
}

fn worker_on(store: Arc<MemoryStore>, provider: FakeProvider) -> Worker<FakeProvider> {
    let limiter = RateLimiter::new(
        store.clone(),
        RateLimitConfig {
            separation: 0.0,
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        },
    );
    Worker::new(
        store,
        limiter,
        provider,
        WorkerConfig {
            pop_timeout: Duration::from_millis(20),
            ..Default::default()
        },
    )
}

fn parse(payload: &str) -> Value {
    serde_json::from_str(payload).unwrap()
}

#[test]
fn test_search_result_is_queued_downstream() {
    let store = Arc::new(MemoryStore::new());
    let provider = FakeProvider::with_listing(listing());
    provider.push_search(Ok(ProviderOutcome::Success(vec![
        record("r1", "ftzenodo"),
        record("r2", "ftunknown"),
    ])));
    let worker = worker_on(store.clone(), provider);

    store
        .push("base", r#"{"id": "job-1", "endpoint": "search", "params": {"q": "soil"}}"#)
        .unwrap();
    let outcome = worker.run_once().unwrap();

    assert_eq!(outcome, Some(JobOutcome::Queued));
    assert_eq!(store.len("base").unwrap(), 0);
    assert_eq!(store.len("input_data").unwrap(), 1);

    let payload = parse(&store.pop("input_data", Duration::ZERO).unwrap().unwrap());
    assert_eq!(payload["id"], "job-1");
    assert_eq!(payload["params"]["q"], "soil");
    assert_eq!(payload["params"]["service"], "base");
    assert_eq!(payload["params"]["list_size"], 100);

    let metadata = parse(payload["input_data"]["metadata"].as_str().unwrap());
    let rows = metadata.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], "r1");
    assert_eq!(rows[0]["repo"], "Zenodo");
    assert_eq!(rows[0]["is_duplicate"], false);
    assert_eq!(rows[1]["repo"], "");

    let text = parse(payload["input_data"]["text"].as_str().unwrap());
    assert_eq!(text[0]["id"], "r1");
    assert!(text[0]["content"].as_str().unwrap().contains("Title r1"));

    assert!(store.get("job-1_output").unwrap().is_none());
}

#[test]
fn test_search_result_respects_list_size() {
    let store = Arc::new(MemoryStore::new());
    let provider = FakeProvider::with_listing(listing());
    provider.push_search(Ok(ProviderOutcome::Success(vec![
        record("r1", "ftzenodo"),
        record("r2", "ftzenodo"),
        record("r3", "ftzenodo"),
    ])));
    let worker = worker_on(store.clone(), provider);

    let outcome = worker
        .process(r#"{"id": "job-2", "endpoint": "search", "params": {"q": "x", "list_size": 2}}"#);

    assert_eq!(outcome, JobOutcome::Queued);
    let payload = parse(&store.pop("input_data", Duration::ZERO).unwrap().unwrap());
    let metadata = parse(payload["input_data"]["metadata"].as_str().unwrap());
    let ids: Vec<&str> = metadata
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["r1", "r2"]);
}

#[test]
fn test_raw_search_goes_to_output_slot() {
    let store = Arc::new(MemoryStore::new());
    let provider = FakeProvider::with_listing(listing());
    provider.push_search(Ok(ProviderOutcome::Success(vec![record("r1", "ftarxiv")])));
    let worker = worker_on(store.clone(), provider);

    let outcome =
        worker.process(r#"{"id": "job-3", "endpoint": "search", "params": {"q": "x", "raw": true}}"#);

    assert_eq!(outcome, JobOutcome::Stored);
    assert_eq!(store.len("input_data").unwrap(), 0);
    let result = parse(&store.get("job-3_output").unwrap().unwrap());
    assert_eq!(result["id"], "job-3");
    assert_eq!(result["params"]["raw"], true);
    let metadata = parse(result["input_data"]["metadata"].as_str().unwrap());
    assert_eq!(metadata[0]["repo"], "arXiv.org e-Print Archive");
}

#[test]
fn test_provider_error_payload_is_stored_verbatim() {
    let store = Arc::new(MemoryStore::new());
    let provider = FakeProvider::with_listing(listing());
    provider.push_search(Ok(ProviderOutcome::Failed(
        json!({"status": "error", "reason": ["API error: timeout"]}),
    )));
    let worker = worker_on(store.clone(), provider);

    let outcome = worker.process(r#"{"id": "job-4", "endpoint": "search", "params": {"q": "x"}}"#);

    assert_eq!(outcome, JobOutcome::Stored);
    assert_eq!(store.len("input_data").unwrap(), 0);
    let result = parse(&store.get("job-4_output").unwrap().unwrap());
    assert_eq!(result["status"], "error");
    assert_eq!(result["reason"][0], "API error: timeout");
    assert_eq!(result["id"], "job-4");
}

#[test]
fn test_failed_job_does_not_stop_the_worker() {
    let store = Arc::new(MemoryStore::new());
    let provider = FakeProvider::with_listing(listing());
    provider.push_search(Err(anyhow!("provider crashed")));
    provider.push_search(Ok(ProviderOutcome::Success(vec![record("r1", "ftzenodo")])));
    let worker = worker_on(store.clone(), provider);

    store
        .push("base", r#"{"id": "bad", "endpoint": "search", "params": {"q": "x"}}"#)
        .unwrap();
    store
        .push("base", r#"{"id": "good", "endpoint": "search", "params": {"q": "y"}}"#)
        .unwrap();

    assert_eq!(worker.run_once().unwrap(), Some(JobOutcome::Failed));
    assert_eq!(worker.run_once().unwrap(), Some(JobOutcome::Queued));
    assert!(store.get("bad_output").unwrap().is_none());

    let payload = parse(&store.pop("input_data", Duration::ZERO).unwrap().unwrap());
    assert_eq!(payload["id"], "good");
}

#[test]
fn test_duplicate_ids_fail_only_that_job() {
    let store = Arc::new(MemoryStore::new());
    let provider = FakeProvider::with_listing(listing());
    provider.push_search(Ok(ProviderOutcome::Success(vec![
        record("same", "ftzenodo"),
        record("same", "ftzenodo"),
    ])));
    let worker = worker_on(store.clone(), provider);

    let outcome = worker.process(r#"{"id": "job-5", "endpoint": "search", "params": {"q": "x"}}"#);

    assert_eq!(outcome, JobOutcome::Failed);
    assert_eq!(store.len("input_data").unwrap(), 0);
}

#[test]
fn test_contentproviders_endpoint_writes_listing() {
    let store = Arc::new(MemoryStore::new());
    let provider = FakeProvider::with_listing(listing());
    let worker = worker_on(store.clone(), provider);

    let outcome = worker.process(r#"{"id": "job-6", "endpoint": "contentproviders"}"#);

    assert_eq!(outcome, JobOutcome::Stored);
    let result = parse(&store.get("job-6_output").unwrap().unwrap());
    assert_eq!(result["id"], "job-6");
    let providers = parse(result["contentproviders"].as_str().unwrap());
    assert_eq!(providers.as_array().unwrap().len(), 2);
    assert_eq!(providers[0]["name"], "ftzenodo");
}

#[test]
fn test_unknown_endpoint_and_garbage_are_skipped() {
    let store = Arc::new(MemoryStore::new());
    let worker = worker_on(store.clone(), FakeProvider::with_listing(listing()));

    assert_eq!(
        worker.process(r#"{"id": "job-7", "endpoint": "export"}"#),
        JobOutcome::Skipped
    );
    assert_eq!(worker.process("{not json"), JobOutcome::Skipped);
    assert!(store.get("job-7_output").unwrap().is_none());
}

#[test]
fn test_missing_listing_leaves_map_empty() {
    let store = Arc::new(MemoryStore::new());
    let provider = FakeProvider::default();
    provider.push_search(Ok(ProviderOutcome::Success(vec![record("r1", "ftzenodo")])));
    let worker = worker_on(store.clone(), provider);

    assert!(worker.content_providers().is_empty());
    assert_eq!(
        worker.process(r#"{"id": "job-8", "endpoint": "search", "params": {"q": "x"}}"#),
        JobOutcome::Queued
    );
    let payload = parse(&store.pop("input_data", Duration::ZERO).unwrap().unwrap());
    let metadata = parse(payload["input_data"]["metadata"].as_str().unwrap());
    assert_eq!(metadata[0]["repo"], "");
}

#[test]
fn test_empty_queue_yields_no_job() {
    let store = Arc::new(MemoryStore::new());
    let worker = worker_on(store.clone(), FakeProvider::with_listing(listing()));

    assert_eq!(worker.run_once().unwrap(), None);
}

#[test]
fn test_run_stops_after_max_jobs() {
    let store = Arc::new(MemoryStore::new());
    let provider = FakeProvider::with_listing(listing());
    provider.push_search(Ok(ProviderOutcome::Success(vec![record("r1", "ftzenodo")])));
    let limiter = RateLimiter::new(
        store.clone(),
        RateLimitConfig {
            separation: 0.0,
            ..Default::default()
        },
    );
    let worker = Worker::new(
        store.clone(),
        limiter,
        provider,
        WorkerConfig {
            pop_timeout: Duration::from_millis(20),
            max_jobs: Some(2),
            ..Default::default()
        },
    );

    store
        .push("base", r#"{"id": "a", "endpoint": "search", "params": {"q": "x"}}"#)
        .unwrap();
    store
        .push("base", r#"{"id": "b", "endpoint": "contentproviders"}"#)
        .unwrap();
    worker.run();

    assert_eq!(store.len("base").unwrap(), 0);
    assert_eq!(store.len("input_data").unwrap(), 1);
    assert!(store.get("b_output").unwrap().is_some());
}
