use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::common::SearchParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Search,
    ContentProviders,
    #[serde(other)]
    Unknown,
}

/// One entry of the inbound job queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub endpoint: Endpoint,
    #[serde(default)]
    pub params: SearchParams,
}

impl Job {
    /// Decode a queue payload and stamp the worker's service onto its params
    pub fn parse(payload: &str, service: &str) -> Result<Self> {
        let mut job: Job = serde_json::from_str(payload)
            .with_context(|| format!("Malformed job payload: {}", payload))?;
        job.params.service = service.to_string();
        Ok(job)
    }

    /// Key of the per-job result slot
    pub fn output_key(&self) -> String {
        format!("{}_output", self.id)
    }
}
