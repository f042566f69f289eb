pub mod process;

pub use process::{ProcessGateway, ProcessGatewayConfig};

use anyhow::Result;
use serde_json::Value;

use crate::common::{RawRecord, SearchParams};

/// What the provider handed back: data, or its own tagged error payload
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome<T> {
    Success(T),
    /// A payload carrying `status: "error"`, passed through verbatim
    Failed(Value),
}

/// The external search provider
pub trait SearchProvider {
    /// Run a search and return the raw metadata rows
    fn search(&self, params: &SearchParams) -> Result<ProviderOutcome<Vec<RawRecord>>>;

    /// List the provider's content sources as raw records (`name`, `internal_name`, ...)
    fn content_providers(&self) -> Result<ProviderOutcome<Vec<Value>>>;
}

/// Whether a payload is the provider's tagged error object
pub fn is_error_payload(value: &Value) -> bool {
    value.get("status").and_then(Value::as_str) == Some("error")
}
