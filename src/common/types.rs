use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Default number of records handed downstream per search
pub const DEFAULT_LIST_SIZE: usize = 100;

/// One row of provider metadata output.
///
/// Fields the dedup heuristics read are typed; every other provider column is kept
/// verbatim in `extra` so it survives to the downstream payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(deserialize_with = "scalar_string")]
    pub id: String,
    /// Only string DOIs count; anything else is treated as absent
    #[serde(default, deserialize_with = "string_only")]
    pub doi: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub link: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub identifier: String,
    /// Comma-separated ids the provider flagged as related
    #[serde(default, deserialize_with = "scalar_string")]
    pub duplicates: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub content_provider: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub dctypenorm: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub oa_state: String,
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub year: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub title: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub paper_abstract: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub subject_orig: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub published_in: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub authors: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawRecord {
    /// Convenience constructor used by tests and benches
    pub fn with_id(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    /// The DOI as a string slice, empty when absent
    pub fn doi_str(&self) -> &str {
        self.doi.as_deref().unwrap_or("")
    }

    pub fn is_open_access(&self) -> bool {
        self.oa_state == "1"
    }

    /// Document-type code 121 marks a journal article
    pub fn is_journal_article(&self) -> bool {
        self.dctypenorm.contains("121")
    }
}

/// Search parameters carried by a job; unknown keys are passed through to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default, deserialize_with = "scalar_string")]
    pub q: String,
    #[serde(default = "default_list_size", deserialize_with = "lenient_usize")]
    pub list_size: usize,
    #[serde(default)]
    pub raw: bool,
    #[serde(default, deserialize_with = "scalar_string")]
    pub service: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            q: String::new(),
            list_size: DEFAULT_LIST_SIZE,
            raw: false,
            service: String::new(),
            extra: Map::new(),
        }
    }
}

fn default_list_size() -> usize {
    DEFAULT_LIST_SIZE
}

/// Statistics from an offline dedup run
#[derive(Debug, Clone, Default)]
pub struct DedupStats {
    pub input_records: usize,
    pub canonical_records: usize,
    pub written_records: usize,
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_to_string(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn optional_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_to_string(Value::deserialize(deserializer)?))
}

fn string_only<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

fn lenient_usize<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        Value::Null => Some(DEFAULT_LIST_SIZE),
        _ => None,
    };
    parsed.ok_or_else(|| serde::de::Error::custom(format!("invalid list_size: {}", value)))
}
