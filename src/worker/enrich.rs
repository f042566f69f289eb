use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::dedup::DedupedRecord;

/// Content-provider code -> display name, built once per worker
#[derive(Debug, Clone, Default)]
pub struct ContentProviderMap {
    names: HashMap<String, String>,
}

impl ContentProviderMap {
    /// Build from listing records, keyed by `name` with `internal_name` as value
    pub fn from_records(records: &[Value]) -> Self {
        let names = records
            .iter()
            .filter_map(|record| {
                let name = record.get("name")?.as_str()?;
                let internal = record.get("internal_name")?.as_str()?;
                Some((name.to_string(), internal.to_string()))
            })
            .collect();
        Self { names }
    }

    /// Display name for a provider code, blank when unknown
    pub fn repo_name(&self, content_provider: &str) -> &str {
        self.names
            .get(content_provider)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A canonical record with enrichment fields, as sent downstream
#[derive(Debug, Clone, Serialize)]
pub struct MetadataRow {
    #[serde(flatten)]
    pub record: DedupedRecord,
    pub repo: String,
}

/// Concatenated descriptive text of one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextRow {
    pub id: String,
    pub content: String,
}

pub fn enrich_metadata(records: Vec<DedupedRecord>, providers: &ContentProviderMap) -> Vec<MetadataRow> {
    records
        .into_iter()
        .map(|mut record| {
            record.record.extra.remove("repo");
            let repo = providers.repo_name(&record.record.content_provider).to_string();
            MetadataRow { record, repo }
        })
        .collect()
}

pub fn text_rows(rows: &[MetadataRow]) -> Vec<TextRow> {
    rows.iter()
        .map(|row| {
            let r = &row.record.record;
            TextRow {
                id: r.id.clone(),
                content: [
                    r.title.as_str(),
                    r.paper_abstract.as_str(),
                    r.subject_orig.as_str(),
                    r.published_in.as_str(),
                    r.authors.as_str(),
                ]
                .join(" "),
            }
        })
        .collect()
}
