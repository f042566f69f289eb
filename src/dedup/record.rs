use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::HashMap;

use super::doi::DoiFields;
use crate::common::RawRecord;

/// Provider columns that collide with fields the engine writes on output
const DERIVED_OUTPUT_KEYS: &[&str] = &["is_duplicate", "relations"];

/// Version summary attached to every member of an unversioned-DOI cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Versions {
    pub versions: Vec<String>,
    pub latest: Vec<String>,
}

/// Working state derived for one record; never outlives the dedup run
#[derive(Debug, Clone, Default)]
pub struct RecordState {
    /// Provider-declared duplicate ids, always including the record's own id
    pub duplicates: Vec<String>,
    pub doi: DoiFields,
    pub doi_duplicate: bool,
    pub link_duplicate: bool,
    pub has_relations: bool,
    pub relations: Option<Vec<String>>,
    pub is_latest: bool,
    pub versions: Option<Versions>,
    pub keep: bool,
    pub is_duplicate: bool,
}

/// For each record (by position), the positions of all records whose duplicate list names it
pub type DuplicateIndex = Vec<Vec<usize>>;

/// Arena of records plus their derived state, addressed by position
#[derive(Debug, Clone)]
pub struct Batch {
    pub records: Vec<RawRecord>,
    pub state: Vec<RecordState>,
    positions: HashMap<String, usize>,
}

impl Batch {
    /// Build a batch, normalising duplicate lists and deriving DOI fields
    pub fn new(records: Vec<RawRecord>) -> Result<Self> {
        let mut positions = HashMap::with_capacity(records.len());
        for (pos, record) in records.iter().enumerate() {
            if positions.insert(record.id.clone(), pos).is_some() {
                bail!("Duplicate record id in batch: {}", record.id);
            }
        }

        let state = records
            .iter()
            .map(|record| RecordState {
                duplicates: self_included_duplicates(record),
                doi: DoiFields::derive(record.doi.as_deref()),
                is_latest: true,
                is_duplicate: record
                    .extra
                    .get("is_duplicate")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
                ..Default::default()
            })
            .collect();

        Ok(Self {
            records,
            state,
            positions,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Position of the record with the given id
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn ids(&self, members: &[usize]) -> Vec<String> {
        members.iter().map(|&i| self.records[i].id.clone()).collect()
    }
}

fn self_included_duplicates(record: &RawRecord) -> Vec<String> {
    let mut ids = vec![record.id.clone()];
    for id in record.duplicates.split(',').map(str::trim) {
        if !id.is_empty() && !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

/// A canonical record as handed downstream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupedRecord {
    #[serde(flatten)]
    pub record: RawRecord,
    pub is_duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relations: Option<Vec<String>>,
}

impl DedupedRecord {
    pub fn new(mut record: RawRecord, state: RecordState) -> Self {
        for key in DERIVED_OUTPUT_KEYS {
            record.extra.remove(*key);
        }
        Self {
            record,
            is_duplicate: state.is_duplicate,
            relations: state.relations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, duplicates: &str) -> RawRecord {
        RawRecord {
            duplicates: duplicates.to_string(),
            ..RawRecord::with_id(id)
        }
    }

    #[test]
    fn test_duplicates_self_included() {
        let batch = Batch::new(vec![record("a", "b, c"), record("d", "")]).unwrap();
        assert_eq!(batch.state[0].duplicates, vec!["a", "b", "c"]);
        assert_eq!(batch.state[1].duplicates, vec!["d"]);
    }

    #[test]
    fn test_duplicates_no_repeated_self() {
        let batch = Batch::new(vec![record("a", "a,b,b")]).unwrap();
        assert_eq!(batch.state[0].duplicates, vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        assert!(Batch::new(vec![record("a", ""), record("a", "")]).is_err());
    }

    #[test]
    fn test_position_lookup() {
        let batch = Batch::new(vec![record("a", ""), record("b", "")]).unwrap();
        assert_eq!(batch.position("b"), Some(1));
        assert_eq!(batch.position("z"), None);
        assert_eq!(batch.ids(&[1, 0]), vec!["b", "a"]);
    }

    #[test]
    fn test_provider_duplicate_flag_seeds_state() {
        let mut flagged = record("a", "");
        flagged.extra.insert("is_duplicate".to_string(), true.into());
        let batch = Batch::new(vec![flagged]).unwrap();
        assert!(batch.state[0].is_duplicate);
        assert!(batch.state[0].is_latest);
    }

    #[test]
    fn test_deduped_record_drops_colliding_columns() {
        let mut raw = record("a", "");
        raw.extra.insert("relations".to_string(), "stale".into());
        raw.extra.insert("lang".to_string(), "eng".into());
        let out = DedupedRecord::new(raw, RecordState::default());
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["lang"], "eng");
        assert_eq!(json["is_duplicate"], false);
        assert!(json.get("relations").is_none());
    }
}
