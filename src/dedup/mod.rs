//! Reduction of a provider batch to one canonical record per logical work.

pub mod doi;
pub mod passes;
pub mod record;

pub use doi::*;
pub use passes::*;
pub use record::{Batch, DedupedRecord, DuplicateIndex, RecordState, Versions};

use anyhow::Result;
use log::debug;

use crate::common::RawRecord;

/// Run the full dedup pipeline over one batch and return the canonical subset in input order
pub fn filter_duplicates(records: Vec<RawRecord>) -> Result<Vec<DedupedRecord>> {
    let input = records.len();
    let mut batch = Batch::new(records)?;
    let clusters = find_duplicate_indexes(&batch);
    seed_cluster_flags(&mut batch, &clusters);

    mark_duplicate_dois(&mut batch);
    mark_duplicate_links(&mut batch);
    identify_relations(&mut batch);
    remove_false_positives(&mut batch);
    remove_textual_duplicates_from_different_sources(&mut batch, &clusters);
    mark_latest_doi(&mut batch);
    add_false_negatives(&mut batch);
    prioritize_open_access(&mut batch, &clusters);

    let canonical = select_canonical(batch);
    debug!("Dedup kept {} of {} records", canonical.len(), input);
    Ok(canonical)
}
