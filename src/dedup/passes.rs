//! The ordered passes of the dedup pipeline.
//!
//! Each pass reads and updates the working state of a [`Batch`] and touches nothing else,
//! so every pass can be exercised on its own. Order matters: later passes correct the
//! false positives and negatives left by the coarser, provider-declared duplicate hints.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::record::{Batch, DedupedRecord, DuplicateIndex, Versions};

/// Group record positions by a key, skipping empty keys; groups keep first-seen order
fn group_by_key<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<Vec<usize>> {
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (pos, key) in keys.enumerate() {
        if key.is_empty() {
            continue;
        }
        let slot = *slots.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(pos);
    }
    groups
}

/// Descending order with absent values last
fn descending_present_first<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// For every record, collect the records whose duplicate list names it
pub fn find_duplicate_indexes(batch: &Batch) -> DuplicateIndex {
    let mut index: DuplicateIndex = vec![Vec::new(); batch.len()];
    for (pos, state) in batch.state.iter().enumerate() {
        for id in &state.duplicates {
            if let Some(named) = batch.position(id) {
                index[named].push(pos);
            }
        }
    }
    index
}

/// Seed the flags that depend on provider-declared clusters
///
/// A record outside every multi-member cluster is its own canonical representative.
/// `is_duplicate` stays as the provider reported it, or is raised when the provider
/// linked the record to any other id.
pub fn seed_cluster_flags(batch: &mut Batch, clusters: &DuplicateIndex) {
    let mut clustered = vec![false; batch.len()];
    for members in clusters.iter().filter(|m| m.len() > 1) {
        for &i in members {
            clustered[i] = true;
        }
    }

    for (pos, state) in batch.state.iter_mut().enumerate() {
        state.keep = !clustered[pos];
        if state.duplicates.len() > 1 || clustered[pos] {
            state.is_duplicate = true;
        }
    }
}

pub fn mark_duplicate_dois(batch: &mut Batch) {
    let groups = group_by_key(batch.records.iter().map(|r| r.doi_str()));
    for group in groups.into_iter().filter(|g| g.len() > 1) {
        for i in group {
            batch.state[i].doi_duplicate = true;
        }
    }
}

pub fn mark_duplicate_links(batch: &mut Batch) {
    let groups = group_by_key(batch.records.iter().map(|r| r.link.as_str()));
    for group in groups.into_iter().filter(|g| g.len() > 1) {
        for i in group {
            batch.state[i].link_duplicate = true;
        }
    }
}

/// Link records sharing an unversioned DOI that also carry it in their identifier
pub fn identify_relations(batch: &mut Batch) {
    let groups = group_by_key(batch.state.iter().map(|s| s.doi.unversioned.as_str()));
    for group in groups {
        let udoi = batch.state[group[0]].doi.unversioned.clone();
        let related: Vec<usize> = group
            .into_iter()
            .filter(|&i| batch.records[i].identifier.contains(&udoi))
            .collect();
        if related.len() < 2 {
            continue;
        }
        let ids = batch.ids(&related);
        for i in related {
            batch.state[i].relations = Some(ids.clone());
            batch.state[i].has_relations = true;
        }
    }
}

/// Drop duplicate flags an exact DOI or link match does not corroborate
pub fn remove_false_positives(batch: &mut Batch) {
    for (record, state) in batch.records.iter().zip(batch.state.iter_mut()) {
        if !record.doi_str().is_empty() && state.is_duplicate && !state.doi_duplicate {
            state.is_duplicate = false;
        }
        if !record.link.is_empty() && state.is_duplicate && !state.link_duplicate {
            state.is_duplicate = false;
        }
    }
}

/// Pick one representative per provider-declared cluster
///
/// Members with a publisher DOI win; otherwise the greatest DOI, then the greatest
/// year, decides. Ties keep input order so identical batches give identical output.
pub fn remove_textual_duplicates_from_different_sources(
    batch: &mut Batch,
    clusters: &DuplicateIndex,
) {
    for members in clusters.iter().filter(|m| m.len() > 1) {
        for &i in members {
            batch.state[i].is_duplicate = true;
            batch.state[i].is_latest = false;
        }

        let with_publisher: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&i| !batch.state[i].doi.publisher.is_empty())
            .collect();

        if !with_publisher.is_empty() {
            for &i in members {
                batch.state[i].keep = false;
            }
            for i in with_publisher {
                batch.state[i].is_latest = true;
                batch.state[i].keep = true;
            }
        } else {
            let records = &batch.records;
            let newest = members.iter().copied().min_by(|&a, &b| {
                descending_present_first(records[a].doi.as_deref(), records[b].doi.as_deref())
                    .then_with(|| {
                        descending_present_first(
                            records[a].year.as_deref(),
                            records[b].year.as_deref(),
                        )
                    })
            });
            if let Some(i) = newest {
                batch.state[i].is_latest = true;
                batch.state[i].keep = true;
            }
        }
    }
}

/// Within each unversioned-DOI cluster only the highest version stays latest
pub fn mark_latest_doi(batch: &mut Batch) {
    let groups = group_by_key(batch.state.iter().map(|s| s.doi.unversioned.as_str()));
    for group in groups {
        let latest = group
            .iter()
            .copied()
            .min_by(|&a, &b| {
                descending_present_first(batch.state[a].doi.version, batch.state[b].doi.version)
            })
            .unwrap_or(group[0]);

        let versions = Versions {
            versions: batch.ids(&group),
            latest: vec![batch.records[latest].id.clone()],
        };
        for &i in &group {
            batch.state[i].is_latest = false;
            batch.state[i].versions = Some(versions.clone());
        }
        batch.state[latest].is_latest = true;
    }
}

/// Exact DOI or link matches always count as duplicates
pub fn add_false_negatives(batch: &mut Batch) {
    for state in batch.state.iter_mut() {
        if !state.is_duplicate && (state.link_duplicate || state.doi_duplicate) {
            state.is_duplicate = true;
        }
    }
}

/// Prefer an open-access member as the kept record of each provider-declared cluster
pub fn prioritize_open_access(batch: &mut Batch, clusters: &DuplicateIndex) {
    for members in clusters.iter().filter(|m| m.len() > 1) {
        let open: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&i| batch.records[i].is_open_access())
            .collect();

        let candidates = if open.is_empty() {
            members.as_slice()
        } else {
            for &i in members {
                batch.state[i].keep = false;
            }
            open.as_slice()
        };

        let chosen = candidates
            .iter()
            .copied()
            .find(|&i| batch.state[i].is_latest)
            .or_else(|| candidates.first().copied());
        if let Some(i) = chosen {
            batch.state[i].keep = true;
        }
    }
}

/// Journal articles survive when latest, everything else when kept; input order is preserved
pub fn select_canonical(batch: Batch) -> Vec<DedupedRecord> {
    batch
        .records
        .into_iter()
        .zip(batch.state)
        .filter(|(record, state)| {
            if record.is_journal_article() {
                state.is_latest
            } else {
                state.keep
            }
        })
        .map(|(record, state)| DedupedRecord::new(record, state))
        .collect()
}
