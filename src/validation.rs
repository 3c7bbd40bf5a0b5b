//! Input validation
//!
//! Every mutation validates its input here before any store access. The
//! scorer trusts the tag graph unguarded, so the checks for the graph live at
//! ingestion rather than on the scoring path.

use std::collections::{HashMap, HashSet};

use crate::error::MatchError;
use crate::model::{PriorityEntry, SupervisorCapacity, TagId, TagImport};

/// Tag import that passed validation; names are trimmed
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedImport {
    pub tags: Vec<String>,
    /// `(name_a, name_b, score)` with `name_a < name_b`
    pub similarities: Vec<(String, String, f64)>,
}

pub fn validate_tag_name(name: &str) -> Result<String, MatchError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(MatchError::Validation("tag name must not be empty".into()));
    }
    Ok(trimmed.to_string())
}

pub fn validate_user_id(field: &str, id: &str) -> Result<(), MatchError> {
    if id.trim().is_empty() {
        return Err(MatchError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Validate a bulk tag import as a whole; the first violation rejects it.
pub fn validate_tag_import(import: &TagImport) -> Result<ValidatedImport, MatchError> {
    let mut tags = Vec::with_capacity(import.tags.len());
    let mut names = HashSet::with_capacity(import.tags.len());

    for (i, raw) in import.tags.iter().enumerate() {
        let name = validate_tag_name(raw)
            .map_err(|e| MatchError::Validation(format!("tags[{}]: {}", i, e)))?;
        if !names.insert(name.clone()) {
            return Err(MatchError::Validation(format!(
                "tags[{}]: duplicate tag '{}'",
                i, name
            )));
        }
        tags.push(name);
    }

    let mut seen: HashMap<(String, String), usize> = HashMap::new();
    let mut similarities = Vec::with_capacity(import.similarities.len());

    for (i, sim) in import.similarities.iter().enumerate() {
        let a = sim.field1.trim();
        let b = sim.field2.trim();

        for name in [a, b] {
            if !names.contains(name) {
                return Err(MatchError::Validation(format!(
                    "similarities[{}]: tag '{}' is not in tags",
                    i, name
                )));
            }
        }

        if a == b {
            return Err(MatchError::Validation(format!(
                "similarities[{}]: self-similarity of '{}' is implicit",
                i, a
            )));
        }

        if !sim.similarity_score.is_finite() || !(0.0..=1.0).contains(&sim.similarity_score) {
            return Err(MatchError::Validation(format!(
                "similarities[{}]: similarity_score {} must be between 0.0 and 1.0",
                i, sim.similarity_score
            )));
        }

        let key = if a < b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        if let Some(first) = seen.insert(key.clone(), i) {
            return Err(MatchError::Validation(format!(
                "similarities[{}]: pair ({}, {}) already given at similarities[{}]",
                i, key.0, key.1, first
            )));
        }

        similarities.push((key.0, key.1, sim.similarity_score));
    }

    Ok(ValidatedImport { tags, similarities })
}

/// Priorities must be a permutation of `1..=N` over distinct, known tags.
pub fn validate_priorities<F>(entries: &[PriorityEntry], tag_exists: F) -> Result<(), MatchError>
where
    F: Fn(TagId) -> bool,
{
    let n = entries.len();
    let mut tags = HashSet::with_capacity(n);
    let mut slots = vec![false; n];

    for entry in entries {
        if !tag_exists(entry.tag_id) {
            return Err(MatchError::Validation(format!(
                "tag {} does not exist",
                entry.tag_id
            )));
        }
        if !tags.insert(entry.tag_id) {
            return Err(MatchError::Validation(format!(
                "tag {} is listed more than once",
                entry.tag_id
            )));
        }

        let p = entry.priority as usize;
        if p == 0 || p > n {
            return Err(MatchError::Validation(format!(
                "priority {} is outside 1..={}",
                entry.priority, n
            )));
        }
        if slots[p - 1] {
            return Err(MatchError::Validation(format!(
                "priority {} is used more than once",
                entry.priority
            )));
        }
        slots[p - 1] = true;
    }

    // n distinct values in 1..=n cover every slot
    Ok(())
}

/// Resizing keeps the accepted count, so it cannot drop below it.
pub fn validate_total_spots(
    current: Option<&SupervisorCapacity>,
    total_spots: u32,
) -> Result<(), MatchError> {
    if let Some(cap) = current {
        let accepted = cap.accepted();
        if total_spots < accepted {
            return Err(MatchError::Validation(format!(
                "total_spots {} is below the {} accepted students of {}",
                total_spots, accepted, cap.supervisor_id
            )));
        }
    }
    Ok(())
}
