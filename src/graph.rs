//! Tag graph snapshot
//!
//! An immutable view of every tag and every pairwise similarity. The tag
//! service swaps whole snapshots behind an `Arc`, so a scorer holding one
//! never observes a half-applied import.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::model::{Tag, TagId, TagSimilarity};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagGraph {
    tags: BTreeMap<TagId, String>,
    by_name: HashMap<String, TagId>,
    similarities: HashMap<(TagId, TagId), f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub tag_count: usize,
    pub similarity_count: usize,
}

impl TagGraph {
    pub fn new(tags: Vec<Tag>, similarities: Vec<TagSimilarity>) -> Self {
        let by_name = tags.iter().map(|t| (t.name.clone(), t.id)).collect();
        let tags = tags.into_iter().map(|t| (t.id, t.name)).collect();
        let similarities = similarities.into_iter().map(|s| (s.key(), s.score)).collect();
        Self {
            tags,
            by_name,
            similarities,
        }
    }

    /// 1.0 for the same tag, the stored score for a known pair, else 0.0
    pub fn similarity(&self, a: TagId, b: TagId) -> f64 {
        if a == b {
            return 1.0;
        }
        let key = if a < b { (a, b) } else { (b, a) };
        self.similarities.get(&key).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, id: TagId) -> bool {
        self.tags.contains_key(&id)
    }

    pub fn tag_id(&self, name: &str) -> Option<TagId> {
        self.by_name.get(name).copied()
    }

    pub fn tag_name(&self, id: TagId) -> Option<&str> {
        self.tags.get(&id).map(String::as_str)
    }

    /// All tags ordered by id
    pub fn tags(&self) -> Vec<Tag> {
        self.tags
            .iter()
            .map(|(id, name)| Tag { id: *id, name: name.clone() })
            .collect()
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            tag_count: self.tags.len(),
            similarity_count: self.similarities.len(),
        }
    }
}
