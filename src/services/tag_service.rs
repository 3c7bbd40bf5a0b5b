//! Tag service - owns the live tag graph
//!
//! Readers take an `Arc<TagGraph>` snapshot and score against it without
//! holding any lock. Writers persist through one store transaction and then
//! swap in a freshly loaded snapshot, so a reader sees either the old graph
//! or the new one in full.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{info, warn};

use crate::error::MatchError;
use crate::graph::{GraphStats, TagGraph};
use crate::model::{Tag, TagId, TagImport, TagSimilarity};
use crate::store::{MatchStore, StoreTx};
use crate::validation::{validate_tag_import, validate_tag_name};

use super::events::{EventBus, MatchEvent};

pub struct TagService<S> {
    store: Arc<S>,
    events: Arc<EventBus>,
    graph: RwLock<Arc<TagGraph>>,
    /// Serializes writers so the swapped snapshot matches the last commit
    write_lock: Mutex<()>,
}

fn read_graph(tx: &mut dyn StoreTx) -> Result<TagGraph, MatchError> {
    Ok(TagGraph::new(tx.list_tags()?, tx.list_similarities()?))
}

impl<S: MatchStore> TagService<S> {
    /// Create the service with the graph currently persisted in `store`
    pub fn load(store: Arc<S>, events: Arc<EventBus>) -> Result<Self, MatchError> {
        let graph = store.with_transaction(read_graph)?;
        let stats = graph.stats();
        info!(tags = stats.tag_count, similarities = stats.similarity_count, "Loaded tag graph");

        Ok(Self {
            store,
            events,
            graph: RwLock::new(Arc::new(graph)),
            write_lock: Mutex::new(()),
        })
    }

    /// Current graph snapshot
    pub fn snapshot(&self) -> Result<Arc<TagGraph>, MatchError> {
        let graph = self
            .graph
            .read()
            .map_err(|e| MatchError::Internal(format!("Lock poisoned: {}", e)))?;
        Ok(Arc::clone(&graph))
    }

    pub fn tags(&self) -> Result<Vec<Tag>, MatchError> {
        Ok(self.snapshot()?.tags())
    }

    pub fn stats(&self) -> Result<GraphStats, MatchError> {
        Ok(self.snapshot()?.stats())
    }

    /// Replace the similarity set wholesale and upsert the listed tags.
    ///
    /// Either the whole import lands or nothing changes. Existing tag names
    /// keep their ids so stored priorities stay valid.
    pub fn bulk_replace(&self, import: &TagImport) -> Result<GraphStats, MatchError> {
        let validated = validate_tag_import(import).map_err(|e| {
            warn!(error = %e, "Rejected tag import");
            e
        })?;

        let _writer = self.lock_writer()?;

        let graph = self.store.with_transaction(|tx| {
            let mut ids: HashMap<String, TagId> = HashMap::with_capacity(validated.tags.len());
            for name in &validated.tags {
                let tag = tx.upsert_tag(name)?;
                ids.insert(tag.name, tag.id);
            }

            let lookup = |name: &String| {
                ids.get(name)
                    .copied()
                    .ok_or_else(|| MatchError::Internal(format!("tag '{}' missing after upsert", name)))
            };
            let similarities = validated
                .similarities
                .iter()
                .map(|(a, b, score)| -> Result<TagSimilarity, MatchError> {
                    Ok(TagSimilarity::new(lookup(a)?, lookup(b)?, *score))
                })
                .collect::<Result<Vec<_>, _>>()?;

            tx.replace_similarities(&similarities)?;
            read_graph(tx)
        })?;

        let stats = graph.stats();
        self.swap(graph)?;

        info!(
            imported_tags = validated.tags.len(),
            tags = stats.tag_count,
            similarities = stats.similarity_count,
            "Tag graph replaced"
        );
        self.events.emit(MatchEvent::TagGraphReplaced {
            tag_count: stats.tag_count,
            similarity_count: stats.similarity_count,
        });

        Ok(stats)
    }

    /// Rename a tag; similarities and priorities follow the id
    pub fn rename(&self, tag_id: TagId, name: &str) -> Result<Tag, MatchError> {
        let name = validate_tag_name(name)?;
        let _writer = self.lock_writer()?;

        let graph = self.store.with_transaction(|tx| {
            if let Some(existing) = tx.list_tags()?.into_iter().find(|t| t.name == name) {
                if existing.id != tag_id {
                    return Err(MatchError::Validation(format!(
                        "tag name '{}' is already used by tag {}",
                        name, existing.id
                    )));
                }
            }
            if !tx.rename_tag(tag_id, &name)? {
                return Err(MatchError::NotFound(format!("tag {}", tag_id)));
            }
            read_graph(tx)
        })?;

        self.swap(graph)?;

        info!(tag_id, name = %name, "Tag renamed");
        self.events.emit(MatchEvent::TagRenamed {
            tag_id,
            name: name.clone(),
        });

        Ok(Tag { id: tag_id, name })
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, ()>, MatchError> {
        self.write_lock
            .lock()
            .map_err(|e| MatchError::Internal(format!("Lock poisoned: {}", e)))
    }

    fn swap(&self, graph: TagGraph) -> Result<(), MatchError> {
        let mut current = self
            .graph
            .write()
            .map_err(|e| MatchError::Internal(format!("Lock poisoned: {}", e)))?;
        *current = Arc::new(graph);
        Ok(())
    }
}
