//! In-memory store
//!
//! A transaction works on a clone of the state and swaps it in on commit.
//! The mutex stays held for the whole transaction, which makes every
//! transaction serializable.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::{MatchStore, StoreTx};
use crate::error::MatchError;
use crate::model::{
    PriorityEntry, RequestQuery, RequestState, SupervisionRequest, SupervisorCapacity, Tag, TagId,
    TagSimilarity,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_tag_id: TagId,
    tags: BTreeMap<TagId, String>,
    similarities: BTreeMap<(TagId, TagId), f64>,
    priorities: HashMap<String, Vec<PriorityEntry>>,
    capacities: BTreeMap<String, SupervisorCapacity>,
    requests: Vec<SupervisionRequest>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchStore for MemoryStore {
    fn with_transaction<T, F>(&self, f: F) -> Result<T, MatchError>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<T, MatchError>,
    {
        let mut committed = self
            .state
            .lock()
            .map_err(|e| MatchError::Internal(format!("Lock poisoned: {}", e)))?;

        let mut working = MemoryTx {
            state: committed.clone(),
        };
        let value = f(&mut working)?;
        *committed = working.state;
        Ok(value)
    }
}

struct MemoryTx {
    state: MemoryState,
}

impl MemoryTx {
    fn request_mut(&mut self, id: &str) -> Option<&mut SupervisionRequest> {
        self.state.requests.iter_mut().find(|r| r.id == id)
    }
}

impl StoreTx for MemoryTx {
    fn list_tags(&mut self) -> Result<Vec<Tag>, MatchError> {
        Ok(self
            .state
            .tags
            .iter()
            .map(|(id, name)| Tag { id: *id, name: name.clone() })
            .collect())
    }

    fn upsert_tag(&mut self, name: &str) -> Result<Tag, MatchError> {
        if let Some((id, _)) = self.state.tags.iter().find(|(_, n)| n.as_str() == name) {
            return Ok(Tag { id: *id, name: name.to_string() });
        }
        self.state.next_tag_id += 1;
        let id = self.state.next_tag_id;
        self.state.tags.insert(id, name.to_string());
        Ok(Tag { id, name: name.to_string() })
    }

    fn rename_tag(&mut self, id: TagId, name: &str) -> Result<bool, MatchError> {
        if self.state.tags.iter().any(|(other, n)| *other != id && n.as_str() == name) {
            return Err(MatchError::Database(format!("tag name '{}' already exists", name)));
        }
        match self.state.tags.get_mut(&id) {
            Some(existing) => {
                *existing = name.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list_similarities(&mut self) -> Result<Vec<TagSimilarity>, MatchError> {
        Ok(self
            .state
            .similarities
            .iter()
            .map(|(&(tag_a, tag_b), &score)| TagSimilarity { tag_a, tag_b, score })
            .collect())
    }

    fn replace_similarities(&mut self, similarities: &[TagSimilarity]) -> Result<(), MatchError> {
        self.state.similarities.clear();
        for sim in similarities {
            if self.state.similarities.insert(sim.key(), sim.score).is_some() {
                return Err(MatchError::Database(format!(
                    "duplicate similarity ({}, {})",
                    sim.tag_a, sim.tag_b
                )));
            }
        }
        Ok(())
    }

    fn priorities(&mut self, user_id: &str) -> Result<Vec<PriorityEntry>, MatchError> {
        let mut entries = self.state.priorities.get(user_id).cloned().unwrap_or_default();
        entries.sort_by_key(|e| e.priority);
        Ok(entries)
    }

    fn replace_priorities(&mut self, user_id: &str, entries: &[PriorityEntry]) -> Result<(), MatchError> {
        if entries.is_empty() {
            self.state.priorities.remove(user_id);
        } else {
            self.state.priorities.insert(user_id.to_string(), entries.to_vec());
        }
        Ok(())
    }

    fn capacity(&mut self, supervisor_id: &str) -> Result<Option<SupervisorCapacity>, MatchError> {
        Ok(self.state.capacities.get(supervisor_id).cloned())
    }

    fn list_capacities(&mut self) -> Result<Vec<SupervisorCapacity>, MatchError> {
        Ok(self.state.capacities.values().cloned().collect())
    }

    fn put_capacity(&mut self, capacity: &SupervisorCapacity) -> Result<(), MatchError> {
        if capacity.available_spots > capacity.total_spots {
            return Err(MatchError::Database(format!(
                "available_spots {} exceeds total_spots {}",
                capacity.available_spots, capacity.total_spots
            )));
        }
        self.state
            .capacities
            .insert(capacity.supervisor_id.clone(), capacity.clone());
        Ok(())
    }

    fn take_spot(&mut self, supervisor_id: &str) -> Result<bool, MatchError> {
        match self.state.capacities.get_mut(supervisor_id) {
            Some(cap) if cap.available_spots > 0 => {
                cap.available_spots -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn return_spot(&mut self, supervisor_id: &str) -> Result<bool, MatchError> {
        match self.state.capacities.get_mut(supervisor_id) {
            Some(cap) if cap.available_spots < cap.total_spots => {
                cap.available_spots += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn get_request(&mut self, id: &str) -> Result<Option<SupervisionRequest>, MatchError> {
        Ok(self.state.requests.iter().find(|r| r.id == id).cloned())
    }

    fn find_pending(
        &mut self,
        student_id: &str,
        supervisor_id: &str,
    ) -> Result<Option<SupervisionRequest>, MatchError> {
        Ok(self
            .state
            .requests
            .iter()
            .find(|r| {
                r.student_id == student_id
                    && r.supervisor_id == supervisor_id
                    && r.state == RequestState::Pending
            })
            .cloned())
    }

    fn insert_request(&mut self, request: &SupervisionRequest) -> Result<(), MatchError> {
        if self.state.requests.iter().any(|r| r.id == request.id) {
            return Err(MatchError::Database(format!("request {} already exists", request.id)));
        }
        if request.state == RequestState::Pending
            && self.find_pending(&request.student_id, &request.supervisor_id)?.is_some()
        {
            return Err(MatchError::Database(format!(
                "pending request exists for ({}, {})",
                request.student_id, request.supervisor_id
            )));
        }
        self.state.requests.push(request.clone());
        Ok(())
    }

    fn update_request_state(
        &mut self,
        id: &str,
        from: RequestState,
        to: RequestState,
        updated_at: &str,
    ) -> Result<bool, MatchError> {
        match self.request_mut(id) {
            Some(request) if request.state == from => {
                request.state = to;
                request.updated_at = updated_at.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn list_requests(&mut self, query: &RequestQuery) -> Result<Vec<SupervisionRequest>, MatchError> {
        let mut matching: Vec<SupervisionRequest> = self
            .state
            .requests
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[test]
    fn test_upsert_keeps_ids() {
        contract::upsert_keeps_ids(&MemoryStore::new());
    }

    #[test]
    fn test_rollback_on_error() {
        contract::rollback_on_error(&MemoryStore::new());
    }

    #[test]
    fn test_spot_bounds() {
        contract::spot_bounds(&MemoryStore::new());
    }

    #[test]
    fn test_request_state_cas() {
        contract::request_state_cas(&MemoryStore::new());
    }

    #[test]
    fn test_priorities_replace() {
        contract::priorities_replace(&MemoryStore::new());
    }

    #[test]
    fn test_similarities_replace() {
        contract::similarities_replace(&MemoryStore::new());
    }
}
