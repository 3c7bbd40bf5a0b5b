//! Profile service - per-user tag priorities

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::error::MatchError;
use crate::model::{PriorityEntry, PriorityProfile};
use crate::store::MatchStore;
use crate::validation::{validate_priorities, validate_user_id};

use super::events::{EventBus, MatchEvent};
use super::tag_service::TagService;

/// Priority update as received from a client
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityUpdate {
    pub user_id: String,
    pub tags: Vec<PriorityEntry>,
}

pub struct ProfileService<S> {
    store: Arc<S>,
    tags: Arc<TagService<S>>,
    events: Arc<EventBus>,
}

impl<S: MatchStore> ProfileService<S> {
    pub fn new(store: Arc<S>, tags: Arc<TagService<S>>, events: Arc<EventBus>) -> Self {
        Self { store, tags, events }
    }

    /// A user's profile; empty if they never set priorities
    pub fn profile(&self, user_id: &str) -> Result<PriorityProfile, MatchError> {
        let entries = self.store.with_transaction(|tx| tx.priorities(user_id))?;
        Ok(PriorityProfile::new(user_id, entries))
    }

    /// Replace a user's priorities after checking they form `1..=N`
    pub fn update(&self, update: &PriorityUpdate) -> Result<PriorityProfile, MatchError> {
        validate_user_id("user_id", &update.user_id)?;

        let graph = self.tags.snapshot()?;
        validate_priorities(&update.tags, |id| graph.contains(id))?;

        self.store
            .with_transaction(|tx| tx.replace_priorities(&update.user_id, &update.tags))?;

        info!(user_id = %update.user_id, tags = update.tags.len(), "Priorities updated");
        self.events.emit(MatchEvent::PrioritiesUpdated {
            user_id: update.user_id.clone(),
            tag_count: update.tags.len(),
        });

        Ok(PriorityProfile::new(update.user_id.clone(), update.tags.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TagImport;
    use crate::store::MemoryStore;

    fn setup() -> (ProfileService<MemoryStore>, i64, i64) {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(EventBus::new());
        let tags = Arc::new(TagService::load(Arc::clone(&store), Arc::clone(&events)).unwrap());
        tags.bulk_replace(&TagImport {
            tags: vec!["AI".into(), "ML".into()],
            similarities: vec![],
        })
        .unwrap();
        let graph = tags.snapshot().unwrap();
        let (ai, ml) = (graph.tag_id("AI").unwrap(), graph.tag_id("ML").unwrap());
        (ProfileService::new(store, tags, events), ai, ml)
    }

    fn update(user: &str, entries: &[(i64, u32)]) -> PriorityUpdate {
        PriorityUpdate {
            user_id: user.into(),
            tags: entries
                .iter()
                .map(|&(tag_id, priority)| PriorityEntry { tag_id, priority })
                .collect(),
        }
    }

    #[test]
    fn test_update_and_read_back() {
        let (service, ai, ml) = setup();
        service.update(&update("stu", &[(ml, 2), (ai, 1)])).unwrap();

        let profile = service.profile("stu").unwrap();
        assert_eq!(profile.tags_by_priority(), vec![ai, ml]);
    }

    #[test]
    fn test_rejected_update_keeps_previous() {
        let (service, ai, ml) = setup();
        service.update(&update("stu", &[(ai, 1)])).unwrap();

        let gap = service.update(&update("stu", &[(ai, 1), (ml, 3)]));
        assert!(matches!(gap, Err(MatchError::Validation(_))));

        let unknown = service.update(&update("stu", &[(ai, 1), (404, 2)]));
        assert!(matches!(unknown, Err(MatchError::Validation(_))));

        assert_eq!(service.profile("stu").unwrap().tags_by_priority(), vec![ai]);
    }

    #[test]
    fn test_empty_update_clears() {
        let (service, ai, _) = setup();
        service.update(&update("stu", &[(ai, 1)])).unwrap();
        service.update(&update("stu", &[])).unwrap();
        assert!(service.profile("stu").unwrap().is_empty());
    }

    #[test]
    fn test_parse_priority_update() {
        let body = r#"{"userId": "stu", "tags": [{"tag_id": 1, "priority": 1}]}"#;
        let parsed: PriorityUpdate = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.tags, vec![PriorityEntry { tag_id: 1, priority: 1 }]);
    }
}
