//! Recommendation service - ranked supervisors for a student
//!
//! Candidate data is read in one store transaction and scored against one
//! graph snapshot, so a ranking never mixes two versions of either.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::MatchError;
use crate::model::{PriorityProfile, RequestQuery, RequestState};
use crate::ranking::{rank, Candidate, RankOptions, Ranking};
use crate::store::MatchStore;
use crate::validation::validate_user_id;

use super::tag_service::TagService;

/// Per-call overrides of the configured ranking filters
#[derive(Debug, Clone, Copy, Default)]
pub struct RankOverrides {
    pub available_only: Option<bool>,
    pub exclude_decided: Option<bool>,
}

impl RankOverrides {
    pub fn apply(self, defaults: RankOptions) -> RankOptions {
        RankOptions {
            available_only: self.available_only.unwrap_or(defaults.available_only),
            exclude_decided: self.exclude_decided.unwrap_or(defaults.exclude_decided),
        }
    }
}

pub struct RecommendationService<S> {
    store: Arc<S>,
    tags: Arc<TagService<S>>,
    defaults: RankOptions,
}

impl<S: MatchStore> RecommendationService<S> {
    pub fn new(store: Arc<S>, tags: Arc<TagService<S>>, defaults: RankOptions) -> Self {
        Self { store, tags, defaults }
    }

    pub fn defaults(&self) -> RankOptions {
        self.defaults
    }

    pub fn recommend(&self, student_id: &str, overrides: RankOverrides) -> Result<Ranking, MatchError> {
        validate_user_id("student_id", student_id)?;
        let options = overrides.apply(self.defaults);
        let graph = self.tags.snapshot()?;

        let (student, candidates) = self.store.with_transaction(|tx| {
            let student = PriorityProfile::new(student_id, tx.priorities(student_id)?);

            let mut pending: HashMap<String, u32> = HashMap::new();
            for request in tx.list_requests(&RequestQuery {
                state: Some(RequestState::Pending),
                ..Default::default()
            })? {
                *pending.entry(request.supervisor_id).or_default() += 1;
            }

            // Requests are ordered by creation, so the latest decision wins
            let mut decided: HashMap<String, RequestState> = HashMap::new();
            for request in tx.list_requests(&RequestQuery {
                student_id: Some(student_id.to_string()),
                ..Default::default()
            })? {
                if matches!(request.state, RequestState::Accepted | RequestState::Rejected) {
                    decided.insert(request.supervisor_id, request.state);
                }
            }

            let mut candidates = Vec::new();
            for capacity in tx.list_capacities()? {
                let id = capacity.supervisor_id.clone();
                candidates.push(Candidate {
                    profile: PriorityProfile::new(id.clone(), tx.priorities(&id)?),
                    pending_requests: pending.get(&id).copied().unwrap_or(0),
                    decided: decided.get(&id).copied(),
                    capacity,
                });
            }

            Ok((student, candidates))
        })?;

        let ranking = rank(&student, &candidates, &graph, options);
        debug!(
            student_id = %student_id,
            candidates = candidates.len(),
            ranked = ranking.len(),
            available_only = options.available_only,
            exclude_decided = options.exclude_decided,
            "Ranked supervisors"
        );

        Ok(ranking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::CapacityLedger;
    use crate::model::{PriorityEntry, SimilarityInput, TagImport};
    use crate::services::events::EventBus;
    use crate::services::profile_service::{PriorityUpdate, ProfileService};
    use crate::services::request_service::{LifecyclePolicy, RequestService};
    use crate::store::MemoryStore;

    struct World {
        profiles: ProfileService<MemoryStore>,
        ledger: Arc<CapacityLedger<MemoryStore>>,
        requests: RequestService<MemoryStore>,
        recommendations: RecommendationService<MemoryStore>,
        tags: Arc<TagService<MemoryStore>>,
    }

    fn world(defaults: RankOptions) -> World {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(EventBus::new());
        let tags = Arc::new(TagService::load(Arc::clone(&store), Arc::clone(&events)).unwrap());
        tags.bulk_replace(&TagImport {
            tags: vec!["AI".into(), "ML".into(), "Design".into()],
            similarities: vec![SimilarityInput {
                field1: "AI".into(),
                field2: "ML".into(),
                similarity_score: 0.8,
            }],
        })
        .unwrap();

        let ledger = Arc::new(CapacityLedger::new(Arc::clone(&store), Arc::clone(&events)));
        World {
            profiles: ProfileService::new(Arc::clone(&store), Arc::clone(&tags), Arc::clone(&events)),
            requests: RequestService::new(
                Arc::clone(&store),
                Arc::clone(&ledger),
                Arc::clone(&events),
                LifecyclePolicy::default(),
            ),
            recommendations: RecommendationService::new(store, Arc::clone(&tags), defaults),
            ledger,
            tags,
        }
    }

    impl World {
        fn set(&self, user: &str, names: &[&str]) {
            let graph = self.tags.snapshot().unwrap();
            let tags = names
                .iter()
                .enumerate()
                .map(|(i, n)| PriorityEntry {
                    tag_id: graph.tag_id(n).unwrap(),
                    priority: i as u32 + 1,
                })
                .collect();
            self.profiles
                .update(&PriorityUpdate {
                    user_id: user.into(),
                    tags,
                })
                .unwrap();
        }

        fn ids(&self, student: &str, overrides: RankOverrides) -> Vec<String> {
            self.recommendations
                .recommend(student, overrides)
                .unwrap()
                .iter()
                .map(|r| r.supervisor_id.clone())
                .collect()
        }
    }

    #[test]
    fn test_recommend_orders_by_compatibility() {
        let w = world(RankOptions::default());
        w.set("stu", &["AI"]);
        w.set("ml", &["ML"]);
        w.set("design", &["Design"]);
        w.ledger.set_total_spots("ml", 1).unwrap();
        w.ledger.set_total_spots("design", 1).unwrap();

        let ranking = w.recommendations.recommend("stu", RankOverrides::default()).unwrap();
        let first = ranking.iter().next().unwrap();
        assert_eq!(first.supervisor_id, "ml");
        assert!((first.compatibility_score - 0.8).abs() < 1e-9);
        assert_eq!(first.tags, vec!["ML".to_string()]);
        assert_eq!(w.ids("stu", RankOverrides::default()), vec!["ml", "design"]);
    }

    #[test]
    fn test_available_only_override() {
        let w = world(RankOptions::default());
        w.ledger.set_total_spots("full", 0).unwrap();
        w.ledger.set_total_spots("open", 1).unwrap();

        assert_eq!(w.ids("stu", RankOverrides::default()), vec!["open", "full"]);
        let only = RankOverrides {
            available_only: Some(true),
            ..Default::default()
        };
        assert_eq!(w.ids("stu", only), vec!["open"]);
    }

    #[test]
    fn test_exclude_decided_uses_request_history() {
        let w = world(RankOptions {
            available_only: false,
            exclude_decided: true,
        });
        w.ledger.set_total_spots("a", 1).unwrap();
        w.ledger.set_total_spots("b", 1).unwrap();

        let request = w.requests.create("stu", "a").unwrap();
        w.requests.reject(&request.id).unwrap();

        assert_eq!(w.ids("stu", RankOverrides::default()), vec!["b"]);
        let keep = RankOverrides {
            exclude_decided: Some(false),
            ..Default::default()
        };
        assert_eq!(w.ids("stu", keep), vec!["a", "b"]);
    }

    #[test]
    fn test_pending_counts() {
        let w = world(RankOptions::default());
        w.ledger.set_total_spots("sup", 2).unwrap();
        w.requests.create("s1", "sup").unwrap();
        w.requests.create("s2", "sup").unwrap();

        let ranking = w.recommendations.recommend("s3", RankOverrides::default()).unwrap();
        assert_eq!(ranking.iter().next().unwrap().pending_requests, 2);
    }

    #[test]
    fn test_student_never_ranked_against_self() {
        let w = world(RankOptions::default());
        w.ledger.set_total_spots("both", 1).unwrap();
        assert!(w.ids("both", RankOverrides::default()).is_empty());
    }
}
