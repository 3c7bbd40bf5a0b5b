//! Storage behind the matching core
//!
//! Services only see two traits:
//!
//! - [`MatchStore`] opens a transaction. `Ok` from the closure commits,
//!   `Err` rolls back, so every operation is all-or-nothing.
//! - [`StoreTx`] is the repository surface available inside a transaction.
//!
//! ## Backends
//!
//! - [`SqliteStore`] - durable, one connection, `BEGIN IMMEDIATE` transactions
//! - [`MemoryStore`] - snapshot-and-swap state, used by unit tests
//!
//! ## Tables
//!
//! - `tags` - tag names with stable ids
//! - `tag_similarities` - one row per unordered pair (`tag_a < tag_b`)
//! - `priorities` - per-user `(tag_id, priority)`
//! - `supervisor_capacity` - total/available spots
//! - `supervision_requests` - request rows, never deleted

pub mod memory;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::MatchError;
use crate::model::{
    PriorityEntry, RequestQuery, RequestState, SupervisionRequest, SupervisorCapacity, Tag,
    TagId, TagSimilarity,
};

/// Transaction boundary over some storage engine
pub trait MatchStore: Send + Sync {
    /// Run `f` inside one serializable transaction
    fn with_transaction<T, F>(&self, f: F) -> Result<T, MatchError>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<T, MatchError>;
}

/// Repository operations available inside a transaction
pub trait StoreTx {
    // ---- tags ----

    fn list_tags(&mut self) -> Result<Vec<Tag>, MatchError>;

    /// Insert a tag by name, or return the existing one with that name
    fn upsert_tag(&mut self, name: &str) -> Result<Tag, MatchError>;

    /// Returns false if the tag does not exist
    fn rename_tag(&mut self, id: TagId, name: &str) -> Result<bool, MatchError>;

    fn list_similarities(&mut self) -> Result<Vec<TagSimilarity>, MatchError>;

    /// Delete every similarity, then insert `similarities`
    fn replace_similarities(&mut self, similarities: &[TagSimilarity]) -> Result<(), MatchError>;

    // ---- priorities ----

    fn priorities(&mut self, user_id: &str) -> Result<Vec<PriorityEntry>, MatchError>;

    fn replace_priorities(&mut self, user_id: &str, entries: &[PriorityEntry]) -> Result<(), MatchError>;

    // ---- capacity (Capacity Ledger only) ----

    fn capacity(&mut self, supervisor_id: &str) -> Result<Option<SupervisorCapacity>, MatchError>;

    fn list_capacities(&mut self) -> Result<Vec<SupervisorCapacity>, MatchError>;

    fn put_capacity(&mut self, capacity: &SupervisorCapacity) -> Result<(), MatchError>;

    /// `available_spots -= 1` if it is above zero; false otherwise
    fn take_spot(&mut self, supervisor_id: &str) -> Result<bool, MatchError>;

    /// `available_spots += 1` if it is below `total_spots`; false otherwise
    fn return_spot(&mut self, supervisor_id: &str) -> Result<bool, MatchError>;

    // ---- requests ----

    fn get_request(&mut self, id: &str) -> Result<Option<SupervisionRequest>, MatchError>;

    fn find_pending(
        &mut self,
        student_id: &str,
        supervisor_id: &str,
    ) -> Result<Option<SupervisionRequest>, MatchError>;

    fn insert_request(&mut self, request: &SupervisionRequest) -> Result<(), MatchError>;

    /// Move `id` from `from` to `to`; false if it was not in `from`
    fn update_request_state(
        &mut self,
        id: &str,
        from: RequestState,
        to: RequestState,
        updated_at: &str,
    ) -> Result<bool, MatchError>;

    /// Matching requests ordered by `created_at`, then id
    fn list_requests(&mut self, query: &RequestQuery) -> Result<Vec<SupervisionRequest>, MatchError>;
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every backend must share; run against each store.

    use super::*;
    use crate::model::{current_timestamp, Initiator};

    pub fn request(id: &str, student: &str, supervisor: &str) -> SupervisionRequest {
        let now = current_timestamp();
        SupervisionRequest {
            id: id.into(),
            student_id: student.into(),
            supervisor_id: supervisor.into(),
            state: RequestState::Pending,
            initiated_by: Initiator::Student,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn upsert_keeps_ids<S: MatchStore>(store: &S) {
        let (first, again) = store
            .with_transaction(|tx| Ok((tx.upsert_tag("AI")?, tx.upsert_tag("AI")?)))
            .unwrap();
        assert_eq!(first, again);

        let renamed = store.with_transaction(|tx| tx.rename_tag(first.id, "Artificial Intelligence")).unwrap();
        assert!(renamed);
        let tags = store.with_transaction(|tx| tx.list_tags()).unwrap();
        assert_eq!(tags, vec![Tag { id: first.id, name: "Artificial Intelligence".into() }]);
        assert!(!store.with_transaction(|tx| tx.rename_tag(999, "x")).unwrap());
    }

    pub fn rollback_on_error<S: MatchStore>(store: &S) {
        let result: Result<(), MatchError> = store.with_transaction(|tx| {
            tx.upsert_tag("ML")?;
            Err(MatchError::Validation("abort".into()))
        });
        assert!(result.is_err());
        let tags = store.with_transaction(|tx| tx.list_tags()).unwrap();
        assert!(tags.iter().all(|t| t.name != "ML"));
    }

    pub fn spot_bounds<S: MatchStore>(store: &S) {
        store
            .with_transaction(|tx| {
                tx.put_capacity(&SupervisorCapacity {
                    supervisor_id: "sup".into(),
                    total_spots: 1,
                    available_spots: 1,
                })
            })
            .unwrap();

        assert!(!store.with_transaction(|tx| tx.return_spot("sup")).unwrap());
        assert!(store.with_transaction(|tx| tx.take_spot("sup")).unwrap());
        assert!(!store.with_transaction(|tx| tx.take_spot("sup")).unwrap());
        assert!(store.with_transaction(|tx| tx.return_spot("sup")).unwrap());
        assert!(!store.with_transaction(|tx| tx.take_spot("nobody")).unwrap());

        let cap = store.with_transaction(|tx| tx.capacity("sup")).unwrap().unwrap();
        assert_eq!(cap.available_spots, 1);
    }

    pub fn request_state_cas<S: MatchStore>(store: &S) {
        store.with_transaction(|tx| tx.insert_request(&request("r1", "stu", "sup"))).unwrap();
        store.with_transaction(|tx| tx.insert_request(&request("r2", "stu", "other"))).unwrap();

        let found = store.with_transaction(|tx| tx.find_pending("stu", "sup")).unwrap();
        assert_eq!(found.map(|r| r.id), Some("r1".to_string()));

        let now = current_timestamp();
        let moved = store
            .with_transaction(|tx| {
                tx.update_request_state("r1", RequestState::Pending, RequestState::Rejected, &now)
            })
            .unwrap();
        assert!(moved);
        let moved_again = store
            .with_transaction(|tx| {
                tx.update_request_state("r1", RequestState::Pending, RequestState::Accepted, &now)
            })
            .unwrap();
        assert!(!moved_again);

        assert!(store.with_transaction(|tx| tx.find_pending("stu", "sup")).unwrap().is_none());

        let pending = store
            .with_transaction(|tx| {
                tx.list_requests(&RequestQuery {
                    student_id: Some("stu".into()),
                    state: Some(RequestState::Pending),
                    ..Default::default()
                })
            })
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "r2");
    }

    pub fn priorities_replace<S: MatchStore>(store: &S) {
        let (ai, ml) = store
            .with_transaction(|tx| Ok((tx.upsert_tag("AI")?.id, tx.upsert_tag("ML")?.id)))
            .unwrap();
        let entries = vec![
            PriorityEntry { tag_id: ai, priority: 1 },
            PriorityEntry { tag_id: ml, priority: 2 },
        ];
        store.with_transaction(|tx| tx.replace_priorities("u1", &entries)).unwrap();
        store
            .with_transaction(|tx| tx.replace_priorities("u1", &entries[..1]))
            .unwrap();
        let stored = store.with_transaction(|tx| tx.priorities("u1")).unwrap();
        assert_eq!(stored, entries[..1].to_vec());
        assert!(store.with_transaction(|tx| tx.priorities("u2")).unwrap().is_empty());
    }

    pub fn similarities_replace<S: MatchStore>(store: &S) {
        let (a, b, c) = store
            .with_transaction(|tx| {
                Ok((tx.upsert_tag("A")?.id, tx.upsert_tag("B")?.id, tx.upsert_tag("C")?.id))
            })
            .unwrap();
        store
            .with_transaction(|tx| tx.replace_similarities(&[TagSimilarity::new(a, b, 0.5)]))
            .unwrap();
        store
            .with_transaction(|tx| tx.replace_similarities(&[TagSimilarity::new(c, a, 0.25)]))
            .unwrap();
        let sims = store.with_transaction(|tx| tx.list_similarities()).unwrap();
        assert_eq!(sims, vec![TagSimilarity::new(a, c, 0.25)]);
    }
}
