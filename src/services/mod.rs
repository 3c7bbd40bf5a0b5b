//! Service layer for thesis-match
//!
//! Services sit between the HTTP adapter and the store. Each one wraps store
//! transactions with:
//! - Input validation
//! - Cross-entity orchestration (request lifecycle + capacity ledger)
//! - Event emission after commit
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (business logic)
//!     ↓
//! Ledger / Ranker / Scorer
//!     ↓
//! MatchStore (SQLite or in-memory)
//! ```

pub mod events;
pub mod profile_service;
pub mod recommendation_service;
pub mod request_service;
pub mod response;
pub mod tag_service;

// Re-exports
pub use events::{spawn_logging_listener, EventBus, EventListener, MatchEvent};
pub use profile_service::{PriorityUpdate, ProfileService};
pub use recommendation_service::{RankOverrides, RecommendationService};
pub use request_service::{AcceptOutcome, CreateRequestInput, LifecyclePolicy, RequestService, WithdrawOutcome};
pub use tag_service::TagService;

use std::sync::Arc;

use crate::error::MatchError;
use crate::ledger::CapacityLedger;
use crate::ranking::RankOptions;
use crate::store::MatchStore;

/// Service container for dependency injection
///
/// All services share one store and one event bus.
pub struct Services<S> {
    pub tags: Arc<TagService<S>>,
    pub profiles: Arc<ProfileService<S>>,
    pub ledger: Arc<CapacityLedger<S>>,
    pub requests: Arc<RequestService<S>>,
    pub recommendations: Arc<RecommendationService<S>>,
    pub events: Arc<EventBus>,
}

impl<S: MatchStore> Services<S> {
    /// Create all services over `store`, loading the persisted tag graph
    pub fn new(store: Arc<S>, ranking: RankOptions, policy: LifecyclePolicy) -> Result<Self, MatchError> {
        let events = Arc::new(EventBus::new());
        let tags = Arc::new(TagService::load(store.clone(), events.clone())?);
        let ledger = Arc::new(CapacityLedger::new(store.clone(), events.clone()));

        Ok(Self {
            profiles: Arc::new(ProfileService::new(store.clone(), tags.clone(), events.clone())),
            requests: Arc::new(RequestService::new(
                store.clone(),
                ledger.clone(),
                events.clone(),
                policy,
            )),
            recommendations: Arc::new(RecommendationService::new(store, tags.clone(), ranking)),
            tags,
            ledger,
            events,
        })
    }
}
