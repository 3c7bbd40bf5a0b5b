//! Thesis Match - student/supervisor matching core
//!
//! Students and supervisors rank research tags by priority. Tags are linked
//! by pairwise similarity scores. A student gets supervisors ranked by how
//! well the two priority profiles line up over the tag graph, and sends
//! supervision requests that a supervisor can accept only while they still
//! have an open spot.
//!
//! ## Architecture
//!
//! - **Tag graph** (`graph`): immutable snapshot of tags and similarities
//! - **Scorer / ranker** (`scoring`, `ranking`): pure functions over snapshots
//! - **Capacity ledger** (`ledger`): the only writer of available spots
//! - **Services** (`services`): validation, transactions and events
//! - **Store** (`store`): SQLite or in-memory, behind `MatchStore`
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/thesis-match/
//! ├── match.db       # SQLite database
//! └── config.toml    # Configuration
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use thesis_match::{LifecyclePolicy, MemoryStore, RankOptions, RankOverrides, Services};
//!
//! # fn main() -> Result<(), thesis_match::MatchError> {
//! let services = Services::new(
//!     Arc::new(MemoryStore::new()),
//!     RankOptions::default(),
//!     LifecyclePolicy::default(),
//! )?;
//! services.ledger.set_total_spots("sup-1", 2)?;
//! let request = services.requests.create("stu-1", "sup-1")?;
//! services.requests.accept(&request.id)?;
//! let ranking = services.recommendations.recommend("stu-2", RankOverrides::default())?;
//! for entry in &ranking {
//!     println!("{} {:.2}", entry.supervisor_id, entry.compatibility_score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod http;
pub mod ledger;
pub mod model;
pub mod ranking;
pub mod scoring;
pub mod services;
pub mod store;
pub mod validation;

pub use config::Config;
pub use error::MatchError;
pub use graph::{GraphStats, TagGraph};
pub use http::HttpServer;
pub use ledger::CapacityLedger;
pub use model::{
    Initiator, PriorityEntry, PriorityProfile, RequestAction, RequestQuery, RequestState,
    SimilarityInput, SupervisionRequest, SupervisorCapacity, Tag, TagId, TagImport, TagSimilarity,
};
pub use ranking::{rank, Candidate, RankOptions, RankedSupervisor, Ranking};
pub use scoring::compatibility;
pub use services::{
    EventBus, LifecyclePolicy, MatchEvent, PriorityUpdate, RankOverrides, Services,
};
pub use store::{MatchStore, MemoryStore, SqliteStore, StoreTx};
