//! Domain types shared by the store, the scorer and the services
//!
//! Requests move through a small state machine:
//!
//! ```text
//!            accept            withdraw (releases a spot)
//! PENDING ───────────► ACCEPTED ─────────────► WITHDRAWN
//!    │ reject
//!    ├───────────────► REJECTED
//!    │ withdraw
//!    └───────────────► WITHDRAWN
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MatchError;

/// Timestamp format used for every stored row
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub type TagId = i64;

// ============================================================================
// Tags
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

/// Similarity between two distinct tags, stored with `tag_a < tag_b`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagSimilarity {
    pub tag_a: TagId,
    pub tag_b: TagId,
    pub score: f64,
}

impl TagSimilarity {
    pub fn new(a: TagId, b: TagId, score: f64) -> Self {
        let (tag_a, tag_b) = if a <= b { (a, b) } else { (b, a) };
        Self { tag_a, tag_b, score }
    }

    pub fn key(&self) -> (TagId, TagId) {
        (self.tag_a, self.tag_b)
    }
}

/// Bulk import payload as received from the admin import
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagImport {
    pub tags: Vec<String>,
    #[serde(default)]
    pub similarities: Vec<SimilarityInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityInput {
    pub field1: String,
    pub field2: String,
    pub similarity_score: f64,
}

// ============================================================================
// Priorities
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityEntry {
    pub tag_id: TagId,
    pub priority: u32,
}

/// A user's prioritized interests, kept sorted by tag id.
///
/// Only built through [`PriorityProfile::new`], which also drops entries
/// with priority 0 so every scoring weight stays finite.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriorityProfile {
    pub user_id: String,
    entries: Vec<PriorityEntry>,
}

impl PriorityProfile {
    pub fn new(user_id: impl Into<String>, mut entries: Vec<PriorityEntry>) -> Self {
        entries.retain(|e| e.priority > 0);
        entries.sort_by_key(|e| (e.tag_id, e.priority));
        Self {
            user_id: user_id.into(),
            entries,
        }
    }

    pub fn entries(&self) -> &[PriorityEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tag ids ordered by priority (most important first)
    pub fn tags_by_priority(&self) -> Vec<TagId> {
        let mut ordered: Vec<&PriorityEntry> = self.entries.iter().collect();
        ordered.sort_by_key(|e| (e.priority, e.tag_id));
        ordered.into_iter().map(|e| e.tag_id).collect()
    }
}

// ============================================================================
// Capacity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorCapacity {
    pub supervisor_id: String,
    pub total_spots: u32,
    pub available_spots: u32,
}

impl SupervisorCapacity {
    pub fn accepted(&self) -> u32 {
        self.total_spots.saturating_sub(self.available_spots)
    }

    pub fn is_full(&self) -> bool {
        self.available_spots == 0
    }
}

// ============================================================================
// Supervision requests
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

impl RequestState {
    pub const ALL: [RequestState; 4] = [
        RequestState::Pending,
        RequestState::Accepted,
        RequestState::Rejected,
        RequestState::Withdrawn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Pending => "PENDING",
            RequestState::Accepted => "ACCEPTED",
            RequestState::Rejected => "REJECTED",
            RequestState::Withdrawn => "WITHDRAWN",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestState::Pending)
    }

    /// Target state for `action`, or `None` if the transition is not allowed.
    ///
    /// ACCEPTED only leaves through a withdrawal, and only when
    /// `allow_withdraw_accepted` is set.
    pub fn apply(self, action: RequestAction, allow_withdraw_accepted: bool) -> Option<RequestState> {
        match (self, action) {
            (RequestState::Pending, RequestAction::Accept) => Some(RequestState::Accepted),
            (RequestState::Pending, RequestAction::Reject) => Some(RequestState::Rejected),
            (RequestState::Pending, RequestAction::Withdraw) => Some(RequestState::Withdrawn),
            (RequestState::Accepted, RequestAction::Withdraw) if allow_withdraw_accepted => {
                Some(RequestState::Withdrawn)
            }
            _ => None,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestState {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| MatchError::Validation(format!("unknown request state '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    Accept,
    Reject,
    Withdraw,
}

impl RequestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestAction::Accept => "accept",
            RequestAction::Reject => "reject",
            RequestAction::Withdraw => "withdraw",
        }
    }
}

/// Who opened the request: the student, or the supervisor via an invite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initiator {
    Student,
    Supervisor,
}

impl Initiator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Initiator::Student => "student",
            Initiator::Supervisor => "supervisor",
        }
    }
}

impl FromStr for Initiator {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Initiator::Student),
            "supervisor" => Ok(Initiator::Supervisor),
            other => Err(MatchError::Validation(format!("unknown initiator '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisionRequest {
    pub id: String,
    pub student_id: String,
    pub supervisor_id: String,
    pub state: RequestState,
    pub initiated_by: Initiator,
    pub created_at: String,
    pub updated_at: String,
}

/// Filters for listing requests - camelCase for URL params
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestQuery {
    pub student_id: Option<String>,
    pub supervisor_id: Option<String>,
    pub state: Option<RequestState>,
}

impl RequestQuery {
    pub fn matches(&self, request: &SupervisionRequest) -> bool {
        self.student_id.as_deref().map_or(true, |s| s == request.student_id)
            && self.supervisor_id.as_deref().map_or(true, |s| s == request.supervisor_id)
            && self.state.map_or(true, |s| s == request.state)
    }
}
