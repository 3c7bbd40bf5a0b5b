//! Request service - supervision request lifecycle
//!
//! Every command runs as one store transaction. `accept` checks the state,
//! reserves a spot through the capacity ledger and flips the request in the
//! same transaction, so two concurrent accepts against a supervisor's last
//! spot produce exactly one ACCEPTED request. When the reservation fails the
//! transaction rolls back and the request stays PENDING.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::MatchError;
use crate::ledger::{release_in, reserve_in, CapacityLedger};
use crate::model::{
    current_timestamp, Initiator, RequestAction, RequestQuery, RequestState, SupervisionRequest,
    SupervisorCapacity,
};
use crate::store::{MatchStore, StoreTx};
use crate::validation::validate_user_id;

use super::events::{EventBus, MatchEvent};

/// Product rules for the request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecyclePolicy {
    /// One accepted supervisor per student: on accept, withdraw the
    /// student's other PENDING requests, and refuse new requests or accepts
    /// while the student holds an ACCEPTED one
    pub withdraw_other_pending_on_accept: bool,
    /// Allow ACCEPTED -> WITHDRAWN, returning the spot
    pub allow_withdraw_accepted: bool,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            withdraw_other_pending_on_accept: true,
            allow_withdraw_accepted: true,
        }
    }
}

/// Input for opening a request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestInput {
    pub student_id: String,
    pub supervisor_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptOutcome {
    pub request: SupervisionRequest,
    pub capacity: SupervisorCapacity,
    /// Other requests of the student withdrawn by this accept
    pub auto_withdrawn: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawOutcome {
    pub request: SupervisionRequest,
    /// Capacity after the returned spot, when the request had been accepted
    pub released: Option<SupervisorCapacity>,
}

pub struct RequestService<S> {
    store: Arc<S>,
    ledger: Arc<CapacityLedger<S>>,
    events: Arc<EventBus>,
    policy: LifecyclePolicy,
}

/// Load `id` and compute the state `action` leads to
fn plan_transition(
    tx: &mut dyn StoreTx,
    id: &str,
    action: RequestAction,
    policy: &LifecyclePolicy,
) -> Result<(SupervisionRequest, RequestState), MatchError> {
    let request = tx
        .get_request(id)?
        .ok_or_else(|| MatchError::NotFound(format!("request {}", id)))?;

    let next = request
        .state
        .apply(action, policy.allow_withdraw_accepted)
        .ok_or_else(|| MatchError::InvalidStateTransition {
            request_id: id.to_string(),
            from: request.state,
            action: action.as_str(),
        })?;

    Ok((request, next))
}

/// Fail when single acceptance is enforced and `student_id` is already matched
fn ensure_unmatched(
    tx: &mut dyn StoreTx,
    student_id: &str,
    policy: &LifecyclePolicy,
) -> Result<(), MatchError> {
    if !policy.withdraw_other_pending_on_accept {
        return Ok(());
    }
    let accepted = tx.list_requests(&RequestQuery {
        student_id: Some(student_id.to_string()),
        state: Some(RequestState::Accepted),
        ..Default::default()
    })?;
    match accepted.into_iter().next() {
        Some(existing) => Err(MatchError::AlreadyMatched {
            student_id: student_id.to_string(),
            request_id: existing.id,
        }),
        None => Ok(()),
    }
}

/// Apply a planned transition; the state check is repeated in the store
fn commit_transition(
    tx: &mut dyn StoreTx,
    mut request: SupervisionRequest,
    next: RequestState,
) -> Result<SupervisionRequest, MatchError> {
    let now = current_timestamp();
    if !tx.update_request_state(&request.id, request.state, next, &now)? {
        return Err(MatchError::Internal(format!(
            "request {} changed state during transition",
            request.id
        )));
    }
    request.state = next;
    request.updated_at = now;
    Ok(request)
}

impl<S: MatchStore> RequestService<S> {
    pub fn new(
        store: Arc<S>,
        ledger: Arc<CapacityLedger<S>>,
        events: Arc<EventBus>,
        policy: LifecyclePolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            events,
            policy,
        }
    }

    pub fn policy(&self) -> LifecyclePolicy {
        self.policy
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, id: &str) -> Result<SupervisionRequest, MatchError> {
        self.store
            .with_transaction(|tx| tx.get_request(id))?
            .ok_or_else(|| MatchError::NotFound(format!("request {}", id)))
    }

    pub fn list(&self, query: &RequestQuery) -> Result<Vec<SupervisionRequest>, MatchError> {
        self.store.with_transaction(|tx| tx.list_requests(query))
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Student asks a supervisor; capacity is not touched until accept
    pub fn create(&self, student_id: &str, supervisor_id: &str) -> Result<SupervisionRequest, MatchError> {
        self.open(student_id, supervisor_id, Initiator::Student)
    }

    /// Supervisor invites a student; same rules as `create`
    pub fn invite(&self, supervisor_id: &str, student_id: &str) -> Result<SupervisionRequest, MatchError> {
        self.open(student_id, supervisor_id, Initiator::Supervisor)
    }

    fn open(
        &self,
        student_id: &str,
        supervisor_id: &str,
        initiated_by: Initiator,
    ) -> Result<SupervisionRequest, MatchError> {
        validate_user_id("student_id", student_id)?;
        validate_user_id("supervisor_id", supervisor_id)?;
        if student_id == supervisor_id {
            return Err(MatchError::Validation(
                "student and supervisor must be different users".into(),
            ));
        }

        let policy = self.policy;
        let request = self.store.with_transaction(|tx| {
            if tx.capacity(supervisor_id)?.is_none() {
                return Err(MatchError::NotFound(format!("supervisor {}", supervisor_id)));
            }
            ensure_unmatched(tx, student_id, &policy)?;
            if tx.find_pending(student_id, supervisor_id)?.is_some() {
                return Err(MatchError::DuplicateRequest {
                    student_id: student_id.to_string(),
                    supervisor_id: supervisor_id.to_string(),
                });
            }

            let now = current_timestamp();
            let request = SupervisionRequest {
                id: Uuid::new_v4().to_string(),
                student_id: student_id.to_string(),
                supervisor_id: supervisor_id.to_string(),
                state: RequestState::Pending,
                initiated_by,
                created_at: now.clone(),
                updated_at: now,
            };
            tx.insert_request(&request)?;
            Ok(request)
        })?;

        info!(
            request_id = %request.id,
            student_id = %student_id,
            supervisor_id = %supervisor_id,
            initiated_by = initiated_by.as_str(),
            "Request created"
        );
        self.events.emit(MatchEvent::RequestCreated {
            id: request.id.clone(),
            student_id: request.student_id.clone(),
            supervisor_id: request.supervisor_id.clone(),
        });

        Ok(request)
    }

    /// PENDING -> ACCEPTED, consuming one of the supervisor's spots
    pub fn accept(&self, id: &str) -> Result<AcceptOutcome, MatchError> {
        let policy = self.policy;

        let outcome = self.store.with_transaction(|tx| {
            let (request, next) = plan_transition(tx, id, RequestAction::Accept, &policy)?;
            ensure_unmatched(tx, &request.student_id, &policy)?;
            let capacity = reserve_in(tx, &request.supervisor_id)?;
            let request = commit_transition(tx, request, next)?;

            let mut auto_withdrawn = Vec::new();
            if policy.withdraw_other_pending_on_accept {
                let siblings = tx.list_requests(&RequestQuery {
                    student_id: Some(request.student_id.clone()),
                    state: Some(RequestState::Pending),
                    ..Default::default()
                })?;
                for sibling in siblings {
                    let sibling_id = sibling.id.clone();
                    commit_transition(tx, sibling, RequestState::Withdrawn)?;
                    auto_withdrawn.push(sibling_id);
                }
            }

            Ok(AcceptOutcome {
                request,
                capacity,
                auto_withdrawn,
            })
        })?;

        info!(
            request_id = %id,
            supervisor_id = %outcome.request.supervisor_id,
            available = outcome.capacity.available_spots,
            auto_withdrawn = outcome.auto_withdrawn.len(),
            "Request accepted"
        );

        self.events.emit(MatchEvent::RequestAccepted {
            id: outcome.request.id.clone(),
            supervisor_id: outcome.request.supervisor_id.clone(),
        });
        self.ledger.emit_change(&outcome.capacity, -1);
        for sibling in &outcome.auto_withdrawn {
            debug!(request_id = %sibling, "Withdrew sibling request after accept");
            self.events.emit(MatchEvent::RequestWithdrawn {
                id: sibling.clone(),
                previous: RequestState::Pending,
                released: false,
            });
        }

        Ok(outcome)
    }

    /// PENDING -> REJECTED; no capacity effect
    pub fn reject(&self, id: &str) -> Result<SupervisionRequest, MatchError> {
        let policy = self.policy;
        let request = self.store.with_transaction(|tx| {
            let (request, next) = plan_transition(tx, id, RequestAction::Reject, &policy)?;
            commit_transition(tx, request, next)
        })?;

        info!(request_id = %id, supervisor_id = %request.supervisor_id, "Request rejected");
        self.events.emit(MatchEvent::RequestRejected { id: request.id.clone() });

        Ok(request)
    }

    /// PENDING -> WITHDRAWN, or ACCEPTED -> WITHDRAWN returning the spot
    pub fn withdraw(&self, id: &str) -> Result<WithdrawOutcome, MatchError> {
        let policy = self.policy;
        let (previous, outcome) = self.store.with_transaction(|tx| {
            let (request, next) = plan_transition(tx, id, RequestAction::Withdraw, &policy)?;
            let previous = request.state;
            let request = commit_transition(tx, request, next)?;

            let released = if previous == RequestState::Accepted {
                release_in(tx, &request.supervisor_id)?
            } else {
                None
            };

            Ok((previous, WithdrawOutcome { request, released }))
        })?;

        info!(
            request_id = %id,
            previous = %previous,
            released = outcome.released.is_some(),
            "Request withdrawn"
        );
        self.events.emit(MatchEvent::RequestWithdrawn {
            id: outcome.request.id.clone(),
            previous,
            released: outcome.released.is_some(),
        });
        if let Some(capacity) = &outcome.released {
            self.ledger.emit_change(capacity, 1);
        }

        Ok(outcome)
    }
}
