//! Capacity ledger
//!
//! Single owner of `SupervisorCapacity`. Every change to `available_spots`
//! goes through [`reserve_in`] / [`release_in`], which rely on the store's
//! compare-and-swap primitives, so `0 <= available_spots <= total_spots`
//! holds after every operation.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::MatchError;
use crate::model::SupervisorCapacity;
use crate::services::events::{EventBus, MatchEvent};
use crate::store::{MatchStore, StoreTx};
use crate::validation::{validate_total_spots, validate_user_id};

/// Take one spot inside an open transaction
pub fn reserve_in(tx: &mut dyn StoreTx, supervisor_id: &str) -> Result<SupervisorCapacity, MatchError> {
    if !tx.take_spot(supervisor_id)? {
        return match tx.capacity(supervisor_id)? {
            Some(_) => Err(MatchError::CapacityExceeded(supervisor_id.to_string())),
            None => Err(MatchError::NotFound(format!("supervisor {}", supervisor_id))),
        };
    }

    tx.capacity(supervisor_id)?
        .ok_or_else(|| MatchError::Internal(format!("capacity for {} vanished", supervisor_id)))
}

/// Return one spot inside an open transaction.
///
/// Returns `None` when nothing was credited: unknown supervisor, or no spot
/// is currently taken.
pub fn release_in(
    tx: &mut dyn StoreTx,
    supervisor_id: &str,
) -> Result<Option<SupervisorCapacity>, MatchError> {
    if !tx.return_spot(supervisor_id)? {
        warn!(supervisor_id = %supervisor_id, "Ignoring release with no matching reservation");
        return Ok(None);
    }
    tx.capacity(supervisor_id)
}

pub struct CapacityLedger<S> {
    store: Arc<S>,
    events: Arc<EventBus>,
}

impl<S: MatchStore> CapacityLedger<S> {
    pub fn new(store: Arc<S>, events: Arc<EventBus>) -> Self {
        Self { store, events }
    }

    pub fn capacity(&self, supervisor_id: &str) -> Result<SupervisorCapacity, MatchError> {
        self.store
            .with_transaction(|tx| tx.capacity(supervisor_id))?
            .ok_or_else(|| MatchError::NotFound(format!("supervisor {}", supervisor_id)))
    }

    pub fn capacities(&self) -> Result<Vec<SupervisorCapacity>, MatchError> {
        self.store.with_transaction(|tx| tx.list_capacities())
    }

    /// Register a supervisor or resize their capacity.
    ///
    /// The accepted count stays fixed, so `available = total - accepted`.
    pub fn set_total_spots(&self, supervisor_id: &str, total_spots: u32) -> Result<SupervisorCapacity, MatchError> {
        validate_user_id("supervisor_id", supervisor_id)?;

        let (before, after) = self.store.with_transaction(|tx| {
            let before = tx.capacity(supervisor_id)?;
            validate_total_spots(before.as_ref(), total_spots)?;

            let accepted = before.as_ref().map_or(0, SupervisorCapacity::accepted);
            let after = SupervisorCapacity {
                supervisor_id: supervisor_id.to_string(),
                total_spots,
                available_spots: total_spots - accepted,
            };
            tx.put_capacity(&after)?;
            Ok((before, after))
        })?;

        let previous_available = before.map_or(0, |c| c.available_spots);
        info!(
            supervisor_id = %supervisor_id,
            total = after.total_spots,
            available = after.available_spots,
            "Supervisor capacity set"
        );
        self.emit_change(&after, after.available_spots as i64 - previous_available as i64);

        Ok(after)
    }

    /// Take one spot; `CapacityExceeded` when none is left
    pub fn reserve(&self, supervisor_id: &str) -> Result<SupervisorCapacity, MatchError> {
        let capacity = self.store.with_transaction(|tx| reserve_in(tx, supervisor_id))?;
        debug!(supervisor_id = %supervisor_id, available = capacity.available_spots, "Reserved spot");
        self.emit_change(&capacity, -1);
        Ok(capacity)
    }

    /// Return one spot; false when there was nothing to return
    pub fn release(&self, supervisor_id: &str) -> Result<bool, MatchError> {
        match self.store.with_transaction(|tx| release_in(tx, supervisor_id))? {
            Some(capacity) => {
                debug!(supervisor_id = %supervisor_id, available = capacity.available_spots, "Released spot");
                self.emit_change(&capacity, 1);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn emit_change(&self, capacity: &SupervisorCapacity, delta: i64) {
        if delta == 0 {
            return;
        }
        self.events.emit(MatchEvent::CapacityChanged {
            supervisor_id: capacity.supervisor_id.clone(),
            available_spots: capacity.available_spots,
            total_spots: capacity.total_spots,
            delta,
        });
    }
}
