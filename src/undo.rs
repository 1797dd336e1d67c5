//! Single step undo
//!
//! The newest event of a container is consumed: its change set is inverted
//! onto the live record and the event is removed, in one batch.
use super::container::{Container, TimeStamp};
use super::error::{Result, UndoRefusal, YardError};
use super::event::EventLog;
use super::lifecycle::{Outcome, Planned};
use super::store::WriteBatch;
use chrono::Utc;
use tracing::debug;

pub fn plan_undo(container: &Container, log: &EventLog, now: TimeStamp<Utc>) -> Result<Planned> {
    let head = log.undo_candidate().map_err(YardError::Unrevertable)?;
    let changes = head
        .changes()
        .ok_or(YardError::Unrevertable(UndoRefusal::NoChanges))?;

    let mut reverted = container.clone();
    changes.inverse_patch().apply(&mut reverted);
    reverted.last_update = now;
    debug!(container = %container.id, event = %head.id, fields = changes.len(), "reverting");

    Ok(Planned {
        batch: WriteBatch::new().set(reverted.clone()).remove_event(head),
        outcome: Outcome::Reverted(reverted),
    })
}
