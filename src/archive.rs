//! Pier acceptance
//!
//! The container leaves the active set and is frozen into the archive. Its
//! events stay behind and gain one more describing the move.
use super::container::{ArchiveRecord, Container, TimeStamp};
use super::diff::ChangeSet;
use super::error::Result;
use super::event::{Event, EventKind, EventLog};
use super::lifecycle::{Outcome, Planned};
use super::store::WriteBatch;
use chrono::Utc;

pub const ARCHIVE_NOTE: &str = "Container moved to archive.";

pub fn plan_archive(container: &Container, log: &EventLog, now: TimeStamp<Utc>) -> Result<Planned> {
    let at = log.next_timestamp(now);
    let record = ArchiveRecord::seal(container.clone(), at)?;
    let changes = ChangeSet::between(container, &record.snapshot);
    let event = Event::new(&container.id, at, EventKind::PierAcceptedArchived, Some(changes))?
        .with_note(ARCHIVE_NOTE);

    Ok(Planned {
        batch: WriteBatch::new()
            .archive(record.clone())
            .delete(&container.id)
            .append_event(event),
        outcome: Outcome::Archived(record),
    })
}
