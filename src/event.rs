//! Audit events and the per-container undo stack
use super::container::TimeStamp;
use super::diff::ChangeSet;
use super::error::{Result, UndoRefusal, YardError};
use super::utils;
use chrono::Utc;
use std::cmp::Ordering;

const EVENT_ID_PREFIX: &str = "event_";
const CREATED_ACTION_PREFIX: &str = "Container created";

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub enum EventKind {
    #[n(0)]
    Created {
        #[n(0)]
        booking: String,
    },
    #[n(1)]
    MovedToLocation,
    #[n(2)]
    Loaded,
    #[n(3)]
    Updated,
    #[n(4)]
    DriverAssigned,
    #[n(5)]
    PierDenied,
    #[n(6)]
    PierAcceptedArchived,
    #[n(7)]
    Imported {
        #[n(0)]
        action: String,
    },
}

impl EventKind {
    pub fn action(&self) -> String {
        match self {
            EventKind::Created { booking } => {
                format!("{CREATED_ACTION_PREFIX} with status: New for booking {booking}")
            }
            EventKind::MovedToLocation => "Container moved to location".into(),
            EventKind::Loaded => "Container loaded".into(),
            EventKind::Updated => "Container updated".into(),
            EventKind::DriverAssigned => "Assigned to delivery driver".into(),
            EventKind::PierDenied => "Pier Denied".into(),
            EventKind::PierAcceptedArchived => "Pier Accepted & Archived".into(),
            EventKind::Imported { action } => action.clone(),
        }
    }
}

#[derive(Debug, PartialEq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct EventDetails {
    #[n(0)]
    pub kind: EventKind,
    #[n(1)]
    pub action: String, // human readable transition name
    #[n(2)]
    pub changes: Option<ChangeSet>, // absent only on the creation event
    #[n(3)]
    pub note: Option<String>,
}

#[derive(Debug, PartialEq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct Event {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7
    #[n(1)]
    pub container_id: String,
    #[n(2)]
    pub timestamp: TimeStamp<Utc>,
    #[n(3)]
    pub details: EventDetails,
}

impl Event {
    pub fn new(
        container_id: &str,
        timestamp: TimeStamp<Utc>,
        kind: EventKind,
        changes: Option<ChangeSet>,
    ) -> Result<Self> {
        let id = utils::new_uuid_to_bech32(EVENT_ID_PREFIX)
            .map_err(|e| YardError::Encoding(e.to_string()))?;

        Ok(Self {
            id,
            container_id: container_id.to_string(),
            timestamp,
            details: EventDetails {
                action: kind.action(),
                kind,
                changes,
                note: None,
            },
        })
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.details.note = Some(note.to_string());
        self
    }

    /// Rebuilds an event recorded with the free-text change description.
    pub fn from_legacy(
        container_id: &str,
        timestamp: TimeStamp<Utc>,
        action: &str,
        changes: Option<&str>,
    ) -> Result<Self> {
        let kind = match action.strip_prefix(CREATED_ACTION_PREFIX) {
            Some(rest) => EventKind::Created {
                booking: rest
                    .rsplit_once("for booking ")
                    .map(|(_, booking)| booking.trim().to_string())
                    .unwrap_or_default(),
            },
            None => EventKind::Imported {
                action: action.to_string(),
            },
        };
        let changes = changes
            .filter(|text| !text.trim().is_empty())
            .map(ChangeSet::parse_legacy);

        let mut event = Event::new(container_id, timestamp, kind, changes)?;
        event.details.action = action.to_string();
        Ok(event)
    }

    pub fn is_creation(&self) -> bool {
        matches!(self.details.kind, EventKind::Created { .. })
    }

    pub fn changes(&self) -> Option<&ChangeSet> {
        self.details.changes.as_ref()
    }

    pub fn storage_key(&self) -> String {
        event_key(&self.container_id, &self.id)
    }

    /// Returns the storage key and the CBOR encoding of this event.
    pub fn build(&self) -> Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        Ok((self.storage_key(), cbor))
    }

    /// Newest first; the id breaks timestamp ties.
    pub fn newest_first(a: &Event, b: &Event) -> Ordering {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.id.cmp(&a.id))
    }
}

pub fn event_key(container_id: &str, event_id: &str) -> String {
    format!("{container_id}/{event_id}")
}

pub fn container_prefix(container_id: &str) -> String {
    format!("{container_id}/")
}

/// The events of one container, newest first. The head is the undo candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLog {
    pub container_id: String,
    events: Vec<Event>,
}

impl EventLog {
    pub fn new(container_id: &str, mut events: Vec<Event>) -> Self {
        events.retain(|e| e.container_id == container_id);
        events.sort_by(Event::newest_first);
        Self {
            container_id: container_id.to_string(),
            events,
        }
    }

    pub fn newest(&self) -> Option<&Event> {
        self.events.first()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// A timestamp for the next event that sorts strictly after the current head.
    pub fn next_timestamp(&self, now: TimeStamp<Utc>) -> TimeStamp<Utc> {
        match self.newest() {
            Some(head) if head.timestamp >= now => head.timestamp.next_tick(),
            _ => now,
        }
    }

    /// The event an undo would consume.
    pub fn undo_candidate(&self) -> std::result::Result<&Event, UndoRefusal> {
        let head = self.newest().ok_or(UndoRefusal::NoHistory)?;
        if head.is_creation() {
            return Err(UndoRefusal::CreationEvent);
        }
        match head.changes() {
            Some(changes) if !changes.is_empty() => Ok(head),
            _ => Err(UndoRefusal::NoChanges),
        }
    }

    /// Only the creation event may lack a change set.
    pub fn is_well_formed(&self) -> bool {
        self.events
            .iter()
            .all(|e| e.is_creation() == e.changes().is_none())
    }
}
