//! Container lifecycle state machine
//!
//! Planners here are pure: they take the current record, its event log and
//! the reference data, check the guards and gates of the requested
//! transition, and return the [`WriteBatch`] that performs it. Reading and
//! committing is left to the caller.

use super::archive;
use super::container::{ArchiveRecord, Booking, Container, TimeStamp, UNRESOLVED_BOOKING_TYPE};
use super::diff::{ChangeSet, Field};
use super::error::{Result, ValidationError, YardError};
use super::event::{Event, EventKind, EventLog};
use super::reference::ReferenceProvider;
use super::status::{KnownStatus, Status};
use super::store::WriteBatch;
use super::utils;
use chrono::Utc;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    Create,
    MoveToLocation,
    MarkLoaded,
    Update,
    AssignDriver,
    PierResponse,
    Delete,
    Undo,
}

impl TransitionKind {
    /// Operations that can be requested for a container that already exists.
    pub const EXISTING: [TransitionKind; 7] = [
        TransitionKind::MoveToLocation,
        TransitionKind::MarkLoaded,
        TransitionKind::Update,
        TransitionKind::AssignDriver,
        TransitionKind::PierResponse,
        TransitionKind::Undo,
        TransitionKind::Delete,
    ];
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransitionKind::Create => "create",
            TransitionKind::MoveToLocation => "move to location",
            TransitionKind::MarkLoaded => "mark as loaded",
            TransitionKind::Update => "update",
            TransitionKind::AssignDriver => "assign driver",
            TransitionKind::PierResponse => "pier response",
            TransitionKind::Delete => "delete",
            TransitionKind::Undo => "undo",
        };
        f.write_str(name)
    }
}

/// A transition request as accepted at the service boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create {
        number: String,
        booking: String,
        tare_weight: Option<f64>,
    },
    MoveToLocation { id: String, location: String },
    MarkLoaded { id: String },
    Update { id: String, proposed: Container },
    AssignDriver { id: String, driver: String },
    PierResponse { id: String, accepted: bool },
    Delete { id: String },
    Undo { id: String },
}

impl Command {
    pub fn kind(&self) -> TransitionKind {
        match self {
            Command::Create { .. } => TransitionKind::Create,
            Command::MoveToLocation { .. } => TransitionKind::MoveToLocation,
            Command::MarkLoaded { .. } => TransitionKind::MarkLoaded,
            Command::Update { .. } => TransitionKind::Update,
            Command::AssignDriver { .. } => TransitionKind::AssignDriver,
            Command::PierResponse { .. } => TransitionKind::PierResponse,
            Command::Delete { .. } => TransitionKind::Delete,
            Command::Undo { .. } => TransitionKind::Undo,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Created(Container),
    Updated(Container),
    /// The proposed record matched the stored one; nothing was written.
    Unchanged(Container),
    Archived(ArchiveRecord),
    Deleted { id: String, events_removed: usize },
    Reverted(Container),
}

impl Outcome {
    /// The container record this outcome leaves behind, if any.
    pub fn into_container(self) -> Option<Container> {
        match self {
            Outcome::Created(c) | Outcome::Updated(c) | Outcome::Unchanged(c) | Outcome::Reverted(c) => {
                Some(c)
            }
            Outcome::Archived(record) => Some(record.snapshot),
            Outcome::Deleted { .. } => None,
        }
    }
}

/// The writes for one transition and what the caller gets back once they commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Planned {
    pub batch: WriteBatch,
    pub outcome: Outcome,
}

impl Planned {
    pub fn unchanged(container: &Container) -> Self {
        Self {
            batch: WriteBatch::new(),
            outcome: Outcome::Unchanged(container.clone()),
        }
    }
}

fn is_parked(status: &Status, refs: &dyn ReferenceProvider) -> bool {
    !status.is_assigned_to_driver() && refs.is_location(&status.label())
}

/// Checks that the current status permits `kind`.
pub fn check(kind: TransitionKind, container: &Container, refs: &dyn ReferenceProvider) -> Result<()> {
    let status = &container.status;
    let allowed = match kind {
        TransitionKind::MoveToLocation => status.is(KnownStatus::New),
        TransitionKind::MarkLoaded => is_parked(status, refs),
        TransitionKind::Update => {
            !(status.is(KnownStatus::New)
                || status.is(KnownStatus::AllGoodBookForDelivery)
                || status.is_assigned_to_driver()
                || is_parked(status, refs))
        }
        TransitionKind::AssignDriver => status.is(KnownStatus::AllGoodBookForDelivery),
        TransitionKind::PierResponse => status.is_assigned_to_driver(),
        TransitionKind::Delete | TransitionKind::Undo => true,
        // the container already exists
        TransitionKind::Create => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(YardError::IllegalTransition {
            operation: kind,
            status: status.label(),
        })
    }
}

/// The operations the current state permits, as data.
pub fn legal_transitions(
    container: &Container,
    log: &EventLog,
    refs: &dyn ReferenceProvider,
) -> Vec<TransitionKind> {
    TransitionKind::EXISTING
        .into_iter()
        .filter(|kind| match kind {
            TransitionKind::Undo => log.undo_candidate().is_ok(),
            _ => check(*kind, container, refs).is_ok(),
        })
        .collect()
}

/// Fields the delivery booking needs that `container` lacks, in declaration order.
pub fn missing_delivery_fields(container: &Container) -> Vec<Field> {
    let mut missing = Vec::new();
    if container.truck.trim().is_empty() {
        missing.push(Field::Truck);
    }
    if container.chassis.trim().is_empty() {
        missing.push(Field::Chassis);
    }
    if container.seal.trim().is_empty() {
        missing.push(Field::Seal);
    }
    if container.gross_weight == 0.0 {
        missing.push(Field::GrossWeight);
    }
    missing
}

// builds the event and merge patch for a set of changes against `current`
fn plan_change(
    current: &Container,
    log: &EventLog,
    changes: ChangeSet,
    kind: EventKind,
    now: TimeStamp<Utc>,
) -> Result<Planned> {
    let at = log.next_timestamp(now);
    let patch = changes.forward_patch().touched(at);
    let mut updated = current.clone();
    patch.apply(&mut updated);

    let event = Event::new(&current.id, at, kind, Some(changes))?;
    Ok(Planned {
        batch: WriteBatch::new().update(&current.id, patch).append_event(event),
        outcome: Outcome::Updated(updated),
    })
}

/// Intake. `booking` is the resolved booking record, if the id is known.
pub fn plan_create(
    number: &str,
    booking_id: &str,
    booking: Option<&Booking>,
    tare_weight: Option<f64>,
    now: TimeStamp<Utc>,
) -> Result<Planned> {
    let booking_id = utils::normalise_key(booking_id);
    if booking_id.is_empty() {
        return Err(ValidationError::MissingBooking.into());
    }
    let id = utils::container_number(number)?;

    let booked_for = booking
        .map(|b| b.container_type.as_str())
        .unwrap_or(UNRESOLVED_BOOKING_TYPE);
    let container = Container::intake(&id, &booking_id, booked_for, now)
        .set_tare_weight(tare_weight.filter(|w| w.is_finite()).unwrap_or(0.0));

    let event = Event::new(&id, now, EventKind::Created { booking: booking_id }, None)?;
    Ok(Planned {
        batch: WriteBatch::new()
            .create(container.clone())
            .append_event(event),
        outcome: Outcome::Created(container),
    })
}

pub fn plan_move_to_location(
    container: &Container,
    log: &EventLog,
    refs: &dyn ReferenceProvider,
    location: &str,
    now: TimeStamp<Utc>,
) -> Result<Planned> {
    check(TransitionKind::MoveToLocation, container, refs)?;
    let location = location.trim();
    if location.is_empty() {
        return Err(ValidationError::MissingLocation.into());
    }
    if !refs.is_location(location) {
        return Err(ValidationError::UnknownLocation(location.to_string()).into());
    }

    let moved = container.clone().set_status(Status::from_label(location));
    let changes = ChangeSet::between(container, &moved);
    plan_change(container, log, changes, EventKind::MovedToLocation, now)
}

pub fn plan_mark_loaded(
    container: &Container,
    log: &EventLog,
    refs: &dyn ReferenceProvider,
    now: TimeStamp<Utc>,
) -> Result<Planned> {
    check(TransitionKind::MarkLoaded, container, refs)?;

    let loaded = container
        .clone()
        .set_status(KnownStatus::LoadingComplete.into());
    let changes = ChangeSet::between(container, &loaded);
    plan_change(container, log, changes, EventKind::Loaded, now)
}

/// Free edit of every persisted field. A proposal identical to the stored
/// record plans no writes.
pub fn plan_update(
    container: &Container,
    log: &EventLog,
    refs: &dyn ReferenceProvider,
    proposed: &Container,
    now: TimeStamp<Utc>,
) -> Result<Planned> {
    if proposed.id != container.id {
        return Err(ValidationError::ContainerMismatch {
            expected: container.id.clone(),
            found: proposed.id.clone(),
        }
        .into());
    }
    check(TransitionKind::Update, container, refs)?;
    for (field, value) in [
        (Field::GrossWeight, proposed.gross_weight),
        (Field::TareWeight, proposed.tare_weight),
    ] {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteNumber(field).into());
        }
    }

    let target = &proposed.status;
    if *target != container.status && !target.is_update_option() {
        return Err(ValidationError::StatusNotSelectable(target.label()).into());
    }
    if target.is(KnownStatus::AllGoodBookForDelivery) {
        let missing = missing_delivery_fields(proposed);
        if !missing.is_empty() {
            return Err(ValidationError::MissingDeliveryFields(missing).into());
        }
    }

    let changes = ChangeSet::between(container, proposed);
    if changes.is_empty() {
        return Ok(Planned::unchanged(container));
    }
    plan_change(container, log, changes, EventKind::Updated, now)
}

pub fn plan_assign_driver(
    container: &Container,
    log: &EventLog,
    refs: &dyn ReferenceProvider,
    driver: &str,
    now: TimeStamp<Utc>,
) -> Result<Planned> {
    check(TransitionKind::AssignDriver, container, refs)?;
    let driver = driver.trim();
    if driver.is_empty() {
        return Err(ValidationError::MissingDriver.into());
    }
    if refs.driver(driver).is_none() {
        return Err(ValidationError::UnknownDriver(driver.to_string()).into());
    }

    let assigned = container
        .clone()
        .set_status(Status::AssignedToDriver(driver.to_string()))
        .set_delivery_driver(driver);
    let changes = ChangeSet::between(container, &assigned);
    plan_change(container, log, changes, EventKind::DriverAssigned, now)
}

/// Accept archives the container, deny is an ordinary status change.
pub fn plan_pier_response(
    container: &Container,
    log: &EventLog,
    refs: &dyn ReferenceProvider,
    accepted: bool,
    now: TimeStamp<Utc>,
) -> Result<Planned> {
    check(TransitionKind::PierResponse, container, refs)?;
    if accepted {
        return archive::plan_archive(container, log, now);
    }

    let denied = container.clone().set_status(Status::denied());
    let changes = ChangeSet::between(container, &denied);
    plan_change(container, log, changes, EventKind::PierDenied, now)
}

/// Removes the container and every event it owns.
pub fn plan_delete(container: &Container, log: &EventLog) -> Planned {
    let batch = log
        .iter()
        .fold(WriteBatch::new().delete(&container.id), |batch, event| {
            batch.remove_event(event)
        });
    Planned {
        batch,
        outcome: Outcome::Deleted {
            id: container.id.clone(),
            events_removed: log.len(),
        },
    }
}
