//! Service layer API for container lifecycle operations
use super::config::YardConfig;
use super::container::{ArchiveRecord, Booking, Container, TimeStamp};
use super::error::{Result, YardError};
use super::event::{Event, EventLog};
use super::lifecycle::{self, Command, Outcome, Planned, TransitionKind};
use super::reference::ReferenceProvider;
use super::sled_store::SledStore;
use super::store::{Store, WriteBatch};
use super::subscription::{Predicate, Subscription};
use super::undo;
use super::utils;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct YardService {
    store: Arc<dyn Store>,
    references: Arc<dyn ReferenceProvider>,
}

impl YardService {
    pub fn new(store: Arc<dyn Store>, references: Arc<dyn ReferenceProvider>) -> Self {
        Self { store, references }
    }

    /// Opens the sled store described by `config`.
    pub fn from_config(
        config: &YardConfig,
        references: Arc<dyn ReferenceProvider>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let store = SledStore::open(&config.storage)?;
        Ok(Self::new(Arc::new(store), references))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn references(&self) -> &Arc<dyn ReferenceProvider> {
        &self.references
    }

    /// Loads the record and a fresh read of its event log.
    async fn load(&self, id: &str) -> Result<(Container, EventLog)> {
        let id = utils::normalise_key(id);
        let container = self
            .store
            .container(&id)
            .await?
            .ok_or_else(|| YardError::NotFound(id.clone()))?;
        let log = self.store.event_log(&id).await?;
        Ok((container, log))
    }

    async fn plan(&self, command: Command) -> Result<Planned> {
        let now = TimeStamp::new();
        let refs = self.references.as_ref();

        match command {
            Command::Create {
                number,
                booking,
                tare_weight,
            } => {
                let booking_id = utils::normalise_key(&booking);
                let mut record = None;
                if !booking_id.is_empty() {
                    record = self.store.booking(&booking_id).await?;
                    if record.is_none() {
                        warn!(booking = %booking_id, "booking not found, container type recorded as N/A");
                    }
                }
                lifecycle::plan_create(&number, &booking_id, record.as_ref(), tare_weight, now)
            }
            Command::MoveToLocation { id, location } => {
                let (container, log) = self.load(&id).await?;
                lifecycle::plan_move_to_location(&container, &log, refs, &location, now)
            }
            Command::MarkLoaded { id } => {
                let (container, log) = self.load(&id).await?;
                lifecycle::plan_mark_loaded(&container, &log, refs, now)
            }
            Command::Update { id, proposed } => {
                let (container, log) = self.load(&id).await?;
                lifecycle::plan_update(&container, &log, refs, &proposed, now)
            }
            Command::AssignDriver { id, driver } => {
                let (container, log) = self.load(&id).await?;
                lifecycle::plan_assign_driver(&container, &log, refs, &driver, now)
            }
            Command::PierResponse { id, accepted } => {
                let (container, log) = self.load(&id).await?;
                lifecycle::plan_pier_response(&container, &log, refs, accepted, now)
            }
            Command::Delete { id } => {
                let (container, log) = self.load(&id).await?;
                Ok(lifecycle::plan_delete(&container, &log))
            }
            Command::Undo { id } => {
                let (container, log) = self.load(&id).await?;
                undo::plan_undo(&container, &log, now)
            }
        }
    }

    /// Validates, plans and atomically commits one transition.
    pub async fn execute(&self, command: Command) -> Result<Outcome> {
        let kind = command.kind();
        let planned = match self.plan(command).await {
            Ok(planned) => planned,
            Err(err) => {
                warn!(operation = %kind, %err, "transition refused");
                return Err(err);
            }
        };

        if planned.batch.is_empty() {
            debug!(operation = %kind, "nothing changed, no event recorded");
            return Ok(planned.outcome);
        }
        let ops = planned.batch.len();
        if let Err(err) = self.store.commit(planned.batch).await {
            warn!(operation = %kind, %err, "transition did not commit");
            return Err(err);
        }

        match &planned.outcome {
            Outcome::Archived(record) => {
                info!(container = %record.container_id(), digest = %record.digest, "pier accepted, container archived")
            }
            Outcome::Deleted { id, events_removed } => {
                info!(container = %id, events_removed, "container deleted")
            }
            Outcome::Created(c) | Outcome::Updated(c) | Outcome::Unchanged(c) | Outcome::Reverted(c) => {
                info!(container = %c.id, operation = %kind, status = %c.status, ops, "transition committed")
            }
        }
        Ok(planned.outcome)
    }

    async fn execute_for_container(&self, command: Command) -> Result<Container> {
        let id = match &command {
            Command::Create { number, .. } => number.clone(),
            Command::MoveToLocation { id, .. }
            | Command::MarkLoaded { id }
            | Command::Update { id, .. }
            | Command::AssignDriver { id, .. }
            | Command::PierResponse { id, .. }
            | Command::Delete { id }
            | Command::Undo { id } => id.clone(),
        };
        self.execute(command)
            .await?
            .into_container()
            .ok_or(YardError::NotFound(id))
    }

    pub async fn register_booking(&self, id: &str, quantity: u32, container_type: &str) -> Result<Booking> {
        let booking = Booking::new(id, quantity, container_type)?;
        self.store
            .commit(WriteBatch::new().booking(booking.clone()))
            .await?;
        info!(booking = %booking.id, quantity, container_type = %booking.container_type, "booking registered");
        Ok(booking)
    }

    pub async fn create_container(
        &self,
        number: &str,
        booking: &str,
        tare_weight: Option<f64>,
    ) -> Result<Container> {
        self.execute_for_container(Command::Create {
            number: number.to_string(),
            booking: booking.to_string(),
            tare_weight,
        })
        .await
    }

    pub async fn move_to_location(&self, id: &str, location: &str) -> Result<Container> {
        self.execute_for_container(Command::MoveToLocation {
            id: id.to_string(),
            location: location.to_string(),
        })
        .await
    }

    pub async fn mark_loaded(&self, id: &str) -> Result<Container> {
        self.execute_for_container(Command::MarkLoaded { id: id.to_string() })
            .await
    }

    /// Free edit. Returns the stored record, unchanged when `proposed` matches it.
    pub async fn update_container(&self, id: &str, proposed: Container) -> Result<Container> {
        self.execute_for_container(Command::Update {
            id: id.to_string(),
            proposed,
        })
        .await
    }

    pub async fn assign_driver(&self, id: &str, driver: &str) -> Result<Container> {
        self.execute_for_container(Command::AssignDriver {
            id: id.to_string(),
            driver: driver.to_string(),
        })
        .await
    }

    /// `Outcome::Archived` on accept, `Outcome::Updated` on deny.
    pub async fn pier_response(&self, id: &str, accepted: bool) -> Result<Outcome> {
        self.execute(Command::PierResponse {
            id: id.to_string(),
            accepted,
        })
        .await
    }

    /// Returns the number of events removed with the container.
    pub async fn delete_container(&self, id: &str) -> Result<usize> {
        match self.execute(Command::Delete { id: id.to_string() }).await? {
            Outcome::Deleted { events_removed, .. } => Ok(events_removed),
            _ => Ok(0),
        }
    }

    pub async fn undo_last(&self, id: &str) -> Result<Container> {
        self.execute_for_container(Command::Undo { id: id.to_string() })
            .await
    }

    pub async fn container(&self, id: &str) -> Result<Option<Container>> {
        self.store.container(&utils::normalise_key(id)).await
    }

    pub async fn containers(&self) -> Result<Vec<Container>> {
        self.store.list().await
    }

    pub async fn search(&self, term: &str) -> Result<Vec<Container>> {
        let mut found = self.store.list().await?;
        found.retain(|c| c.matches_search(term));
        Ok(found)
    }

    /// Full history of a container, newest first. Still readable after archival.
    pub async fn history(&self, id: &str) -> Result<EventLog> {
        self.store.event_log(&utils::normalise_key(id)).await
    }

    pub async fn legal_transitions(&self, id: &str) -> Result<Vec<TransitionKind>> {
        let (container, log) = self.load(id).await?;
        Ok(lifecycle::legal_transitions(
            &container,
            &log,
            self.references.as_ref(),
        ))
    }

    pub async fn archived(&self, id: &str) -> Result<Vec<ArchiveRecord>> {
        self.store.archived(&utils::normalise_key(id)).await
    }

    pub async fn archive(&self) -> Result<Vec<ArchiveRecord>> {
        self.store.archive().await
    }

    pub fn subscribe(&self, predicate: Predicate<Container>) -> Subscription<Container> {
        self.store.subscribe(predicate)
    }

    /// Live view of the containers matching a search term.
    pub fn subscribe_search(&self, term: &str) -> Subscription<Container> {
        let term = term.to_string();
        self.store
            .subscribe(Box::new(move |c: &Container| c.matches_search(&term)))
    }

    pub fn subscribe_history(&self, id: &str) -> Subscription<Event> {
        self.store.subscribe_events(&utils::normalise_key(id))
    }
}
