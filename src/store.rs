//! Persistence contract for the lifecycle
//!
//! Every mutation goes through [`Store::commit`]: a [`WriteBatch`] of
//! heterogeneous writes across the container, event, booking and archive
//! collections that is applied entirely or not at all.

use super::container::{ArchiveRecord, Booking, Container, ContainerPatch};
use super::error::Result;
use super::event::{Event, EventLog};
use super::subscription::{Predicate, Subscription};
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Fails with `AlreadyExists` if the container number is taken.
    CreateContainer(Container),
    /// Overwrite; fails with `NotFound` if the container is absent.
    SetContainer(Container),
    /// Merge; fails with `NotFound` if the container is absent.
    UpdateContainer { id: String, patch: ContainerPatch },
    DeleteContainer(String),
    PutEvent(Event),
    /// Fails with `Conflict` if the event is already gone.
    DeleteEvent { container_id: String, event_id: String },
    PutBooking(Booking),
    /// Archive records are immutable; fails with `AlreadyExists` on a second write.
    PutArchive(ArchiveRecord),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn create(mut self, container: Container) -> Self {
        self.ops.push(BatchOp::CreateContainer(container));
        self
    }
    pub fn set(mut self, container: Container) -> Self {
        self.ops.push(BatchOp::SetContainer(container));
        self
    }
    pub fn update(mut self, id: &str, patch: ContainerPatch) -> Self {
        self.ops.push(BatchOp::UpdateContainer {
            id: id.to_string(),
            patch,
        });
        self
    }
    pub fn delete(mut self, id: &str) -> Self {
        self.ops.push(BatchOp::DeleteContainer(id.to_string()));
        self
    }
    pub fn append_event(mut self, event: Event) -> Self {
        self.ops.push(BatchOp::PutEvent(event));
        self
    }
    pub fn remove_event(mut self, event: &Event) -> Self {
        self.ops.push(BatchOp::DeleteEvent {
            container_id: event.container_id.clone(),
            event_id: event.id.clone(),
        });
        self
    }
    pub fn booking(mut self, booking: Booking) -> Self {
        self.ops.push(BatchOp::PutBooking(booking));
        self
    }
    pub fn archive(mut self, record: ArchiveRecord) -> Self {
        self.ops.push(BatchOp::PutArchive(record));
        self
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
    pub fn len(&self) -> usize {
        self.ops.len()
    }
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn container(&self, id: &str) -> Result<Option<Container>>;
    async fn containers(&self) -> Result<Vec<Container>>;
    async fn booking(&self, id: &str) -> Result<Option<Booking>>;
    /// Events of one container in storage order; callers sort.
    async fn events_for(&self, container_id: &str) -> Result<Vec<Event>>;
    /// Archive records of one container number, oldest first.
    async fn archived(&self, container_id: &str) -> Result<Vec<ArchiveRecord>>;
    async fn archive(&self) -> Result<Vec<ArchiveRecord>>;

    /// Applies every op of `batch` atomically.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// Live view of the containers matching `predicate`. The current
    /// result set is delivered immediately and again after every change to it.
    fn subscribe(&self, predicate: Predicate<Container>) -> Subscription<Container>;

    /// Live view of one container's events, newest first.
    fn subscribe_events(&self, container_id: &str) -> Subscription<Event>;

    async fn create(&self, container: Container) -> Result<()> {
        self.commit(WriteBatch::new().create(container)).await
    }

    async fn get(&self, id: &str) -> Result<Option<Container>> {
        self.container(id).await
    }

    async fn update(&self, id: &str, patch: ContainerPatch) -> Result<()> {
        self.commit(WriteBatch::new().update(id, patch)).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.commit(WriteBatch::new().delete(id)).await
    }

    async fn list(&self) -> Result<Vec<Container>> {
        self.containers().await
    }

    async fn event_log(&self, container_id: &str) -> Result<EventLog> {
        let events = self.events_for(container_id).await?;
        Ok(EventLog::new(container_id, events))
    }
}
