//! sled backed [`Store`]
//!
//! Four trees, one per collection. A [`WriteBatch`] is committed as a single
//! multi-tree transaction, so readers never see half of a lifecycle step.
use super::config::StorageConfig;
use super::container::{decode_container, ArchiveRecord, Booking, Container, ContainerPatch};
use super::error::{Result, YardError};
use super::event::{container_prefix, event_key, Event};
use super::store::{BatchOp, Store, WriteBatch};
use super::subscription::{Observers, Predicate, Subscription};
use async_trait::async_trait;
use sled::transaction::{abort, ConflictableTransactionResult, TransactionalTree};
use sled::{Transactional, Tree};
use std::sync::Arc;
use tracing::debug;

const CONTAINERS: &str = "containers";
const EVENTS: &str = "events";
const BOOKINGS: &str = "bookings";
const ARCHIVE: &str = "archive";

#[derive(Clone)]
struct Trees {
    containers: Tree,
    events: Tree,
    bookings: Tree,
    archive: Tree,
}

// a batch op with its key and value encoded ahead of the transaction
enum Staged {
    Create { key: String, value: Vec<u8> },
    Set { key: String, value: Vec<u8> },
    Update { key: String, patch: ContainerPatch },
    Delete { key: String },
    PutEvent { key: String, value: Vec<u8> },
    DeleteEvent { owner: String, key: String },
    PutBooking { key: String, value: Vec<u8> },
    PutArchive { key: String, value: Vec<u8> },
}

pub struct SledStore {
    db: Arc<sled::Db>,
    trees: Trees,
    flush_on_commit: bool,
    container_feed: Observers<Container>,
    event_feed: Observers<Event>,
}

impl SledStore {
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let db = sled::Config::new()
            .path(&config.path)
            .temporary(config.temporary)
            .cache_capacity(config.cache_capacity_bytes)
            .open()?;
        Self::with_db(Arc::new(db), config.flush_on_commit)
    }

    /// A throwaway database removed on drop.
    pub fn temporary() -> Result<Self> {
        Self::open(&StorageConfig::temporary())
    }

    pub fn with_db(db: Arc<sled::Db>, flush_on_commit: bool) -> Result<Self> {
        let trees = Trees {
            containers: db.open_tree(CONTAINERS)?,
            events: db.open_tree(EVENTS)?,
            bookings: db.open_tree(BOOKINGS)?,
            archive: db.open_tree(ARCHIVE)?,
        };
        Ok(Self {
            db,
            trees,
            flush_on_commit,
            container_feed: Observers::new(),
            event_feed: Observers::new(),
        })
    }

    pub fn db(&self) -> &Arc<sled::Db> {
        &self.db
    }
}

fn load_containers(tree: &Tree) -> Result<Vec<Container>> {
    tree.iter()
        .values()
        .map(|value| -> Result<Container> { decode_container(&value?) })
        .collect()
}

fn load_events(tree: &Tree, prefix: &str) -> Result<Vec<Event>> {
    let mut events = tree
        .scan_prefix(prefix.as_bytes())
        .values()
        .map(|value| -> Result<Event> { Ok(minicbor::decode(&value?)?) })
        .collect::<Result<Vec<_>>>()?;
    events.sort_by(Event::newest_first);
    Ok(events)
}

fn load_archive(tree: &Tree, prefix: &str) -> Result<Vec<ArchiveRecord>> {
    tree.scan_prefix(prefix.as_bytes())
        .values()
        .map(|value| -> Result<ArchiveRecord> { Ok(minicbor::decode(&value?)?) })
        .collect()
}

fn stage(batch: &WriteBatch) -> Result<Vec<Staged>> {
    batch
        .ops()
        .iter()
        .map(|op| -> Result<Staged> {
            Ok(match op {
                BatchOp::CreateContainer(container) => Staged::Create {
                    key: container.id.clone(),
                    value: minicbor::to_vec(container)?,
                },
                BatchOp::SetContainer(container) => Staged::Set {
                    key: container.id.clone(),
                    value: minicbor::to_vec(container)?,
                },
                BatchOp::UpdateContainer { id, patch } => Staged::Update {
                    key: id.clone(),
                    patch: patch.clone(),
                },
                BatchOp::DeleteContainer(id) => Staged::Delete { key: id.clone() },
                BatchOp::PutEvent(event) => {
                    let (key, value) = event.build()?;
                    Staged::PutEvent { key, value }
                }
                BatchOp::DeleteEvent {
                    container_id,
                    event_id,
                } => Staged::DeleteEvent {
                    owner: container_id.clone(),
                    key: event_key(container_id, event_id),
                },
                BatchOp::PutBooking(booking) => Staged::PutBooking {
                    key: booking.id.clone(),
                    value: minicbor::to_vec(booking)?,
                },
                BatchOp::PutArchive(record) => Staged::PutArchive {
                    key: record.storage_key(),
                    value: minicbor::to_vec(record)?,
                },
            })
        })
        .collect()
}

// merge a patch inside the transaction so it sees earlier writes of the same batch
fn merge(
    containers: &TransactionalTree,
    key: &str,
    patch: &ContainerPatch,
) -> ConflictableTransactionResult<(), YardError> {
    let Some(current) = containers.get(key.as_bytes())? else {
        return abort(YardError::NotFound(key.to_string()));
    };
    let mut container = match decode_container(&current) {
        Ok(container) => container,
        Err(err) => return abort(err),
    };
    patch.apply(&mut container);
    match minicbor::to_vec(&container) {
        Ok(value) => {
            containers.insert(key.as_bytes(), value)?;
            Ok(())
        }
        Err(err) => abort(err.into()),
    }
}

fn apply(trees: &Trees, staged: &[Staged]) -> Result<()> {
    (&trees.containers, &trees.events, &trees.bookings, &trees.archive).transaction(
        |(containers, events, bookings, archive)| {
            for op in staged {
                match op {
                    Staged::Create { key, value } => {
                        if containers.get(key.as_bytes())?.is_some() {
                            return abort(YardError::AlreadyExists(format!("container {key}")));
                        }
                        containers.insert(key.as_bytes(), value.as_slice())?;
                    }
                    // a full overwrite must not resurrect an archived or deleted record
                    Staged::Set { key, value } => {
                        if containers.get(key.as_bytes())?.is_none() {
                            return abort(YardError::NotFound(key.clone()));
                        }
                        containers.insert(key.as_bytes(), value.as_slice())?;
                    }
                    Staged::Update { key, patch } => merge(containers, key, patch)?,
                    Staged::Delete { key } => {
                        containers.remove(key.as_bytes())?;
                    }
                    Staged::PutEvent { key, value } => {
                        events.insert(key.as_bytes(), value.as_slice())?;
                    }
                    Staged::DeleteEvent { owner, key } => {
                        if events.remove(key.as_bytes())?.is_none() {
                            return abort(YardError::Conflict(owner.clone()));
                        }
                    }
                    Staged::PutBooking { key, value } => {
                        bookings.insert(key.as_bytes(), value.as_slice())?;
                    }
                    Staged::PutArchive { key, value } => {
                        if archive.get(key.as_bytes())?.is_some() {
                            return abort(YardError::AlreadyExists(format!("archive record {key}")));
                        }
                        archive.insert(key.as_bytes(), value.as_slice())?;
                    }
                }
            }
            Ok(())
        },
    )?;
    Ok(())
}

#[async_trait]
impl Store for SledStore {
    async fn container(&self, id: &str) -> Result<Option<Container>> {
        self.trees
            .containers
            .get(id.as_bytes())?
            .map(|value| decode_container(&value))
            .transpose()
    }

    async fn containers(&self) -> Result<Vec<Container>> {
        load_containers(&self.trees.containers)
    }

    async fn booking(&self, id: &str) -> Result<Option<Booking>> {
        match self.trees.bookings.get(id.as_bytes())? {
            Some(value) => Ok(Some(minicbor::decode(&value)?)),
            None => Ok(None),
        }
    }

    async fn events_for(&self, container_id: &str) -> Result<Vec<Event>> {
        load_events(&self.trees.events, &container_prefix(container_id))
    }

    async fn archived(&self, container_id: &str) -> Result<Vec<ArchiveRecord>> {
        load_archive(&self.trees.archive, &container_prefix(container_id))
    }

    async fn archive(&self) -> Result<Vec<ArchiveRecord>> {
        load_archive(&self.trees.archive, "")
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let touches_containers = batch.ops().iter().any(|op| {
            matches!(
                op,
                BatchOp::CreateContainer(_)
                    | BatchOp::SetContainer(_)
                    | BatchOp::UpdateContainer { .. }
                    | BatchOp::DeleteContainer(_)
            )
        });
        let mut event_owners: Vec<String> = batch
            .ops()
            .iter()
            .filter_map(|op| match op {
                BatchOp::PutEvent(event) => Some(event.container_id.clone()),
                BatchOp::DeleteEvent { container_id, .. } => Some(container_id.clone()),
                _ => None,
            })
            .collect();
        event_owners.sort();
        event_owners.dedup();

        let staged = stage(&batch)?;
        let trees = self.trees.clone();
        tokio::task::spawn_blocking(move || apply(&trees, &staged)).await??;

        if self.flush_on_commit {
            self.db.flush_async().await?;
        }
        debug!(ops = batch.len(), "batch committed");

        if !touches_containers && event_owners.is_empty() {
            return Ok(());
        }
        let (trees, containers, events) = (
            self.trees.clone(),
            self.container_feed.clone(),
            self.event_feed.clone(),
        );
        tokio::task::spawn_blocking(move || {
            if touches_containers {
                containers.publish(|| load_containers(&trees.containers));
            }
            events.publish_scoped(&event_owners, |owner| {
                load_events(&trees.events, &container_prefix(owner))
            });
        })
        .await?;
        Ok(())
    }

    fn subscribe(&self, predicate: Predicate<Container>) -> Subscription<Container> {
        self.container_feed
            .register(predicate, || load_containers(&self.trees.containers))
    }

    fn subscribe_events(&self, container_id: &str) -> Subscription<Event> {
        let prefix = container_prefix(container_id);
        let owner = container_id.to_string();
        self.event_feed.register_scoped(
            container_id,
            Box::new(move |event: &Event| event.container_id == owner),
            || load_events(&self.trees.events, &prefix),
        )
    }
}
