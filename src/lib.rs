pub mod archive;
pub mod config;
pub mod container;
pub mod diff;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod logging;
pub mod reference;
pub mod service;
pub mod sled_store;
pub mod status;
pub mod store;
pub mod subscription;
pub mod undo;
pub mod utils;

pub use container::{ArchiveRecord, Booking, Container, ContainerPatch, TimeStamp};
pub use diff::{ChangeSet, Field, FieldChange, FieldValue};
pub use error::{Result, UndoRefusal, ValidationError, YardError};
pub use event::{Event, EventKind, EventLog};
pub use lifecycle::{Command, Outcome, TransitionKind};
pub use service::YardService;
pub use status::{KnownStatus, Status};
pub use store::{Store, WriteBatch};
