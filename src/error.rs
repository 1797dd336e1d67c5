use crate::diff::Field;
use crate::lifecycle::TransitionKind;

pub type Result<T> = std::result::Result<T, YardError>;

#[derive(thiserror::Error, Debug)]
pub enum YardError {
    #[error("validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
    #[error("{operation} is not permitted while the container is '{status}'")]
    IllegalTransition {
        operation: TransitionKind,
        status: String,
    },
    #[error("cannot undo: {0}")]
    Unrevertable(UndoRefusal),
    #[error("the atomic write did not commit: {0}")]
    PersistenceFailure(String),
    #[error("container {0} was not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("container {0} changed since it was read")]
    Conflict(String),
    #[error("failed to encode or decode a stored record: {0}")]
    Encoding(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("container number is required")]
    MissingContainerNumber,
    #[error("container number '{0}' must be alphanumeric")]
    MalformedContainerNumber(String),
    #[error("a booking must be selected")]
    MissingBooking,
    #[error("a location must be selected")]
    MissingLocation,
    #[error("a driver must be selected")]
    MissingDriver,
    #[error("'{0}' is not a registered location")]
    UnknownLocation(String),
    #[error("'{0}' is not a registered driver")]
    UnknownDriver(String),
    #[error("{0} must be a finite number")]
    NonFiniteNumber(Field),
    #[error("booking for delivery requires {}", Field::list(.0))]
    MissingDeliveryFields(Vec<Field>),
    #[error("booking is missing its {0}")]
    BookingIncomplete(&'static str),
    #[error("'{0}' cannot be selected as an update status")]
    StatusNotSelectable(String),
    #[error("proposed record is for container {found}, expected {expected}")]
    ContainerMismatch { expected: String, found: String },
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoRefusal {
    #[error("no previous state found")]
    NoHistory,
    #[error("the creation of a container cannot be undone, delete it instead")]
    CreationEvent,
    #[error("the most recent event carries no changes")]
    NoChanges,
}

impl From<sled::Error> for YardError {
    fn from(value: sled::Error) -> Self {
        YardError::PersistenceFailure(value.to_string())
    }
}

impl From<sled::transaction::TransactionError<YardError>> for YardError {
    fn from(value: sled::transaction::TransactionError<YardError>) -> Self {
        match value {
            sled::transaction::TransactionError::Abort(err) => err,
            sled::transaction::TransactionError::Storage(err) => err.into(),
        }
    }
}

impl From<minicbor::decode::Error> for YardError {
    fn from(value: minicbor::decode::Error) -> Self {
        YardError::Encoding(value.to_string())
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for YardError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        YardError::Encoding(value.to_string())
    }
}

impl From<tokio::task::JoinError> for YardError {
    fn from(value: tokio::task::JoinError) -> Self {
        YardError::PersistenceFailure(value.to_string())
    }
}
