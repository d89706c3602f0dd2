mod competitions;

pub use competitions::*;
use luckydraw_core::CoreError;
use thiserror::Error;

use crate::infra::{connector::ConnectorError, scheduler::SchedulerError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("item already exists: {0}")]
    AlreadyExists(String),
    #[error("{0}")]
    Validation(String),
    #[error("competition {0} kept changing underneath us, giving up")]
    Conflict(String),
    #[error("unrecognized action: {0}")]
    UnrecognizedAction(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("problem querying db: {0}")]
    DbError(#[from] sqlx::Error),
    #[error("failed to schedule draw: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("failed to reach chat connector: {0}")]
    Connector(#[from] ConnectorError),
}

impl From<CoreError> for Error {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(msg) => Error::Validation(msg),
        }
    }
}
