//! Shared error types for the services crate.

use thiserror::Error;

use lingua_core::model::{ReviewError, SessionStateError};
use lingua_core::scheduler::SchedulerError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the session manager.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no active session for learner")]
    NotFound,
    #[error("session already completed")]
    AlreadyComplete,
    #[error(transparent)]
    InvalidRating(#[from] ReviewError),
    #[error(transparent)]
    State(#[from] SessionStateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}
