use std::sync::Arc;

use lingua_core::scheduler::{Scheduler, SchedulerConfig};
use storage::repository::Storage;

use crate::Clock;
use crate::error::AppServicesError;
use crate::sessions::{SessionConfig, SessionManager};

/// Knobs the app passes down when assembling services.
#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    pub session: SessionConfig,
    pub scheduler: SchedulerConfig,
    /// Fixed jitter seed; `None` seeds from the OS.
    pub jitter_seed: Option<u64>,
}

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    sessions: Arc<SessionManager>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails or the
    /// scheduler settings are invalid.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        settings: ServiceSettings,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::with_storage(storage, clock, settings)
    }

    /// Build services over an already-constructed storage bundle.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Scheduler` if the scheduler settings are invalid.
    pub fn with_storage(
        storage: Storage,
        clock: Clock,
        settings: ServiceSettings,
    ) -> Result<Self, AppServicesError> {
        let scheduler = Scheduler::try_with_config(settings.scheduler)?;
        let mut sessions = SessionManager::new(
            clock,
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.progress),
        )
        .with_scheduler(scheduler)
        .with_config(settings.session);
        if let Some(seed) = settings.jitter_seed {
            sessions = sessions.with_jitter_seed(seed);
        }

        Ok(Self {
            storage,
            sessions: Arc::new(sessions),
        })
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }
}
