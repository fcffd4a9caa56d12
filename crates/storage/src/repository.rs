use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lingua_core::model::{Card, CardId, LearnerId, Level, ProgressRecord, StudyCard};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Aggregate counters over one learner's progress records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressStats {
    pub total: u64,
    pub learned: u64,
    pub due: u64,
    /// Mean per-card correct ratio over reviewed records, in percent.
    pub accuracy: f64,
}

impl ProgressStats {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            total: 0,
            learned: 0,
            due: 0,
            accuracy: 0.0,
        }
    }

    /// Fold a set of records into stats as seen at `now`.
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a ProgressRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut stats = Self::empty();
        let mut ratio_sum = 0.0;
        let mut touched = 0_u32;

        for record in records {
            stats.total += 1;
            if record.is_learned() {
                stats.learned += 1;
            }
            if record.is_due(now) {
                stats.due += 1;
            }
            if let Some(ratio) = record.accuracy() {
                ratio_sum += ratio;
                touched += 1;
            }
        }

        if touched > 0 {
            stats.accuracy = ratio_sum / f64::from(touched) * 100.0;
        }
        stats
    }
}

/// Read/write access to the static card content.
#[async_trait]
pub trait CardCatalog: Send + Sync {
    /// Persist or update a card.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the card cannot be stored.
    async fn upsert_card(&self, card: &Card) -> Result<(), StorageError>;

    /// Fetch a card by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_card(&self, id: CardId) -> Result<Card, StorageError>;

    /// Cards of `level` the learner has never been shown, lowest id first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn cards_for_level(
        &self,
        learner: LearnerId,
        level: Level,
        limit: u32,
    ) -> Result<Vec<Card>, StorageError>;
}

/// Durable per-(learner, card) learning history.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Unlearned records with `next_review_at <= now`, earliest first, joined
    /// with their cards.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails or a row cannot be decoded.
    async fn due(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<StudyCard>, StorageError>;

    /// Fetch one record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the pair has no record.
    async fn get(&self, learner: LearnerId, card: CardId) -> Result<ProgressRecord, StorageError>;

    /// Insert a record for a pair that has none yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the pair already has a record.
    async fn create(&self, record: &ProgressRecord) -> Result<(), StorageError>;

    /// Overwrite an existing record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the pair has no record.
    async fn update(&self, record: &ProgressRecord) -> Result<(), StorageError>;

    /// Totals for the learner as seen at `now`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn aggregate_stats(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<ProgressStats, StorageError>;

    /// Nearest `next_review_at` strictly after `now` among unlearned records.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn next_upcoming(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    cards: Arc<Mutex<HashMap<CardId, Card>>>,
    progress: Arc<Mutex<HashMap<(LearnerId, CardId), ProgressRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cards: Arc::new(Mutex::new(HashMap::new())),
            progress: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl CardCatalog for InMemoryRepository {
    async fn upsert_card(&self, card: &Card) -> Result<(), StorageError> {
        let mut guard = self
            .cards
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(card.id(), card.clone());
        Ok(())
    }

    async fn get_card(&self, id: CardId) -> Result<Card, StorageError> {
        let guard = self
            .cards
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn cards_for_level(
        &self,
        learner: LearnerId,
        level: Level,
        limit: u32,
    ) -> Result<Vec<Card>, StorageError> {
        let cards = self
            .cards
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let progress = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut fresh: Vec<Card> = cards
            .values()
            .filter(|card| card.level() == level)
            .filter(|card| !progress.contains_key(&(learner, card.id())))
            .cloned()
            .collect();
        fresh.sort_by_key(Card::id);
        fresh.truncate(limit as usize);
        Ok(fresh)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn due(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<StudyCard>, StorageError> {
        // cards before progress, same order as cards_for_level
        let cards = self
            .cards
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let progress = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut due: Vec<StudyCard> = progress
            .values()
            .filter(|record| record.learner_id() == learner && record.is_due(now))
            .filter_map(|record| {
                cards
                    .get(&record.card_id())
                    .map(|card| StudyCard::new(record.clone(), card.clone()))
            })
            .collect();
        due.sort_by_key(|item| (item.progress.next_review_at(), item.progress.card_id()));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn get(&self, learner: LearnerId, card: CardId) -> Result<ProgressRecord, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .get(&(learner, card))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn create(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let key = (record.learner_id(), record.card_id());
        if guard.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        guard.insert(key, record.clone());
        Ok(())
    }

    async fn update(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        match guard.get_mut(&(record.learner_id(), record.card_id())) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound),
        }
    }

    async fn aggregate_stats(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<ProgressStats, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(ProgressStats::from_records(
            guard.values().filter(|record| record.learner_id() == learner),
            now,
        ))
    }

    async fn next_upcoming(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .values()
            .filter(|record| record.learner_id() == learner && !record.is_learned())
            .map(ProgressRecord::next_review_at)
            .filter(|at| *at > now)
            .min())
    }
}

/// Aggregates catalog and progress repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn CardCatalog>,
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let catalog: Arc<dyn CardCatalog> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo);
        Self { catalog, progress }
    }
}
