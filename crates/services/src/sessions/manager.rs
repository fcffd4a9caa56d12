use std::sync::{Arc, Mutex, PoisonError};

use chrono::Duration;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use lingua_core::Clock;
use lingua_core::model::{
    Answer, AnswerOutcome, LearnerId, Level, ProgressRecord, Rating, Session, SessionProgress,
    StudyCard,
};
use lingua_core::reporting::{StudyRecommendation, recommend};
use lingua_core::scheduler::Scheduler;
use storage::repository::{CardCatalog, ProgressRepository, StorageError};

use super::registry::SessionRegistry;
use super::view::{CardView, LearnerStats, SessionView};
use crate::error::SessionError;

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Limits and lifetimes for study sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum due cards pulled into a new session.
    pub due_limit: u32,
    /// Maximum unseen cards introduced when nothing is due.
    pub new_card_limit: u32,
    /// Idle time after which a session is discarded.
    pub ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            due_limit: 50,
            new_card_limit: 10,
            ttl: Duration::minutes(30),
        }
    }
}

//
// ─── ANSWER RESULT ─────────────────────────────────────────────────────────────
//

/// Result of answering a single card in a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionAnswerResult {
    pub outcome: AnswerOutcome,
    pub progress: SessionProgress,
    /// True when this answer finished the queue and the session was closed.
    pub is_complete: bool,
}

//
// ─── MANAGER ───────────────────────────────────────────────────────────────────
//

/// Orchestrates per-learner study sessions over the catalog and progress store.
///
/// Every operation on a learner runs under that learner's registry slot lock,
/// so duplicate or concurrent requests for the same learner are applied one at
/// a time while other learners proceed in parallel.
pub struct SessionManager {
    clock: Clock,
    catalog: Arc<dyn CardCatalog>,
    progress: Arc<dyn ProgressRepository>,
    scheduler: Scheduler,
    rng: Mutex<StdRng>,
    registry: SessionRegistry,
    config: SessionConfig,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CardCatalog>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            catalog,
            progress,
            scheduler: Scheduler::new(),
            rng: Mutex::new(StdRng::from_os_rng()),
            registry: SessionRegistry::new(),
            config: SessionConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Seed the jitter source so intervals are reproducible.
    #[must_use]
    pub fn with_jitter_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    fn sample_jitter(&self) -> f64 {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        self.scheduler.sample_jitter(&mut *rng)
    }

    /// Start studying, or return the learner's live session unchanged.
    ///
    /// A session that has gone idle past the TTL, or that already reached the
    /// end of its queue, is flushed and replaced. Returns `Ok(None)` when
    /// nothing is due and no unseen cards exist for `level`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if loading the queue fails or a replaced
    /// session cannot be flushed.
    pub async fn start_session(
        &self,
        learner: LearnerId,
        level: Level,
    ) -> Result<Option<SessionView>, SessionError> {
        let slot = self.registry.slot(learner);
        let mut guard = slot.lock().await;
        let now = self.clock.now();

        if let Some(existing) = guard.as_ref() {
            if !existing.is_finished() && !existing.is_stale(now, self.config.ttl) {
                debug!(learner_id = %learner, session_id = %existing.id(), "resuming session");
                return Ok(Some(SessionView::from_session(existing)));
            }
        }
        if let Some(stale) = guard.take() {
            info!(
                learner_id = %learner,
                session_id = %stale.id(),
                finished = stale.is_finished(),
                "discarding previous session"
            );
            self.flush(&stale).await?;
        }

        let mut queue = self
            .progress
            .due(learner, now, self.config.due_limit)
            .await?;
        if queue.is_empty() {
            queue = self.introduce_new_cards(learner, level, now).await?;
        }
        if queue.is_empty() {
            info!(learner_id = %learner, %level, "nothing to study");
            return Ok(None);
        }

        let session = Session::new(learner, queue, now)?;
        info!(
            learner_id = %learner,
            session_id = %session.id(),
            cards = session.len(),
            "session started"
        );
        let view = SessionView::from_session(&session);
        *guard = Some(session);
        Ok(Some(view))
    }

    async fn introduce_new_cards(
        &self,
        learner: LearnerId,
        level: Level,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<StudyCard>, SessionError> {
        let cards = self
            .catalog
            .cards_for_level(learner, level, self.config.new_card_limit)
            .await?;

        let mut queue = Vec::with_capacity(cards.len());
        for card in cards {
            let record = ProgressRecord::new(learner, card.id(), now);
            match self.progress.create(&record).await {
                Ok(()) => queue.push(StudyCard::new(record, card)),
                Err(err) => {
                    warn!(
                        learner_id = %learner,
                        card_id = %card.id(),
                        error = %err,
                        "skipping new card, progress record not created"
                    );
                }
            }
        }
        Ok(queue)
    }

    /// Card at the cursor of the learner's session.
    pub async fn current_card(&self, learner: LearnerId) -> Option<CardView> {
        let slot = self.registry.existing_slot(learner)?;
        let guard = slot.lock().await;
        guard.as_ref().and_then(CardView::current)
    }

    /// Grade the current card, persist it, then advance.
    ///
    /// The progress store is written before the session changes; if the write
    /// fails the session is left exactly as it was and the same answer can be
    /// retried. Answering the last card closes the session.
    ///
    /// # Errors
    ///
    /// - `InvalidRating` for a correct answer rated `forgot`
    /// - `NotFound` if the learner has no session
    /// - `AlreadyComplete` if the queue is exhausted
    /// - `Storage` if persisting the updated record fails
    pub async fn submit_answer(
        &self,
        learner: LearnerId,
        is_correct: bool,
        rating: Rating,
    ) -> Result<SessionAnswerResult, SessionError> {
        let answer = Answer::new(is_correct, rating)?;
        let slot = self
            .registry
            .existing_slot(learner)
            .ok_or(SessionError::NotFound)?;
        let mut guard = slot.lock().await;
        let session = guard.as_mut().ok_or(SessionError::NotFound)?;
        let current = session.current().ok_or(SessionError::AlreadyComplete)?;

        let now = self.clock.now();
        let jitter = self.sample_jitter();
        let applied = self
            .scheduler
            .advance_with_jitter(&current.progress, answer, now, jitter);

        self.progress.update(&applied.record).await?;
        session.commit_answer(applied.record, answer.is_correct(), now)?;

        let outcome = applied.outcome;
        let progress = session.progress();
        let is_complete = session.is_finished();
        debug!(
            learner_id = %learner,
            session_id = %session.id(),
            correct = outcome.is_correct,
            difficulty = outcome.new_difficulty,
            next_review_at = %outcome.next_review_at,
            "answer recorded"
        );

        if is_complete {
            if let Some(finished) = guard.take() {
                // every answer is already durable; a failed re-save loses nothing
                if let Err(err) = self.flush(&finished).await {
                    warn!(
                        learner_id = %learner,
                        session_id = %finished.id(),
                        error = %err,
                        "final flush failed after completed session"
                    );
                }
                info!(
                    learner_id = %learner,
                    session_id = %finished.id(),
                    completed = progress.completed,
                    correct = progress.correct,
                    "session completed"
                );
            }
        }

        Ok(SessionAnswerResult {
            outcome,
            progress,
            is_complete,
        })
    }

    /// Abandon the learner's session, persisting every answered card first.
    ///
    /// Returns the final progress, or `None` if there was no session. The
    /// session is removed even when the flush fails.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if re-saving an answered record fails.
    pub async fn end_session(
        &self,
        learner: LearnerId,
    ) -> Result<Option<SessionProgress>, SessionError> {
        let Some(slot) = self.registry.existing_slot(learner) else {
            return Ok(None);
        };
        let mut guard = slot.lock().await;
        let Some(session) = guard.take() else {
            return Ok(None);
        };
        drop(guard);
        drop(slot);
        self.registry.prune();

        let progress = session.progress();
        info!(
            learner_id = %learner,
            session_id = %session.id(),
            completed = progress.completed,
            remaining = progress.remaining,
            "session ended"
        );
        self.flush(&session).await?;
        Ok(Some(progress))
    }

    /// Progress of the learner's live session.
    pub async fn progress(&self, learner: LearnerId) -> Option<SessionProgress> {
        let slot = self.registry.existing_slot(learner)?;
        let guard = slot.lock().await;
        guard.as_ref().map(Session::progress)
    }

    /// Stored totals plus the live session and a study recommendation.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the aggregate queries fail.
    pub async fn stats(&self, learner: LearnerId) -> Result<LearnerStats, SessionError> {
        let now = self.clock.now();
        let stored = self.progress.aggregate_stats(learner, now).await?;
        let recommendation = self.recommend_from(learner, stored.due, now).await?;
        let session = self.progress(learner).await;
        Ok(LearnerStats::new(learner, stored, session, recommendation))
    }

    /// How long the learner should study now, or how long until they can.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the aggregate queries fail.
    pub async fn recommended_study_time(
        &self,
        learner: LearnerId,
    ) -> Result<StudyRecommendation, SessionError> {
        let now = self.clock.now();
        let stored = self.progress.aggregate_stats(learner, now).await?;
        self.recommend_from(learner, stored.due, now).await
    }

    async fn recommend_from(
        &self,
        learner: LearnerId,
        due: u64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<StudyRecommendation, SessionError> {
        let next = if due == 0 {
            self.progress.next_upcoming(learner, now).await?
        } else {
            None
        };
        Ok(recommend(due, next, now))
    }

    /// Flush and discard every session idle past the TTL; returns how many.
    ///
    /// Flush failures are logged and the session is discarded anyway, since
    /// each answer was already persisted when it was submitted.
    pub async fn expire_stale(&self) -> usize {
        let now = self.clock.now();
        let mut expired = 0;

        for (learner, slot) in self.registry.snapshot() {
            let mut guard = slot.lock().await;
            let is_expired = guard
                .as_ref()
                .is_some_and(|s| s.is_finished() || s.is_stale(now, self.config.ttl));
            if !is_expired {
                continue;
            }
            let Some(session) = guard.take() else {
                continue;
            };
            if let Err(err) = self.flush(&session).await {
                warn!(
                    learner_id = %learner,
                    session_id = %session.id(),
                    error = %err,
                    "flush failed while expiring session"
                );
            }
            info!(learner_id = %learner, session_id = %session.id(), "expired idle session");
            expired += 1;
        }

        self.registry.prune();
        expired
    }

    /// Re-save every answered record in the session.
    ///
    /// All records are attempted; the first error is returned.
    async fn flush(&self, session: &Session) -> Result<usize, StorageError> {
        let mut saved = 0;
        let mut first_err = None;
        for record in session.touched() {
            match self.progress.update(record).await {
                Ok(()) => saved += 1,
                Err(err) => {
                    warn!(
                        learner_id = %record.learner_id(),
                        card_id = %record.card_id(),
                        error = %err,
                        "failed to persist progress record"
                    );
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(saved),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use lingua_core::model::{Card, CardId};
    use lingua_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    async fn manager_with_cards(n: u64, clock: Clock) -> (SessionManager, InMemoryRepository) {
        let repo = InMemoryRepository::new();
        for id in 1..=n {
            let card = Card::new(
                CardId::new(id),
                format!("front {id}"),
                format!("back {id}"),
                "",
                Level::Beginner,
                "",
            )
            .unwrap();
            repo.upsert_card(&card).await.unwrap();
        }
        let manager = SessionManager::new(clock, Arc::new(repo.clone()), Arc::new(repo.clone()))
            .with_jitter_seed(11);
        (manager, repo)
    }

    /// Move a live session between managers that share storage.
    async fn hand_over(from: &SessionManager, to: &SessionManager, learner: LearnerId) {
        let session = from.registry().slot(learner).lock().await.take();
        *to.registry().slot(learner).lock().await = session;
    }

    #[tokio::test]
    async fn start_is_idempotent_while_session_is_live() {
        let (manager, _repo) = manager_with_cards(4, Clock::fixed(fixed_now())).await;
        let learner = LearnerId::new(1);

        let first = manager
            .start_session(learner, Level::Beginner)
            .await
            .unwrap()
            .unwrap();
        manager
            .submit_answer(learner, true, Rating::Good)
            .await
            .unwrap();
        let second = manager
            .start_session(learner, Level::Beginner)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.session_id, second.session_id);
        assert_eq!(second.progress.completed, 1);
        assert_eq!(manager.registry().active_count(), 1);
    }

    #[tokio::test]
    async fn same_seed_gives_identical_answer_results() {
        let mut results = Vec::new();
        for _ in 0..2 {
            let (manager, _repo) = manager_with_cards(2, Clock::fixed(fixed_now())).await;
            let learner = LearnerId::new(1);
            manager.start_session(learner, Level::Beginner).await.unwrap();
            results.push(
                manager
                    .submit_answer(learner, true, Rating::Hard)
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(results[0], results[1]);
        assert!((results[0].progress.accuracy - 100.0).abs() < f64::EPSILON);
        assert!(!results[0].is_complete);
    }

    #[tokio::test]
    async fn nothing_to_study_returns_none() {
        let (manager, _repo) = manager_with_cards(0, Clock::fixed(fixed_now())).await;
        let started = manager
            .start_session(LearnerId::new(1), Level::Beginner)
            .await
            .unwrap();
        assert!(started.is_none());
        assert_eq!(manager.registry().active_count(), 0);
    }

    #[tokio::test]
    async fn answer_without_session_is_not_found() {
        let (manager, _repo) = manager_with_cards(1, Clock::fixed(fixed_now())).await;
        let err = manager
            .submit_answer(LearnerId::new(1), true, Rating::Easy)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound));
    }

    #[tokio::test]
    async fn correct_forgot_is_rejected_before_scheduling() {
        let (manager, repo) = manager_with_cards(1, Clock::fixed(fixed_now())).await;
        let learner = LearnerId::new(1);
        manager.start_session(learner, Level::Beginner).await.unwrap();

        let err = manager
            .submit_answer(learner, true, Rating::Forgot)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidRating(_)));

        let stored = repo.get(learner, CardId::new(1)).await.unwrap();
        assert_eq!(stored.review_count(), 0);
        assert_eq!(manager.progress(learner).await.unwrap().completed, 0);
    }

    #[tokio::test]
    async fn finished_session_in_slot_reports_already_complete() {
        let (manager, _repo) = manager_with_cards(1, Clock::fixed(fixed_now())).await;
        let learner = LearnerId::new(1);
        manager.start_session(learner, Level::Beginner).await.unwrap();

        // Commit directly so the finished session stays registered.
        let slot = manager.registry().slot(learner);
        {
            let mut guard = slot.lock().await;
            let session = guard.as_mut().unwrap();
            let record = session.current().unwrap().progress.clone();
            session.commit_answer(record, true, fixed_now()).unwrap();
        }

        let err = manager
            .submit_answer(learner, true, Rating::Good)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::AlreadyComplete));
        assert!(manager.current_card(learner).await.is_none());
    }

    #[tokio::test]
    async fn stale_session_is_replaced_on_start() {
        let clock = Clock::fixed(fixed_now());
        let (manager, repo) = manager_with_cards(3, clock).await;
        let learner = LearnerId::new(1);

        let first = manager
            .start_session(learner, Level::Beginner)
            .await
            .unwrap()
            .unwrap();
        manager
            .submit_answer(learner, false, Rating::Forgot)
            .await
            .unwrap();

        // same repositories, an hour later
        let later = SessionManager::new(
            clock.shifted(Duration::hours(1)),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        );
        hand_over(&manager, &later, learner).await;

        let second = later
            .start_session(learner, Level::Beginner)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(first.session_id, second.session_id);
        // the missed card is due again after ten minutes, plus the two never answered
        assert_eq!(second.progress.total, 3);
    }

    #[tokio::test]
    async fn expire_stale_discards_only_idle_sessions() {
        let clock = Clock::fixed(fixed_now());
        let (manager, repo) = manager_with_cards(2, clock).await;
        manager
            .start_session(LearnerId::new(1), Level::Beginner)
            .await
            .unwrap();

        assert_eq!(manager.expire_stale().await, 0);

        let later = SessionManager::new(
            clock.shifted(Duration::minutes(31)),
            Arc::new(repo.clone()),
            Arc::new(repo),
        );
        hand_over(&manager, &later, LearnerId::new(1)).await;

        assert_eq!(later.expire_stale().await, 1);
        assert_eq!(later.registry().active_count(), 0);
        assert_eq!(later.registry().slot_count(), 0);
    }
}
