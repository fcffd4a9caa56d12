use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lingua_core::model::{Card, CardId, LearnerId, Level, ProgressRecord, Rating, StudyCard};
use lingua_core::time::fixed_now;
use services::{Clock, SessionError, SessionManager, StudyRecommendation, WaitBucket};
use storage::repository::{
    CardCatalog, InMemoryRepository, ProgressRepository, ProgressStats, StorageError,
};

async fn catalog_with(repo: &InMemoryRepository, n: u64, level: Level) {
    for id in 1..=n {
        let card = Card::new(
            CardId::new(id),
            format!("word {id}"),
            format!("meaning {id}"),
            format!("example {id}"),
            level,
            "",
        )
        .unwrap();
        repo.upsert_card(&card).await.unwrap();
    }
}

fn manager(repo: &InMemoryRepository, now: DateTime<Utc>) -> SessionManager {
    SessionManager::new(
        Clock::fixed(now),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    )
    .with_jitter_seed(7)
}

#[tokio::test]
async fn new_learner_gets_ten_beginner_cards() {
    let repo = InMemoryRepository::new();
    catalog_with(&repo, 12, Level::Beginner).await;
    let sessions = manager(&repo, fixed_now());
    let learner = LearnerId::new(100);

    let view = sessions
        .start_session(learner, Level::Beginner)
        .await
        .unwrap()
        .expect("session");
    assert_eq!(view.progress.total, 10);

    let current = sessions.current_card(learner).await.expect("card");
    assert_eq!(current.card_id, CardId::new(1));
    assert_eq!(current.position, 1);
    assert_eq!(view.current, Some(current));

    // every queued card now has a fresh record, due immediately
    let stats = repo.aggregate_stats(learner, fixed_now()).await.unwrap();
    assert_eq!(stats.total, 10);
    assert_eq!(stats.due, 10);
}

#[tokio::test]
async fn answering_every_card_closes_and_persists_the_session() {
    let repo = InMemoryRepository::new();
    catalog_with(&repo, 3, Level::Beginner).await;
    let sessions = manager(&repo, fixed_now());
    let learner = LearnerId::new(7);

    sessions
        .start_session(learner, Level::Beginner)
        .await
        .unwrap()
        .expect("session");

    let first = sessions.submit_answer(learner, true, Rating::Easy).await.unwrap();
    assert!(!first.is_complete);
    assert_eq!(first.outcome.new_difficulty, 1);
    assert_eq!(first.outcome.base_interval, Duration::hours(36));

    sessions.submit_answer(learner, false, Rating::Forgot).await.unwrap();
    let last = sessions.submit_answer(learner, true, Rating::Hard).await.unwrap();

    assert!(last.is_complete);
    assert_eq!(last.progress.completed, 3);
    assert_eq!(last.progress.correct, 2);
    assert_eq!(last.progress.remaining, 0);
    assert!(sessions.progress(learner).await.is_none());
    assert_eq!(sessions.registry().active_count(), 0);

    for id in 1..=3 {
        let stored = repo.get(learner, CardId::new(id)).await.unwrap();
        assert_eq!(stored.review_count(), 1, "card {id}");
        assert_eq!(stored.last_reviewed_at(), Some(fixed_now()));
    }
    assert_eq!(
        repo.get(learner, CardId::new(2)).await.unwrap().correct_count(),
        0
    );

    let err = sessions
        .submit_answer(learner, true, Rating::Good)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotFound));
}

#[tokio::test]
async fn end_session_persists_partial_progress() {
    let repo = InMemoryRepository::new();
    catalog_with(&repo, 5, Level::Intermediate).await;
    let sessions = manager(&repo, fixed_now());
    let learner = LearnerId::new(3);

    sessions
        .start_session(learner, Level::Intermediate)
        .await
        .unwrap()
        .expect("session");
    sessions.submit_answer(learner, true, Rating::Good).await.unwrap();
    sessions.submit_answer(learner, true, Rating::Good).await.unwrap();

    let progress = sessions.end_session(learner).await.unwrap().expect("progress");
    assert_eq!(progress.completed, 2);
    assert_eq!(progress.remaining, 3);
    assert!(sessions.current_card(learner).await.is_none());
    assert!(sessions.end_session(learner).await.unwrap().is_none());

    let stats = repo.aggregate_stats(learner, fixed_now()).await.unwrap();
    assert_eq!(stats.total, 5);
    // two answered cards moved into the future
    assert_eq!(stats.due, 3);
}

#[tokio::test]
async fn due_cards_come_back_without_unseen_ones() {
    let repo = InMemoryRepository::new();
    catalog_with(&repo, 12, Level::Beginner).await;
    let learner = LearnerId::new(11);

    let sessions = manager(&repo, fixed_now());
    let first = sessions
        .start_session(learner, Level::Beginner)
        .await
        .unwrap()
        .expect("session");
    assert_eq!(first.progress.total, 10);
    sessions.submit_answer(learner, true, Rating::Good).await.unwrap();
    sessions.end_session(learner).await.unwrap();

    let later = manager(&repo, fixed_now() + Duration::minutes(5));
    let second = later
        .start_session(learner, Level::Beginner)
        .await
        .unwrap()
        .expect("session");

    // cards 2..=10 were queued but never answered; card 1 is a day out
    assert_eq!(second.progress.total, 9);
    let mut ids = Vec::new();
    while let Some(card) = later.current_card(learner).await {
        ids.push(card.card_id.value());
        later.submit_answer(learner, true, Rating::Good).await.unwrap();
    }
    assert_eq!(ids, (2..=10).collect::<Vec<u64>>());

    // 11 and 12 still have no progress record
    for id in [11, 12] {
        assert!(matches!(
            repo.get(learner, CardId::new(id)).await,
            Err(StorageError::NotFound)
        ));
    }
}

#[tokio::test]
async fn nothing_due_recommends_hours_until_next_review() {
    let repo = InMemoryRepository::new();
    catalog_with(&repo, 1, Level::Beginner).await;
    let learner = LearnerId::new(5);
    let now = fixed_now();
    let record = ProgressRecord::from_persisted(
        learner,
        CardId::new(1),
        1,
        1,
        1,
        Some(now - Duration::days(1)),
        now + Duration::minutes(90),
        false,
    )
    .unwrap();
    repo.create(&record).await.unwrap();

    let sessions = manager(&repo, now);
    let stats = sessions.stats(learner).await.unwrap();

    assert_eq!(stats.due_count, 0);
    assert_eq!(stats.total, 1);
    assert!(!stats.active_session);
    assert_eq!(
        stats.recommendation,
        StudyRecommendation::NextReviewIn {
            wait: WaitBucket::Hours(1)
        }
    );

    // no unseen cards and nothing due
    let started = sessions.start_session(learner, Level::Beginner).await.unwrap();
    assert!(started.is_none());
}

#[tokio::test]
async fn stats_include_live_session() {
    let repo = InMemoryRepository::new();
    catalog_with(&repo, 4, Level::Beginner).await;
    let sessions = manager(&repo, fixed_now());
    let learner = LearnerId::new(8);

    sessions.start_session(learner, Level::Beginner).await.unwrap();
    sessions.submit_answer(learner, true, Rating::Good).await.unwrap();

    let stats = sessions.stats(learner).await.unwrap();
    assert!(stats.active_session);
    let session = stats.session.expect("session progress");
    assert_eq!(session.completed, 1);
    assert!((session.accuracy - 100.0).abs() < f64::EPSILON);
    assert_eq!(stats.due_count, 3);
    assert_eq!(
        stats.recommendation,
        StudyRecommendation::Study { minutes: 1, due: 3 }
    );
}

//
// ─── FAILING STORE ─────────────────────────────────────────────────────────────
//

/// Delegates to an in-memory repository but can be told to fail updates.
#[derive(Clone)]
struct FlakyProgress {
    inner: InMemoryRepository,
    fail_updates: Arc<AtomicBool>,
}

#[async_trait]
impl ProgressRepository for FlakyProgress {
    async fn due(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<StudyCard>, StorageError> {
        self.inner.due(learner, now, limit).await
    }

    async fn get(&self, learner: LearnerId, card: CardId) -> Result<ProgressRecord, StorageError> {
        self.inner.get(learner, card).await
    }

    async fn create(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        self.inner.create(record).await
    }

    async fn update(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("database is locked".into()));
        }
        self.inner.update(record).await
    }

    async fn aggregate_stats(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<ProgressStats, StorageError> {
        self.inner.aggregate_stats(learner, now).await
    }

    async fn next_upcoming(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.inner.next_upcoming(learner, now).await
    }
}

#[tokio::test]
async fn failed_write_leaves_session_where_it_was() {
    let repo = InMemoryRepository::new();
    catalog_with(&repo, 2, Level::Beginner).await;
    let flaky = FlakyProgress {
        inner: repo.clone(),
        fail_updates: Arc::new(AtomicBool::new(false)),
    };
    let sessions = SessionManager::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(flaky.clone()),
    );
    let learner = LearnerId::new(1);
    sessions.start_session(learner, Level::Beginner).await.unwrap();

    flaky.fail_updates.store(true, Ordering::SeqCst);
    let err = sessions
        .submit_answer(learner, true, Rating::Good)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Storage(StorageError::Connection(_))));

    let progress = sessions.progress(learner).await.unwrap();
    assert_eq!(progress.completed, 0);
    assert_eq!(
        sessions.current_card(learner).await.unwrap().card_id,
        CardId::new(1)
    );
    assert_eq!(
        repo.get(learner, CardId::new(1)).await.unwrap().review_count(),
        0
    );

    // retry succeeds once the store recovers
    flaky.fail_updates.store(false, Ordering::SeqCst);
    let retried = sessions.submit_answer(learner, true, Rating::Good).await.unwrap();
    assert_eq!(retried.progress.completed, 1);
    assert_eq!(
        repo.get(learner, CardId::new(1)).await.unwrap().review_count(),
        1
    );
}

#[tokio::test]
async fn end_session_surfaces_flush_failure_and_still_removes() {
    let repo = InMemoryRepository::new();
    catalog_with(&repo, 2, Level::Beginner).await;
    let flaky = FlakyProgress {
        inner: repo.clone(),
        fail_updates: Arc::new(AtomicBool::new(false)),
    };
    let sessions = SessionManager::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(flaky.clone()),
    );
    let learner = LearnerId::new(1);
    sessions.start_session(learner, Level::Beginner).await.unwrap();
    sessions.submit_answer(learner, true, Rating::Good).await.unwrap();

    flaky.fail_updates.store(true, Ordering::SeqCst);
    let err = sessions.end_session(learner).await.unwrap_err();
    assert!(matches!(err, SessionError::Storage(_)));
    assert!(sessions.progress(learner).await.is_none());
}

//
// ─── CONCURRENCY ───────────────────────────────────────────────────────────────
//

/// Yields inside every write so concurrent callers interleave.
#[derive(Clone)]
struct SlowProgress {
    inner: InMemoryRepository,
}

#[async_trait]
impl ProgressRepository for SlowProgress {
    async fn due(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<StudyCard>, StorageError> {
        self.inner.due(learner, now, limit).await
    }

    async fn get(&self, learner: LearnerId, card: CardId) -> Result<ProgressRecord, StorageError> {
        self.inner.get(learner, card).await
    }

    async fn create(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        tokio::task::yield_now().await;
        self.inner.create(record).await
    }

    async fn update(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        self.inner.update(record).await
    }

    async fn aggregate_stats(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<ProgressStats, StorageError> {
        self.inner.aggregate_stats(learner, now).await
    }

    async fn next_upcoming(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.inner.next_upcoming(learner, now).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_answers_for_one_learner_never_share_a_card() {
    let repo = InMemoryRepository::new();
    catalog_with(&repo, 4, Level::Beginner).await;
    let sessions = Arc::new(SessionManager::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(SlowProgress {
            inner: repo.clone(),
        }),
    ));
    let learner = LearnerId::new(1);

    let starts: Vec<_> = (0..4)
        .map(|_| {
            let sessions = Arc::clone(&sessions);
            tokio::spawn(async move { sessions.start_session(learner, Level::Beginner).await })
        })
        .collect();
    let mut ids = Vec::new();
    for handle in starts {
        ids.push(handle.await.unwrap().unwrap().expect("session").session_id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "duplicate starts must share one session");

    let answers: Vec<_> = (0..4)
        .map(|_| {
            let sessions = Arc::clone(&sessions);
            tokio::spawn(async move { sessions.submit_answer(learner, true, Rating::Good).await })
        })
        .collect();
    for handle in answers {
        handle.await.unwrap().unwrap();
    }

    for id in 1..=4 {
        let stored = repo.get(learner, CardId::new(id)).await.unwrap();
        assert_eq!(stored.review_count(), 1, "card {id}");
    }
    assert_eq!(sessions.registry().active_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn learners_do_not_block_each_other() {
    let repo = InMemoryRepository::new();
    catalog_with(&repo, 3, Level::Beginner).await;
    let sessions = Arc::new(manager(&repo, fixed_now()));

    let handles: Vec<_> = (1..=8)
        .map(|n| {
            let sessions = Arc::clone(&sessions);
            tokio::spawn(async move {
                let learner = LearnerId::new(n);
                sessions.start_session(learner, Level::Beginner).await?;
                sessions.submit_answer(learner, n % 2 == 0, Rating::Good).await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(sessions.registry().active_count(), 8);
    assert_eq!(sessions.expire_stale().await, 0);
}
