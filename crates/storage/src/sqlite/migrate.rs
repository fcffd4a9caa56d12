use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned migrations for the current schema.
///
/// Version 1 creates the card catalog and per-learner progress tables.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: catalog and progress.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS cards (
                    id INTEGER PRIMARY KEY,
                    front_text TEXT NOT NULL,
                    back_text TEXT NOT NULL,
                    example TEXT NOT NULL DEFAULT '',
                    level TEXT NOT NULL
                        CHECK (level IN ('beginner', 'intermediate', 'advanced')),
                    category TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS progress (
                    learner_id INTEGER NOT NULL,
                    card_id INTEGER NOT NULL,
                    difficulty INTEGER NOT NULL CHECK (difficulty BETWEEN 0 AND 5),
                    review_count INTEGER NOT NULL CHECK (review_count >= 0),
                    correct_count INTEGER NOT NULL
                        CHECK (correct_count >= 0 AND correct_count <= review_count),
                    last_reviewed_at TEXT,
                    next_review_at TEXT NOT NULL,
                    is_learned INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (learner_id, card_id),
                    FOREIGN KEY (card_id) REFERENCES cards(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_cards_level_id
                    ON cards(level, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_progress_learner_due
                    ON progress(learner_id, is_learned, next_review_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
