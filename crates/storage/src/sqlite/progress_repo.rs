use chrono::{DateTime, Utc};
use lingua_core::model::{CardId, LearnerId, ProgressRecord, StudyCard};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{card_id_to_i64, connection, map_progress_row, map_study_card_row};
use crate::repository::{ProgressRepository, ProgressStats, StorageError};

fn classify_write_error(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        // progress rows must reference a catalog card
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::NotFound,
        _ => connection(e),
    }
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn due(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<StudyCard>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                p.learner_id, p.card_id, p.difficulty, p.review_count, p.correct_count,
                p.last_reviewed_at, p.next_review_at, p.is_learned,
                c.id, c.front_text, c.back_text, c.example, c.level, c.category
            FROM progress p
            JOIN cards c ON c.id = p.card_id
            WHERE p.learner_id = ?1
              AND p.is_learned = 0
              AND p.next_review_at <= ?2
            ORDER BY p.next_review_at ASC, p.card_id ASC
            LIMIT ?3
            ",
        )
        .bind(learner.value())
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(connection)?;

        let mut due = Vec::with_capacity(rows.len());
        for row in rows {
            due.push(map_study_card_row(&row)?);
        }
        Ok(due)
    }

    async fn get(&self, learner: LearnerId, card: CardId) -> Result<ProgressRecord, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                learner_id, card_id, difficulty, review_count, correct_count,
                last_reviewed_at, next_review_at, is_learned
            FROM progress
            WHERE learner_id = ?1 AND card_id = ?2
            ",
        )
        .bind(learner.value())
        .bind(card_id_to_i64(card)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(connection)?;

        match row {
            Some(row) => map_progress_row(&row),
            None => Err(StorageError::NotFound),
        }
    }

    async fn create(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO progress (
                learner_id, card_id, difficulty, review_count, correct_count,
                last_reviewed_at, next_review_at, is_learned
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(record.learner_id().value())
        .bind(card_id_to_i64(record.card_id())?)
        .bind(i64::from(record.difficulty()))
        .bind(i64::from(record.review_count()))
        .bind(i64::from(record.correct_count()))
        .bind(record.last_reviewed_at())
        .bind(record.next_review_at())
        .bind(record.is_learned())
        .execute(&self.pool)
        .await
        .map_err(classify_write_error)?;

        Ok(())
    }

    async fn update(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let result = sqlx::query(
            r"
            UPDATE progress SET
                difficulty = ?3,
                review_count = ?4,
                correct_count = ?5,
                last_reviewed_at = ?6,
                next_review_at = ?7,
                is_learned = ?8
            WHERE learner_id = ?1 AND card_id = ?2
            ",
        )
        .bind(record.learner_id().value())
        .bind(card_id_to_i64(record.card_id())?)
        .bind(i64::from(record.difficulty()))
        .bind(i64::from(record.review_count()))
        .bind(i64::from(record.correct_count()))
        .bind(record.last_reviewed_at())
        .bind(record.next_review_at())
        .bind(record.is_learned())
        .execute(&self.pool)
        .await
        .map_err(connection)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn aggregate_stats(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<ProgressStats, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN is_learned = 1 THEN 1 ELSE 0 END), 0) AS learned,
                COALESCE(
                    SUM(CASE WHEN is_learned = 0 AND next_review_at <= ?2 THEN 1 ELSE 0 END),
                    0
                ) AS due,
                AVG(
                    CASE WHEN review_count > 0
                        THEN CAST(correct_count AS REAL) / review_count
                    END
                ) AS ratio
            FROM progress
            WHERE learner_id = ?1
            ",
        )
        .bind(learner.value())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(connection)?;

        let count = |column: &'static str| -> Result<u64, StorageError> {
            let raw: i64 = row
                .try_get(column)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            u64::try_from(raw)
                .map_err(|_| StorageError::Serialization(format!("invalid {column}: {raw}")))
        };
        let ratio: Option<f64> = row
            .try_get("ratio")
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(ProgressStats {
            total: count("total")?,
            learned: count("learned")?,
            due: count("due")?,
            accuracy: ratio.map_or(0.0, |r| r * 100.0),
        })
    }

    async fn next_upcoming(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT next_review_at
            FROM progress
            WHERE learner_id = ?1
              AND is_learned = 0
              AND next_review_at > ?2
            ORDER BY next_review_at ASC
            LIMIT 1
            ",
        )
        .bind(learner.value())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(connection)?;

        row.map(|row| {
            row.try_get("next_review_at")
                .map_err(|e| StorageError::Serialization(e.to_string()))
        })
        .transpose()
    }
}
