use lingua_core::model::{Card, CardId, LearnerId, Level};

use super::SqliteRepository;
use super::mapping::{card_id_to_i64, connection, map_card_row};
use crate::repository::{CardCatalog, StorageError};

#[async_trait::async_trait]
impl CardCatalog for SqliteRepository {
    async fn upsert_card(&self, card: &Card) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO cards (id, front_text, back_text, example, level, category)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                front_text = excluded.front_text,
                back_text = excluded.back_text,
                example = excluded.example,
                level = excluded.level,
                category = excluded.category
            ",
        )
        .bind(card_id_to_i64(card.id())?)
        .bind(card.front_text())
        .bind(card.back_text())
        .bind(card.example())
        .bind(card.level().as_str())
        .bind(card.category())
        .execute(&self.pool)
        .await
        .map_err(connection)?;

        Ok(())
    }

    async fn get_card(&self, id: CardId) -> Result<Card, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, front_text, back_text, example, level, category
            FROM cards
            WHERE id = ?1
            ",
        )
        .bind(card_id_to_i64(id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(connection)?;

        match row {
            Some(row) => map_card_row(&row),
            None => Err(StorageError::NotFound),
        }
    }

    async fn cards_for_level(
        &self,
        learner: LearnerId,
        level: Level,
        limit: u32,
    ) -> Result<Vec<Card>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT c.id, c.front_text, c.back_text, c.example, c.level, c.category
            FROM cards c
            LEFT JOIN progress p
                ON p.card_id = c.id AND p.learner_id = ?1
            WHERE c.level = ?2
              AND p.card_id IS NULL
            ORDER BY c.id ASC
            LIMIT ?3
            ",
        )
        .bind(learner.value())
        .bind(level.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(connection)?;

        let mut cards = Vec::with_capacity(rows.len());
        for row in rows {
            cards.push(map_card_row(&row)?);
        }
        Ok(cards)
    }
}
