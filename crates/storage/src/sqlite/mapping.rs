use chrono::{DateTime, Utc};
use lingua_core::model::{Card, CardId, LearnerId, Level, ProgressRecord, StudyCard};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn connection(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn card_id_from_i64(v: i64) -> Result<CardId, StorageError> {
    Ok(CardId::new(i64_to_u64("card_id", v)?))
}

pub(crate) fn card_id_to_i64(id: CardId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("card_id overflow".into()))
}

pub(crate) fn parse_level(s: &str) -> Result<Level, StorageError> {
    match s {
        "beginner" => Ok(Level::Beginner),
        "intermediate" => Ok(Level::Intermediate),
        "advanced" => Ok(Level::Advanced),
        _ => Err(StorageError::Serialization(format!("invalid level: {s}"))),
    }
}

fn u32_column(row: &SqliteRow, column: &'static str) -> Result<u32, StorageError> {
    let raw: i64 = row.try_get(column).map_err(ser)?;
    u32::try_from(raw).map_err(|_| StorageError::Serialization(format!("invalid {column}: {raw}")))
}

/// Card columns: `id, front_text, back_text, example, level, category`.
pub(crate) fn map_card_row(row: &SqliteRow) -> Result<Card, StorageError> {
    let level: String = row.try_get("level").map_err(ser)?;
    Card::new(
        card_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("front_text").map_err(ser)?,
        row.try_get::<String, _>("back_text").map_err(ser)?,
        row.try_get::<String, _>("example").map_err(ser)?,
        parse_level(level.as_str())?,
        row.try_get::<String, _>("category").map_err(ser)?,
    )
    .map_err(ser)
}

/// Progress columns: `learner_id, card_id, difficulty, review_count,
/// correct_count, last_reviewed_at, next_review_at, is_learned`.
pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<ProgressRecord, StorageError> {
    let difficulty_i64: i64 = row.try_get("difficulty").map_err(ser)?;
    let difficulty = u8::try_from(difficulty_i64).map_err(|_| {
        StorageError::Serialization(format!("invalid difficulty: {difficulty_i64}"))
    })?;
    let last_reviewed_at: Option<DateTime<Utc>> =
        row.try_get("last_reviewed_at").map_err(ser)?;

    ProgressRecord::from_persisted(
        LearnerId::new(row.try_get::<i64, _>("learner_id").map_err(ser)?),
        card_id_from_i64(row.try_get::<i64, _>("card_id").map_err(ser)?)?,
        difficulty,
        u32_column(row, "review_count")?,
        u32_column(row, "correct_count")?,
        last_reviewed_at,
        row.try_get("next_review_at").map_err(ser)?,
        row.try_get::<bool, _>("is_learned").map_err(ser)?,
    )
    .map_err(ser)
}

/// A joined row carrying both card and progress columns.
pub(crate) fn map_study_card_row(row: &SqliteRow) -> Result<StudyCard, StorageError> {
    Ok(StudyCard::new(map_progress_row(row)?, map_card_row(row)?))
}
