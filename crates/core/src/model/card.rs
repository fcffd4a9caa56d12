use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::CardId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CardError {
    #[error("card front text cannot be empty")]
    EmptyFront,

    #[error("card back text cannot be empty")]
    EmptyBack,

    #[error("unknown level: {0}")]
    UnknownLevel(String),
}

//
// ─── LEVEL ─────────────────────────────────────────────────────────────────────
//

/// Proficiency band a card is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Level {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = CardError;

    /// Blank input resolves to `Beginner`, matching learners who never took the level test.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "beginner" => Ok(Level::Beginner),
            "intermediate" => Ok(Level::Intermediate),
            "advanced" => Ok(Level::Advanced),
            other => Err(CardError::UnknownLevel(other.to_owned())),
        }
    }
}

//
// ─── CARD ──────────────────────────────────────────────────────────────────────
//

pub const DEFAULT_CATEGORY: &str = "general";

/// Immutable catalog content. The engine never mutates a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    id: CardId,
    front_text: String,
    back_text: String,
    example: String,
    level: Level,
    category: String,
}

impl Card {
    /// Build a validated card.
    ///
    /// # Errors
    ///
    /// Returns `CardError::EmptyFront` or `CardError::EmptyBack` when either side is blank.
    pub fn new(
        id: CardId,
        front_text: impl Into<String>,
        back_text: impl Into<String>,
        example: impl Into<String>,
        level: Level,
        category: impl Into<String>,
    ) -> Result<Self, CardError> {
        let front_text = front_text.into().trim().to_owned();
        let back_text = back_text.into().trim().to_owned();
        if front_text.is_empty() {
            return Err(CardError::EmptyFront);
        }
        if back_text.is_empty() {
            return Err(CardError::EmptyBack);
        }

        let category = category.into().trim().to_owned();
        let category = if category.is_empty() {
            DEFAULT_CATEGORY.to_owned()
        } else {
            category
        };

        Ok(Self {
            id,
            front_text,
            back_text,
            example: example.into().trim().to_owned(),
            level,
            category,
        })
    }

    #[must_use]
    pub fn id(&self) -> CardId {
        self.id
    }

    #[must_use]
    pub fn front_text(&self) -> &str {
        &self.front_text
    }

    #[must_use]
    pub fn back_text(&self) -> &str {
        &self.back_text
    }

    #[must_use]
    pub fn example(&self) -> &str {
        &self.example
    }

    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
