//! Demo catalog used by the `seed` binary and the app's `seed` command.

use lingua_core::model::{Card, CardError, CardId, Level};
use thiserror::Error;

use crate::repository::{CardCatalog, StorageError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SeedError {
    #[error(transparent)]
    Card(#[from] CardError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

struct Entry {
    front: &'static str,
    back: &'static str,
    example: &'static str,
    category: &'static str,
}

const fn entry(
    front: &'static str,
    back: &'static str,
    example: &'static str,
    category: &'static str,
) -> Entry {
    Entry {
        front,
        back,
        example,
        category,
    }
}

const BEGINNER: &[Entry] = &[
    entry("apple", "a round fruit", "She ate an apple for lunch.", "food"),
    entry("bread", "baked food made from flour", "We need bread and milk.", "food"),
    entry("water", "a clear liquid you drink", "Can I have some water?", "food"),
    entry("house", "a building where people live", "Their house is near the park.", "home"),
    entry("kitchen", "the room where you cook", "Dinner is ready in the kitchen.", "home"),
    entry("morning", "the early part of the day", "I run every morning.", "time"),
    entry("tomorrow", "the day after today", "See you tomorrow!", "time"),
    entry("friend", "a person you like and trust", "My friend lives in Berlin.", "people"),
    entry("doctor", "a person who treats the sick", "The doctor answered every question.", "people"),
    entry("train", "a vehicle that runs on rails", "The train leaves at six.", "travel"),
    entry("ticket", "a paper that lets you travel or enter", "I lost my ticket.", "travel"),
    entry("cheap", "not expensive", "This shirt was cheap.", "shopping"),
];

const INTERMEDIATE: &[Entry] = &[
    entry("reliable", "able to be trusted", "He is a reliable colleague.", "work"),
    entry("deadline", "the latest time to finish something", "The deadline is Friday.", "work"),
    entry("negotiate", "to discuss to reach an agreement", "They negotiated a better price.", "work"),
    entry("commute", "regular travel to and from work", "My commute takes an hour.", "travel"),
    entry("itinerary", "a planned route for a trip", "Check the itinerary before we leave.", "travel"),
    entry("reluctant", "unwilling to do something", "She was reluctant to leave.", "feelings"),
    entry("grateful", "feeling thankful", "I am grateful for your help.", "feelings"),
    entry("appointment", "an arranged meeting", "I have a dentist appointment.", "health"),
];

const ADVANCED: &[Entry] = &[
    entry("ubiquitous", "found everywhere", "Smartphones are ubiquitous now.", "general"),
    entry("meticulous", "very careful about details", "He keeps meticulous notes.", "general"),
    entry("ambivalent", "having mixed feelings", "She felt ambivalent about the offer.", "feelings"),
    entry("mitigate", "to make less severe", "We must mitigate the risks.", "work"),
    entry("unprecedented", "never done or known before", "The storm caused unprecedented damage.", "general"),
    entry("tenuous", "very weak or slight", "The link between them is tenuous.", "general"),
];

/// Build the demo catalog with ids assigned from 1 in level order.
///
/// # Errors
///
/// Returns `CardError` if an entry fails validation.
pub fn demo_cards() -> Result<Vec<Card>, CardError> {
    let levels = [
        (Level::Beginner, BEGINNER),
        (Level::Intermediate, INTERMEDIATE),
        (Level::Advanced, ADVANCED),
    ];

    let mut cards = Vec::new();
    let mut next_id = 1_u64;
    for (level, entries) in levels {
        for e in entries {
            cards.push(Card::new(
                CardId::new(next_id),
                e.front,
                e.back,
                e.example,
                level,
                e.category,
            )?);
            next_id += 1;
        }
    }
    Ok(cards)
}

/// Upsert the demo catalog and return how many cards were written.
///
/// # Errors
///
/// Returns `SeedError` if a card is invalid or the catalog rejects a write.
pub async fn seed_demo_catalog(catalog: &dyn CardCatalog) -> Result<usize, SeedError> {
    let cards = demo_cards()?;
    for card in &cards {
        catalog.upsert_card(card).await?;
    }
    tracing::info!(cards = cards.len(), "seeded demo catalog");
    Ok(cards.len())
}
