use std::fmt;

use lingua_core::model::{LearnerId, Level, Rating};
use serde_json::{Value, json};
use services::{SessionError, SessionManager};
use tracing::warn;

//
// ─── PARSING ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start { learner: LearnerId, level: Level },
    Card { learner: LearnerId },
    Answer { learner: LearnerId, correct: bool, rating: Rating },
    Progress { learner: LearnerId },
    End { learner: LearnerId },
    Stats { learner: LearnerId },
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    Unknown(String),
    MissingArg { command: &'static str, arg: &'static str },
    InvalidLearner { raw: String },
    InvalidLevel { raw: String },
    InvalidAnswer { raw: String },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Empty => write!(f, "empty command"),
            CommandError::Unknown(cmd) => write!(f, "unknown command: {cmd}"),
            CommandError::MissingArg { command, arg } => write!(f, "{command} requires <{arg}>"),
            CommandError::InvalidLearner { raw } => write!(f, "invalid learner id: {raw}"),
            CommandError::InvalidLevel { raw } => write!(f, "invalid level: {raw}"),
            CommandError::InvalidAnswer { raw } => write!(
                f,
                "invalid answer: {raw} (expected easy, good, hard, forgot or wrong)"
            ),
        }
    }
}

impl std::error::Error for CommandError {}

fn learner_arg<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    command: &'static str,
) -> Result<LearnerId, CommandError> {
    let raw = parts.next().ok_or(CommandError::MissingArg {
        command,
        arg: "learner",
    })?;
    raw.parse().map_err(|_| CommandError::InvalidLearner {
        raw: raw.to_owned(),
    })
}

/// Map a button label to correctness and rating; `wrong` is an incorrect answer.
fn parse_answer(raw: &str) -> Result<(bool, Rating), CommandError> {
    if raw.eq_ignore_ascii_case("wrong") {
        return Ok((false, Rating::Forgot));
    }
    let rating: Rating = raw.parse().map_err(|_| CommandError::InvalidAnswer {
        raw: raw.to_owned(),
    })?;
    Ok((rating != Rating::Forgot, rating))
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut parts = line.split_whitespace();
        let name = parts.next().ok_or(CommandError::Empty)?;

        match name.to_ascii_lowercase().as_str() {
            "start" => {
                let learner = learner_arg(&mut parts, "start")?;
                let raw_level = parts.next().unwrap_or_default();
                let level = raw_level.parse().map_err(|_| CommandError::InvalidLevel {
                    raw: raw_level.to_owned(),
                })?;
                Ok(Command::Start { learner, level })
            }
            "card" => Ok(Command::Card {
                learner: learner_arg(&mut parts, "card")?,
            }),
            "answer" => {
                let learner = learner_arg(&mut parts, "answer")?;
                let raw = parts.next().ok_or(CommandError::MissingArg {
                    command: "answer",
                    arg: "rating",
                })?;
                let (correct, rating) = parse_answer(raw)?;
                Ok(Command::Answer {
                    learner,
                    correct,
                    rating,
                })
            }
            "progress" => Ok(Command::Progress {
                learner: learner_arg(&mut parts, "progress")?,
            }),
            "end" => Ok(Command::End {
                learner: learner_arg(&mut parts, "end")?,
            }),
            "stats" => Ok(Command::Stats {
                learner: learner_arg(&mut parts, "stats")?,
            }),
            "quit" | "exit" => Ok(Command::Quit),
            _ => Err(CommandError::Unknown(name.to_owned())),
        }
    }
}

//
// ─── EXECUTION ─────────────────────────────────────────────────────────────────
//

fn session_error_kind(err: &SessionError) -> &'static str {
    match err {
        SessionError::NotFound => "session_not_found",
        SessionError::AlreadyComplete => "session_already_complete",
        SessionError::InvalidRating(_) => "invalid_rating",
        SessionError::Storage(_) => "persistence_error",
        _ => "internal_error",
    }
}

/// JSON reply for a failed session call; every kind is retryable by restarting.
pub fn error_reply(err: &SessionError) -> Value {
    json!({
        "event": "error",
        "kind": session_error_kind(err),
        "message": err.to_string(),
        "retry": "start",
    })
}

pub fn invalid_command_reply(err: &CommandError) -> Value {
    json!({
        "event": "invalid_command",
        "message": err.to_string(),
    })
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| {
        warn!(error = %err, "reply field could not be serialized");
        Value::Null
    })
}

/// Run one parsed command; `Quit` is handled by the caller.
pub async fn execute(sessions: &SessionManager, command: Command) -> Value {
    let result = match command {
        Command::Start { learner, level } => start(sessions, learner, level).await,
        Command::Card { learner } => Ok(match sessions.current_card(learner).await {
            Some(card) => json!({ "event": "card", "card": to_value(&card) }),
            None => json!({ "event": "no_card" }),
        }),
        Command::Answer {
            learner,
            correct,
            rating,
        } => answer(sessions, learner, correct, rating).await,
        Command::Progress { learner } => Ok(json!({
            "event": "progress",
            "progress": to_value(&sessions.progress(learner).await),
        })),
        Command::End { learner } => sessions.end_session(learner).await.map(|progress| {
            json!({
                "event": "ended",
                "progress": to_value(&progress),
            })
        }),
        Command::Stats { learner } => sessions.stats(learner).await.map(|stats| {
            json!({
                "event": "stats",
                "stats": to_value(&stats),
                "summary": stats.recommendation.to_string(),
            })
        }),
        Command::Quit => Ok(json!({ "event": "bye" })),
    };

    result.unwrap_or_else(|err| error_reply(&err))
}

async fn start(
    sessions: &SessionManager,
    learner: LearnerId,
    level: Level,
) -> Result<Value, SessionError> {
    match sessions.start_session(learner, level).await? {
        Some(view) => Ok(json!({ "event": "session", "session": to_value(&view) })),
        None => {
            let recommendation = sessions.recommended_study_time(learner).await?;
            Ok(json!({
                "event": "nothing_to_review",
                "recommendation": to_value(&recommendation),
                "summary": recommendation.to_string(),
            }))
        }
    }
}

async fn answer(
    sessions: &SessionManager,
    learner: LearnerId,
    correct: bool,
    rating: Rating,
) -> Result<Value, SessionError> {
    let result = sessions.submit_answer(learner, correct, rating).await?;
    let next = if result.is_complete {
        None
    } else {
        sessions.current_card(learner).await
    };
    Ok(json!({
        "event": "answer",
        "outcome": to_value(&result.outcome),
        "progress": to_value(&result.progress),
        "complete": result.is_complete,
        "next": to_value(&next),
    }))
}
