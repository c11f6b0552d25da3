//! Compact JSON state records embedded after an item's marker.
//!
//! Loading is forgiving: an unreadable record gives an all-defaults item and
//! out-of-range numbers are clamped, so one corrupt annotation never stops a
//! whole document from loading.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::fsrs::{
    LEARNING_STEPS_MINUTES, MAX_INTERVAL_DAYS, MIN_STABILITY, RELEARNING_STEPS_MINUTES,
};
use crate::models::{
    derived_id, CardState, ChatMessage, DifficultyLabel, Exercise, ExerciseGrade, Flashcard,
    DEFAULT_DIFFICULTY,
};

/// Flashcard state as persisted in text.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct FlashcardRecord {
    id: Option<String>,
    state: Option<String>,
    step: Option<i64>,
    #[serde(rename = "S", alias = "stability")]
    stability: Option<f64>,
    #[serde(rename = "D", alias = "difficulty")]
    difficulty: Option<f64>,
    #[serde(rename = "days", alias = "scheduled_days")]
    days: Option<i64>,
    due: Option<String>,
    reviewed: Option<String>,
}

/// Exercise state as persisted in text.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ExerciseRecord {
    id: Option<String>,
    grade: Option<i64>,
    order: Option<i64>,
    difficulty: Option<String>,
    attempts: Option<i64>,
    last_attempt: Option<String>,
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Read an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn read_timestamp(raw: Option<&str>, field: &str) -> Option<DateTime<Utc>> {
    let raw = raw?;
    let parsed = parse_timestamp(raw);
    if parsed.is_none() {
        warn!("Ignoring unreadable '{}' timestamp: {:?}", field, raw);
    }
    parsed
}

fn to_u32(value: Option<i64>) -> u32 {
    clamp_u32(value, u32::MAX)
}

fn clamp_u32(value: Option<i64>, max: u32) -> u32 {
    value.unwrap_or(0).clamp(0, i64::from(max)) as u32
}

/// Highest step index that is meaningful in `state`.
fn last_step(state: CardState) -> u32 {
    let steps = match state {
        CardState::Learning => LEARNING_STEPS_MINUTES.len(),
        CardState::Relearning => RELEARNING_STEPS_MINUTES.len(),
        CardState::New | CardState::Review => 1,
    };
    steps.saturating_sub(1) as u32
}

/// Decode a record payload. `None` means there was no payload at all.
fn decode<T>(raw: Option<&str>, offset: usize) -> T
where
    T: Default + for<'de> Deserialize<'de>,
{
    let Some(raw) = raw else {
        return T::default();
    };
    match serde_json::from_str(raw.trim()) {
        Ok(record) => record,
        Err(err) => {
            warn!(
                "Malformed state record at byte {}: {}; treating item as new",
                offset, err
            );
            T::default()
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Flashcards
// ══════════════════════════════════════════════════════════════════════════

impl FlashcardRecord {
    pub(crate) fn from_card(card: &Flashcard) -> Self {
        Self {
            id: Some(card.id.clone()),
            state: Some(card.state.as_str().to_string()),
            step: Some(i64::from(card.step)),
            stability: Some(card.stability),
            difficulty: Some(card.difficulty),
            days: Some(i64::from(card.scheduled_days)),
            due: card.due_at.as_ref().map(format_timestamp),
            reviewed: card.last_reviewed_at.as_ref().map(format_timestamp),
        }
    }

    pub(crate) fn to_json(&self) -> String {
        // Only plain strings and numbers in here, so this cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Build a flashcard from parsed text and its (possibly missing or corrupt) record.
pub(crate) fn load_flashcard(
    question: String,
    answer: String,
    tags: BTreeSet<String>,
    raw_record: Option<&str>,
    offset: usize,
) -> Flashcard {
    let record: FlashcardRecord = decode(raw_record, offset);

    let id = record
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| derived_id(&question));
    let mut card = Flashcard::with_id(id, question, answer);
    card.tags = tags;

    let stability = record.stability.filter(|s| s.is_finite()).unwrap_or(0.0);
    let mut state = match record.state.as_deref() {
        None => CardState::New,
        Some(name) => CardState::parse(name).unwrap_or_else(|| {
            warn!("Unknown flashcard state {:?} for '{}'; treating as new", name, card.id);
            CardState::New
        }),
    };
    // Older notes marked cards "learning" before they had ever been rated.
    if state == CardState::Learning && stability == 0.0 {
        state = CardState::New;
    }

    card.difficulty = record
        .difficulty
        .filter(|d| d.is_finite())
        .map(|d| d.clamp(1.0, 10.0))
        .unwrap_or(DEFAULT_DIFFICULTY);
    card.due_at = read_timestamp(record.due.as_deref(), "due");
    card.last_reviewed_at = read_timestamp(record.reviewed.as_deref(), "reviewed");

    if state != CardState::New && card.due_at.is_none() {
        warn!("Flashcard '{}' is {} but has no due date; treating as new", card.id, state);
        state = CardState::New;
    }

    if state == CardState::New {
        card.due_at = None;
        return card;
    }

    card.state = state;
    card.step = clamp_u32(record.step, last_step(state));
    card.scheduled_days = clamp_u32(record.days, MAX_INTERVAL_DAYS);
    card.stability = if stability > 0.0 { stability } else { MIN_STABILITY };
    card
}

// ══════════════════════════════════════════════════════════════════════════
// Exercises
// ══════════════════════════════════════════════════════════════════════════

impl ExerciseRecord {
    pub(crate) fn from_exercise(exercise: &Exercise) -> Self {
        Self {
            id: Some(exercise.id.clone()),
            grade: Some(i64::from(exercise.grade.value())),
            order: Some(i64::from(exercise.order)),
            difficulty: Some(exercise.difficulty.as_str().to_string()),
            attempts: Some(i64::from(exercise.attempts)),
            last_attempt: exercise.last_attempt_at.as_ref().map(format_timestamp),
        }
    }

    pub(crate) fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Parsed body of an exercise, before its record is applied.
pub(crate) struct ExerciseBody {
    pub prompt: String,
    pub hints: Vec<String>,
    pub chat_history: Vec<ChatMessage>,
    pub tags: BTreeSet<String>,
}

pub(crate) fn load_exercise(body: ExerciseBody, raw_record: Option<&str>, offset: usize) -> Exercise {
    let record: ExerciseRecord = decode(raw_record, offset);

    let id = record
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| derived_id(&body.prompt));
    let mut exercise = Exercise::with_id(id, body.prompt, to_u32(record.order));
    exercise.hints = body.hints;
    exercise.chat_history = body.chat_history;
    exercise.tags = body.tags;
    exercise.difficulty = record
        .difficulty
        .as_deref()
        .map(DifficultyLabel::parse)
        .unwrap_or_default();
    exercise.grade = ExerciseGrade::from_value(record.grade.unwrap_or(0));
    exercise.attempts = to_u32(record.attempts);
    exercise.last_attempt_at = read_timestamp(record.last_attempt.as_deref(), "last_attempt");

    // A grade implies at least one attempt.
    if exercise.attempts == 0 && exercise.grade != ExerciseGrade::NotAttempted {
        exercise.attempts = 1;
    }
    exercise
}
