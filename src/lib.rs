//! srl-recall - spaced repetition recall for flashcards and exercises kept in notes.
//!
//! Flashcards are scheduled with FSRS, exercises follow a linear progression,
//! and both live as annotations inside ordinary note text.

pub mod codec;
pub mod config;
pub mod error;
pub mod fsrs;
pub mod models;
pub mod progression;
pub mod recall;
pub mod storage;

use chrono::{DateTime, Utc};

pub use codec::{
    parse_items, serialize_exercise, serialize_flashcard, update_item_in_document, ParsedItem,
};
pub use error::{CodecError, ItemKind};
pub use models::{CardState, Exercise, ExerciseGrade, Flashcard, LearningItem, Rating};
pub use recall::{select_next, ItemFilter, SelectionMode};

/// New state of `card` after a review rated `rating` at `now`.
pub fn apply_flashcard_rating(card: &Flashcard, rating: Rating, now: DateTime<Utc>) -> Flashcard {
    fsrs::apply_rating(card, rating, now)
}

/// New state of `exercise` after an attempt graded `grade` at `now`.
pub fn record_exercise_grade(
    exercise: &Exercise,
    grade: ExerciseGrade,
    now: DateTime<Utc>,
) -> Exercise {
    progression::record_attempt(exercise, grade, now)
}
