//! Data models for flashcards and exercises.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ItemKind;

/// Generate a fresh 8-character item id.
///
/// Callers use this once, when an item is first created. The engine never
/// calls it while scheduling or re-serializing.
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Derive a stable 8-character id from item text, for annotations that carry none.
pub(crate) fn derived_id(text: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, text.as_bytes())
        .simple()
        .to_string()[..8]
        .to_string()
}

/// Normalize a tag so it survives being written as `#tag`.
///
/// Leading `#`s are dropped and whitespace runs become `-`. Blank tags give `None`.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let words: Vec<&str> = tag.trim().trim_start_matches('#').split_whitespace().collect();
    if words.is_empty() {
        return None;
    }
    Some(words.join("-"))
}

fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter().filter_map(|tag| normalize_tag(tag.as_ref())).collect()
}

// ══════════════════════════════════════════════════════════════════════════
// Flashcards
// ══════════════════════════════════════════════════════════════════════════

/// Rating for how well you remembered a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Again = 1, // Forgot
    Hard = 2,  // Serious difficulty
    Good = 3,  // Some hesitation
    Easy = 4,  // Perfect recall
}

impl Rating {
    pub const ALL: [Rating; 4] = [Self::Again, Self::Hard, Self::Good, Self::Easy];

    pub fn from_key(c: char) -> Option<Self> {
        match c {
            '1' => Some(Self::Again),
            '2' => Some(Self::Hard),
            '3' => Some(Self::Good),
            '4' => Some(Self::Easy),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Again => "Again",
            Self::Hard => "Hard",
            Self::Good => "Good",
            Self::Easy => "Easy",
        }
    }

    /// Numeric value used by the FSRS formulas (1-4).
    pub fn value(&self) -> i32 {
        *self as i32
    }
}

impl FromStr for Rating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rating) = s.chars().next().filter(|_| s.len() == 1).and_then(Self::from_key) {
            return Ok(rating);
        }
        match s.to_ascii_lowercase().as_str() {
            "again" => Ok(Self::Again),
            "hard" => Ok(Self::Hard),
            "good" => Ok(Self::Good),
            "easy" => Ok(Self::Easy),
            other => Err(format!("unknown rating '{}' (expected again, hard, good, easy or 1-4)", other)),
        }
    }
}

/// Where a card is in the learning process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    /// Never reviewed
    #[default]
    New,
    /// Working through the short learning steps
    Learning,
    /// Failed a review and re-learning
    Relearning,
    /// Regular spaced review
    Review,
}

impl CardState {
    /// Name written into the state record.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Learning => "learning",
            Self::Relearning => "relearning",
            Self::Review => "reviewing",
        }
    }

    /// Parse a state name from a record. Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Some(Self::New),
            "learning" => Some(Self::Learning),
            "relearning" => Some(Self::Relearning),
            "reviewing" | "review" => Some(Self::Review),
            _ => None,
        }
    }
}

impl fmt::Display for CardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single flashcard with its FSRS memory state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: String,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,

    // Scheduling
    pub state: CardState,
    pub step: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reviewed_at: Option<DateTime<Utc>>,

    // FSRS fields
    pub stability: f64,
    pub difficulty: f64,
    pub scheduled_days: u32,
}

/// Difficulty given to a card before its first rating.
pub const DEFAULT_DIFFICULTY: f64 = 5.0;

impl Flashcard {
    /// Create a brand new card with a freshly generated id.
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self::with_id(generate_id(), question, answer)
    }

    pub fn with_id(
        id: impl Into<String>,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            question: question.into().trim().to_string(),
            answer: answer.into().trim().to_string(),
            tags: BTreeSet::new(),
            state: CardState::New,
            step: 0,
            due_at: None,
            last_reviewed_at: None,
            stability: 0.0,
            difficulty: DEFAULT_DIFFICULTY,
            scheduled_days: 0,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    pub fn is_new(&self) -> bool {
        self.state == CardState::New
    }

    /// New cards are always due; everything else is due once `due_at` has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.due_at {
            None => true,
            Some(due) => now >= due,
        }
    }

    /// Time remaining until the card is due. Negative when overdue.
    pub fn time_until_due(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.due_at.map(|due| due - now)
    }

    /// Probability of recall at `now`.
    pub fn retrievability(&self, now: DateTime<Utc>) -> f64 {
        crate::fsrs::retrievability(self, now)
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Exercises
// ══════════════════════════════════════════════════════════════════════════

/// Grade for an exercise attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum ExerciseGrade {
    #[default]
    NotAttempted = 0,
    Incorrect = 1,
    Partial = 2,
    Correct = 3,
}

impl ExerciseGrade {
    pub fn value(&self) -> u8 {
        *self as u8
    }

    /// Map a stored number onto a grade, clamping out-of-range values.
    pub fn from_value(value: i64) -> Self {
        match value {
            i64::MIN..=0 => Self::NotAttempted,
            1 => Self::Incorrect,
            2 => Self::Partial,
            _ => Self::Correct,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NotAttempted => "Not attempted",
            Self::Incorrect => "Incorrect",
            Self::Partial => "Partial",
            Self::Correct => "Correct",
        }
    }
}

impl FromStr for ExerciseGrade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "none" | "not-attempted" => Ok(Self::NotAttempted),
            "1" | "incorrect" | "wrong" => Ok(Self::Incorrect),
            "2" | "partial" => Ok(Self::Partial),
            "3" | "correct" => Ok(Self::Correct),
            other => Err(format!("unknown grade '{}' (expected 0-3)", other)),
        }
    }
}

/// Author-assigned difficulty label for an exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLabel {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl DifficultyLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    /// Unknown labels fall back to medium.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Self::Easy,
            "hard" => Self::Hard,
            _ => Self::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One message in an exercise's feedback history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// An exercise with linear progression tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub difficulty: DifficultyLabel,
    /// Position in the note's exercise sequence
    pub order: u32,

    // Progress
    pub grade: ExerciseGrade,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,

    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Exercise {
    /// Create a brand new exercise with a freshly generated id.
    pub fn new(prompt: impl Into<String>, order: u32) -> Self {
        Self::with_id(generate_id(), prompt, order)
    }

    pub fn with_id(id: impl Into<String>, prompt: impl Into<String>, order: u32) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into().trim().to_string(),
            hints: Vec::new(),
            difficulty: DifficultyLabel::default(),
            order,
            grade: ExerciseGrade::NotAttempted,
            attempts: 0,
            last_attempt_at: None,
            chat_history: Vec::new(),
            tags: BTreeSet::new(),
        }
    }

    /// Complete once at least partially solved.
    pub fn is_complete(&self) -> bool {
        self.grade >= ExerciseGrade::Partial
    }

    pub fn is_correct(&self) -> bool {
        self.grade == ExerciseGrade::Correct
    }

    /// Whether the learner may move on to the next exercise in the sequence.
    pub fn can_progress(&self) -> bool {
        self.is_complete()
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Either kind
// ══════════════════════════════════════════════════════════════════════════

/// A flashcard or an exercise, as handed out by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LearningItem {
    Flashcard(Flashcard),
    Exercise(Exercise),
}

impl LearningItem {
    pub fn id(&self) -> &str {
        match self {
            Self::Flashcard(card) => &card.id,
            Self::Exercise(exercise) => &exercise.id,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Flashcard(_) => ItemKind::Flashcard,
            Self::Exercise(_) => ItemKind::Exercise,
        }
    }
}

impl From<Flashcard> for LearningItem {
    fn from(card: Flashcard) -> Self {
        Self::Flashcard(card)
    }
}

impl From<Exercise> for LearningItem {
    fn from(exercise: Exercise) -> Self {
        Self::Exercise(exercise)
    }
}
