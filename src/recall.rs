//! Recall orchestration: picking what to show next across flashcards and exercises.
//!
//! Selection is hierarchical. Each pool nominates its most urgent item
//! (FSRS urgency for flashcards, linear progression for exercises) and the two
//! nominees are compared on a priority score biased by the topic.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::fsrs::{memory_score, retrievability};
use crate::models::{CardState, Exercise, ExerciseGrade, Flashcard, LearningItem};
use crate::progression::{exercise_score, fewest_attempts, next_exercise_index};

// ══════════════════════════════════════════════════════════════════════════
// Topic bias
// ══════════════════════════════════════════════════════════════════════════

/// Keywords suggesting a topic is learned by practice.
pub const EXERCISE_KEYWORDS: &[&str] = &[
    "math", "mathematics", "algebra", "calculus", "geometry", "statistics",
    "proof", "proofs", "theorem", "lemma", "corollary",
    "programming", "coding", "algorithm", "algorithms", "data structure",
    "physics", "chemistry", "engineering",
    "problem solving", "exercise", "exercises",
    "implementation", "code", "practice",
];

/// Keywords suggesting a topic is learned by memorisation.
pub const FLASHCARD_KEYWORDS: &[&str] = &[
    "history", "historical", "date", "dates", "event", "events",
    "vocabulary", "vocab", "word", "words", "definition", "definitions",
    "fact", "facts", "memorize", "memory",
    "language", "languages", "grammar",
    "terminology", "terms", "concepts",
    "people", "names", "places", "geography",
];

/// Share of exercises (0-1) a topic calls for; 0.5 when no keyword matches.
pub fn estimate_exercise_ratio(topic: &str, content: &str) -> f64 {
    let combined = format!("{} {}", topic, content).to_lowercase();
    let hits = |keywords: &[&str]| keywords.iter().filter(|kw| combined.contains(*kw)).count();

    let exercise = hits(EXERCISE_KEYWORDS);
    let flashcard = hits(FLASHCARD_KEYWORDS);
    if exercise + flashcard == 0 {
        return 0.5;
    }
    exercise as f64 / (exercise + flashcard) as f64
}

/// How strongly each item kind is favoured for a topic. The two weights sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TopicWeights {
    pub flashcard: f64,
    pub exercise: f64,
}

impl TopicWeights {
    pub fn balanced() -> Self {
        Self {
            flashcard: 0.5,
            exercise: 0.5,
        }
    }

    pub fn for_topic(topic: &str, content: &str) -> Self {
        let ratio = estimate_exercise_ratio(topic, content);
        Self {
            flashcard: 1.0 - ratio,
            exercise: ratio,
        }
    }
}

impl Default for TopicWeights {
    fn default() -> Self {
        Self::balanced()
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Selection
// ══════════════════════════════════════════════════════════════════════════

/// Due items only, or early review once nothing is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    Due,
    Early,
}

/// Which item kinds a session draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemFilter {
    #[default]
    Both,
    FlashcardsOnly,
    ExercisesOnly,
}

impl ItemFilter {
    fn flashcards(&self) -> bool {
        *self != Self::ExercisesOnly
    }

    fn exercises(&self) -> bool {
        *self != Self::FlashcardsOnly
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pick {
    Flashcard(usize),
    Exercise(usize),
}

fn state_tier(state: CardState) -> u8 {
    match state {
        CardState::New => 0,
        CardState::Learning => 1,
        CardState::Relearning => 2,
        CardState::Review => 3,
    }
}

/// Index of the most urgent due card: new, then learning, then relearning,
/// then review cards by lowest retrievability. Ties keep input order.
fn most_urgent_flashcard(cards: &[Flashcard], now: DateTime<Utc>) -> Option<usize> {
    let key = |card: &Flashcard| {
        let r = if card.state == CardState::Review {
            retrievability(card, now)
        } else {
            0.0
        };
        (state_tier(card.state), r)
    };

    let mut best: Option<(usize, (u8, f64))> = None;
    for (i, card) in cards.iter().enumerate().filter(|(_, c)| c.is_due(now)) {
        let k = key(card);
        match best {
            Some((_, b)) if b.0 < k.0 || (b.0 == k.0 && b.1 <= k.1) => {}
            _ => best = Some((i, k)),
        }
    }
    best.map(|(i, _)| i)
}

/// Review card closest to dropping below the target retention, among those not yet due.
fn early_review_flashcard(cards: &[Flashcard], now: DateTime<Utc>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, card) in cards.iter().enumerate() {
        if card.state != CardState::Review || card.is_due(now) {
            continue;
        }
        let r = retrievability(card, now);
        match best {
            Some((_, b)) if b <= r => {}
            _ => best = Some((i, r)),
        }
    }
    best.map(|(i, _)| i)
}

/// Already-solved exercise with the fewest attempts, for reinforcement.
fn reinforcement_exercise(exercises: &[Exercise]) -> Option<usize> {
    let solved = (0..exercises.len()).filter(|&i| exercises[i].is_complete());
    fewest_attempts(exercises, solved)
}

/// Urgency of a due flashcard; higher is more urgent.
fn flashcard_priority(card: &Flashcard, now: DateTime<Utc>) -> f64 {
    match card.state {
        CardState::New => 12.0,
        CardState::Learning => 10.0,
        CardState::Relearning => 8.0,
        CardState::Review => 3.0 + (1.0 - retrievability(card, now)) * 5.0,
    }
}

/// Urgency of an exercise; higher is more urgent.
fn exercise_priority(exercise: &Exercise) -> f64 {
    match exercise.grade {
        ExerciseGrade::NotAttempted => 10.0,
        ExerciseGrade::Incorrect => 8.0,
        ExerciseGrade::Partial => 3.0,
        ExerciseGrade::Correct => 1.0,
    }
}

/// Chooses the next item of a recall session.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RecallOrchestrator {
    weights: TopicWeights,
    filter: ItemFilter,
}

impl RecallOrchestrator {
    /// Orchestrator biased by the keywords in `topic`.
    pub fn new(topic: &str, filter: ItemFilter) -> Self {
        Self::with_weights(TopicWeights::for_topic(topic, ""), filter)
    }

    pub fn with_weights(weights: TopicWeights, filter: ItemFilter) -> Self {
        Self { weights, filter }
    }

    pub fn weights(&self) -> TopicWeights {
        self.weights
    }

    fn pick(
        &self,
        flashcards: &[Flashcard],
        exercises: &[Exercise],
        mode: SelectionMode,
        now: DateTime<Utc>,
    ) -> Option<Pick> {
        match mode {
            SelectionMode::Due => self.pick_due(flashcards, exercises, now),
            SelectionMode::Early => self.pick_early(flashcards, exercises, now),
        }
    }

    fn pick_due(
        &self,
        flashcards: &[Flashcard],
        exercises: &[Exercise],
        now: DateTime<Utc>,
    ) -> Option<Pick> {
        let card = if self.filter.flashcards() {
            most_urgent_flashcard(flashcards, now)
        } else {
            None
        };
        let exercise = if self.filter.exercises() {
            next_exercise_index(exercises)
        } else {
            None
        };

        match (card, exercise) {
            (None, None) => None,
            (Some(c), None) => Some(Pick::Flashcard(c)),
            (None, Some(e)) => Some(Pick::Exercise(e)),
            (Some(c), Some(e)) => {
                let card_score =
                    flashcard_priority(&flashcards[c], now) * (1.0 + self.weights.flashcard);
                let exercise_score =
                    exercise_priority(&exercises[e]) * (1.0 + self.weights.exercise);
                debug!(
                    "Flashcard '{}' scores {:.2}, exercise '{}' scores {:.2}",
                    flashcards[c].id, card_score, exercises[e].id, exercise_score
                );
                if card_score >= exercise_score {
                    Some(Pick::Flashcard(c))
                } else {
                    Some(Pick::Exercise(e))
                }
            }
        }
    }

    fn pick_early(
        &self,
        flashcards: &[Flashcard],
        exercises: &[Exercise],
        now: DateTime<Utc>,
    ) -> Option<Pick> {
        let card = if self.filter.flashcards() {
            early_review_flashcard(flashcards, now)
        } else {
            None
        };
        if let Some(c) = card {
            return Some(Pick::Flashcard(c));
        }
        if self.filter.exercises() {
            return reinforcement_exercise(exercises).map(Pick::Exercise);
        }
        None
    }

    /// The next item to present, or `None` when the session is exhausted.
    pub fn select_next(
        &self,
        flashcards: &[Flashcard],
        exercises: &[Exercise],
        mode: SelectionMode,
        now: DateTime<Utc>,
    ) -> Option<LearningItem> {
        self.pick(flashcards, exercises, mode, now).map(|pick| match pick {
            Pick::Flashcard(i) => LearningItem::Flashcard(flashcards[i].clone()),
            Pick::Exercise(i) => LearningItem::Exercise(exercises[i].clone()),
        })
    }

    /// Whether anything is due right now.
    pub fn has_due_items(
        &self,
        flashcards: &[Flashcard],
        exercises: &[Exercise],
        now: DateTime<Utc>,
    ) -> bool {
        self.pick_due(flashcards, exercises, now).is_some()
    }

    /// Ordered plan of up to `limit` items. Each chosen item leaves its pool.
    pub fn session_items(
        &self,
        flashcards: &[Flashcard],
        exercises: &[Exercise],
        mode: SelectionMode,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<LearningItem> {
        let mut cards = flashcards.to_vec();
        let mut remaining = exercises.to_vec();
        let mut items = Vec::new();

        while items.len() < limit {
            let Some(pick) = self.pick(&cards, &remaining, mode, now) else {
                break;
            };
            items.push(match pick {
                Pick::Flashcard(i) => LearningItem::Flashcard(cards.remove(i)),
                Pick::Exercise(i) => LearningItem::Exercise(remaining.remove(i)),
            });
        }

        debug!("Planned {} of at most {} session items", items.len(), limit);
        items
    }
}

/// Select the next item for `topic`. See [`RecallOrchestrator::select_next`].
pub fn select_next(
    flashcards: &[Flashcard],
    exercises: &[Exercise],
    topic: &str,
    mode: SelectionMode,
    filter: ItemFilter,
    now: DateTime<Utc>,
) -> Option<LearningItem> {
    RecallOrchestrator::new(topic, filter).select_next(flashcards, exercises, mode, now)
}

/// Ordered plan of due items for a session.
pub fn get_session_items(
    flashcards: &[Flashcard],
    exercises: &[Exercise],
    topic: &str,
    filter: ItemFilter,
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<LearningItem> {
    RecallOrchestrator::new(topic, filter).session_items(
        flashcards,
        exercises,
        SelectionMode::Due,
        limit,
        now,
    )
}

/// Progress figures for a set of items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub flashcards: usize,
    pub exercises: usize,
    pub due_flashcards: usize,
    pub new_flashcards: usize,
    pub incomplete_exercises: usize,
    pub memory_score: f64,
    pub exercise_score: f64,
}

impl SessionSummary {
    pub fn compute(flashcards: &[Flashcard], exercises: &[Exercise], now: DateTime<Utc>) -> Self {
        Self {
            flashcards: flashcards.len(),
            exercises: exercises.len(),
            due_flashcards: flashcards.iter().filter(|c| c.is_due(now)).count(),
            new_flashcards: flashcards.iter().filter(|c| c.is_new()).count(),
            incomplete_exercises: exercises.iter().filter(|e| !e.is_complete()).count(),
            memory_score: memory_score(flashcards, now),
            exercise_score: exercise_score(exercises),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 10, 12, 0, 0).unwrap()
    }

    fn card(id: &str, state: CardState) -> Flashcard {
        let mut card = Flashcard::with_id(id, format!("Question {}", id), "Answer");
        if state != CardState::New {
            card.state = state;
            card.stability = 5.0;
            card.last_reviewed_at = Some(now() - Duration::days(5));
            card.due_at = Some(now() - Duration::hours(1));
        }
        card
    }

    fn review_card(id: &str, stability: f64, reviewed_days_ago: i64, due_in_days: i64) -> Flashcard {
        let mut card = card(id, CardState::Review);
        card.stability = stability;
        card.last_reviewed_at = Some(now() - Duration::days(reviewed_days_ago));
        card.due_at = Some(now() + Duration::days(due_in_days));
        card
    }

    fn exercise(id: &str, order: u32, grade: ExerciseGrade, attempts: u32) -> Exercise {
        let mut ex = Exercise::with_id(id, format!("Exercise {}", id), order);
        ex.grade = grade;
        ex.attempts = attempts;
        ex
    }

    fn ids(items: &[LearningItem]) -> Vec<&str> {
        items.iter().map(|item| item.id()).collect()
    }

    #[test]
    fn test_ratio_defaults_to_balanced() {
        assert_eq!(estimate_exercise_ratio("", ""), 0.5);
        assert_eq!(TopicWeights::for_topic("gardening", ""), TopicWeights::balanced());
    }

    #[test]
    fn test_ratio_follows_keywords() {
        assert_eq!(estimate_exercise_ratio("Linear algebra proofs", ""), 1.0);
        assert_eq!(estimate_exercise_ratio("French vocabulary", ""), 0.0);
        let weights = TopicWeights::for_topic("History of mathematics", "");
        assert!(weights.exercise > 0.0 && weights.flashcard > 0.0);
        assert!((weights.exercise + weights.flashcard - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_flashcard_tiers() {
        let cards = vec![
            review_card("rev", 5.0, 10, -1),
            card("relearn", CardState::Relearning),
            card("learn", CardState::Learning),
            card("new", CardState::New),
        ];
        let orchestrator = RecallOrchestrator::new("", ItemFilter::FlashcardsOnly);
        let plan = orchestrator.session_items(&cards, &[], SelectionMode::Due, 10, now());
        assert_eq!(ids(&plan), vec!["new", "learn", "relearn", "rev"]);
    }

    #[test]
    fn test_review_cards_by_lowest_retrievability() {
        let cards = vec![
            review_card("fresh", 10.0, 2, -1),
            review_card("fading", 1.0, 20, -1),
        ];
        let next = select_next(&cards, &[], "", SelectionMode::Due, ItemFilter::Both, now());
        assert_eq!(next.map(|i| i.id().to_string()), Some("fading".to_string()));
    }

    #[test]
    fn test_not_due_cards_are_skipped() {
        let cards = vec![review_card("later", 10.0, 1, 5)];
        let orchestrator = RecallOrchestrator::default();
        assert!(orchestrator.select_next(&cards, &[], SelectionMode::Due, now()).is_none());
        assert!(!orchestrator.has_due_items(&cards, &[], now()));
    }

    #[test]
    fn test_single_pool_candidate_is_returned() {
        let exercises = vec![exercise("ex", 1, ExerciseGrade::Correct, 3)];
        let next = select_next(&[], &exercises, "", SelectionMode::Due, ItemFilter::Both, now());
        assert!(matches!(next, Some(LearningItem::Exercise(_))));
    }

    #[test]
    fn test_new_card_beats_unattempted_exercise_when_balanced() {
        // 12 * 1.5 = 18 against 10 * 1.5 = 15
        let cards = vec![card("new", CardState::New)];
        let exercises = vec![exercise("ex", 1, ExerciseGrade::NotAttempted, 0)];
        let next = select_next(&cards, &exercises, "", SelectionMode::Due, ItemFilter::Both, now());
        assert_eq!(next.map(|i| i.id().to_string()), Some("new".to_string()));
    }

    #[test]
    fn test_topic_bias_can_favour_exercises() {
        // Review card: 3 + (1 - R) * 5 with R close to 1, so about 3.3 * 1.0
        let cards = vec![review_card("rev", 50.0, 3, -1)];
        let exercises = vec![exercise("ex", 1, ExerciseGrade::Incorrect, 1)];
        let next = select_next(
            &cards,
            &exercises,
            "calculus practice",
            SelectionMode::Due,
            ItemFilter::Both,
            now(),
        );
        assert_eq!(next.map(|i| i.id().to_string()), Some("ex".to_string()));
    }

    #[test]
    fn test_ties_favour_flashcards() {
        let orchestrator = RecallOrchestrator::with_weights(TopicWeights::balanced(), ItemFilter::Both);
        let cards = vec![card("relearn", CardState::Relearning)];
        let exercises = vec![exercise("ex", 1, ExerciseGrade::Incorrect, 1)];
        // Both score 8 * 1.5
        let next = orchestrator.select_next(&cards, &exercises, SelectionMode::Due, now());
        assert!(matches!(next, Some(LearningItem::Flashcard(_))));
    }

    #[test]
    fn test_filters_restrict_pools() {
        let cards = vec![card("new", CardState::New)];
        let exercises = vec![exercise("ex", 1, ExerciseGrade::NotAttempted, 0)];
        let only_ex = select_next(&cards, &exercises, "", SelectionMode::Due, ItemFilter::ExercisesOnly, now());
        assert_eq!(only_ex.map(|i| i.id().to_string()), Some("ex".to_string()));
        let only_fc = select_next(&[], &exercises, "", SelectionMode::Due, ItemFilter::FlashcardsOnly, now());
        assert!(only_fc.is_none());
    }

    #[test]
    fn test_early_review_picks_lowest_retrievability() {
        let cards = vec![
            review_card("solid", 100.0, 1, 60),
            review_card("shaky", 2.0, 1, 1),
            card("new", CardState::New),
        ];
        let next = select_next(&cards, &[], "", SelectionMode::Early, ItemFilter::Both, now());
        assert_eq!(next.map(|i| i.id().to_string()), Some("shaky".to_string()));
    }

    #[test]
    fn test_early_review_exercise_reinforcement() {
        let exercises = vec![
            exercise("open", 1, ExerciseGrade::Incorrect, 1),
            exercise("busy", 2, ExerciseGrade::Correct, 4),
            exercise("quiet", 3, ExerciseGrade::Partial, 1),
        ];
        let next = select_next(&[], &exercises, "", SelectionMode::Early, ItemFilter::ExercisesOnly, now());
        assert_eq!(next.map(|i| i.id().to_string()), Some("quiet".to_string()));
        let none = select_next(&[], &exercises[..1], "", SelectionMode::Early, ItemFilter::Both, now());
        assert!(none.is_none());
    }

    #[test]
    fn test_session_plan_exhausts_pools() {
        let cards = vec![card("a", CardState::New), review_card("later", 10.0, 1, 5)];
        let exercises = vec![
            exercise("e1", 1, ExerciseGrade::Correct, 1),
            exercise("e2", 2, ExerciseGrade::NotAttempted, 0),
        ];
        let plan = get_session_items(&cards, &exercises, "", ItemFilter::Both, 10, now());
        assert_eq!(ids(&plan), vec!["a", "e2", "e1"]);

        let limited = get_session_items(&cards, &exercises, "", ItemFilter::Both, 2, now());
        assert_eq!(ids(&limited), vec!["a", "e2"]);
    }

    #[test]
    fn test_session_plan_is_deterministic() {
        let cards = vec![
            card("n1", CardState::New),
            card("n2", CardState::New),
            review_card("r1", 3.0, 9, -2),
            review_card("r2", 3.0, 9, -2),
            card("l1", CardState::Learning),
        ];
        let exercises = vec![
            exercise("e1", 2, ExerciseGrade::Partial, 2),
            exercise("e2", 1, ExerciseGrade::Incorrect, 1),
        ];
        let first = get_session_items(&cards, &exercises, "history", ItemFilter::Both, 20, now());
        let second = get_session_items(&cards, &exercises, "history", ItemFilter::Both, 20, now());
        assert_eq!(first, second);
        assert_eq!(first.len(), 7);
    }

    #[test]
    fn test_summary() {
        let cards = vec![card("n", CardState::New), review_card("r", 10.0, 1, 5)];
        let exercises = vec![exercise("e", 1, ExerciseGrade::Correct, 1)];
        let summary = SessionSummary::compute(&cards, &exercises, now());
        assert_eq!(summary.flashcards, 2);
        assert_eq!(summary.due_flashcards, 1);
        assert_eq!(summary.new_flashcards, 1);
        assert_eq!(summary.incomplete_exercises, 0);
        assert_eq!(summary.exercise_score, 1.0);
    }
}
