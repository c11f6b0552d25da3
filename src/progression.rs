//! Linear progression for exercises.
//!
//! Exercises have no forgetting curve. They form an ordered checklist: the
//! learner works through them by `order` and an exercise counts as done once
//! it has been at least partially solved.

use chrono::{DateTime, Utc};

use crate::models::{ChatMessage, ChatRole, Exercise, ExerciseGrade};

/// Record an attempt and return the updated exercise.
pub fn record_attempt(exercise: &Exercise, grade: ExerciseGrade, now: DateTime<Utc>) -> Exercise {
    let mut next = exercise.clone();
    next.grade = grade;
    next.attempts = exercise.attempts.saturating_add(1);
    next.last_attempt_at = Some(now);
    next
}

/// Record an attempt and keep the reviewer's feedback in the chat history.
pub fn record_attempt_with_feedback(
    exercise: &Exercise,
    grade: ExerciseGrade,
    feedback: &str,
    now: DateTime<Utc>,
) -> Exercise {
    let next = record_attempt(exercise, grade, now);
    if feedback.trim().is_empty() {
        return next;
    }
    with_message(&next, ChatRole::Assistant, feedback)
}

/// Append a chat message to an exercise's history.
pub fn with_message(exercise: &Exercise, role: ChatRole, content: &str) -> Exercise {
    let mut next = exercise.clone();
    next.chat_history.push(ChatMessage::new(role, content));
    next
}

fn sorted_by_order(exercises: &[Exercise]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..exercises.len()).collect();
    indices.sort_by_key(|&i| exercises[i].order);
    indices
}

/// Index of the exercise to present next.
///
/// 1. First exercise (by order) below Partial
/// 2. First exercise at Partial
/// 3. Everything solved: the one with the fewest attempts
pub(crate) fn next_exercise_index(exercises: &[Exercise]) -> Option<usize> {
    let ordered = sorted_by_order(exercises);

    ordered
        .iter()
        .copied()
        .find(|&i| exercises[i].grade < ExerciseGrade::Partial)
        .or_else(|| {
            ordered
                .iter()
                .copied()
                .find(|&i| exercises[i].grade == ExerciseGrade::Partial)
        })
        .or_else(|| fewest_attempts(exercises, ordered.into_iter()))
}

/// First exercise among `candidates` with the fewest attempts.
pub(crate) fn fewest_attempts(
    exercises: &[Exercise],
    candidates: impl Iterator<Item = usize>,
) -> Option<usize> {
    let mut best: Option<usize> = None;
    for i in candidates {
        match best {
            Some(b) if exercises[b].attempts <= exercises[i].attempts => {}
            _ => best = Some(i),
        }
    }
    best
}

/// The exercise to present next, if any.
pub fn next_exercise(exercises: &[Exercise]) -> Option<&Exercise> {
    next_exercise_index(exercises).map(|i| &exercises[i])
}

/// All incomplete exercises, in order.
pub fn incomplete_exercises(exercises: &[Exercise]) -> Vec<&Exercise> {
    sorted_by_order(exercises)
        .into_iter()
        .map(|i| &exercises[i])
        .filter(|e| !e.is_complete())
        .collect()
}

/// Exercises for a study session.
///
/// Incomplete ones first; once everything is complete, the lowest graded
/// (most attempted first within a grade) for review.
pub fn exercises_for_session(exercises: &[Exercise], limit: usize) -> Vec<&Exercise> {
    let incomplete = incomplete_exercises(exercises);
    if !incomplete.is_empty() {
        return incomplete.into_iter().take(limit).collect();
    }

    let mut review: Vec<&Exercise> = exercises.iter().collect();
    review.sort_by(|a, b| a.grade.cmp(&b.grade).then(b.attempts.cmp(&a.attempts)));
    review.truncate(limit);
    review
}

/// Overall exercise score (0-1), rounded to two decimals.
///
/// Correct counts 1.0, Partial 0.66, Incorrect 0.33, not attempted 0.
pub fn exercise_score(exercises: &[Exercise]) -> f64 {
    if exercises.is_empty() {
        return 0.0;
    }
    let total: f64 = exercises
        .iter()
        .map(|e| f64::from(e.grade.value()) / 3.0)
        .sum();
    (total / exercises.len() as f64 * 100.0).round() / 100.0
}
