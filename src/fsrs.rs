//! FSRS (Free Spaced Repetition Scheduler) v4.5
//!
//! Each card carries a stability (S, days until recall probability decays to
//! the target retention) and a difficulty (D, 1-10). A review updates both and
//! the next interval is derived from the new stability.
//!
//! Ratings:
//! - Again (1): forgot
//! - Hard (2): recalled with serious difficulty
//! - Good (3): recalled after hesitation
//! - Easy (4): perfect recall
//!
//! Every function here is pure: "now" is an argument and the input card is
//! never modified.

use chrono::{DateTime, Duration, Utc};

use crate::models::{CardState, Flashcard, Rating};

/// Model weights.
pub const W: [f64; 17] = [
    0.40255, 1.18385, 3.173, 15.69105, // initial stability per rating
    7.19605, // initial difficulty
    0.5345,  // difficulty mean reversion
    1.4604,  // difficulty update rate
    0.0046,  // unused
    1.54575, // stability increase base
    0.1192,  // stability increase power
    1.01925, // retrievability factor
    1.9395,  // failure penalty base
    0.11,    // failure difficulty factor
    0.29605, // failure stability factor
    2.2698,  // failure retrievability factor
    0.2315,  // easy bonus
    2.9482,  // unused
];

/// Probability of recall the intervals aim for.
pub const TARGET_RETENTION: f64 = 0.9;

pub const MAX_INTERVAL_DAYS: u32 = 36500;

/// Floor applied to every stability produced by a review.
pub const MIN_STABILITY: f64 = 0.1;

/// Short-term steps (minutes) before a new card graduates.
pub const LEARNING_STEPS_MINUTES: [i64; 2] = [1, 10];

/// Short-term steps (minutes) after a lapse.
pub const RELEARNING_STEPS_MINUTES: [i64; 1] = [10];

fn step_duration(steps: &[i64], step: u32) -> Duration {
    let idx = (step as usize).min(steps.len() - 1);
    Duration::minutes(steps[idx])
}

fn clamp_difficulty(d: f64) -> f64 {
    d.clamp(1.0, 10.0)
}

/// Interval in whole days that keeps recall at the target retention.
pub fn next_interval(stability: f64) -> u32 {
    let raw = stability * 9.0 * (1.0 / TARGET_RETENTION - 1.0);
    if !raw.is_finite() || raw < 1.0 {
        return 1;
    }
    raw.round().min(MAX_INTERVAL_DAYS as f64) as u32
}

/// Current probability of recall: `(1 + elapsed / (9 * S))^-1`.
///
/// Zero for cards that were never reviewed or have no stability.
pub fn retrievability(card: &Flashcard, now: DateTime<Utc>) -> f64 {
    if card.state == CardState::New || card.stability <= 0.0 {
        return 0.0;
    }
    let Some(last) = card.last_reviewed_at else {
        return 0.0;
    };
    let elapsed = elapsed_days(last, now);
    1.0 / (1.0 + elapsed / (9.0 * card.stability))
}

fn elapsed_days(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let seconds = (to - from).num_milliseconds() as f64 / 1000.0;
    (seconds / 86_400.0).max(0.0)
}

/// Initial stability and difficulty for a first (or reset) rating.
fn initial_stability_difficulty(rating: Rating) -> (f64, f64) {
    let r = rating.value();
    let stability = W[(r - 1) as usize];
    let difficulty = clamp_difficulty(W[4] - f64::from(r - 3) * W[5]);
    (stability, difficulty)
}

fn schedule_days(card: &mut Flashcard, interval: u32, now: DateTime<Utc>) {
    let interval = interval.min(MAX_INTERVAL_DAYS);
    card.scheduled_days = interval;
    card.due_at = Some(now + Duration::days(i64::from(interval)));
}

fn graduate(card: &mut Flashcard, rating: Rating, now: DateTime<Utc>) {
    let (s, d) = initial_stability_difficulty(rating);
    card.stability = s;
    card.difficulty = d;
    card.state = CardState::Review;
    card.step = 0;
    schedule_days(card, next_interval(s), now);
}

/// Apply a rating to a card and return the updated card.
pub fn apply_rating(card: &Flashcard, rating: Rating, now: DateTime<Utc>) -> Flashcard {
    let mut next = card.clone();
    next.last_reviewed_at = Some(now);

    match card.state {
        CardState::New => {
            if rating == Rating::Easy {
                graduate(&mut next, rating, now);
            } else {
                let (s, d) = initial_stability_difficulty(rating);
                next.stability = s;
                next.difficulty = d;
                next.state = CardState::Learning;
                next.step = 0;
                next.due_at = Some(now + step_duration(&LEARNING_STEPS_MINUTES, 0));
            }
        }

        CardState::Learning => match rating {
            Rating::Again => {
                let (s, d) = initial_stability_difficulty(rating);
                next.stability = s;
                next.difficulty = d;
                next.step = 0;
                next.due_at = Some(now + step_duration(&LEARNING_STEPS_MINUTES, 0));
            }
            Rating::Hard => {
                next.due_at = Some(now + step_duration(&LEARNING_STEPS_MINUTES, card.step));
            }
            Rating::Good => {
                let step = card.step.saturating_add(1);
                if step as usize >= LEARNING_STEPS_MINUTES.len() {
                    graduate(&mut next, rating, now);
                } else {
                    next.step = step;
                    next.due_at = Some(now + step_duration(&LEARNING_STEPS_MINUTES, step));
                }
            }
            Rating::Easy => graduate(&mut next, rating, now),
        },

        CardState::Relearning => match rating {
            Rating::Again => {
                next.step = 0;
                next.due_at = Some(now + step_duration(&RELEARNING_STEPS_MINUTES, 0));
            }
            Rating::Hard => {
                next.due_at = Some(now + step_duration(&RELEARNING_STEPS_MINUTES, card.step));
            }
            Rating::Good | Rating::Easy => {
                let mut interval = next_interval(card.stability);
                if rating == Rating::Easy {
                    interval = interval.max(card.scheduled_days.saturating_add(1));
                }
                next.state = CardState::Review;
                next.step = 0;
                schedule_days(&mut next, interval, now);
            }
        },

        CardState::Review => review(card, &mut next, rating, now),
    }

    next
}

fn review(card: &Flashcard, next: &mut Flashcard, rating: Rating, now: DateTime<Utc>) {
    let r = retrievability(card, now);
    let s = card.stability;

    if rating == Rating::Again {
        let d = (card.difficulty + W[6]).min(10.0);
        let lapse_s =
            W[11] * d.powf(-W[12]) * (s + 1.0).powf(W[13]) * (W[14] * (1.0 - r)).exp();

        next.state = CardState::Relearning;
        next.step = 0;
        next.difficulty = d;
        next.stability = lapse_s.max(MIN_STABILITY);
        next.scheduled_days = 0;
        next.due_at = Some(now + step_duration(&RELEARNING_STEPS_MINUTES, 0));
        return;
    }

    let reverted = card.difficulty - W[6] * f64::from(rating.value() - 3);
    let d = clamp_difficulty(W[5] * W[4] + (1.0 - W[5]) * reverted);

    let increase =
        W[8].exp() * (11.0 - d) * s.powf(-W[9]) * ((W[10] * (1.0 - r)).exp() - 1.0);
    let grown = match rating {
        Rating::Hard => s * (1.0 + increase * 0.5),
        Rating::Easy => s * (1.0 + increase * W[15]),
        _ => s * (1.0 + increase),
    };
    // A zero or corrupt stability makes the power term blow up.
    let new_s = if grown.is_finite() { grown.max(MIN_STABILITY) } else { MIN_STABILITY };

    let interval = match rating {
        Rating::Hard => next_interval(new_s).max(card.scheduled_days),
        _ => next_interval(new_s).max(card.scheduled_days.saturating_add(1)),
    };

    next.stability = new_s;
    next.difficulty = d;
    schedule_days(next, interval, now);
}

/// The card that each rating would produce, in Again/Hard/Good/Easy order.
pub fn preview(card: &Flashcard, now: DateTime<Utc>) -> [(Rating, Flashcard); 4] {
    Rating::ALL.map(|rating| (rating, apply_rating(card, rating, now)))
}

/// Format a wait time compactly: "now", "10m", "3h", "5d", "2w", "3mo", "1y".
pub fn format_interval(wait: Duration) -> String {
    let minutes = wait.num_minutes();
    if minutes < 1 {
        return "now".to_string();
    }
    if minutes < 60 {
        return format!("{}m", minutes);
    }
    let hours = wait.num_hours();
    if hours < 24 {
        return format!("{}h", hours);
    }
    let days = wait.num_days();
    if days < 7 {
        format!("{}d", days)
    } else if days < 30 {
        format!("{}w", days / 7)
    } else if days < 365 {
        format!("{}mo", days / 30)
    } else {
        format!("{}y", days / 365)
    }
}

/// Overall memory score (0-1) for a set of cards, rounded to two decimals.
pub fn memory_score(cards: &[Flashcard], now: DateTime<Utc>) -> f64 {
    if cards.is_empty() {
        return 0.0;
    }
    let total: f64 = cards
        .iter()
        .map(|card| match card.state {
            CardState::New => 0.0,
            CardState::Review => retrievability(card, now),
            CardState::Learning => {
                0.1 + (card.step as f64 / LEARNING_STEPS_MINUTES.len() as f64) * 0.3
            }
            CardState::Relearning => 0.2,
        })
        .sum();
    (total / cards.len() as f64 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn new_card() -> Flashcard {
        Flashcard::with_id("card0001", "Capital of France", "Paris")
    }

    fn review_card(stability: f64, difficulty: f64, days: u32) -> Flashcard {
        let mut card = new_card();
        card.state = CardState::Review;
        card.stability = stability;
        card.difficulty = difficulty;
        card.scheduled_days = days;
        card.last_reviewed_at = Some(t0());
        card.due_at = Some(t0() + Duration::days(days as i64));
        card
    }

    #[test]
    fn test_new_card_easy_graduates() {
        let card = apply_rating(&new_card(), Rating::Easy, t0());

        assert_eq!(card.state, CardState::Review);
        assert_eq!(card.stability, 15.69105);
        assert!((card.difficulty - 6.66155).abs() < 1e-9);
        assert_eq!(card.scheduled_days, 16);
        assert_eq!(card.due_at, Some(t0() + Duration::days(16)));
        assert_eq!(card.last_reviewed_at, Some(t0()));
    }

    #[test]
    fn test_new_card_again_enters_learning() {
        let card = apply_rating(&new_card(), Rating::Again, t0());

        assert_eq!(card.state, CardState::Learning);
        assert_eq!(card.step, 0);
        assert_eq!(card.stability, 0.40255);
        assert!((card.difficulty - 8.26505).abs() < 1e-9);
        assert_eq!(card.due_at, Some(t0() + Duration::minutes(1)));
    }

    #[test]
    fn test_input_card_is_untouched() {
        let card = new_card();
        let _ = apply_rating(&card, Rating::Good, t0());
        assert_eq!(card, new_card());
    }

    #[test]
    fn test_learning_steps_then_graduation() {
        let card = apply_rating(&new_card(), Rating::Good, t0());
        assert_eq!(card.state, CardState::Learning);
        assert_eq!(card.due_at, Some(t0() + Duration::minutes(1)));

        let later = t0() + Duration::minutes(1);
        let card = apply_rating(&card, Rating::Good, later);
        assert_eq!(card.state, CardState::Learning);
        assert_eq!(card.step, 1);
        assert_eq!(card.due_at, Some(later + Duration::minutes(10)));

        let later = later + Duration::minutes(10);
        let card = apply_rating(&card, Rating::Good, later);
        assert_eq!(card.state, CardState::Review);
        assert_eq!(card.stability, W[2]);
        assert_eq!(card.scheduled_days, 3);
        assert_eq!(card.due_at, Some(later + Duration::days(3)));
    }

    #[test]
    fn test_learning_hard_repeats_step() {
        let mut card = apply_rating(&new_card(), Rating::Good, t0());
        card.step = 1;
        let next = apply_rating(&card, Rating::Hard, t0());
        assert_eq!(next.state, CardState::Learning);
        assert_eq!(next.step, 1);
        assert_eq!(next.due_at, Some(t0() + Duration::minutes(10)));
    }

    #[test]
    fn test_learning_again_resets() {
        let mut card = apply_rating(&new_card(), Rating::Good, t0());
        card.step = 1;
        let next = apply_rating(&card, Rating::Again, t0());
        assert_eq!(next.step, 0);
        assert_eq!(next.stability, W[0]);
        assert_eq!(next.due_at, Some(t0() + Duration::minutes(1)));
    }

    #[test]
    fn test_review_again_lapses_to_relearning() {
        let card = review_card(10.0, 5.0, 10);
        let now = t0() + Duration::days(10);
        let next = apply_rating(&card, Rating::Again, now);

        assert_eq!(next.state, CardState::Relearning);
        assert_eq!(next.step, 0);
        assert_eq!(next.scheduled_days, 0);
        assert!((next.difficulty - (5.0 + W[6])).abs() < 1e-12);
        assert!(next.stability < card.stability);
        assert!(next.stability >= MIN_STABILITY);
        assert_eq!(next.due_at, Some(now + Duration::minutes(10)));
    }

    #[test]
    fn test_review_success_grows_stability_in_rating_order() {
        let card = review_card(10.0, 5.0, 10);
        let now = t0() + Duration::days(10);
        let hard = apply_rating(&card, Rating::Hard, now);
        let good = apply_rating(&card, Rating::Good, now);

        assert_eq!(good.state, CardState::Review);
        assert!(hard.stability > card.stability);
        assert!(good.stability > hard.stability);
        assert!(good.scheduled_days >= card.scheduled_days.saturating_add(1));
        assert!(hard.scheduled_days >= card.scheduled_days);
        assert_eq!(good.due_at, Some(now + Duration::days(good.scheduled_days as i64)));
    }

    #[test]
    fn test_relearning_easy_forces_longer_interval() {
        let mut card = review_card(0.5, 7.0, 30);
        card.state = CardState::Relearning;
        let next = apply_rating(&card, Rating::Easy, t0());
        assert_eq!(next.state, CardState::Review);
        assert_eq!(next.scheduled_days, 31);

        let good = apply_rating(&card, Rating::Good, t0());
        assert_eq!(good.scheduled_days, 1);
    }

    #[test]
    fn test_next_interval_bounds() {
        for s in [-5.0, 0.0, 0.01, 1.0, 15.69105, 1e6, f64::INFINITY, f64::NAN] {
            let interval = next_interval(s);
            assert!((1..=MAX_INTERVAL_DAYS).contains(&interval), "s={} -> {}", s, interval);
        }
        assert_eq!(next_interval(1e9), MAX_INTERVAL_DAYS);
    }

    #[test]
    fn test_retrievability_decreases_over_time() {
        let card = review_card(5.0, 5.0, 5);
        let mut previous = retrievability(&card, t0());
        assert!((previous - 1.0).abs() < 1e-12);
        for day in 1..60 {
            let r = retrievability(&card, t0() + Duration::days(day));
            assert!(r <= previous);
            previous = r;
        }
        assert_eq!(retrievability(&new_card(), t0()), 0.0);
    }

    #[test]
    fn test_preview_covers_all_ratings() {
        let options = preview(&new_card(), t0());
        assert_eq!(options[0].0, Rating::Again);
        assert_eq!(options[3].1.state, CardState::Review);
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(Duration::seconds(20)), "now");
        assert_eq!(format_interval(Duration::minutes(10)), "10m");
        assert_eq!(format_interval(Duration::hours(3)), "3h");
        assert_eq!(format_interval(Duration::days(5)), "5d");
        assert_eq!(format_interval(Duration::days(14)), "2w");
        assert_eq!(format_interval(Duration::days(90)), "3mo");
        assert_eq!(format_interval(Duration::days(730)), "2y");
    }

    #[test]
    fn test_memory_score() {
        assert_eq!(memory_score(&[], t0()), 0.0);

        let mut learning = new_card();
        learning.state = CardState::Learning;
        learning.step = 1;
        let fresh = review_card(5.0, 5.0, 5);
        // (0 + 0.25 + 1.0) / 3
        let score = memory_score(&[new_card(), learning, fresh], t0());
        assert!((score - 0.42).abs() < 1e-9);
    }

    #[test]
    fn test_extreme_step_and_days_do_not_overflow() {
        let mut learning = new_card();
        learning.state = CardState::Learning;
        learning.stability = 1.0;
        learning.step = u32::MAX;
        learning.last_reviewed_at = Some(t0());
        learning.due_at = Some(t0());
        let graduated = apply_rating(&learning, Rating::Good, t0());
        assert_eq!(graduated.state, CardState::Review);

        let mut review = new_card();
        review.state = CardState::Review;
        review.stability = 10.0;
        review.scheduled_days = u32::MAX;
        review.last_reviewed_at = Some(t0() - Duration::days(10));
        review.due_at = Some(t0());
        for rating in [Rating::Hard, Rating::Good, Rating::Easy] {
            let next = apply_rating(&review, rating, t0());
            assert_eq!(next.scheduled_days, MAX_INTERVAL_DAYS);
        }
    }
}
