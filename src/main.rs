//! srl - spaced repetition recall over flashcards and exercises in notes
//!
//! Plans review sessions, records ratings and grades, and writes the updated
//! state straight back into the note files.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use srl_recall::config::Config;
use srl_recall::fsrs::{format_interval, preview};
use srl_recall::models::{DifficultyLabel, Exercise, ExerciseGrade, Flashcard, LearningItem, Rating};
use srl_recall::progression::{record_attempt, record_attempt_with_feedback};
use srl_recall::recall::{ItemFilter, RecallOrchestrator, SelectionMode, SessionSummary};
use srl_recall::storage::{load_notes, pooled_items, Note};

// ══════════════════════════════════════════════════════════════════════════
// CLI Arguments
// ══════════════════════════════════════════════════════════════════════════

#[derive(Parser, Debug)]
#[command(name = "srl")]
#[command(author, version, about = "Spaced repetition recall for notes", long_about = None)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the ordered session plan
    Plan {
        /// Note files to draw items from
        #[arg(required = true)]
        notes: Vec<PathBuf>,
        /// Topic used to bias flashcards against exercises
        #[arg(long, default_value = "")]
        topic: String,
        /// Maximum number of items (default from config)
        #[arg(long)]
        limit: Option<usize>,
        /// Only flashcards
        #[arg(long, conflicts_with = "exercises_only")]
        flashcards_only: bool,
        /// Only exercises
        #[arg(long)]
        exercises_only: bool,
        /// Review ahead of schedule when nothing is due
        #[arg(long)]
        early: bool,
    },

    /// Rate a flashcard review
    Rate {
        note: PathBuf,
        id: String,
        /// again, hard, good, easy (or 1-4)
        rating: Rating,
    },

    /// Record an exercise attempt
    Grade {
        note: PathBuf,
        id: String,
        /// 0 not attempted, 1 incorrect, 2 partial, 3 correct
        grade: ExerciseGrade,
        /// Feedback kept in the exercise's history
        #[arg(long)]
        feedback: Option<String>,
    },

    /// Show the interval each rating would give
    Preview { note: PathBuf, id: String },

    /// Print progress statistics
    Stats {
        #[arg(required = true)]
        notes: Vec<PathBuf>,
    },

    /// Append a new flashcard to a note
    AddCard {
        note: PathBuf,
        #[arg(long)]
        question: String,
        #[arg(long)]
        answer: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Append a new exercise to a note
    AddExercise {
        note: PathBuf,
        #[arg(long)]
        prompt: String,
        #[arg(long = "hint")]
        hints: Vec<String>,
        /// Position in the progression (default: after the last exercise)
        #[arg(long)]
        order: Option<u32>,
        /// easy, medium or hard
        #[arg(long, default_value = "medium")]
        difficulty: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Print the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        init: bool,
    },
}

// ══════════════════════════════════════════════════════════════════════════
// Main Entry Point
// ══════════════════════════════════════════════════════════════════════════

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load config")?;

    let now = Utc::now();
    match cli.command {
        Command::Plan {
            notes,
            topic,
            limit,
            flashcards_only,
            exercises_only,
            early,
        } => {
            let filter = if flashcards_only {
                ItemFilter::FlashcardsOnly
            } else if exercises_only {
                ItemFilter::ExercisesOnly
            } else {
                config.filter
            };
            let limit = limit.unwrap_or(config.session_limit);
            let early = early || config.early_review;
            plan(&notes, &topic, filter, limit, early, cli.format, now)
        }
        Command::Rate { note, id, rating } => rate(&note, &id, rating, cli.format, now),
        Command::Grade {
            note,
            id,
            grade,
            feedback,
        } => grade_exercise(&note, &id, grade, feedback.as_deref(), cli.format, now),
        Command::Preview { note, id } => show_preview(&note, &id, cli.format, now),
        Command::Stats { notes } => stats(&notes, cli.format, now),
        Command::AddCard {
            note,
            question,
            answer,
            tags,
        } => add_card(&note, question, answer, tags, &config, cli.format),
        Command::AddExercise {
            note,
            prompt,
            hints,
            order,
            difficulty,
            tags,
        } => {
            let draft = ExerciseDraft {
                prompt,
                hints,
                order,
                difficulty: DifficultyLabel::parse(&difficulty),
                tags,
            };
            add_exercise(&note, draft, &config, cli.format)
        }
        Command::Config { init } => {
            let path = cli.config.unwrap_or_else(Config::default_path);
            show_config(&config, &path, init, cli.format)
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Commands
// ══════════════════════════════════════════════════════════════════════════

fn plan(
    paths: &[PathBuf],
    topic: &str,
    filter: ItemFilter,
    limit: usize,
    early: bool,
    format: OutputFormat,
    now: DateTime<Utc>,
) -> Result<()> {
    let notes = load_notes(paths)?;
    let (flashcards, exercises) = pooled_items(&notes);
    let orchestrator = RecallOrchestrator::new(topic, filter);

    let mode = if early && !orchestrator.has_due_items(&flashcards, &exercises, now) {
        SelectionMode::Early
    } else {
        SelectionMode::Due
    };
    let items = orchestrator.session_items(&flashcards, &exercises, mode, limit, now);

    if format == OutputFormat::Json {
        return print_json(&items);
    }

    if items.is_empty() {
        println!("Nothing to review right now.");
        return Ok(());
    }
    if mode == SelectionMode::Early {
        println!("Nothing is due; reviewing ahead of schedule.");
    }
    for (i, item) in items.iter().enumerate() {
        println!("{:>3}. {}", i + 1, describe(item, now));
    }
    Ok(())
}

fn rate(path: &Path, id: &str, rating: Rating, format: OutputFormat, now: DateTime<Utc>) -> Result<()> {
    let mut note = Note::load(path)?;
    let card = note
        .find_flashcard(id)
        .with_context(|| format!("No flashcard '{}' in {:?}", id, path))?;

    let rated = srl_recall::apply_flashcard_rating(card, rating, now);
    note.apply_item(&LearningItem::Flashcard(rated.clone()))?;
    note.save()?;

    if format == OutputFormat::Json {
        return print_json(&rated);
    }
    println!(
        "✓ {} → {} (next review {})",
        rating.name(),
        rated.state,
        due_label(&rated, now)
    );
    Ok(())
}

fn grade_exercise(
    path: &Path,
    id: &str,
    grade: ExerciseGrade,
    feedback: Option<&str>,
    format: OutputFormat,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut note = Note::load(path)?;
    let exercise = note
        .find_exercise(id)
        .with_context(|| format!("No exercise '{}' in {:?}", id, path))?;

    let graded = match feedback {
        Some(text) => record_attempt_with_feedback(exercise, grade, text, now),
        None => record_attempt(exercise, grade, now),
    };
    note.apply_item(&LearningItem::Exercise(graded.clone()))?;
    note.save()?;

    if format == OutputFormat::Json {
        return print_json(&graded);
    }
    let status = if graded.is_complete() { "complete" } else { "keep practising" };
    println!(
        "✓ {} after {} attempt(s), {}",
        graded.grade.name(),
        graded.attempts,
        status
    );
    Ok(())
}

#[derive(Serialize)]
struct PreviewRow {
    rating: Rating,
    interval: String,
    card: Flashcard,
}

fn show_preview(path: &Path, id: &str, format: OutputFormat, now: DateTime<Utc>) -> Result<()> {
    let note = Note::load(path)?;
    let card = note
        .find_flashcard(id)
        .with_context(|| format!("No flashcard '{}' in {:?}", id, path))?;

    let rows: Vec<PreviewRow> = preview(card, now)
        .into_iter()
        .map(|(rating, next)| PreviewRow {
            rating,
            interval: due_label(&next, now),
            card: next,
        })
        .collect();

    if format == OutputFormat::Json {
        return print_json(&rows);
    }
    println!("{}", card.question);
    for row in &rows {
        println!("  {:<6} {}", row.rating.name(), row.interval);
    }
    Ok(())
}

fn stats(paths: &[PathBuf], format: OutputFormat, now: DateTime<Utc>) -> Result<()> {
    let notes = load_notes(paths)?;
    let (flashcards, exercises) = pooled_items(&notes);
    let summary = SessionSummary::compute(&flashcards, &exercises, now);

    if format == OutputFormat::Json {
        return print_json(&summary);
    }
    println!(
        "Flashcards: {} ({} due, {} new)",
        summary.flashcards, summary.due_flashcards, summary.new_flashcards
    );
    println!(
        "Exercises:  {} ({} incomplete)",
        summary.exercises, summary.incomplete_exercises
    );
    println!("Memory:     {:.0}%", summary.memory_score * 100.0);
    println!("Progress:   {:.0}%", summary.exercise_score * 100.0);
    Ok(())
}

fn add_card(
    path: &Path,
    question: String,
    answer: String,
    tags: Vec<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    if question.trim().is_empty() || answer.trim().is_empty() {
        bail!("Question and answer must not be empty");
    }

    let mut note = if path.exists() {
        Note::load(path)?
    } else {
        Note::from_text(path.to_path_buf(), String::new())
    };
    let card = Flashcard::new(question.trim(), answer.trim()).with_tags(tags);
    note.append_flashcard(&card, &config.flashcard_section);
    note.save()?;

    if format == OutputFormat::Json {
        return print_json(&card);
    }
    println!("✓ Added flashcard '{}' to {:?}", card.id, path);
    Ok(())
}

struct ExerciseDraft {
    prompt: String,
    hints: Vec<String>,
    order: Option<u32>,
    difficulty: DifficultyLabel,
    tags: Vec<String>,
}

fn add_exercise(path: &Path, draft: ExerciseDraft, config: &Config, format: OutputFormat) -> Result<()> {
    if draft.prompt.trim().is_empty() {
        bail!("Prompt must not be empty");
    }

    let mut note = if path.exists() {
        Note::load(path)?
    } else {
        Note::from_text(path.to_path_buf(), String::new())
    };
    let order = draft.order.unwrap_or_else(|| note.next_exercise_order());
    let mut exercise = Exercise::new(draft.prompt, order).with_tags(draft.tags);
    exercise.hints = draft
        .hints
        .iter()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect();
    exercise.difficulty = draft.difficulty;

    note.append_exercise(&exercise, &config.exercise_section);
    note.save()?;

    if format == OutputFormat::Json {
        return print_json(&exercise);
    }
    println!("✓ Added exercise '{}' (order {}) to {:?}", exercise.id, order, path);
    Ok(())
}

fn show_config(config: &Config, path: &Path, init: bool, format: OutputFormat) -> Result<()> {
    if init {
        config
            .save_to(path)
            .with_context(|| format!("Failed to write config to {:?}", path))?;
    }

    if format == OutputFormat::Json {
        return print_json(config);
    }
    if init {
        println!("✓ Wrote {:?}", path);
    }
    print!("{}", toml::to_string_pretty(config).context("Failed to serialize config")?);
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════
// Output
// ══════════════════════════════════════════════════════════════════════════

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn due_label(card: &Flashcard, now: DateTime<Utc>) -> String {
    match card.time_until_due(now) {
        Some(wait) if wait.num_minutes() >= 1 => format!("in {}", format_interval(wait)),
        _ => "now".to_string(),
    }
}

fn describe(item: &LearningItem, now: DateTime<Utc>) -> String {
    match item {
        LearningItem::Flashcard(card) => format!(
            "[flashcard {}] {} ({}, retention {:.0}%)",
            card.id,
            card.question,
            card.state,
            card.retrievability(now) * 100.0
        ),
        LearningItem::Exercise(exercise) => format!(
            "[exercise {}] {} ({}, {} attempt(s))",
            exercise.id,
            first_line(&exercise.prompt),
            exercise.grade.name(),
            exercise.attempts
        ),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}
