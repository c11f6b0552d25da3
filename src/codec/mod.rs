//! Reading and writing learning items embedded in note text.
//!
//! Supported annotations:
//! - One-line flashcard: `Question : Answer #flashcard {...}`
//! - Micro flashcard: `Question : Answer ⚡️ {...}`
//! - Block flashcard: `#flashcard {...} #tags`, question, `---`, answer, `---`
//! - Exercise: `#exercise {...} #tags`, prompt with `Hint:` lines and an
//!   optional feedback history, `---`
//!
//! Updating an item replaces only the bytes of that item's annotation.

mod parse;
mod record;

use std::collections::BTreeSet;
use std::ops::Range;

use crate::error::{CodecError, CodecResult};
use crate::models::{normalize_tag, ChatRole, Exercise, Flashcard, LearningItem};

use parse::{contains_marker, FEEDBACK_HEADING, HINT_PREFIX};
use record::{ExerciseRecord, FlashcardRecord};

/// Surface syntax of a flashcard annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlashcardForm {
    OneLine,
    Block,
    Micro,
}

/// Surface syntax of any annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemForm {
    Flashcard(FlashcardForm),
    Exercise,
}

/// A parsed item with the byte range of its annotation in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedItem {
    pub item: LearningItem,
    pub span: Range<usize>,
    pub form: ItemForm,
}

/// Parse every annotation in `text`, in document order, keeping spans.
pub fn parse_document(text: &str) -> Vec<ParsedItem> {
    parse::parse_document(text)
}

/// Parse all flashcards and exercises from `text`.
pub fn parse_items(text: &str) -> (Vec<Flashcard>, Vec<Exercise>) {
    let mut flashcards = Vec::new();
    let mut exercises = Vec::new();
    for parsed in parse_document(text) {
        match parsed.item {
            LearningItem::Flashcard(card) => flashcards.push(card),
            LearningItem::Exercise(exercise) => exercises.push(exercise),
        }
    }
    (flashcards, exercises)
}

// ══════════════════════════════════════════════════════════════════════════
// Serialization
// ══════════════════════════════════════════════════════════════════════════

fn tag_suffix(tags: &BTreeSet<String>) -> String {
    tags.iter()
        .filter_map(|tag| normalize_tag(tag))
        .map(|tag| format!(" #{}", tag))
        .collect()
}

/// Whether the card reads back unchanged from a single line.
fn fits_one_line(card: &Flashcard) -> bool {
    let single_line = |s: &str| !s.contains('\n') && !s.contains('\r');
    single_line(&card.question)
        && single_line(&card.answer)
        && !card.question.trim().is_empty()
        && !card.answer.trim().is_empty()
        && !card.question.contains(':')
        && !contains_marker(&card.question)
        && !contains_marker(&card.answer)
}

/// Serialize a flashcard, using the block form only when the one-line form cannot hold it.
pub fn serialize_flashcard(card: &Flashcard) -> String {
    serialize_flashcard_as(card, FlashcardForm::OneLine)
}

/// Serialize a flashcard in the preferred form, falling back to a block when needed.
pub fn serialize_flashcard_as(card: &Flashcard, form: FlashcardForm) -> String {
    let record = FlashcardRecord::from_card(card).to_json();
    let tags = tag_suffix(&card.tags);

    let form = if fits_one_line(card) { form } else { FlashcardForm::Block };
    match form {
        FlashcardForm::OneLine => format!(
            "{} : {} #flashcard {}{}",
            card.question.trim(),
            card.answer.trim(),
            record,
            tags
        ),
        FlashcardForm::Micro => format!(
            "{} : {} \u{26A1}\u{FE0F} {}{}",
            card.question.trim(),
            card.answer.trim(),
            record,
            tags
        ),
        FlashcardForm::Block => format!(
            "#flashcard {}{}\n{}\n\n---\n{}\n\n---",
            record,
            tags,
            card.question.trim(),
            card.answer.trim()
        ),
    }
}

/// Serialize an exercise as an `#exercise` block.
pub fn serialize_exercise(exercise: &Exercise) -> String {
    let record = ExerciseRecord::from_exercise(exercise).to_json();
    let mut out = format!(
        "#exercise {}{}\n{}",
        record,
        tag_suffix(&exercise.tags),
        exercise.prompt.trim()
    );

    for hint in &exercise.hints {
        out.push('\n');
        out.push_str(HINT_PREFIX);
        out.push(' ');
        out.push_str(hint.trim());
    }

    if !exercise.chat_history.is_empty() {
        out.push_str("\n\n");
        out.push_str(FEEDBACK_HEADING);
        for message in &exercise.chat_history {
            let role = match message.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            out.push_str(&format!("\n**{}**: {}", role, message.content.trim()));
        }
    }

    out.push_str("\n\n---");
    out
}

fn serialize_in_form(item: &LearningItem, form: ItemForm) -> String {
    match (item, form) {
        (LearningItem::Flashcard(card), ItemForm::Flashcard(form)) => {
            serialize_flashcard_as(card, form)
        }
        (LearningItem::Flashcard(card), ItemForm::Exercise) => serialize_flashcard(card),
        (LearningItem::Exercise(exercise), _) => serialize_exercise(exercise),
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Updating documents
// ══════════════════════════════════════════════════════════════════════════

fn locate<'a>(parsed: &'a [ParsedItem], item: &LearningItem) -> Option<&'a ParsedItem> {
    let same_kind = |p: &&ParsedItem| p.item.kind() == item.kind();

    if let Some(found) = parsed.iter().filter(same_kind).find(|p| p.item.id() == item.id()) {
        return Some(found);
    }

    // Flashcards may also be matched by question, for annotations written without an id.
    let LearningItem::Flashcard(card) = item else {
        return None;
    };
    let question = card.question.trim();
    parsed.iter().find(|p| match &p.item {
        LearningItem::Flashcard(existing) => existing.question.trim() == question,
        LearningItem::Exercise(_) => false,
    })
}

/// Replace the annotation of `item` in `text` with its current serialized form.
///
/// Everything outside the item's span is left byte-for-byte untouched. Fails
/// with [`CodecError::ItemNotFound`] when the item is no longer in the text.
pub fn update_item_in_document(text: &str, item: &LearningItem) -> CodecResult<String> {
    let parsed = parse_document(text);
    let target = locate(&parsed, item).ok_or_else(|| CodecError::ItemNotFound {
        kind: item.kind(),
        id: item.id().to_string(),
    })?;

    let replacement = serialize_in_form(item, target.form);
    let span = target.span.clone();
    log::debug!(
        "Updating {} '{}' at bytes {}..{}",
        item.kind(),
        item.id(),
        span.start,
        span.end
    );

    let mut out = String::with_capacity(text.len() - span.len() + replacement.len());
    out.push_str(&text[..span.start]);
    out.push_str(&replacement);
    out.push_str(&text[span.end..]);
    Ok(out)
}

/// Update a flashcard in `text`.
pub fn update_flashcard(text: &str, card: &Flashcard) -> CodecResult<String> {
    update_item_in_document(text, &LearningItem::Flashcard(card.clone()))
}

/// Update an exercise in `text`.
pub fn update_exercise(text: &str, exercise: &Exercise) -> CodecResult<String> {
    update_item_in_document(text, &LearningItem::Exercise(exercise.clone()))
}

/// Byte offset just past a `## <section>` heading line, if present.
fn find_section(text: &str, section: &str) -> Option<usize> {
    let heading = format!("## {}", section);
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        if content.trim_end() == heading {
            return Some(offset + content.len());
        }
        offset += line.len();
    }
    None
}

/// Insert serialized items at the end of a `## <section>` section,
/// creating the section at the end of the document when it is missing.
fn insert_into_section(text: &str, section: &str, body: &str) -> String {
    if body.is_empty() {
        return text.to_string();
    }

    match find_section(text, section) {
        Some(after_heading) => {
            let section_end = text[after_heading..]
                .find("\n## ")
                .map_or(text.len(), |i| after_heading + i);
            let content_end = after_heading + text[after_heading..section_end].trim_end().len();
            format!("{}\n\n{}{}", &text[..content_end], body, &text[content_end..])
        }
        None => {
            let base = text.trim_end();
            if base.is_empty() {
                format!("## {}\n\n{}\n", section, body)
            } else {
                format!("{}\n\n## {}\n\n{}\n", base, section, body)
            }
        }
    }
}

/// Append flashcards to the given section of `text`.
pub fn append_flashcards(text: &str, cards: &[Flashcard], section: &str) -> String {
    let body: Vec<String> = cards.iter().map(serialize_flashcard).collect();
    insert_into_section(text, section, &body.join("\n\n"))
}

/// Append exercises to the given section of `text`.
pub fn append_exercises(text: &str, exercises: &[Exercise], section: &str) -> String {
    let body: Vec<String> = exercises.iter().map(serialize_exercise).collect();
    insert_into_section(text, section, &body.join("\n\n"))
}
