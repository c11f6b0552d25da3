//! Locating annotations in document text.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::OnceLock;

use log::debug;
use regex::{Captures, Regex};

use super::record::{load_exercise, load_flashcard, ExerciseBody};
use super::{FlashcardForm, ItemForm, ParsedItem};
use crate::models::{ChatMessage, ChatRole, LearningItem};

pub(crate) const FEEDBACK_HEADING: &str = "###### Feedback History";
pub(crate) const HINT_PREFIX: &str = "Hint:";

fn oneline_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?mR)^(?P<question>[^\n]+?)[ \t]*:[ \t]*(?P<answer>[^\n]+?)[ \t]*#flashcard(?:[ \t]*(?P<state>\{[^\n]*?\}))?(?P<tags>(?:[ \t]+#\S+)*)[ \t]*$",
        )
        .expect("one-line flashcard regex must compile")
    })
}

fn micro_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?mR)^(?P<question>[^\n]+?)[ \t]*:[ \t]*(?P<answer>[^\n]+?)[ \t]*(?:\x{26A1}\x{FE0F}?|\x{1F9E0})(?:[ \t]*(?P<state>\{[^\n]*?\}))?(?P<tags>(?:[ \t]+#\S+)*)[ \t]*$",
        )
        .expect("micro flashcard regex must compile")
    })
}

fn block_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?mR)^#flashcard(?:[ \t]*(?P<state>\{[^\n]*?\}))?(?P<tags>(?:[ \t]+#\S+)*)[ \t]*$",
        )
        .expect("flashcard header regex must compile")
    })
}

fn exercise_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?mR)^#exercise(?:[ \t]*(?P<state>\{[^\n]*?\}))?(?P<tags>(?:[ \t]+#\S+)*)[ \t]*$",
        )
        .expect("exercise header regex must compile")
    })
}

/// Whether `text` would be read back as carrying a flashcard marker.
pub(crate) fn contains_marker(text: &str) -> bool {
    text.contains("#flashcard") || text.contains('\u{26A1}') || text.contains('\u{1F9E0}')
}

/// One line of the document, as byte offsets.
#[derive(Debug, Clone, Copy)]
struct Line {
    start: usize,
    /// End of the content, before any line terminator
    end: usize,
    /// Start of the following line
    next: usize,
}

fn line_at(text: &str, start: usize) -> Line {
    match text[start..].find('\n') {
        Some(i) => {
            let newline = start + i;
            let end = if newline > start && text.as_bytes()[newline - 1] == b'\r' {
                newline - 1
            } else {
                newline
            };
            Line {
                start,
                end,
                next: newline + 1,
            }
        }
        None => Line {
            start,
            end: text.len(),
            next: text.len(),
        },
    }
}

fn is_delimiter(text: &str, line: Line) -> bool {
    text[line.start..line.end].trim() == "---"
}

fn is_header(text: &str, line: Line) -> bool {
    let content = &text[line.start..line.end];
    block_header_re().is_match(content) || exercise_header_re().is_match(content)
}

fn parse_tags(caps: &Captures<'_>) -> BTreeSet<String> {
    caps.name("tags")
        .map(|m| {
            m.as_str()
                .split_whitespace()
                .filter_map(|t| t.strip_prefix('#'))
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn claimed(spans: &[Range<usize>], pos: usize) -> bool {
    spans.iter().any(|span| span.contains(&pos))
}

/// Parse every annotation in `text`, in document order.
pub(crate) fn parse_document(text: &str) -> Vec<ParsedItem> {
    let mut items: Vec<ParsedItem> = Vec::new();

    // Multi-line annotations claim their spans first.
    let mut headers: Vec<(usize, ItemForm, Captures<'_>)> = block_header_re()
        .captures_iter(text)
        .map(|caps| (caps.get(0).map_or(0, |m| m.start()), ItemForm::Flashcard(FlashcardForm::Block), caps))
        .chain(
            exercise_header_re()
                .captures_iter(text)
                .map(|caps| (caps.get(0).map_or(0, |m| m.start()), ItemForm::Exercise, caps)),
        )
        .collect();
    headers.sort_by_key(|(start, _, _)| *start);

    for (start, form, caps) in headers {
        let spans: Vec<Range<usize>> = items.iter().map(|p| p.span.clone()).collect();
        if claimed(&spans, start) {
            continue;
        }
        let parsed = match form {
            ItemForm::Exercise => Some(scan_exercise(text, start, &caps)),
            _ => scan_block_flashcard(text, start, &caps),
        };
        if let Some(parsed) = parsed {
            items.push(parsed);
        }
    }

    // Single-line flashcards, unless they sit inside a block.
    let inline = oneline_re()
        .captures_iter(text)
        .map(|caps| (FlashcardForm::OneLine, caps))
        .chain(micro_re().captures_iter(text).map(|caps| (FlashcardForm::Micro, caps)));
    let mut single: Vec<ParsedItem> = Vec::new();
    for (form, caps) in inline {
        let Some(whole) = caps.get(0) else { continue };
        let spans: Vec<Range<usize>> = items
            .iter()
            .chain(single.iter())
            .map(|p| p.span.clone())
            .collect();
        if claimed(&spans, whole.start()) {
            continue;
        }
        let question = caps.name("question").map_or("", |m| m.as_str()).trim().to_string();
        let answer = caps.name("answer").map_or("", |m| m.as_str()).trim().to_string();
        let card = load_flashcard(
            question,
            answer,
            parse_tags(&caps),
            caps.name("state").map(|m| m.as_str()),
            whole.start(),
        );
        single.push(ParsedItem {
            item: LearningItem::Flashcard(card),
            span: whole.range(),
            form: ItemForm::Flashcard(form),
        });
    }

    items.extend(single);
    items.sort_by_key(|p| p.span.start);

    debug!(
        "Parsed {} learning items ({} exercises)",
        items.len(),
        items.iter().filter(|p| p.form == ItemForm::Exercise).count()
    );
    items
}

/// Header, question, `---`, answer, `---`. Incomplete blocks are skipped.
fn scan_block_flashcard(text: &str, start: usize, caps: &Captures<'_>) -> Option<ParsedItem> {
    let header = line_at(text, start);

    let question_start = header.next;
    let first = next_delimiter(text, question_start)?;
    let answer_start = first.next;
    let second = next_delimiter(text, answer_start)?;

    let question = text[question_start..first.start].trim().to_string();
    let answer = text[answer_start..second.start].trim().to_string();
    let card = load_flashcard(
        question,
        answer,
        parse_tags(caps),
        caps.name("state").map(|m| m.as_str()),
        start,
    );
    Some(ParsedItem {
        item: LearningItem::Flashcard(card),
        span: start..second.end,
        form: ItemForm::Flashcard(FlashcardForm::Block),
    })
}

/// The next `---` line at or after `pos`, unless another annotation starts first.
fn next_delimiter(text: &str, mut pos: usize) -> Option<Line> {
    while pos < text.len() {
        let line = line_at(text, pos);
        if is_delimiter(text, line) {
            return Some(line);
        }
        if is_header(text, line) {
            debug!("Flashcard block at byte {} is missing its closing ---", pos);
            return None;
        }
        pos = line.next;
    }
    None
}

fn is_inline_flashcard(text: &str, line: Line) -> bool {
    let content = &text[line.start..line.end];
    oneline_re().is_match(content) || micro_re().is_match(content)
}

fn is_blank(text: &str, line: Line) -> bool {
    text[line.start..line.end].trim().is_empty()
}

/// Exercise body runs to a `---` line, the next annotation header, or the end of text.
///
/// Without a closing `---`, the body also stops before the first one-line or
/// micro flashcard, and trailing blank lines are left outside the span.
fn scan_exercise(text: &str, start: usize, caps: &Captures<'_>) -> ParsedItem {
    let header = line_at(text, start);
    let body_start = header.next;

    let mut lines: Vec<Line> = Vec::new();
    let mut closing: Option<Line> = None;
    let mut pos = body_start;
    while pos < text.len() {
        let line = line_at(text, pos);
        if is_delimiter(text, line) {
            closing = Some(line);
            break;
        }
        if is_header(text, line) {
            break;
        }
        lines.push(line);
        pos = line.next;
    }

    let (body_end, span_end) = match closing {
        Some(delimiter) => (delimiter.start.max(body_start), delimiter.end),
        None => {
            if let Some(cut) = lines.iter().position(|&l| is_inline_flashcard(text, l)) {
                debug!("Exercise at byte {} has no closing ---; ending it before a flashcard", start);
                lines.truncate(cut);
            }
            while lines.last().is_some_and(|&l| is_blank(text, l)) {
                lines.pop();
            }
            match lines.last() {
                Some(last) => (last.end, last.end),
                None => (body_start, header.end),
            }
        }
    };

    let body = if body_end > body_start {
        &text[body_start..body_end]
    } else {
        ""
    };
    let exercise = load_exercise(
        parse_exercise_body(body, parse_tags(caps)),
        caps.name("state").map(|m| m.as_str()),
        start,
    );
    ParsedItem {
        item: LearningItem::Exercise(exercise),
        span: start..span_end,
        form: ItemForm::Exercise,
    }
}

fn role_marker(line: &str) -> Option<(ChatRole, &str)> {
    if let Some(rest) = line.strip_prefix("**User**:") {
        return Some((ChatRole::User, rest));
    }
    if let Some(rest) = line.strip_prefix("**Assistant**:") {
        return Some((ChatRole::Assistant, rest));
    }
    line.strip_prefix("**Agent**:")
        .map(|rest| (ChatRole::Assistant, rest))
}

/// Split an exercise body into prompt, hints and feedback history.
fn parse_exercise_body(body: &str, tags: BTreeSet<String>) -> ExerciseBody {
    let mut prompt_lines: Vec<&str> = Vec::new();
    let mut hints = Vec::new();
    let mut chat_history = Vec::new();

    let mut in_history = false;
    let mut current: Option<(ChatRole, Vec<&str>)> = None;

    for line in body.lines() {
        let stripped = line.trim();
        if stripped.starts_with(FEEDBACK_HEADING) {
            in_history = true;
            continue;
        }

        if in_history {
            if let Some((role, rest)) = role_marker(stripped) {
                if let Some((role, lines)) = current.take() {
                    chat_history.push(ChatMessage::new(role, lines.join("\n").trim()));
                }
                current = Some((role, vec![rest.trim()]));
            } else if let Some((_, lines)) = current.as_mut() {
                lines.push(line);
            }
            continue;
        }

        let is_hint = stripped
            .get(..HINT_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(HINT_PREFIX));
        if is_hint {
            hints.push(stripped[HINT_PREFIX.len()..].trim().to_string());
        } else {
            prompt_lines.push(line);
        }
    }

    if let Some((role, lines)) = current {
        chat_history.push(ChatMessage::new(role, lines.join("\n").trim()));
    }

    ExerciseBody {
        prompt: prompt_lines.join("\n").trim().to_string(),
        hints,
        chat_history,
        tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_offsets_handle_crlf() {
        let text = "one\r\ntwo";
        let first = line_at(text, 0);
        assert_eq!(&text[first.start..first.end], "one");
        let second = line_at(text, first.next);
        assert_eq!(&text[second.start..second.end], "two");
        assert_eq!(second.next, text.len());
    }

    #[test]
    fn test_exercise_body_sections() {
        let body = "Show that the sum of two even numbers is even.\nhint: write them as 2a and 2b\nHint: factor out 2\n\n###### Feedback History\n**User**: 2a + 2b = 2(a + b)\n**Agent**: Correct.\nWell done.";
        let parsed = parse_exercise_body(body, BTreeSet::new());

        assert_eq!(parsed.prompt, "Show that the sum of two even numbers is even.");
        assert_eq!(parsed.hints, vec!["write them as 2a and 2b", "factor out 2"]);
        assert_eq!(parsed.chat_history.len(), 2);
        assert_eq!(parsed.chat_history[0].role, ChatRole::User);
        assert_eq!(parsed.chat_history[1].role, ChatRole::Assistant);
        assert_eq!(parsed.chat_history[1].content, "Correct.\nWell done.");
    }

    #[test]
    fn test_unterminated_block_is_skipped() {
        let text = "#flashcard\nQuestion without delimiters\n";
        assert!(parse_document(text).is_empty());
    }

    #[test]
    fn test_block_contents_are_not_read_as_one_liners() {
        let text = "#flashcard {\"id\":\"blk00001\"}\nTerm : definition #flashcard\n---\nAnswer\n---\n";
        let items = parse_document(text);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].form, ItemForm::Flashcard(FlashcardForm::Block));
    }

    #[test]
    fn test_exercise_stops_at_next_header() {
        let text = "#exercise {\"id\":\"ex000001\"}\nFirst prompt\n#exercise {\"id\":\"ex000002\"}\nSecond prompt\n---";
        let items = parse_document(text);
        assert_eq!(items.len(), 2);
        assert_eq!(&text[items[0].span.clone()], "#exercise {\"id\":\"ex000001\"}\nFirst prompt");
        assert_eq!(items[1].item.id(), "ex000002");
    }

    #[test]
    fn test_unterminated_exercise_leaves_following_flashcard() {
        let text = "#exercise {\"id\":\"ex000001\"}\nImplement binary search.\n\nCapital of France : Paris #flashcard {\"id\":\"fc000001\"}\n";
        let items = parse_document(text);
        assert_eq!(items.len(), 2);
        assert_eq!(&text[items[0].span.clone()], "#exercise {\"id\":\"ex000001\"}\nImplement binary search.");
        let LearningItem::Exercise(exercise) = &items[0].item else {
            panic!("expected an exercise first");
        };
        assert_eq!(exercise.prompt, "Implement binary search.");
        assert_eq!(items[1].item.id(), "fc000001");
    }

    #[test]
    fn test_terminated_exercise_keeps_blank_lines_in_prompt() {
        let text = "#exercise\nFirst paragraph.\n\nSecond paragraph.\n---\n";
        let LearningItem::Exercise(exercise) = &parse_document(text)[0].item else {
            panic!("expected an exercise");
        };
        assert_eq!(exercise.prompt, "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn test_tags_with_punctuation() {
        let text = "#flashcard {\"id\":\"blk00001\"} #v1.2 #c++\nQuestion\n---\nAnswer\n---\nLanguage : Rust #flashcard #c++ #systems/low-level\n";
        let items = parse_document(text);
        assert_eq!(items.len(), 2);
        let LearningItem::Flashcard(block) = &items[0].item else {
            panic!("expected a flashcard");
        };
        assert!(block.tags.contains("v1.2") && block.tags.contains("c++"));
        let LearningItem::Flashcard(inline) = &items[1].item else {
            panic!("expected a flashcard");
        };
        assert_eq!(inline.answer, "Rust");
        assert!(inline.tags.contains("systems/low-level"));
    }
}
