//! Loading and saving note files that carry learning items.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec;
use crate::models::{Exercise, Flashcard, LearningItem};

/// A note file and the items parsed from it.
#[derive(Debug, Clone)]
pub struct Note {
    pub path: PathBuf,
    pub text: String,
    pub flashcards: Vec<Flashcard>,
    pub exercises: Vec<Exercise>,
}

impl Note {
    /// Read and parse a note from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read note: {:?}", path))?;
        Ok(Self::from_text(path.to_path_buf(), text))
    }

    /// Parse a note that is already in memory.
    pub fn from_text(path: PathBuf, text: String) -> Self {
        let (flashcards, exercises) = codec::parse_items(&text);
        log::debug!(
            "Loaded {:?}: {} flashcards, {} exercises",
            path,
            flashcards.len(),
            exercises.len()
        );
        Self {
            path,
            text,
            flashcards,
            exercises,
        }
    }

    /// Write the note text back to disk.
    pub fn save(&self) -> Result<()> {
        fs::write(&self.path, &self.text)
            .with_context(|| format!("Failed to write note: {:?}", self.path))
    }

    pub fn find_flashcard(&self, id: &str) -> Option<&Flashcard> {
        self.flashcards.iter().find(|c| c.id == id)
    }

    pub fn find_exercise(&self, id: &str) -> Option<&Exercise> {
        self.exercises.iter().find(|e| e.id == id)
    }

    /// Rewrite one item's annotation and refresh the parsed items.
    pub fn apply_item(&mut self, item: &LearningItem) -> Result<()> {
        self.text = codec::update_item_in_document(&self.text, item)
            .with_context(|| format!("Failed to update {:?}", self.path))?;
        self.reparse();
        Ok(())
    }

    /// Append a flashcard under the `## <section>` heading.
    pub fn append_flashcard(&mut self, card: &Flashcard, section: &str) {
        self.text = codec::append_flashcards(&self.text, std::slice::from_ref(card), section);
        self.reparse();
    }

    /// Append an exercise under the `## <section>` heading.
    pub fn append_exercise(&mut self, exercise: &Exercise, section: &str) {
        self.text = codec::append_exercises(&self.text, std::slice::from_ref(exercise), section);
        self.reparse();
    }

    /// Order for an exercise added after all existing ones.
    pub fn next_exercise_order(&self) -> u32 {
        self.exercises
            .iter()
            .map(|e| e.order)
            .max()
            .map_or(1, |order| order.saturating_add(1))
    }

    fn reparse(&mut self) {
        let (flashcards, exercises) = codec::parse_items(&self.text);
        self.flashcards = flashcards;
        self.exercises = exercises;
    }
}

/// Load several notes, failing on the first unreadable one.
pub fn load_notes(paths: &[PathBuf]) -> Result<Vec<Note>> {
    paths.iter().map(|path| Note::load(path)).collect()
}

/// All flashcards and exercises across `notes`, in note order.
pub fn pooled_items(notes: &[Note]) -> (Vec<Flashcard>, Vec<Exercise>) {
    let flashcards = notes.iter().flat_map(|n| n.flashcards.iter().cloned()).collect();
    let exercises = notes.iter().flat_map(|n| n.exercises.iter().cloned()).collect();
    (flashcards, exercises)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsrs;
    use crate::models::{CardState, Rating};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    const NOTE: &str = "# Geography\n\nSome prose.\n\nCapital of France : Paris #flashcard {\"id\":\"fr000001\"}\n\n#exercise {\"id\":\"ex000001\",\"order\":1}\nName three rivers in France.\n\n---\n";

    fn write_note(dir: &TempDir, name: &str, text: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_load_note() {
        let dir = TempDir::new().unwrap();
        let path = write_note(&dir, "geo.md", NOTE);
        let note = Note::load(&path).unwrap();
        assert_eq!(note.flashcards.len(), 1);
        assert_eq!(note.exercises.len(), 1);
        assert!(note.find_flashcard("fr000001").is_some());
        assert!(note.find_exercise("ex000001").is_some());
    }

    #[test]
    fn test_missing_note_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(Note::load(&dir.path().join("nope.md")).is_err());
    }

    #[test]
    fn test_apply_rating_and_save() {
        let dir = TempDir::new().unwrap();
        let path = write_note(&dir, "geo.md", NOTE);
        let mut note = Note::load(&path).unwrap();

        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let card = note.find_flashcard("fr000001").unwrap().clone();
        let rated = fsrs::apply_rating(&card, Rating::Good, now);
        note.apply_item(&LearningItem::Flashcard(rated)).unwrap();
        note.save().unwrap();

        let reloaded = Note::load(&path).unwrap();
        let card = reloaded.find_flashcard("fr000001").unwrap();
        assert_eq!(card.state, CardState::Learning);
        assert!(reloaded.text.starts_with("# Geography\n\nSome prose.\n\n"));
        assert!(reloaded.text.contains("Name three rivers in France."));
    }

    #[test]
    fn test_apply_unknown_item_leaves_text() {
        let mut note = Note::from_text(PathBuf::from("geo.md"), NOTE.to_string());
        let stranger = Flashcard::with_id("zz999999", "Unknown", "Card");
        assert!(note.apply_item(&LearningItem::Flashcard(stranger)).is_err());
        assert_eq!(note.text, NOTE);
    }

    #[test]
    fn test_append_and_pool() {
        let dir = TempDir::new().unwrap();
        let first = write_note(&dir, "a.md", NOTE);
        let second = write_note(&dir, "b.md", "# Empty\n");

        let mut notes = load_notes(&[first, second]).unwrap();
        notes[1].append_flashcard(&Flashcard::with_id("new00001", "2 + 2", "4"), "Flashcards");
        assert!(notes[1].text.contains("## Flashcards"));

        let (flashcards, exercises) = pooled_items(&notes);
        let ids: Vec<&str> = flashcards.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["fr000001", "new00001"]);
        assert_eq!(exercises.len(), 1);
    }

    #[test]
    fn test_append_exercise_after_existing_ones() {
        let mut note = Note::from_text(PathBuf::from("geo.md"), NOTE.to_string());
        assert_eq!(note.next_exercise_order(), 2);

        let exercise = Exercise::with_id("ex000002", "Sketch the Loire basin.", note.next_exercise_order())
            .with_tags(["maps"]);
        note.append_exercise(&exercise, "Exercises");

        assert!(note.text.contains("## Exercises"));
        assert_eq!(note.exercises.len(), 2);
        let added = note.find_exercise("ex000002").unwrap();
        assert_eq!(added.order, 2);
        assert!(added.tags.contains("maps"));
        assert_eq!(note.flashcards.len(), 1);
    }
}
