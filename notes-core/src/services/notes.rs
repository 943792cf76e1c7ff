//! Notes service
//!
//! High-level business logic for notes and tags: input validation,
//! timestamping, and the composite note-with-tags write.

use super::filter::{CompositionRule, NoteFilter};
use crate::database::{
    now_millis, LiveQuery, NewNote, NewTag, Note, NoteWithTags, Repository, Tag,
};
use crate::error::{AppError, Result};

/// Service for managing notes and tags
#[derive(Clone)]
pub struct NotesService {
    repo: Repository,
}

impl NotesService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Create a note and attach `tag_ids` to it as one unit.
    ///
    /// Title and content must be non-blank; an empty category means
    /// uncategorized. Tag ids are not checked against existing tags.
    pub async fn create_note_with_tags(
        &self,
        title: &str,
        content: &str,
        category: &str,
        tag_ids: &[i64],
    ) -> Result<i64> {
        validate_note(title, content)?;

        tracing::info!("Creating note: {}", title);

        let note = NewNote::now(title, content, category);
        let id = self.repo.insert_note_with_tags(&note, tag_ids).await?;

        tracing::info!("Note created successfully: {}", id);
        Ok(id)
    }

    /// Create a note with no tags
    pub async fn create_note(&self, title: &str, content: &str, category: &str) -> Result<i64> {
        self.create_note_with_tags(title, content, category, &[]).await
    }

    /// Save edits to a note, stamping `updated_at` with the current time.
    /// Any caller-supplied `updated_at` is discarded.
    pub async fn update_note(&self, mut note: Note) -> Result<Note> {
        validate_note(&note.title, &note.content)?;

        tracing::debug!("Updating note: {}", note.id);

        note.updated_at = now_millis().max(note.created_at);
        self.repo.update_note(&note).await?;

        tracing::debug!("Note updated successfully: {}", note.id);
        Ok(note)
    }

    /// Delete a note. Tag attachments are left behind.
    pub async fn delete_note(&self, note: &Note) -> Result<()> {
        tracing::info!("Deleting note: {}", note.id);

        self.repo.delete_note(note).await?;

        tracing::info!("Note deleted successfully: {}", note.id);
        Ok(())
    }

    pub async fn get_note_by_id(&self, id: i64) -> Result<Option<Note>> {
        self.repo.get_note_by_id(id).await
    }

    pub async fn get_note_with_tags(&self, id: i64) -> Result<Option<NoteWithTags>> {
        self.repo.get_note_with_tags(id).await
    }

    // ===== Tags =====

    /// Create a tag, using the default color when none is given
    pub async fn create_tag(&self, name: &str, color: Option<&str>) -> Result<i64> {
        if name.trim().is_empty() {
            return Err(AppError::ConstraintViolation("Tag name is required".to_string()));
        }

        let tag = NewTag {
            name: name.to_string(),
            color: color.map(str::to_string),
        };
        let id = self.repo.insert_tag(&tag).await?;

        tracing::info!("Tag created: {} ({})", id, name);
        Ok(id)
    }

    pub async fn update_tag(&self, tag: &Tag) -> Result<()> {
        self.repo.update_tag(tag).await
    }

    /// Delete a tag. Notes it was attached to keep their cross references.
    pub async fn delete_tag(&self, tag: &Tag) -> Result<()> {
        tracing::info!("Deleting tag: {}", tag.id);
        self.repo.delete_tag(tag).await
    }

    /// Attach a tag to a note; attaching twice is harmless
    pub async fn attach_tag(&self, note_id: i64, tag_id: i64) -> Result<()> {
        self.repo.insert_note_tag_cross_ref(note_id, tag_id).await
    }

    /// Detach a tag from a note; detaching an unattached tag is harmless
    pub async fn detach_tag(&self, note_id: i64, tag_id: i64) -> Result<()> {
        self.repo.delete_note_tag_cross_ref(note_id, tag_id).await
    }

    // ===== Live views =====

    /// Search/category-filtered note list using legacy precedence
    pub fn note_filter(&self) -> NoteFilter {
        NoteFilter::new(self.repo.clone())
    }

    pub fn note_filter_with_rule(&self, rule: CompositionRule) -> NoteFilter {
        NoteFilter::with_rule(self.repo.clone(), rule)
    }

    pub fn observe_notes_with_tags(&self) -> LiveQuery<NoteWithTags> {
        self.repo.get_all_notes_with_tags()
    }

    pub fn observe_notes_with_tag(&self, tag_id: i64) -> LiveQuery<Note> {
        self.repo.get_notes_with_tag(tag_id)
    }

    pub fn observe_categories(&self) -> LiveQuery<String> {
        self.repo.get_all_categories()
    }

    pub fn observe_tags(&self) -> LiveQuery<Tag> {
        self.repo.get_all_tags()
    }
}

fn validate_note(title: &str, content: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(AppError::ConstraintViolation("Note title is required".to_string()));
    }
    if content.trim().is_empty() {
        return Err(AppError::ConstraintViolation("Note content is required".to_string()));
    }
    Ok(())
}
