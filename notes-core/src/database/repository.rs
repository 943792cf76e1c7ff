//! Repository layer for database operations
//!
//! CRUD for notes, tags and their cross references, plus the derived
//! read queries. Every list read exists as a one-shot `fetch_*` snapshot
//! and as a live query that re-emits after each relevant commit.
//!
//! Cross-reference rows are never removed by note or tag deletion. Orphaned
//! rows are inert: every read that goes through `note_tag_cross_ref` inner
//! joins the parent table, so a dangling reference never surfaces.

use super::live::{LiveQuery, Table, TableChange};
use super::models::*;
use crate::config::{CHANGE_CHANNEL_CAPACITY, DEFAULT_TAG_COLOR};
use crate::error::{AppError, Result};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tokio::sync::broadcast;

const NOTE_ORDER: &str = "ORDER BY created_at DESC, id DESC";

const NOTES: &[Table] = &[Table::Notes];
const TAGS: &[Table] = &[Table::Tags];
const CROSS_REFS: &[Table] = &[Table::NoteTagCrossRef];
const NOTES_AND_CROSS_REFS: &[Table] = &[Table::Notes, Table::NoteTagCrossRef];
const ALL_TABLES: &[Table] = &[Table::Notes, Table::Tags, Table::NoteTagCrossRef];

#[derive(FromRow)]
struct TaggedRow {
    note_id: i64,
    #[sqlx(flatten)]
    tag: Tag,
}

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    changes: broadcast::Sender<TableChange>,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { pool, changes }
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Subscribe to raw table-change notifications
    pub fn subscribe_changes(&self) -> broadcast::Receiver<TableChange> {
        self.changes.subscribe()
    }

    /// Number of live queries and raw subscribers currently attached
    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    fn notify(&self, tables: &'static [Table]) {
        // No receivers is not an error: nobody is watching
        let _ = self.changes.send(TableChange(tables));
    }

    fn live<T, F, Fut>(&self, tables: &'static [Table], query: F) -> LiveQuery<T>
    where
        T: Send + 'static,
        F: Fn(Repository) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<Vec<T>>> + Send + 'static,
    {
        // The refresh task only reads. Giving it a detached sender keeps the
        // change channel closable once every writer-side clone is gone.
        let reader = Repository::new(self.pool.clone());
        LiveQuery::spawn(&self.changes, tables, move || query(reader.clone()))
    }

    // ===== Notes =====

    /// Insert a note and return its assigned id
    pub async fn insert_note(&self, note: &NewNote) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        let id = insert_note_row(&mut conn, note).await?;

        self.notify(NOTES);
        tracing::debug!("Inserted note: {}", id);
        Ok(id)
    }

    /// Insert a note and attach `tag_ids` to it in one transaction.
    ///
    /// Readers see either the note with every requested cross reference or
    /// nothing at all.
    pub async fn insert_note_with_tags(&self, note: &NewNote, tag_ids: &[i64]) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let id = insert_note_row(&mut tx, note).await?;
        for &tag_id in tag_ids {
            insert_cross_ref_row(&mut tx, id, tag_id).await?;
        }

        tx.commit().await?;

        self.notify(NOTES_AND_CROSS_REFS);
        tracing::debug!("Inserted note {} with {} tag(s)", id, tag_ids.len());
        Ok(id)
    }

    /// Replace a note's mutable fields by id. `created_at` is never rewritten.
    ///
    /// `updated_at` is checked against the stored `created_at`, not the one
    /// carried by `note`.
    pub async fn update_note(&self, note: &Note) -> Result<()> {
        let rows = sqlx::query(
            r#"
            UPDATE notes SET title = ?, content = ?, category = ?, updated_at = ?
            WHERE id = ? AND ? >= created_at
            "#,
        )
        .bind(&note.title)
        .bind(&note.content)
        .bind(&note.category)
        .bind(note.updated_at)
        .bind(note.id)
        .bind(note.updated_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::from_write)?
        .rows_affected();

        if rows == 0 {
            let stored: Option<i64> = sqlx::query_scalar("SELECT created_at FROM notes WHERE id = ?")
                .bind(note.id)
                .fetch_optional(&self.pool)
                .await?;

            return match stored {
                Some(created_at) => check_timestamps(created_at, note.updated_at),
                None => Err(AppError::note_not_found(note.id)),
            };
        }

        self.notify(NOTES);
        tracing::debug!("Updated note: {}", note.id);
        Ok(())
    }

    /// Delete a note by id. Its cross-reference rows are left in place.
    pub async fn delete_note(&self, note: &Note) -> Result<()> {
        let rows = sqlx::query("DELETE FROM notes WHERE id = ?")
            .bind(note.id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::note_not_found(note.id));
        }

        self.notify(NOTES);
        tracing::debug!("Deleted note: {}", note.id);
        Ok(())
    }

    /// Get a note by ID
    pub async fn get_note_by_id(&self, id: i64) -> Result<Option<Note>> {
        let note = sqlx::query_as::<_, Note>("SELECT * FROM notes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(note)
    }

    /// Get a note and its tags by note ID
    pub async fn get_note_with_tags(&self, id: i64) -> Result<Option<NoteWithTags>> {
        let mut tx = self.pool.begin().await?;

        let Some(note) = sqlx::query_as::<_, Note>("SELECT * FROM notes WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        let tags = sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.* FROM tags t
            INNER JOIN note_tag_cross_ref x ON x.tag_id = t.id
            WHERE x.note_id = ?
            ORDER BY t.name, t.id
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(NoteWithTags { note, tags }))
    }

    /// All notes, most recent first
    pub async fn fetch_all_notes(&self) -> Result<Vec<Note>> {
        let notes = sqlx::query_as::<_, Note>(&format!("SELECT * FROM notes {}", NOTE_ORDER))
            .fetch_all(&self.pool)
            .await?;

        Ok(notes)
    }

    /// Notes whose title or content contains `term`, ignoring case.
    /// The term is matched as given, surrounding whitespace included. A blank
    /// term matches nothing.
    pub async fn fetch_search_notes(&self, term: &str) -> Result<Vec<Note>> {
        if term.trim().is_empty() {
            return Ok(Vec::new());
        }

        let notes = sqlx::query_as::<_, Note>(&format!(
            r#"
            SELECT * FROM notes
            WHERE instr(lower(title), lower(?)) > 0 OR instr(lower(content), lower(?)) > 0
            {}
            "#,
            NOTE_ORDER
        ))
        .bind(term)
        .bind(term)
        .fetch_all(&self.pool)
        .await?;

        Ok(notes)
    }

    /// Notes whose category is exactly `category`
    pub async fn fetch_notes_by_category(&self, category: &str) -> Result<Vec<Note>> {
        let notes = sqlx::query_as::<_, Note>(&format!(
            "SELECT * FROM notes WHERE category = ? {}",
            NOTE_ORDER
        ))
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        Ok(notes)
    }

    /// Notes matching `term` that are also in `category`
    pub async fn fetch_search_notes_in_category(&self, term: &str, category: &str) -> Result<Vec<Note>> {
        if term.trim().is_empty() {
            return Ok(Vec::new());
        }

        let notes = sqlx::query_as::<_, Note>(&format!(
            r#"
            SELECT * FROM notes
            WHERE category = ?
              AND (instr(lower(title), lower(?)) > 0 OR instr(lower(content), lower(?)) > 0)
            {}
            "#,
            NOTE_ORDER
        ))
        .bind(category)
        .bind(term)
        .bind(term)
        .fetch_all(&self.pool)
        .await?;

        Ok(notes)
    }

    /// Distinct non-empty categories in use, alphabetically
    pub async fn fetch_all_categories(&self) -> Result<Vec<String>> {
        let categories: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT category FROM notes WHERE category != '' ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    /// Every note with its tags; untagged notes carry an empty tag list
    pub async fn fetch_all_notes_with_tags(&self) -> Result<Vec<NoteWithTags>> {
        let mut tx = self.pool.begin().await?;

        let notes = sqlx::query_as::<_, Note>(&format!("SELECT * FROM notes {}", NOTE_ORDER))
            .fetch_all(&mut *tx)
            .await?;

        let rows = sqlx::query_as::<_, TaggedRow>(
            r#"
            SELECT x.note_id, t.id, t.name, t.color
            FROM note_tag_cross_ref x
            INNER JOIN tags t ON t.id = x.tag_id
            ORDER BY t.name, t.id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut tags_by_note: HashMap<i64, Vec<Tag>> = HashMap::new();
        for row in rows {
            tags_by_note.entry(row.note_id).or_default().push(row.tag);
        }

        Ok(notes
            .into_iter()
            .map(|note| {
                let tags = tags_by_note.remove(&note.id).unwrap_or_default();
                NoteWithTags { note, tags }
            })
            .collect())
    }

    /// Notes carrying the tag `tag_id`
    pub async fn fetch_notes_with_tag(&self, tag_id: i64) -> Result<Vec<Note>> {
        let notes = sqlx::query_as::<_, Note>(
            r#"
            SELECT n.* FROM notes n
            INNER JOIN note_tag_cross_ref x ON x.note_id = n.id
            WHERE x.tag_id = ?
            ORDER BY n.created_at DESC, n.id DESC
            "#,
        )
        .bind(tag_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(notes)
    }

    /// Live: all notes, most recent first
    ///
    /// Spawns a refresh task, so it must be called inside a tokio runtime.
    pub fn get_all_notes(&self) -> LiveQuery<Note> {
        self.live(NOTES, |repo| async move { repo.fetch_all_notes().await })
    }

    /// Live: notes matching `term`
    ///
    /// Spawns a refresh task, so it must be called inside a tokio runtime.
    pub fn search_notes(&self, term: &str) -> LiveQuery<Note> {
        let term = term.to_string();
        self.live(NOTES, move |repo| {
            let term = term.clone();
            async move { repo.fetch_search_notes(&term).await }
        })
    }

    /// Live: notes in `category`
    ///
    /// Spawns a refresh task, so it must be called inside a tokio runtime.
    pub fn get_notes_by_category(&self, category: &str) -> LiveQuery<Note> {
        let category = category.to_string();
        self.live(NOTES, move |repo| {
            let category = category.clone();
            async move { repo.fetch_notes_by_category(&category).await }
        })
    }

    /// Live: notes matching `term` within `category`
    ///
    /// Spawns a refresh task, so it must be called inside a tokio runtime.
    pub fn search_notes_in_category(&self, term: &str, category: &str) -> LiveQuery<Note> {
        let term = term.to_string();
        let category = category.to_string();
        self.live(NOTES, move |repo| {
            let term = term.clone();
            let category = category.clone();
            async move { repo.fetch_search_notes_in_category(&term, &category).await }
        })
    }

    /// Live: distinct non-empty categories
    ///
    /// Spawns a refresh task, so it must be called inside a tokio runtime.
    pub fn get_all_categories(&self) -> LiveQuery<String> {
        self.live(NOTES, |repo| async move { repo.fetch_all_categories().await })
    }

    /// Live: every note with its tags
    ///
    /// Spawns a refresh task, so it must be called inside a tokio runtime.
    pub fn get_all_notes_with_tags(&self) -> LiveQuery<NoteWithTags> {
        self.live(ALL_TABLES, |repo| async move {
            repo.fetch_all_notes_with_tags().await
        })
    }

    /// Live: notes carrying `tag_id`
    ///
    /// Spawns a refresh task, so it must be called inside a tokio runtime.
    pub fn get_notes_with_tag(&self, tag_id: i64) -> LiveQuery<Note> {
        self.live(NOTES_AND_CROSS_REFS, move |repo| async move {
            repo.fetch_notes_with_tag(tag_id).await
        })
    }

    // ===== Tags =====

    /// Insert a tag and return its assigned id
    pub async fn insert_tag(&self, tag: &NewTag) -> Result<i64> {
        let color = tag.color.as_deref().unwrap_or(DEFAULT_TAG_COLOR);

        let id = sqlx::query("INSERT INTO tags (name, color) VALUES (?, ?)")
            .bind(&tag.name)
            .bind(color)
            .execute(&self.pool)
            .await
            .map_err(AppError::from_write)?
            .last_insert_rowid();

        self.notify(TAGS);
        tracing::debug!("Inserted tag: {} ({})", id, tag.name);
        Ok(id)
    }

    /// Replace a tag's name and color by id
    pub async fn update_tag(&self, tag: &Tag) -> Result<()> {
        let rows = sqlx::query("UPDATE tags SET name = ?, color = ? WHERE id = ?")
            .bind(&tag.name)
            .bind(&tag.color)
            .bind(tag.id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from_write)?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::tag_not_found(tag.id));
        }

        self.notify(TAGS);
        tracing::debug!("Updated tag: {}", tag.id);
        Ok(())
    }

    /// Delete a tag by id. Its cross-reference rows are left in place.
    pub async fn delete_tag(&self, tag: &Tag) -> Result<()> {
        let rows = sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(tag.id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::tag_not_found(tag.id));
        }

        self.notify(TAGS);
        tracing::debug!("Deleted tag: {}", tag.id);
        Ok(())
    }

    /// All tags, alphabetically
    pub async fn fetch_all_tags(&self) -> Result<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>("SELECT * FROM tags ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;

        Ok(tags)
    }

    /// Live: all tags
    ///
    /// Spawns a refresh task, so it must be called inside a tokio runtime.
    pub fn get_all_tags(&self) -> LiveQuery<Tag> {
        self.live(TAGS, |repo| async move { repo.fetch_all_tags().await })
    }

    // ===== Cross references =====

    /// Attach a tag to a note. Re-attaching is a no-op.
    pub async fn insert_note_tag_cross_ref(&self, note_id: i64, tag_id: i64) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        let inserted = insert_cross_ref_row(&mut conn, note_id, tag_id).await?;

        if inserted {
            self.notify(CROSS_REFS);
            tracing::debug!("Attached tag {} to note {}", tag_id, note_id);
        }
        Ok(())
    }

    /// Detach a tag from a note. Detaching an absent pair is a no-op.
    pub async fn delete_note_tag_cross_ref(&self, note_id: i64, tag_id: i64) -> Result<()> {
        let rows = sqlx::query("DELETE FROM note_tag_cross_ref WHERE note_id = ? AND tag_id = ?")
            .bind(note_id)
            .bind(tag_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows > 0 {
            self.notify(CROSS_REFS);
            tracing::debug!("Detached tag {} from note {}", tag_id, note_id);
        }
        Ok(())
    }

    /// Raw cross-reference rows, including dangling ones
    pub async fn fetch_cross_refs(&self) -> Result<Vec<NoteTagCrossRef>> {
        let refs = sqlx::query_as::<_, NoteTagCrossRef>(
            "SELECT note_id, tag_id FROM note_tag_cross_ref ORDER BY note_id, tag_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(refs)
    }
}

fn check_timestamps(created_at: i64, updated_at: i64) -> Result<()> {
    if updated_at < created_at {
        return Err(AppError::ConstraintViolation(format!(
            "updated_at ({}) precedes created_at ({})",
            updated_at, created_at
        )));
    }
    Ok(())
}

async fn insert_note_row(conn: &mut SqliteConnection, note: &NewNote) -> Result<i64> {
    check_timestamps(note.created_at, note.updated_at)?;

    let id = sqlx::query(
        r#"
        INSERT INTO notes (title, content, category, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&note.title)
    .bind(&note.content)
    .bind(&note.category)
    .bind(note.created_at)
    .bind(note.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(AppError::from_write)?
    .last_insert_rowid();

    Ok(id)
}

/// Returns whether a new row was written
async fn insert_cross_ref_row(conn: &mut SqliteConnection, note_id: i64, tag_id: i64) -> Result<bool> {
    let rows = sqlx::query(
        r#"
        INSERT INTO note_tag_cross_ref (note_id, tag_id) VALUES (?, ?)
        ON CONFLICT(note_id, tag_id) DO NOTHING
        "#,
    )
    .bind(note_id)
    .bind(tag_id)
    .execute(&mut *conn)
    .await
    .map_err(AppError::from_write)?
    .rows_affected();

    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing::create_test_repo;

    fn new_note(title: &str, content: &str, category: &str, at: i64) -> NewNote {
        NewNote {
            title: title.to_string(),
            content: content.to_string(),
            category: category.to_string(),
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_note() {
        let (repo, _temp) = create_test_repo().await;

        let id = repo
            .insert_note(&new_note("Test Note", "Hello", "Work", 1_000))
            .await
            .unwrap();

        let fetched = repo.get_note_by_id(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.title, "Test Note");
        assert_eq!(fetched.category, "Work");
        assert!(fetched.updated_at >= fetched.created_at);
    }

    #[tokio::test]
    async fn test_missing_note_is_none() {
        let (repo, _temp) = create_test_repo().await;

        assert!(repo.get_note_by_id(999).await.unwrap().is_none());
        assert!(repo.get_note_with_tags(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_backwards_timestamps() {
        let (repo, _temp) = create_test_repo().await;

        let mut note = new_note("Backwards", "", "", 2_000);
        note.updated_at = 1_000;

        let err = repo.insert_note(&note).await.unwrap_err();
        assert!(matches!(err, AppError::ConstraintViolation(_)));
        assert!(repo.fetch_all_notes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_note() {
        let (repo, _temp) = create_test_repo().await;

        let id = repo.insert_note(&new_note("Original", "", "", 1_000)).await.unwrap();
        let mut note = repo.get_note_by_id(id).await.unwrap().unwrap();
        note.title = "Updated".to_string();
        note.category = "Ideas".to_string();
        note.updated_at = 5_000;

        repo.update_note(&note).await.unwrap();

        let fetched = repo.get_note_by_id(id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Updated");
        assert_eq!(fetched.category, "Ideas");
        assert_eq!(fetched.created_at, 1_000);
        assert_eq!(fetched.updated_at, 5_000);
    }

    #[tokio::test]
    async fn test_update_checks_stored_created_at() {
        let (repo, _temp) = create_test_repo().await;

        let id = repo.insert_note(&new_note("Pinned", "", "", 5_000)).await.unwrap();
        let mut note = repo.get_note_by_id(id).await.unwrap().unwrap();
        note.created_at = 0;
        note.updated_at = 1_000;

        let err = repo.update_note(&note).await.unwrap_err();
        assert!(matches!(err, AppError::ConstraintViolation(_)));

        let stored = repo.get_note_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.created_at, 5_000);
        assert_eq!(stored.updated_at, 5_000);
    }

    #[tokio::test]
    async fn test_update_missing_note_is_not_found() {
        let (repo, _temp) = create_test_repo().await;

        let ghost = Note {
            id: 77,
            title: "Ghost".to_string(),
            content: String::new(),
            category: String::new(),
            created_at: 1,
            updated_at: 1,
        };

        let err = repo.update_note(&ghost).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "Note", id: 77 }));

        let err = repo.delete_note(&ghost).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_is_most_recent_first() {
        let (repo, _temp) = create_test_repo().await;

        for (i, title) in ["Old", "Middle", "New"].iter().enumerate() {
            repo.insert_note(&new_note(title, "", "", 1_000 * (i as i64 + 1)))
                .await
                .unwrap();
        }

        let titles: Vec<String> = repo
            .fetch_all_notes()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, vec!["New", "Middle", "Old"]);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let (repo, _temp) = create_test_repo().await;

        repo.insert_note(&new_note("Groceries", "Milk, eggs", "Personal", 1))
            .await
            .unwrap();
        repo.insert_note(&new_note("Standup", "Discuss MILESTONES", "Work", 2))
            .await
            .unwrap();

        let results = repo.fetch_search_notes("milk").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Groceries");

        let results = repo.fetch_search_notes("MIL").await.unwrap();
        assert_eq!(results.len(), 2);

        let results = repo.fetch_search_notes("stand").await.unwrap();
        assert_eq!(results[0].title, "Standup");

        assert!(repo.fetch_search_notes("xyz").await.unwrap().is_empty());
        assert!(repo.fetch_search_notes("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_does_not_treat_percent_as_wildcard() {
        let (repo, _temp) = create_test_repo().await;

        repo.insert_note(&new_note("Plain", "nothing here", "", 1)).await.unwrap();
        repo.insert_note(&new_note("Discount", "50% off", "", 2)).await.unwrap();

        let results = repo.fetch_search_notes("%").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Discount");
    }

    #[tokio::test]
    async fn test_search_keeps_surrounding_whitespace() {
        let (repo, _temp) = create_test_repo().await;

        repo.insert_note(&new_note("Glued", "buttermilk", "Work", 1)).await.unwrap();
        repo.insert_note(&new_note("Spaced", "milk and eggs", "Work", 2)).await.unwrap();

        let results = repo.fetch_search_notes("milk ").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Spaced");

        let results = repo.fetch_search_notes_in_category(" milk", "Work").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Spaced");

        assert_eq!(repo.fetch_search_notes("milk").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_category_queries() {
        let (repo, _temp) = create_test_repo().await;

        repo.insert_note(&new_note("Groceries", "Milk", "Personal", 1)).await.unwrap();
        repo.insert_note(&new_note("Gym", "Legs", "Personal", 2)).await.unwrap();
        repo.insert_note(&new_note("Report", "Milk sales", "Work", 3)).await.unwrap();
        repo.insert_note(&new_note("Loose", "", "", 4)).await.unwrap();

        let personal = repo.fetch_notes_by_category("Personal").await.unwrap();
        assert_eq!(personal.len(), 2);
        assert!(repo.fetch_notes_by_category("personal").await.unwrap().is_empty());

        let categories = repo.fetch_all_categories().await.unwrap();
        assert_eq!(categories, vec!["Personal".to_string(), "Work".to_string()]);

        let both = repo.fetch_search_notes_in_category("milk", "Work").await.unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].title, "Report");
    }

    #[tokio::test]
    async fn test_tag_crud() {
        let (repo, _temp) = create_test_repo().await;

        let id = repo.insert_tag(&NewTag::named("urgent")).await.unwrap();
        let tags = repo.fetch_all_tags().await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].color, DEFAULT_TAG_COLOR);

        let mut tag = tags[0].clone();
        tag.name = "later".to_string();
        tag.color = "#FF0000".to_string();
        repo.update_tag(&tag).await.unwrap();

        let tags = repo.fetch_all_tags().await.unwrap();
        assert_eq!(tags[0].id, id);
        assert_eq!(tags[0].name, "later");
        assert_eq!(tags[0].color, "#FF0000");

        repo.delete_tag(&tag).await.unwrap();
        assert!(repo.fetch_all_tags().await.unwrap().is_empty());
        assert!(matches!(
            repo.delete_tag(&tag).await.unwrap_err(),
            AppError::NotFound { entity: "Tag", .. }
        ));
    }

    #[tokio::test]
    async fn test_duplicate_tag_names_are_allowed() {
        let (repo, _temp) = create_test_repo().await;

        repo.insert_tag(&NewTag::named("dup")).await.unwrap();
        repo.insert_tag(&NewTag::named("dup")).await.unwrap();

        assert_eq!(repo.fetch_all_tags().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cross_ref_insert_is_idempotent() {
        let (repo, _temp) = create_test_repo().await;

        let note_id = repo.insert_note(&new_note("Note", "", "", 1)).await.unwrap();
        let tag_id = repo.insert_tag(&NewTag::named("tag")).await.unwrap();

        repo.insert_note_tag_cross_ref(note_id, tag_id).await.unwrap();
        repo.insert_note_tag_cross_ref(note_id, tag_id).await.unwrap();

        let refs = repo.fetch_cross_refs().await.unwrap();
        assert_eq!(refs, vec![NoteTagCrossRef { note_id, tag_id }]);
    }

    #[tokio::test]
    async fn test_cross_ref_delete_of_absent_pair_is_noop() {
        let (repo, _temp) = create_test_repo().await;

        repo.delete_note_tag_cross_ref(1, 2).await.unwrap();

        assert!(repo.fetch_cross_refs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notes_with_tags_join() {
        let (repo, _temp) = create_test_repo().await;

        let tagged = repo.insert_note(&new_note("Tagged", "", "", 1)).await.unwrap();
        let untagged = repo.insert_note(&new_note("Untagged", "", "", 2)).await.unwrap();
        let a = repo.insert_tag(&NewTag::named("alpha")).await.unwrap();
        let b = repo.insert_tag(&NewTag::named("beta")).await.unwrap();

        repo.insert_note_tag_cross_ref(tagged, b).await.unwrap();
        repo.insert_note_tag_cross_ref(tagged, a).await.unwrap();

        let all = repo.fetch_all_notes_with_tags().await.unwrap();
        assert_eq!(all.len(), 2);

        let untagged_entry = all.iter().find(|n| n.note.id == untagged).unwrap();
        assert!(untagged_entry.tags.is_empty());

        let tagged_entry = all.iter().find(|n| n.note.id == tagged).unwrap();
        let names: Vec<&str> = tagged_entry.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        let single = repo.get_note_with_tags(tagged).await.unwrap().unwrap();
        assert_eq!(single.tags.len(), 2);
        assert!(single.has_tag(a));

        let with_alpha = repo.fetch_notes_with_tag(a).await.unwrap();
        assert_eq!(with_alpha.len(), 1);
        assert_eq!(with_alpha[0].id, tagged);
    }

    #[tokio::test]
    async fn test_deleting_tag_leaves_inert_cross_ref() {
        let (repo, _temp) = create_test_repo().await;

        let note_id = repo.insert_note(&new_note("Note", "", "", 1)).await.unwrap();
        let tag_id = repo.insert_tag(&NewTag::named("gone")).await.unwrap();
        repo.insert_note_tag_cross_ref(note_id, tag_id).await.unwrap();

        let tag = repo.fetch_all_tags().await.unwrap().remove(0);
        repo.delete_tag(&tag).await.unwrap();

        // The association row survives the tag
        let refs = repo.fetch_cross_refs().await.unwrap();
        assert_eq!(refs, vec![NoteTagCrossRef { note_id, tag_id }]);

        // ...but never shows up as a phantom tag
        let note = repo.get_note_with_tags(note_id).await.unwrap().unwrap();
        assert!(note.tags.is_empty());
    }

    #[tokio::test]
    async fn test_deleting_note_leaves_inert_cross_ref() {
        let (repo, _temp) = create_test_repo().await;

        let note_id = repo.insert_note(&new_note("Note", "", "", 1)).await.unwrap();
        let tag_id = repo.insert_tag(&NewTag::named("kept")).await.unwrap();
        repo.insert_note_tag_cross_ref(note_id, tag_id).await.unwrap();

        let note = repo.get_note_by_id(note_id).await.unwrap().unwrap();
        repo.delete_note(&note).await.unwrap();

        assert_eq!(repo.fetch_cross_refs().await.unwrap().len(), 1);
        assert!(repo.fetch_notes_with_tag(tag_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_live_notes_reemit_after_insert() {
        let (repo, _temp) = create_test_repo().await;
        let mut live = repo.get_all_notes();

        assert!(live.next().await.unwrap().unwrap().is_empty());

        repo.insert_note(&new_note("First", "", "", 1)).await.unwrap();
        let notes = live.next().await.unwrap().unwrap();
        assert_eq!(notes.len(), 1);

        repo.insert_note(&new_note("Second", "", "", 2)).await.unwrap();
        let notes = live.next().await.unwrap().unwrap();
        assert_eq!(notes[0].title, "Second");
    }

    #[tokio::test]
    async fn test_live_tags_ignore_note_writes() {
        let (repo, _temp) = create_test_repo().await;
        let mut live = repo.get_all_tags();

        assert!(live.next().await.unwrap().unwrap().is_empty());

        repo.insert_note(&new_note("Irrelevant", "", "", 1)).await.unwrap();
        repo.insert_tag(&NewTag::named("relevant")).await.unwrap();

        // The note write does not produce an emission; the tag write does
        let tags = live.next().await.unwrap().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "relevant");
    }

    #[tokio::test]
    async fn test_live_notes_with_tags_follow_attachments() {
        let (repo, _temp) = create_test_repo().await;

        let note_id = repo.insert_note(&new_note("Note", "", "", 1)).await.unwrap();
        let tag_id = repo.insert_tag(&NewTag::named("t")).await.unwrap();

        let mut live = repo.get_all_notes_with_tags();
        assert!(live.next().await.unwrap().unwrap()[0].tags.is_empty());

        repo.insert_note_tag_cross_ref(note_id, tag_id).await.unwrap();
        assert!(live.next().await.unwrap().unwrap()[0].has_tag(tag_id));

        repo.delete_note_tag_cross_ref(note_id, tag_id).await.unwrap();
        assert!(live.next().await.unwrap().unwrap()[0].tags.is_empty());
    }

    #[tokio::test]
    async fn test_raw_changes_name_written_tables() {
        let (repo, _temp) = create_test_repo().await;
        let mut changes = repo.subscribe_changes();

        let note_id = repo.insert_note(&new_note("Note", "", "", 1)).await.unwrap();
        let change = changes.recv().await.unwrap();
        assert!(change.touches(&[Table::Notes]));
        assert!(!change.touches(&[Table::Tags]));

        let tag_id = repo.insert_tag(&NewTag::named("t")).await.unwrap();
        assert!(changes.recv().await.unwrap().touches(&[Table::Tags]));

        // Only the first attach writes a row, so only it is announced
        repo.insert_note_tag_cross_ref(note_id, tag_id).await.unwrap();
        repo.insert_note_tag_cross_ref(note_id, tag_id).await.unwrap();
        assert!(changes.recv().await.unwrap().touches(&[Table::NoteTagCrossRef]));
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_live_query_ends_when_store_dropped() {
        let (repo, _temp) = create_test_repo().await;
        let mut live = repo.get_all_tags();
        live.next().await.unwrap().unwrap();

        drop(repo);

        assert!(live.next().await.is_none());
    }
}
