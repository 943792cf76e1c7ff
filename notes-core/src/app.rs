//! Application state and initialization
//!
//! The store is opened once during startup and the resulting state is
//! cloned into every consumer. There is no global lookup.

use crate::config::{DATABASE_NAME, LATEST_SCHEMA_VERSION};
use crate::database::{self, Repository};
use crate::error::Result;
use crate::services::{NoteFilter, NotesService};
use std::path::{Path, PathBuf};

/// Central application state holding the store and its services
#[derive(Clone)]
pub struct AppState {
    pub app_data_dir: PathBuf,
    pub repo: Repository,
    pub notes_service: NotesService,
}

impl AppState {
    /// Open (and migrate) the store under `app_data_dir`.
    ///
    /// Migration failure is returned before any service is built.
    pub async fn initialize(app_data_dir: impl AsRef<Path>) -> Result<Self> {
        let app_data_dir = app_data_dir.as_ref().to_path_buf();
        tracing::info!("Initializing data layer in {:?}", app_data_dir);

        std::fs::create_dir_all(&app_data_dir)?;

        let repo = database::open(&app_data_dir.join(DATABASE_NAME), LATEST_SCHEMA_VERSION).await?;
        let notes_service = NotesService::new(repo.clone());

        tracing::info!("Data layer initialized successfully");

        Ok(Self {
            app_data_dir,
            repo,
            notes_service,
        })
    }

    /// A fresh note list filter for a screen
    pub fn note_filter(&self) -> NoteFilter {
        self.notes_service.note_filter()
    }

    /// Close every pooled connection
    pub async fn shutdown(&self) {
        tracing::info!("Closing store");
        self.repo.pool().close().await;
    }
}
