//! Notes data layer
//!
//! Versioned SQLite schema, note/tag repository with live queries,
//! search/category composition and transactional note writes.

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod services;

pub use app::AppState;
pub use error::{AppError, Result};
