//! Data layer configuration constants
//!
//! Central location for the store's logical name, schema version,
//! connection sizing and live-query buffering.

use std::time::Duration;

// ===== Store =====

/// Logical file name of the relational store inside the data directory
pub const DATABASE_NAME: &str = "notes_database";

/// Newest schema version this build knows how to migrate to
pub const LATEST_SCHEMA_VERSION: u32 = 2;

/// How long a connection waits on a locked database before failing
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on pooled connections used by reads and writes.
/// Migrations always run on a dedicated single connection.
pub const MAX_CONNECTIONS: u32 = 5;

// ===== Tags =====

/// Color given to tags created without one
pub const DEFAULT_TAG_COLOR: &str = "#6200EE";

// ===== Live queries =====

/// Capacity of the broadcast channel carrying table-change notifications.
/// A subscriber that falls further behind than this is refreshed once.
pub const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Result sets buffered per live query before the refresh task waits
pub const LIVE_QUERY_BUFFER: usize = 16;

// ===== Logging =====

/// Filter used when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "notes_core=debug,info";
