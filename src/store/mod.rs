//! Persistence layer for per-user preferences, backed by libSQL.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlPreferenceStore;
pub use traits::{DEFAULT_USER, PreferenceStore, SetOutcome, UserPreference};
