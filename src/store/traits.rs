//! The async interface for per-user preference persistence.

use async_trait::async_trait;

use crate::error::DatabaseError;

/// Reserved key holding the server-wide default turn.
///
/// Discord user ids are numeric snowflakes, so this never collides with a
/// real user.
pub const DEFAULT_USER: &str = "default";

/// Everything stored for one user key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPreference {
    pub user_id: String,
    pub turn: Option<u32>,
    pub affiliation: Option<String>,
}

/// Outcome of a set operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// No value existed before.
    Created,
    /// An existing value was overwritten.
    Updated,
}

/// Backend-agnostic preference store.
///
/// Turns and affiliations are two independent key-value maps. Every write
/// is atomic per key; nothing here needs a cross-user lock.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Fetch both preferences for a user. Missing values are `None`.
    async fn get(&self, user_id: &str) -> Result<UserPreference, DatabaseError>;

    /// Fetch only the stored turn for a user key.
    async fn get_turn(&self, user_id: &str) -> Result<Option<u32>, DatabaseError>;

    /// Store a turn, reporting whether it was created or overwritten.
    async fn set_turn(&self, user_id: &str, turn: u32) -> Result<SetOutcome, DatabaseError>;

    /// Remove a stored turn. Returns whether anything was removed.
    async fn clear_turn(&self, user_id: &str) -> Result<bool, DatabaseError>;

    /// Store an affiliation override.
    async fn set_affiliation(
        &self,
        user_id: &str,
        affiliation: &str,
    ) -> Result<SetOutcome, DatabaseError>;

    /// Remove an affiliation override. Returns whether anything was removed.
    async fn clear_affiliation(&self, user_id: &str) -> Result<bool, DatabaseError>;
}
