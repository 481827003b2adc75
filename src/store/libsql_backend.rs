//! libSQL implementation of `PreferenceStore`.
//!
//! Supports local file and in-memory databases. Each write is a single
//! `INSERT … ON CONFLICT … RETURNING` statement, which keeps the
//! read-modify-write atomic per user key without any process-wide lock.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{PreferenceStore, SetOutcome, UserPreference};

/// libSQL preference store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlPreferenceStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlPreferenceStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&store.conn).await?;
        info!(path = %path.display(), "Preference store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&store.conn).await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn get_affiliation(&self, user_id: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT affiliation FROM affiliations WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_affiliation: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let affiliation: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_affiliation: {e}")))?;
                Ok(Some(affiliation))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_affiliation: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Map the `revision` returned by an upsert to its outcome.
fn revision_to_outcome(revision: i64) -> SetOutcome {
    if revision <= 1 {
        SetOutcome::Created
    } else {
        SetOutcome::Updated
    }
}

/// Read the single `revision` column produced by an upsert's `RETURNING`.
async fn returned_revision(mut rows: libsql::Rows, op: &str) -> Result<i64, DatabaseError> {
    match rows.next().await {
        Ok(Some(row)) => row
            .get::<i64>(0)
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}"))),
        Ok(None) => Err(DatabaseError::Query(format!("{op}: upsert returned no row"))),
        Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
    }
}

#[async_trait]
impl PreferenceStore for LibSqlPreferenceStore {
    async fn get(&self, user_id: &str) -> Result<UserPreference, DatabaseError> {
        Ok(UserPreference {
            user_id: user_id.to_string(),
            turn: self.get_turn(user_id).await?,
            affiliation: self.get_affiliation(user_id).await?,
        })
    }

    async fn get_turn(&self, user_id: &str) -> Result<Option<u32>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT turn FROM turns WHERE user_id = ?1", params![user_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_turn: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let turn: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_turn: {e}")))?;
                let turn = u32::try_from(turn).map_err(|_| {
                    DatabaseError::Query(format!("get_turn: stored turn {turn} out of range"))
                })?;
                Ok(Some(turn))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_turn: {e}"))),
        }
    }

    async fn set_turn(&self, user_id: &str, turn: u32) -> Result<SetOutcome, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let rows = self
            .conn()
            .query(
                "INSERT INTO turns (user_id, turn, revision, updated_at) VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT (user_id) DO UPDATE SET
                     turn = excluded.turn,
                     revision = turns.revision + 1,
                     updated_at = excluded.updated_at
                 RETURNING revision",
                params![user_id, i64::from(turn), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_turn: {e}")))?;

        let outcome = revision_to_outcome(returned_revision(rows, "set_turn").await?);
        debug!(user_id, turn, ?outcome, "Turn stored");
        Ok(outcome)
    }

    async fn clear_turn(&self, user_id: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM turns WHERE user_id = ?1", params![user_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("clear_turn: {e}")))?;
        Ok(count > 0)
    }

    async fn set_affiliation(
        &self,
        user_id: &str,
        affiliation: &str,
    ) -> Result<SetOutcome, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let rows = self
            .conn()
            .query(
                "INSERT INTO affiliations (user_id, affiliation, revision, updated_at)
                 VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT (user_id) DO UPDATE SET
                     affiliation = excluded.affiliation,
                     revision = affiliations.revision + 1,
                     updated_at = excluded.updated_at
                 RETURNING revision",
                params![user_id, affiliation, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_affiliation: {e}")))?;

        let outcome = revision_to_outcome(returned_revision(rows, "set_affiliation").await?);
        debug!(user_id, affiliation, ?outcome, "Affiliation stored");
        Ok(outcome)
    }

    async fn clear_affiliation(&self, user_id: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM affiliations WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("clear_affiliation: {e}")))?;
        Ok(count > 0)
    }
}
