//! Durable store on libsql.
//!
//! Supports multiple backends:
//! - Local SQLite file: `path/to/db.sqlite` or `file:path` or `sqlite://path`
//! - In-memory: `:memory:`
//! - Remote Turso: `libsql://...` or `https://...` (requires TURSO_AUTH_TOKEN env var)
//!
//! Two tables back the authorization core: `token` holds session tokens and
//! `perm` holds one permission value per actor and model.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use libsql::{Builder, Connection, Database, params};

use crate::error::{Error, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS token (
    token TEXT PRIMARY KEY,
    actor_id INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS token_actor_id ON token (actor_id);
CREATE TABLE IF NOT EXISTS perm (
    actor_id INTEGER NOT NULL,
    model TEXT NOT NULL,
    value INTEGER NOT NULL,
    PRIMARY KEY (actor_id, model)
);
";

/// Open the database.
///
/// # URL formats
/// - Local file: `mydata.db`, `file:path/to/db.sqlite`, `sqlite://path`
/// - In-memory: `:memory:`
/// - Remote Turso: `libsql://your-db.turso.io` (requires `TURSO_AUTH_TOKEN` env var)
pub async fn connect(url: &str) -> Result<Database> {
    let db = if url.starts_with("libsql://") || url.starts_with("https://") {
        let token = std::env::var("TURSO_AUTH_TOKEN").map_err(|_| {
            Error::Config("TURSO_AUTH_TOKEN not set for remote database".into())
        })?;
        Builder::new_remote(url.to_string(), token).build().await?
    } else if url == ":memory:" {
        Builder::new_local(":memory:").build().await?
    } else {
        // Local file - strip sqlite:// or file: prefix if present
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("file:"))
            .unwrap_or(url);
        Builder::new_local(path).build().await?
    };

    Ok(db)
}

/// A persisted session token row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRow {
    pub token: String,
    pub actor_id: i64,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Shared handle to the durable store.
///
/// Cheap to clone; every call is bounded by the handle's timeout.
#[derive(Clone)]
pub struct Handle {
    // Kept alive for the connection's sake; an in-memory database lives
    // only as long as its connections.
    _db: Arc<Database>,
    conn: Connection,
    timeout: Duration,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Handle {
    /// Wrap an opened database.
    pub fn new(db: Database, timeout: Duration) -> Result<Self> {
        let conn = db.connect()?;
        Ok(Self {
            _db: Arc::new(db),
            conn,
            timeout,
        })
    }

    /// Open `url` and create the schema.
    pub async fn open(url: &str, timeout: Duration) -> Result<Self> {
        let handle = Self::new(connect(url).await?, timeout)?;
        handle.migrate().await?;
        Ok(handle)
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<()> {
        self.bounded(async { self.conn.execute_batch(SCHEMA).await.map(|_| ()) })
            .await
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, libsql::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Database call timed out");
                Err(Error::Timeout("database"))
            }
        }
    }

    pub async fn insert_token(&self, row: &TokenRow) -> Result<()> {
        self.bounded(self.conn.execute(
            "INSERT INTO token (token, actor_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                row.token.clone(),
                row.actor_id,
                row.created_at,
                row.expires_at
            ],
        ))
        .await?;
        Ok(())
    }

    pub async fn find_token(&self, token: &str) -> Result<Option<TokenRow>> {
        self.bounded(async {
            let mut rows = self
                .conn
                .query(
                    "SELECT token, actor_id, created_at, expires_at FROM token WHERE token = ?1",
                    params![token.to_string()],
                )
                .await?;
            rows.next().await?.as_ref().map(token_row).transpose()
        })
        .await
    }

    /// One page of an actor's tokens, oldest first.
    pub async fn tokens_for_actor(
        &self,
        actor_id: i64,
        limit: u32,
        skip: u32,
    ) -> Result<Vec<TokenRow>> {
        self.bounded(async {
            let mut rows = self
                .conn
                .query(
                    "SELECT token, actor_id, created_at, expires_at FROM token \
                     WHERE actor_id = ?1 ORDER BY created_at, token LIMIT ?2 OFFSET ?3",
                    params![actor_id, limit as i64, skip as i64],
                )
                .await?;
            let mut page = Vec::new();
            while let Some(row) = rows.next().await? {
                page.push(token_row(&row)?);
            }
            Ok::<_, libsql::Error>(page)
        })
        .await
    }

    /// Delete one token. Deleting a missing token is not an error.
    pub async fn delete_token(&self, token: &str) -> Result<bool> {
        let deleted = self
            .bounded(self.conn.execute(
                "DELETE FROM token WHERE token = ?1",
                params![token.to_string()],
            ))
            .await?;
        Ok(deleted > 0)
    }

    /// Delete every token of an actor, returning the deleted token strings.
    pub async fn delete_tokens_for_actor(&self, actor_id: i64) -> Result<Vec<String>> {
        self.bounded(async {
            let mut rows = self
                .conn
                .query(
                    "DELETE FROM token WHERE actor_id = ?1 RETURNING token",
                    params![actor_id],
                )
                .await?;
            let mut deleted = Vec::new();
            while let Some(row) = rows.next().await? {
                deleted.push(row.get::<String>(0)?);
            }
            Ok::<_, libsql::Error>(deleted)
        })
        .await
    }

    /// Stored permission value for `(actor_id, model)`, if any.
    pub async fn load_permission(&self, actor_id: i64, model: &str) -> Result<Option<i64>> {
        self.bounded(async {
            let mut rows = self
                .conn
                .query(
                    "SELECT value FROM perm WHERE actor_id = ?1 AND model = ?2",
                    params![actor_id, model.to_string()],
                )
                .await?;
            rows.next().await?.map(|row| row.get::<i64>(0)).transpose()
        })
        .await
    }

    /// Insert or overwrite the stored value. Last write wins.
    pub async fn save_permission(&self, actor_id: i64, model: &str, value: i64) -> Result<()> {
        self.bounded(self.conn.execute(
            "INSERT INTO perm (actor_id, model, value) VALUES (?1, ?2, ?3) \
             ON CONFLICT (actor_id, model) DO UPDATE SET value = excluded.value",
            params![actor_id, model.to_string(), value],
        ))
        .await?;
        Ok(())
    }

    pub async fn delete_permission(&self, actor_id: i64, model: &str) -> Result<bool> {
        let deleted = self
            .bounded(self.conn.execute(
                "DELETE FROM perm WHERE actor_id = ?1 AND model = ?2",
                params![actor_id, model.to_string()],
            ))
            .await?;
        Ok(deleted > 0)
    }
}

fn token_row(row: &libsql::Row) -> std::result::Result<TokenRow, libsql::Error> {
    Ok(TokenRow {
        token: row.get::<String>(0)?,
        actor_id: row.get::<i64>(1)?,
        created_at: row.get::<i64>(2)?,
        expires_at: row.get::<i64>(3)?,
    })
}
