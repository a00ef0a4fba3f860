//! Session token store.
//!
//! Tokens are opaque random identifiers bound to one actor. Every token is
//! written to the durable store; short-lived ones (TTL within the session
//! window, 7 days by default) are also written to the fast cache. Reads are
//! cache-aside: a miss falls back to the durable store and backfills the
//! cache for at most the window.
//!
//! Revocation is strict. A revoked token is replaced in the cache by a
//! revocation marker before its durable row is deleted, and backfills never
//! overwrite an existing entry, so once `revoke` or `revoke_all` returns `Ok`
//! the token can no longer validate from either tier. The durable row is
//! deleted even when the marker cannot be written; the marker failure is
//! then returned so the caller knows a cached copy may outlive the revoke.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::{Cache, MemoryCache};
use crate::clock::{Clock, SystemClock};
use crate::config::{Cache as CacheConfig, Config, Session as SessionConfig};
use crate::db::{self, TokenRow};
use crate::error::{Error, Result};

/// Rows fetched per page when enumerating an actor's tokens.
const REVOKE_PAGE_SIZE: u32 = 100;

/// A session token bound to one actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub token: String,
    pub actor_id: i64,
    /// UNIX seconds.
    pub created_at: i64,
    /// UNIX seconds; the token is invalid once `now > expires_at`.
    pub expires_at: i64,
}

impl SessionToken {
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }
}

impl From<TokenRow> for SessionToken {
    fn from(row: TokenRow) -> Self {
        Self {
            token: row.token,
            actor_id: row.actor_id,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

/// What the cache holds for a token key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
enum Cached {
    Active {
        actor_id: i64,
        created_at: i64,
        expires_at: i64,
    },
    Revoked,
}

fn cache_key(token: &str) -> String {
    format!("token:{token}")
}

/// Session tokens over a fast cache and the durable store.
pub struct SessionStore<C = MemoryCache> {
    db: db::Handle,
    cache: C,
    clock: Arc<dyn Clock>,
    window: Duration,
    cache_timeout: Duration,
    default_ttl_secs: u64,
}

impl SessionStore<MemoryCache> {
    /// Build a store with an in-process cache sized from config.
    pub fn from_config(db: db::Handle, config: &Config) -> Self {
        SessionStore::new(db, MemoryCache::new(config.cache.capacity), &config.cache)
            .with_default_ttl(config.session.default_ttl_secs)
    }
}

impl<C: Cache> SessionStore<C> {
    pub fn new(db: db::Handle, cache: C, config: &CacheConfig) -> Self {
        Self {
            db,
            cache,
            clock: Arc::new(SystemClock),
            window: Duration::from_secs(config.session_window_secs),
            cache_timeout: Duration::from_millis(config.timeout_ms),
            default_ttl_secs: SessionConfig::default().default_ttl_secs,
        }
    }

    /// Lifetime used by [`SessionStore::create_default`].
    pub fn with_default_ttl(mut self, secs: u64) -> Self {
        self.default_ttl_secs = secs;
        self
    }

    /// Replace the clock used for expiry decisions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Issue a token with the configured default lifetime.
    pub async fn create_default(&self, actor_id: i64) -> Result<SessionToken> {
        self.create(actor_id, self.default_ttl_secs).await
    }

    /// Issue a token for `actor_id` that expires `ttl_secs` from now.
    ///
    /// Actor ids must be positive; `0` is reserved for guests.
    pub async fn create(&self, actor_id: i64, ttl_secs: u64) -> Result<SessionToken> {
        if actor_id <= 0 {
            return Err(Error::Validation(format!(
                "cannot issue a token for actor id {actor_id}"
            )));
        }
        let ttl = i64::try_from(ttl_secs)
            .map_err(|_| Error::Validation(format!("token ttl {ttl_secs}s is too large")))?;
        let now = self.clock.now();
        let session = SessionToken {
            token: Uuid::new_v4().simple().to_string(),
            actor_id,
            created_at: now,
            expires_at: now.saturating_add(ttl),
        };

        self.db
            .insert_token(&TokenRow {
                token: session.token.clone(),
                actor_id: session.actor_id,
                created_at: session.created_at,
                expires_at: session.expires_at,
            })
            .await?;

        let ttl = Duration::from_secs(ttl_secs);
        if !ttl.is_zero() && ttl <= self.window {
            // The durable row is authoritative; a failed cache write only
            // costs a later cache miss.
            if let Err(e) = self.cache_put(&session, ttl).await {
                tracing::warn!(actor_id, error = %e, "Session cache write failed");
            }
        }

        tracing::debug!(actor_id, expires_at = session.expires_at, "Created session token");
        Ok(session)
    }

    /// Whether `token` is live and bound to `actor_id`.
    pub async fn validate(&self, actor_id: i64, token: &str) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .lookup(token)
            .await?
            .is_some_and(|s| s.actor_id == actor_id && !s.is_expired(now)))
    }

    /// The actor bound to `token`, or `None` when it is missing, revoked or
    /// expired.
    pub async fn strip_actor_id(&self, token: &str) -> Result<Option<i64>> {
        let now = self.clock.now();
        Ok(self
            .lookup(token)
            .await?
            .filter(|s| !s.is_expired(now))
            .map(|s| s.actor_id))
    }

    /// Fetch a token unconditionally. Expired tokens are still returned;
    /// missing or revoked ones are `NotFound`.
    pub async fn get(&self, token: &str) -> Result<SessionToken> {
        self.lookup(token)
            .await?
            .ok_or_else(|| Error::NotFound("session token".to_string()))
    }

    /// Revoke one token. Revoking an unknown token is not an error.
    ///
    /// A cache failure is returned only after the durable row is gone.
    pub async fn revoke(&self, token: &str) -> Result<()> {
        let marked = self.mark_revoked(token).await;
        self.db.delete_token(token).await?;
        if let Err(e) = marked {
            tracing::warn!(error = %e, "Revoked session token without cache marker");
            return Err(e);
        }
        tracing::debug!("Revoked session token");
        Ok(())
    }

    /// Revoke every token of `actor_id`. Returns how many durable rows were
    /// deleted.
    ///
    /// As with [`SessionStore::revoke`], the rows are deleted even when the
    /// cache is unreachable, and the first cache failure is returned after.
    pub async fn revoke_all(&self, actor_id: i64) -> Result<usize> {
        let mut skip = 0;
        let mut marked = std::collections::HashSet::new();
        let mut cache_failure = None;
        loop {
            let page = self
                .db
                .tokens_for_actor(actor_id, REVOKE_PAGE_SIZE, skip)
                .await?;
            for row in &page {
                match self.mark_revoked(&row.token).await {
                    Ok(()) => {
                        marked.insert(row.token.clone());
                    }
                    Err(e) => {
                        cache_failure.get_or_insert(e);
                    }
                }
            }
            if page.len() < REVOKE_PAGE_SIZE as usize {
                break;
            }
            skip += REVOKE_PAGE_SIZE;
        }

        let deleted = self.db.delete_tokens_for_actor(actor_id).await?;
        // Tokens issued while the pages above were read, plus any whose
        // marker failed the first time.
        for token in deleted.iter().filter(|t| !marked.contains(*t)) {
            if let Err(e) = self.mark_revoked(token).await {
                cache_failure.get_or_insert(e);
            }
        }

        if let Some(e) = cache_failure {
            tracing::warn!(
                actor_id,
                revoked = deleted.len(),
                error = %e,
                "Revoked session tokens without cache markers"
            );
            return Err(e);
        }
        tracing::info!(actor_id, revoked = deleted.len(), "Revoked all session tokens");
        Ok(deleted.len())
    }

    /// Cache-aside read. `None` means absent from both tiers or revoked.
    async fn lookup(&self, token: &str) -> Result<Option<SessionToken>> {
        match self.cache_get(token).await {
            Ok(Some(Cached::Active {
                actor_id,
                created_at,
                expires_at,
            })) => {
                return Ok(Some(SessionToken {
                    token: token.to_string(),
                    actor_id,
                    created_at,
                    expires_at,
                }));
            }
            Ok(Some(Cached::Revoked)) => return Ok(None),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Session cache read failed, using durable store");
            }
        }

        let Some(session) = self.db.find_token(token).await?.map(SessionToken::from) else {
            return Ok(None);
        };
        self.backfill(&session).await;
        Ok(Some(session))
    }

    /// Best-effort cache fill after a miss, bounded by the session window
    /// and the token's remaining lifetime.
    async fn backfill(&self, session: &SessionToken) {
        let remaining = session.expires_at - self.clock.now();
        if remaining <= 0 {
            return;
        }
        let ttl = Duration::from_secs(remaining as u64).min(self.window);
        let value = match serde_json::to_string(&Cached::from(session)) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Could not encode session for cache");
                return;
            }
        };
        let key = cache_key(&session.token);
        match tokio::time::timeout(self.cache_timeout, self.cache.set_if_absent(&key, value, ttl))
            .await
        {
            Ok(Ok(inserted)) => {
                tracing::debug!(actor_id = session.actor_id, inserted, "Backfilled session cache");
            }
            Ok(Err(e)) => tracing::warn!(error = %e, "Session cache backfill failed"),
            Err(_) => tracing::warn!("Session cache backfill timed out"),
        }
    }

    async fn cache_get(&self, token: &str) -> Result<Option<Cached>> {
        let raw = tokio::time::timeout(self.cache_timeout, self.cache.get(&cache_key(token)))
            .await
            .map_err(|_| Error::Timeout("cache"))??;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn cache_put(&self, session: &SessionToken, ttl: Duration) -> Result<()> {
        let value = serde_json::to_string(&Cached::from(session))?;
        tokio::time::timeout(
            self.cache_timeout,
            self.cache.set(&cache_key(&session.token), value, ttl),
        )
        .await
        .map_err(|_| Error::Timeout("cache"))?
    }

    /// Shadow any cached copy of `token` with a revocation marker.
    ///
    /// Failures are reported: a stale active entry would keep validating.
    async fn mark_revoked(&self, token: &str) -> Result<()> {
        let value = serde_json::to_string(&Cached::Revoked)?;
        tokio::time::timeout(
            self.cache_timeout,
            self.cache.set(&cache_key(token), value, self.window),
        )
        .await
        .map_err(|_| Error::Timeout("cache"))?
    }
}

impl From<&SessionToken> for Cached {
    fn from(session: &SessionToken) -> Self {
        Cached::Active {
            actor_id: session.actor_id,
            created_at: session.created_at,
            expires_at: session.expires_at,
        }
    }
}
