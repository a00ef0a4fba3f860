//! Permission-gated operations.
//!
//! [`Interceptor::wrap`] turns an operation into one that first resolves the
//! calling actor from its credentials, loads that actor's value for a model
//! and checks a single permission bit. A denied call fails with
//! [`Error::PermissionDenied`] and the wrapped body never runs. Wrapped
//! operations have the same type as the original, so requirements stack.
//!
//! # Example
//!
//! ```ignore
//! use turnstile::guard::{self, Invocation};
//!
//! let create = guard::operation(|inv: Invocation<NewPost>| async move {
//!     posts::create(inv.args).await
//! });
//! let create = interceptor.wrap("discuss", "modifyOwn", create)?;
//! let create = interceptor.wrap("comment", "view", create)?;
//!
//! create(Invocation::new(credentials, post)).await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use hyper::http::HeaderMap;

use crate::cache::{Cache, MemoryCache};
use crate::error::{Error, Result};
use crate::grant::{Actor, Grants};
use crate::registry::Registry;
use crate::session::SessionStore;

/// Boxed future for async operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A shareable async operation taking an [`Invocation`].
pub type Operation<A, T> =
    Arc<dyn Fn(Invocation<A>) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Box a closure into an [`Operation`].
pub fn operation<A, T, F, Fut>(f: F) -> Operation<A, T>
where
    A: 'static,
    T: 'static,
    F: Fn(Invocation<A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Arc::new(
        move |invocation: Invocation<A>| -> BoxFuture<'static, Result<T>> {
            Box::pin(f(invocation))
        },
    )
}

/// What a caller presents to prove who it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Claimed actor id, verified against `token` when present.
    pub actor_id: Option<i64>,
    pub token: Option<String>,
}

impl Credentials {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A bare token; the actor is read from the token itself.
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            actor_id: None,
            token: Some(token.into()),
        }
    }

    /// A claimed actor id together with its token.
    pub fn claimed(actor_id: i64, token: impl Into<String>) -> Self {
        Self {
            actor_id: Some(actor_id),
            token: Some(token.into()),
        }
    }

    /// Read credentials from request headers.
    ///
    /// `Authorization: Bearer <token>` (scheme case-insensitive) wins over
    /// the `token` cookie. The `_uid` cookie supplies a claimed actor id.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let bearer = headers
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| {
                h.get(..7)
                    .filter(|p| p.eq_ignore_ascii_case("bearer "))
                    .map(|_| h[7..].trim().to_string())
            })
            .filter(|t| !t.is_empty());

        let mut cookie_token = None;
        let mut actor_id = None;
        for cookie in headers
            .get_all("Cookie")
            .iter()
            .filter_map(|h| h.to_str().ok())
            .flat_map(|h| h.split(';'))
        {
            match cookie.trim().split_once('=') {
                Some(("token", value)) if !value.is_empty() => {
                    cookie_token = Some(value.to_string())
                }
                Some(("_uid", value)) => actor_id = value.parse().ok(),
                _ => {}
            }
        }

        Self {
            actor_id,
            token: bearer.or(cookie_token),
        }
    }
}

/// Arguments for an operation plus the caller's credentials.
#[derive(Debug, Clone)]
pub struct Invocation<A> {
    pub credentials: Credentials,
    pub args: A,
}

impl<A> Invocation<A> {
    pub fn new(credentials: Credentials, args: A) -> Self {
        Self { credentials, args }
    }
}

/// Gate between callers and protected operations.
pub struct Interceptor<C = MemoryCache> {
    sessions: Arc<SessionStore<C>>,
    grants: Grants,
}

impl<C: Cache> Interceptor<C> {
    pub fn new(sessions: Arc<SessionStore<C>>, grants: Grants) -> Self {
        Self { sessions, grants }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.grants.registry()
    }

    pub fn sessions(&self) -> &Arc<SessionStore<C>> {
        &self.sessions
    }

    pub fn grants(&self) -> &Grants {
        &self.grants
    }

    /// Work out who is calling.
    ///
    /// A claimed id must be backed by a valid token for that id; otherwise
    /// the actor is read from the token. Anything that does not verify, and
    /// any id that is not positive, is a guest. Store failures propagate.
    pub async fn resolve_actor(&self, credentials: &Credentials) -> Result<Actor> {
        let Some(token) = credentials.token.as_deref() else {
            return Ok(Actor::Guest);
        };
        let actor_id = match credentials.actor_id {
            Some(id) if id > 0 => self
                .sessions
                .validate(id, token)
                .await?
                .then_some(id),
            _ => self.sessions.strip_actor_id(token).await?,
        };
        Ok(match actor_id {
            Some(id) if id > 0 => Actor::User(id),
            _ => Actor::Guest,
        })
    }

    /// Check `permission` of `model` for the caller.
    ///
    /// Returns the resolved actor when allowed.
    pub async fn authorize(
        &self,
        credentials: &Credentials,
        model: &str,
        permission: &str,
    ) -> Result<Actor> {
        let actor = self.resolve_actor(credentials).await?;
        let model = self.registry().lookup(model)?;
        let value = self.grants.value_for(actor, &model).await?;

        if model.check(value, permission)? {
            tracing::debug!(actor_id = actor.id(), model = model.name(), permission, "Allowed");
            Ok(actor)
        } else {
            tracing::debug!(actor_id = actor.id(), model = model.name(), permission, "Denied");
            Err(Error::PermissionDenied {
                actor_id: actor.id(),
                permission: permission.to_string(),
            })
        }
    }

    /// Gate `op` behind `permission` of `model`.
    ///
    /// Fails immediately when the model is unregistered or does not declare
    /// the permission.
    pub fn wrap<A, T>(
        self: &Arc<Self>,
        model: &str,
        permission: &str,
        op: Operation<A, T>,
    ) -> Result<Operation<A, T>>
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        let declared = self.registry().lookup(model)?;
        if !declared.contains(permission) {
            return Err(Error::NotFound(format!(
                "permission `{permission}` in model `{model}`"
            )));
        }

        let interceptor = Arc::clone(self);
        let model = model.to_string();
        let permission = permission.to_string();
        Ok(Arc::new(
            move |invocation: Invocation<A>| -> BoxFuture<'static, Result<T>> {
                let interceptor = Arc::clone(&interceptor);
                let model = model.clone();
                let permission = permission.clone();
                let op = Arc::clone(&op);
                Box::pin(async move {
                    interceptor
                        .authorize(&invocation.credentials, &model, &permission)
                        .await?;
                    op(invocation).await
                })
            },
        ))
    }
}
