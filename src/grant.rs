//! Stored permission values.
//!
//! Each actor may hold one stored value per model in the `perm` table. An
//! actor without a row gets the model's default value; anonymous callers
//! always get the guest value and never read the store.
//!
//! Updates are read-modify-write without locking, so concurrent edits of
//! the same `(actor, model)` pair race and the last write wins.

use std::sync::Arc;

use crate::db;
use crate::error::Result;
use crate::permission::{Mode, PermissionValue};
use crate::registry::{Model, Registry};

/// Who is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actor {
    /// Anonymous caller.
    Guest,
    /// Authenticated actor id.
    User(i64),
}

impl Actor {
    /// Id reported in denials; guests are `0`.
    pub fn id(self) -> i64 {
        match self {
            Actor::Guest => 0,
            Actor::User(id) => id,
        }
    }

    pub fn is_guest(self) -> bool {
        matches!(self, Actor::Guest)
    }
}

/// Read and edit stored permission values.
#[derive(Debug, Clone)]
pub struct Grants {
    registry: Arc<Registry>,
    db: db::Handle,
}

impl Grants {
    pub fn new(registry: Arc<Registry>, db: db::Handle) -> Self {
        Self { registry, db }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Effective value of `actor` for `model`.
    pub async fn value_for(&self, actor: Actor, model: &Model) -> Result<PermissionValue> {
        match actor {
            Actor::Guest => Ok(model.guest_value()),
            Actor::User(id) => self.stored_or_default(id, model).await,
        }
    }

    async fn stored_or_default(&self, actor_id: i64, model: &Model) -> Result<PermissionValue> {
        match self.db.load_permission(actor_id, model.name()).await? {
            Some(raw) => PermissionValue::from_stored(raw),
            None => Ok(model.default_value()),
        }
    }

    /// Names `actor_id` holds for `model`, in list order.
    pub async fn list(&self, actor_id: i64, model: &str) -> Result<Vec<String>> {
        let model = self.registry.lookup(model)?;
        let value = self.stored_or_default(actor_id, &model).await?;
        Ok(model.decode(value).into_iter().map(str::to_string).collect())
    }

    /// Add permissions to the actor's value and store the result.
    pub async fn grant<S: AsRef<str>>(
        &self,
        actor_id: i64,
        model: &str,
        selected: &[S],
        mode: Mode,
    ) -> Result<PermissionValue> {
        let model = self.registry.lookup(model)?;
        let current = self.stored_or_default(actor_id, &model).await?;
        let updated = model.add(current, selected, mode)?;
        self.db
            .save_permission(actor_id, model.name(), updated.to_stored())
            .await?;
        tracing::info!(actor_id, model = model.name(), value = updated.to_stored(), "Granted permissions");
        Ok(updated)
    }

    /// Remove permissions from the actor's value and store the result.
    pub async fn revoke<S: AsRef<str>>(
        &self,
        actor_id: i64,
        model: &str,
        selected: &[S],
        mode: Mode,
    ) -> Result<PermissionValue> {
        let model = self.registry.lookup(model)?;
        let current = self.stored_or_default(actor_id, &model).await?;
        let updated = model.remove(current, selected, mode)?;
        self.db
            .save_permission(actor_id, model.name(), updated.to_stored())
            .await?;
        tracing::info!(actor_id, model = model.name(), value = updated.to_stored(), "Revoked permissions");
        Ok(updated)
    }

    /// Overwrite the actor's stored value.
    pub async fn set(&self, actor_id: i64, model: &str, value: PermissionValue) -> Result<()> {
        let model = self.registry.lookup(model)?;
        let full = crate::permission::full_mask(model.permissions().len());
        if let PermissionValue::Bitmask(bits) = value
            && bits & !full != 0
        {
            return Err(crate::Error::Validation(format!(
                "value {bits} sets bits undeclared by model `{}`",
                model.name()
            )));
        }
        self.db
            .save_permission(actor_id, model.name(), value.to_stored())
            .await
    }

    /// Drop the stored row so the actor falls back to the model default.
    pub async fn reset(&self, actor_id: i64, model: &str) -> Result<bool> {
        let model = self.registry.lookup(model)?;
        self.db.delete_permission(actor_id, model.name()).await
    }
}
