//! Registry of named permission models.
//!
//! Each feature module (user, discuss, comment, ...) registers its model once
//! during start-up. The registry is then frozen behind an `Arc` and shared
//! read-only with every component that evaluates permissions.
//!
//! ```
//! use turnstile::registry::Registry;
//!
//! let mut registry = Registry::new();
//! registry
//!     .register(
//!         "comment",
//!         &["view", "modifyOwn", "modifyAll", "delete"],
//!         &["View comments", "Edit own comments", "Edit any comment", "Delete comments"],
//!         3,
//!         1,
//!     )
//!     .unwrap();
//! assert!(registry.lookup("comment").is_ok());
//! ```

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::permission::{self, MAX_PERMISSIONS, Mode, PermissionValue};

/// Permission layout and defaults for one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    name: String,
    permissions: Vec<String>,
    explanations: Vec<String>,
    default_value: PermissionValue,
    guest_value: PermissionValue,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Permission names in bit order.
    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    /// Value for an authenticated actor without a stored row.
    pub fn default_value(&self) -> PermissionValue {
        self.default_value
    }

    /// Value for an anonymous actor.
    pub fn guest_value(&self) -> PermissionValue {
        self.guest_value
    }

    /// Human-readable description of a permission.
    pub fn explain(&self, name: &str) -> Option<&str> {
        permission::index_of(&self.permissions, name).map(|i| self.explanations[i].as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        permission::index_of(&self.permissions, name).is_some()
    }

    pub fn encode<S: AsRef<str>>(&self, selected: &[S], mode: Mode) -> Result<u64> {
        permission::encode(&self.permissions, selected, mode)
    }

    pub fn decode(&self, value: PermissionValue) -> Vec<&str> {
        permission::decode(&self.permissions, value)
    }

    pub fn check(&self, value: PermissionValue, name: &str) -> Result<bool> {
        permission::check(value, &self.permissions, name)
    }

    pub fn add<S: AsRef<str>>(
        &self,
        value: PermissionValue,
        selected: &[S],
        mode: Mode,
    ) -> Result<PermissionValue> {
        permission::add_permission(value, &self.permissions, selected, mode)
    }

    pub fn remove<S: AsRef<str>>(
        &self,
        value: PermissionValue,
        selected: &[S],
        mode: Mode,
    ) -> Result<PermissionValue> {
        permission::remove_permission(value, &self.permissions, selected, mode)
    }

    /// Bind a value to this model for in-place editing.
    pub fn bind(&self, value: PermissionValue) -> PermissionSet<'_> {
        PermissionSet { model: self, value }
    }
}

/// A permission value paired with the model that gives its bits meaning.
#[derive(Debug, Clone, Copy)]
pub struct PermissionSet<'m> {
    model: &'m Model,
    value: PermissionValue,
}

impl PermissionSet<'_> {
    pub fn value(&self) -> PermissionValue {
        self.value
    }

    pub fn has(&self, name: &str) -> Result<bool> {
        self.model.check(self.value, name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.model.decode(self.value)
    }

    pub fn grant<S: AsRef<str>>(&mut self, selected: &[S], mode: Mode) -> Result<()> {
        self.value = self.model.add(self.value, selected, mode)?;
        Ok(())
    }

    pub fn revoke<S: AsRef<str>>(&mut self, selected: &[S], mode: Mode) -> Result<()> {
        self.value = self.model.remove(self.value, selected, mode)?;
        Ok(())
    }
}

/// Process-wide table of permission models.
///
/// Mutated only during start-up; share it as `Arc<Registry>` afterwards.
#[derive(Debug, Default)]
pub struct Registry {
    models: HashMap<String, Arc<Model>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model.
    ///
    /// Registering a name twice is a [`Error::Conflict`]; models are
    /// immutable once registered. `explanations` must pair one-to-one with
    /// `permissions`, and both defaults must fit within the list's bits
    /// (or be `-1` for all permissions).
    pub fn register<P: AsRef<str>, E: AsRef<str>>(
        &mut self,
        name: &str,
        permissions: &[P],
        explanations: &[E],
        default_value: i64,
        guest_value: i64,
    ) -> Result<Arc<Model>> {
        if self.models.contains_key(name) {
            return Err(Error::Conflict(format!(
                "permission model `{name}` is already registered"
            )));
        }
        if permissions.len() > MAX_PERMISSIONS {
            return Err(Error::Validation(format!(
                "model `{name}` declares {} permissions, at most {MAX_PERMISSIONS} fit",
                permissions.len()
            )));
        }
        if explanations.len() != permissions.len() {
            return Err(Error::Validation(format!(
                "model `{name}` has {} permissions but {} explanations",
                permissions.len(),
                explanations.len()
            )));
        }
        let mut seen = HashSet::new();
        for permission in permissions {
            if !seen.insert(permission.as_ref()) {
                return Err(Error::Validation(format!(
                    "model `{name}` lists permission `{}` twice",
                    permission.as_ref()
                )));
            }
        }

        let full = permission::full_mask(permissions.len());
        let fits = |raw: i64, label: &str| -> Result<PermissionValue> {
            let value = PermissionValue::from_stored(raw)?;
            match value {
                PermissionValue::Bitmask(bits) if bits & !full != 0 => Err(Error::Validation(
                    format!("{label} value {raw} of model `{name}` sets undeclared bits"),
                )),
                value => Ok(value),
            }
        };
        let default_value = fits(default_value, "default")?;
        let guest_value = fits(guest_value, "guest")?;

        let model = Arc::new(Model {
            name: name.to_string(),
            permissions: permissions.iter().map(|p| p.as_ref().to_string()).collect(),
            explanations: explanations.iter().map(|e| e.as_ref().to_string()).collect(),
            default_value,
            guest_value,
        });
        self.models.insert(name.to_string(), Arc::clone(&model));
        tracing::info!(
            model = name,
            permissions = model.permissions.len(),
            "Registered permission model"
        );
        Ok(model)
    }

    /// Look up a registered model.
    pub fn lookup(&self, name: &str) -> Result<Arc<Model>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("permission model `{name}`")))
    }

    /// Registered model names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
