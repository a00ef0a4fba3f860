//! Turnstile - authorization core for judge and training platforms.
//!
//! Turnstile provides the pieces every protected operation consults:
//!
//! - **Permission**: Bitmask codec and gate over named permission lists
//! - **Registry**: Per-model permission lists with default and guest values
//! - **Session**: Opaque session tokens over a fast cache and a durable store
//! - **Grant**: Stored per-actor permission values and their administration
//! - **Guard**: Wrapping of operations behind a permission check
//! - **Config**: Layered configuration (file → env → CLI)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use turnstile::{ConfigLoader, Credentials, Grants, Interceptor, Invocation, Registry, SessionStore};
//!
//! #[tokio::main]
//! async fn main() -> turnstile::Result<()> {
//!     let config = ConfigLoader::new("JUDGE").load(None, None, None, None)?;
//!     let db = turnstile::db::Handle::open(&config.database.url, config.database.timeout()).await?;
//!
//!     // Each feature module declares its model once at start-up.
//!     let mut registry = Registry::new();
//!     registry.register(
//!         "discuss",
//!         &["view", "modifyOwn", "modifyAll", "delete", "action"],
//!         &["View posts", "Edit own posts", "Edit any post", "Delete posts", "React"],
//!         3,
//!         1,
//!     )?;
//!     let registry = Arc::new(registry);
//!
//!     let sessions = Arc::new(SessionStore::from_config(db.clone(), &config));
//!     let interceptor = Arc::new(Interceptor::new(sessions, Grants::new(registry, db)));
//!
//!     let view = turnstile::guard::operation(|inv: Invocation<u64>| async move {
//!         Ok(format!("post {}", inv.args))
//!     });
//!     let view = interceptor.wrap("discuss", "view", view)?;
//!
//!     let body = view(Invocation::new(Credentials::anonymous(), 7)).await?;
//!     println!("{body}");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod grant;
pub mod guard;
pub mod permission;
pub mod registry;
pub mod session;

// Re-export main types at crate root
pub use cache::{Cache, MemoryCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigLoader};
pub use db::Handle as DbHandle;
pub use error::{Error, Result};
pub use grant::{Actor, Grants};
pub use guard::{Credentials, Interceptor, Invocation, Operation};
pub use permission::{Mode, PermissionValue};
pub use registry::{Model, PermissionSet, Registry};
pub use session::{SessionStore, SessionToken};
