//! Durable state: persisted preferences and the metadata cache.

pub mod models;
pub mod store;

pub use models::{MetadataCache, Preferences};
pub use store::{PersistenceError, SettingsStore};
