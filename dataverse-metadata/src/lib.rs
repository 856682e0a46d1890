//! Session state engine for browsing a Dataverse schema catalog and
//! exporting a normalized metadata description.
//!
//! The engine fetches dependent metadata (attributes, forms, views) for many
//! tables concurrently, reconciles fresh data against selections persisted in
//! earlier sessions, and maintains a durable single-slot metadata cache keyed
//! by (environment, solution).
//!
//! - [`api`]: catalog access, the [`api::CatalogClient`] trait, the
//!   Dataverse Web API implementation, and form-XML field extraction.
//! - [`session`]: the engine proper, with store, orchestrator, reconciler
//!   and the [`session::MetadataSession`] coordinator.
//! - [`config`]: persisted preferences and the metadata cache.
//! - [`export`]: the all-or-nothing metadata dictionary export.

pub mod api;
pub mod config;
pub mod export;
pub mod session;

pub use api::{ApiError, CatalogClient, DataverseClient};
pub use config::{MetadataCache, Preferences, SettingsStore};
pub use export::{MetadataDocument, write_document};
pub use session::{LoadState, MetadataSession, ResourceKind, SessionStore};
