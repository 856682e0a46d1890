//! Session state engine.
//!
//! [`MetadataSession`] coordinates everything: it owns the [`SessionStore`],
//! fans fetches out through the [`FetchOrchestrator`] and applies their
//! results, reconciling fresh data with persisted selections via the pure
//! functions in [`reconcile`].

pub mod engine;
pub mod load_state;
pub mod orchestrator;
pub mod reconcile;
pub mod store;

pub use engine::MetadataSession;
pub use load_state::{LoadState, ResourceKind, TableLoadState};
pub use orchestrator::{FETCH_CONCURRENCY, FetchOrchestrator, FetchOutcome, FetchedData};
pub use reconcile::{
    DEFAULT_ATTRIBUTE_KEYS, reconcile_attributes, reconcile_form, reconcile_view,
};
pub use store::{SelectionSnapshot, SessionStore, TableSelection, TableState};
