//! Reconciliation of freshly fetched metadata with persisted selections.
//!
//! Every function here is pure and total: the same (fetched data, saved
//! preference) pair always yields the same selection, independent of fetch
//! arrival order. Saved references that no longer exist upstream are dropped
//! silently, never reported as errors.

use std::collections::HashSet;

use crate::api::{AttributeMetadata, FormMetadata, TableMetadata, ViewMetadata};

/// Standard audit/ownership/state attributes selected by default the first
/// time a table is seen, when no saved selection exists for it.
pub const DEFAULT_ATTRIBUTE_KEYS: [&str; 7] = [
    "createdon",
    "modifiedon",
    "createdby",
    "modifiedby",
    "ownerid",
    "statecode",
    "statuscode",
];

/// Compute the attribute selection for one table.
///
/// The table's primary id and primary name attributes are always included.
/// A saved selection is replayed key by key, keeping only keys that still
/// exist in the fetched collection. Without a saved selection, the standard
/// keys from [`DEFAULT_ATTRIBUTE_KEYS`] that exist in the fetched collection
/// are selected.
pub fn reconcile_attributes(
    table: &TableMetadata,
    fetched: &[AttributeMetadata],
    saved: Option<&[String]>,
) -> HashSet<String> {
    let available: HashSet<&str> = fetched.iter().map(|a| a.logical_name.as_str()).collect();

    let mut selection = table.required_attributes();

    match saved {
        Some(keys) if !keys.is_empty() => {
            selection.extend(
                keys.iter()
                    .filter(|key| available.contains(key.as_str()))
                    .cloned(),
            );
        }
        _ => {
            selection.extend(
                fetched
                    .iter()
                    .filter(|a| DEFAULT_ATTRIBUTE_KEYS.contains(&a.logical_name.as_str()))
                    .map(|a| a.logical_name.clone()),
            );
        }
    }

    selection
}

/// Choose the form for one table: the saved form if it still exists, else the
/// first form in listing order, else none.
pub fn reconcile_form(forms: &[FormMetadata], saved: Option<&str>) -> Option<String> {
    saved
        .and_then(|id| forms.iter().find(|f| f.id == id))
        .or_else(|| forms.first())
        .map(|f| f.id.clone())
}

/// Choose the view for one table: the saved view if it still exists, else the
/// view flagged as default, else the first view in listing order, else none.
pub fn reconcile_view(views: &[ViewMetadata], saved: Option<&str>) -> Option<String> {
    saved
        .and_then(|id| views.iter().find(|v| v.id == id))
        .or_else(|| views.iter().find(|v| v.is_default))
        .or_else(|| views.first())
        .map(|v| v.id.clone())
}
