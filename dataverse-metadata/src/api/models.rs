//! Metadata records returned by the remote schema catalog.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An unmanaged solution visible in the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionInfo {
    pub unique_name: String,
    pub friendly_name: String,
    pub version: Option<String>,
}

/// A table (entity) in the remote catalog.
///
/// Immutable once fetched within a session; everything mutable about a table
/// lives in the session store, keyed by `logical_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    pub logical_name: String,
    pub display_name: String,
    pub schema_name: Option<String>,
    pub object_type_code: Option<i64>,
    pub primary_id_attribute: Option<String>,
    pub primary_name_attribute: Option<String>,
}

impl TableMetadata {
    /// The attribute keys that can never be deselected for this table.
    pub fn required_attributes(&self) -> HashSet<String> {
        self.primary_id_attribute
            .iter()
            .chain(self.primary_name_attribute.iter())
            .cloned()
            .collect()
    }
}

/// A field belonging to exactly one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeMetadata {
    pub logical_name: String,
    pub schema_name: Option<String>,
    pub display_name: Option<String>,
    pub attribute_type: Option<String>,
    pub is_custom: bool,
}

impl AttributeMetadata {
    /// Label shown to the user: display name with schema-name fallback.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.schema_name.as_deref())
            .unwrap_or(&self.logical_name)
    }
}

/// A main form scoped to one table.
///
/// `form_xml` is the heavy detail blob; it is populated only when the listing
/// was fetched with detail included or after a dedicated detail fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormMetadata {
    pub id: String,
    pub name: String,
    pub form_xml: Option<String>,
}

/// A public view scoped to one table.
///
/// `fetch_xml` is the heavy detail blob, fetched separately from the summary
/// listing (typically only at export time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewMetadata {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub fetch_xml: Option<String>,
}
