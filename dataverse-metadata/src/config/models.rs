//! Durable record shapes: user preferences and the metadata cache.
//!
//! The two records have independent lifecycles. Preferences always apply at
//! session start (best effort); the cache applies only when
//! [`MetadataCache::is_valid_for`] holds for the requested source and
//! solution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::api::{AttributeMetadata, FormMetadata, TableMetadata, ViewMetadata};

/// User choices persisted across sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub environment_url: String,
    #[serde(default)]
    pub last_solution: String,
    /// Tables that were selected when the last session ended.
    #[serde(default)]
    pub selected_tables: Vec<String>,
    /// Chosen form id per table.
    #[serde(default)]
    pub table_forms: HashMap<String, String>,
    /// Chosen view id per table.
    #[serde(default)]
    pub table_views: HashMap<String, String>,
    /// Selected attribute keys per table.
    #[serde(default)]
    pub table_attributes: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub output_folder: String,
    #[serde(default)]
    pub project_name: String,
}

impl Preferences {
    /// Saved attribute selection for one table, if any.
    pub fn saved_attributes(&self, table: &str) -> Option<&[String]> {
        self.table_attributes.get(table).map(Vec::as_slice)
    }

    pub fn saved_form(&self, table: &str) -> Option<&str> {
        self.table_forms.get(table).map(String::as_str)
    }

    pub fn saved_view(&self, table: &str) -> Option<&str> {
        self.table_views.get(table).map(String::as_str)
    }
}

/// Snapshot of fetched catalog metadata, valid for one (source, solution)
/// pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataCache {
    #[serde(default)]
    pub environment_url: String,
    #[serde(default)]
    pub solution_name: String,
    /// Every table in the solution, as last listed.
    #[serde(default)]
    pub tables: Vec<TableMetadata>,
    /// Metadata of the tables that were selected, keyed by logical name.
    #[serde(default)]
    pub table_data: HashMap<String, TableMetadata>,
    #[serde(default)]
    pub table_attributes: HashMap<String, Vec<AttributeMetadata>>,
    #[serde(default)]
    pub table_forms: HashMap<String, Vec<FormMetadata>>,
    #[serde(default)]
    pub table_views: HashMap<String, Vec<ViewMetadata>>,
}

impl MetadataCache {
    /// Whether this cache can stand in for a fresh catalog listing of the
    /// given environment and solution. An empty table list never validates,
    /// regardless of identity.
    pub fn is_valid_for(&self, environment_url: &str, solution: &str) -> bool {
        self.environment_url == environment_url
            && self.solution_name == solution
            && !self.tables.is_empty()
    }
}
