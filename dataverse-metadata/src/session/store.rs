//! In-memory authoritative state for one session.
//!
//! The store owns every piece of mutable session data: selected tables, their
//! fetched collections, per-table selections and load states. All mutations
//! are synchronous and performed by a single coordinator; fetch workers never
//! touch the store directly. Every operation leaves the store consistent:
//! required attributes are always selected, chosen form/view ids always refer
//! to fetched records, and removing a table removes everything that hangs off
//! it.

use std::collections::{BTreeMap, HashSet};

use crate::api::{ApiError, AttributeMetadata, FormMetadata, TableMetadata, ViewMetadata};
use crate::config::Preferences;

use super::load_state::{LoadState, ResourceKind, TableLoadState};
use super::orchestrator::FetchedData;
use super::reconcile::{reconcile_attributes, reconcile_form, reconcile_view};

/// Per-table selection: chosen attribute keys, form and view.
#[derive(Debug, Clone, Default)]
pub struct TableSelection {
    pub attributes: HashSet<String>,
    /// `None` means "no form available" once forms are loaded.
    pub form_id: Option<String>,
    /// `None` means "no view available" once views are loaded.
    pub view_id: Option<String>,
}

/// Everything the session knows about one selected table.
#[derive(Debug, Clone)]
pub struct TableState {
    pub metadata: TableMetadata,
    pub attributes: Vec<AttributeMetadata>,
    pub forms: Vec<FormMetadata>,
    pub views: Vec<ViewMetadata>,
    pub selection: TableSelection,
    pub load: TableLoadState,
    /// Message of the most recent failed fetch, cleared on success.
    pub last_error: Option<String>,
}

impl TableState {
    fn new(metadata: TableMetadata) -> Self {
        Self {
            metadata,
            attributes: Vec::new(),
            forms: Vec::new(),
            views: Vec::new(),
            selection: TableSelection::default(),
            load: TableLoadState::default(),
            last_error: None,
        }
    }
}

/// One row of the selection snapshot handed to the presentation layer and the
/// exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSnapshot {
    pub table: String,
    /// Sorted for stable display and comparison.
    pub attributes: Vec<String>,
    pub form_id: Option<String>,
    pub view_id: Option<String>,
}

/// The mutable aggregate for one session.
#[derive(Debug, Default)]
pub struct SessionStore {
    tables: BTreeMap<String, TableState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add tables to the selection. Idempotent per key: tables already
    /// present are left untouched. Returns the keys that were actually added.
    pub fn add_tables(&mut self, tables: Vec<TableMetadata>) -> Vec<String> {
        let mut added = Vec::new();
        for metadata in tables {
            let key = metadata.logical_name.clone();
            if self.tables.contains_key(&key) {
                continue;
            }
            self.tables.insert(key.clone(), TableState::new(metadata));
            added.push(key);
        }
        added
    }

    /// Remove a table and everything that hangs off it. No orphaned state
    /// survives; a fetch still in flight for the key will have its result
    /// discarded on arrival.
    pub fn remove_table(&mut self, key: &str) -> bool {
        self.tables.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tables.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&TableState> {
        self.tables.get(key)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableState> {
        self.tables.values()
    }

    pub fn table_keys(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Move a (table, kind) to `Loading`. Returns `false` when the table is
    /// unknown or the kind is already `Loading` (no duplicate in-flight
    /// work); re-entry from `Loaded` is allowed and treated as a refresh.
    pub fn begin_fetch(&mut self, key: &str, kind: ResourceKind) -> bool {
        let Some(state) = self.tables.get_mut(key) else {
            return false;
        };
        if state.load.get(kind).is_loading() {
            return false;
        }
        state.load.set(kind, LoadState::Loading);
        true
    }

    /// Apply one fetch completion.
    ///
    /// Results for keys no longer in the store are discarded silently; a
    /// removed table must not resurrect. Successful data is reconciled
    /// against the given preferences, so replaying the same result is
    /// idempotent. A failure marks only this (table, kind) as `Failed`.
    pub fn apply_fetch_result(
        &mut self,
        key: &str,
        kind: ResourceKind,
        result: Result<FetchedData, ApiError>,
        preferences: &Preferences,
    ) {
        let Some(state) = self.tables.get_mut(key) else {
            log::debug!("Dropping {} result for removed table {}", kind.label(), key);
            return;
        };

        match result {
            Ok(FetchedData::Attributes(attributes)) => {
                state.selection.attributes = reconcile_attributes(
                    &state.metadata,
                    &attributes,
                    preferences.saved_attributes(key),
                );
                state.attributes = attributes;
                state.load.set(ResourceKind::Attributes, LoadState::Loaded);
                state.last_error = None;
            }
            Ok(FetchedData::FormsAndViews { forms, views }) => {
                state.selection.form_id = reconcile_form(&forms, preferences.saved_form(key));
                state.selection.view_id = reconcile_view(&views, preferences.saved_view(key));
                state.forms = forms;
                state.views = views;
                state.load.set(ResourceKind::FormsAndViews, LoadState::Loaded);
                state.last_error = None;
            }
            Err(err) => {
                state.load.set(kind, LoadState::Failed);
                state.last_error = Some(err.to_string());
                log::warn!("Loading {} for {} failed: {}", kind.label(), key, err);
            }
        }
    }

    /// Toggle one attribute in a table's selection. A no-op (returning
    /// `false`) for required attributes, unknown tables and attributes not
    /// present in the fetched collection.
    pub fn toggle_attribute(&mut self, key: &str, attribute: &str) -> bool {
        let Some(state) = self.tables.get_mut(key) else {
            return false;
        };
        if state.metadata.required_attributes().contains(attribute) {
            return false;
        }
        if !state
            .attributes
            .iter()
            .any(|a| a.logical_name == attribute)
        {
            return false;
        }

        if !state.selection.attributes.remove(attribute) {
            state.selection.attributes.insert(attribute.to_string());
        }
        true
    }

    /// Select every fetched attribute of a table.
    pub fn select_all_attributes(&mut self, key: &str) -> bool {
        let Some(state) = self.tables.get_mut(key) else {
            return false;
        };
        state.selection.attributes = state
            .attributes
            .iter()
            .map(|a| a.logical_name.clone())
            .collect();
        state
            .selection
            .attributes
            .extend(state.metadata.required_attributes());
        true
    }

    /// Reset a table's selection to its required attributes.
    pub fn clear_attribute_selection(&mut self, key: &str) -> bool {
        let Some(state) = self.tables.get_mut(key) else {
            return false;
        };
        state.selection.attributes = state.metadata.required_attributes();
        true
    }

    /// Union a set of lowercase field names (extracted from form markup) into
    /// a table's selection. Returns how many attributes are selected after.
    pub fn apply_form_fields(&mut self, key: &str, fields: &HashSet<String>) -> usize {
        let Some(state) = self.tables.get_mut(key) else {
            return 0;
        };
        state.selection.attributes.extend(
            state
                .attributes
                .iter()
                .filter(|a| fields.contains(&a.logical_name.to_lowercase()))
                .map(|a| a.logical_name.clone()),
        );
        state
            .selection
            .attributes
            .extend(state.metadata.required_attributes());
        state.selection.attributes.len()
    }

    /// Remember lazily fetched form markup so a later export does not fetch
    /// it again.
    pub fn cache_form_xml(&mut self, key: &str, form_id: &str, form_xml: String) -> bool {
        let Some(state) = self.tables.get_mut(key) else {
            return false;
        };
        match state.forms.iter_mut().find(|f| f.id == form_id) {
            Some(form) => {
                form.form_xml = Some(form_xml);
                true
            }
            None => false,
        }
    }

    /// Choose a form for a table. Rejected when the id is not in the fetched
    /// form collection.
    pub fn select_form(&mut self, key: &str, form_id: &str) -> bool {
        let Some(state) = self.tables.get_mut(key) else {
            return false;
        };
        if !state.forms.iter().any(|f| f.id == form_id) {
            return false;
        }
        state.selection.form_id = Some(form_id.to_string());
        true
    }

    /// Choose a view for a table. Rejected when the id is not in the fetched
    /// view collection.
    pub fn select_view(&mut self, key: &str, view_id: &str) -> bool {
        let Some(state) = self.tables.get_mut(key) else {
            return false;
        };
        if !state.views.iter().any(|v| v.id == view_id) {
            return false;
        }
        state.selection.view_id = Some(view_id.to_string());
        true
    }

    /// Current selection per table, in stable key order.
    pub fn snapshot(&self) -> Vec<SelectionSnapshot> {
        self.tables
            .iter()
            .map(|(key, state)| {
                let mut attributes: Vec<String> =
                    state.selection.attributes.iter().cloned().collect();
                attributes.sort();
                SelectionSnapshot {
                    table: key.clone(),
                    attributes,
                    form_id: state.selection.form_id.clone(),
                    view_id: state.selection.view_id.clone(),
                }
            })
            .collect()
    }

    /// True once at least one table is selected and every selected table's
    /// attributes are `Loaded`.
    pub fn export_ready(&self) -> bool {
        !self.tables.is_empty()
            && self
                .tables
                .values()
                .all(|state| state.load.attributes.is_loaded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::MockCatalog;

    fn store_with(keys: &[&str]) -> SessionStore {
        let mut store = SessionStore::new();
        store.add_tables(
            keys.iter()
                .map(|k| MockCatalog::table(k, &format!("{k}id"), "name"))
                .collect(),
        );
        store
    }

    fn standard_attributes() -> Vec<AttributeMetadata> {
        vec![
            MockCatalog::attr("accountid"),
            MockCatalog::attr("name"),
            MockCatalog::attr("createdon"),
            MockCatalog::attr("custom_field"),
        ]
    }

    fn loaded_store(key: &str) -> SessionStore {
        let mut store = store_with(&[key]);
        store.begin_fetch(key, ResourceKind::Attributes);
        store.apply_fetch_result(
            key,
            ResourceKind::Attributes,
            Ok(FetchedData::Attributes(standard_attributes())),
            &Preferences::default(),
        );
        store
    }

    #[test]
    fn add_tables_is_idempotent_per_key() {
        let mut store = store_with(&["account"]);
        let added = store.add_tables(vec![
            MockCatalog::table("account", "accountid", "name"),
            MockCatalog::table("contact", "contactid", "fullname"),
        ]);
        assert_eq!(added, vec!["contact".to_string()]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn fresh_fetch_without_preferences_selects_defaults() {
        let store = loaded_store("account");
        let snapshot = store.snapshot();

        // custom_field is excluded; createdon is a standard default.
        assert_eq!(snapshot[0].attributes, ["accountid", "createdon", "name"]);
    }

    #[test]
    fn required_attributes_survive_any_toggle_sequence() {
        let mut store = loaded_store("account");

        for attr in ["accountid", "name", "createdon", "custom_field"] {
            store.toggle_attribute("account", attr);
            store.toggle_attribute("account", attr);
            store.toggle_attribute("account", attr);
        }

        let selection = &store.get("account").unwrap().selection.attributes;
        assert!(selection.contains("accountid"));
        assert!(selection.contains("name"));
    }

    #[test]
    fn toggling_a_required_attribute_is_a_noop() {
        let mut store = loaded_store("account");
        assert!(!store.toggle_attribute("account", "accountid"));
        assert!(
            store
                .get("account")
                .unwrap()
                .selection
                .attributes
                .contains("accountid")
        );
    }

    #[test]
    fn toggling_an_unknown_attribute_is_a_noop() {
        let mut store = loaded_store("account");
        assert!(!store.toggle_attribute("account", "no_such_field"));
    }

    #[test]
    fn stale_saved_attributes_are_dropped_without_error() {
        let mut store = store_with(&["account"]);
        let mut prefs = Preferences::default();
        prefs.table_attributes.insert(
            "account".into(),
            vec!["accountid".into(), "custom_field".into()],
        );

        // custom_field no longer exists upstream.
        let fetched = vec![MockCatalog::attr("accountid"), MockCatalog::attr("name")];
        store.begin_fetch("account", ResourceKind::Attributes);
        store.apply_fetch_result(
            "account",
            ResourceKind::Attributes,
            Ok(FetchedData::Attributes(fetched)),
            &prefs,
        );

        assert_eq!(store.snapshot()[0].attributes, ["accountid", "name"]);
    }

    #[test]
    fn removed_table_does_not_resurrect_from_late_results() {
        let mut store = store_with(&["account", "contact"]);
        store.begin_fetch("account", ResourceKind::Attributes);
        store.remove_table("account");

        let before = store.snapshot();
        store.apply_fetch_result(
            "account",
            ResourceKind::Attributes,
            Ok(FetchedData::Attributes(standard_attributes())),
            &Preferences::default(),
        );

        assert!(!store.contains("account"));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn remove_table_cascades_all_state() {
        let mut store = loaded_store("account");
        assert!(store.remove_table("account"));
        assert!(store.get("account").is_none());
        assert!(store.is_empty());
        assert!(!store.remove_table("account"));
    }

    #[test]
    fn begin_fetch_rejects_reentry_while_loading() {
        let mut store = store_with(&["account"]);
        assert!(store.begin_fetch("account", ResourceKind::Attributes));
        assert!(!store.begin_fetch("account", ResourceKind::Attributes));
        // The other kind is independent.
        assert!(store.begin_fetch("account", ResourceKind::FormsAndViews));
    }

    #[test]
    fn begin_fetch_allows_refresh_after_load() {
        let mut store = loaded_store("account");
        assert!(store.begin_fetch("account", ResourceKind::Attributes));

        // The refresh overwrites the previous snapshot for this key only.
        let fetched = vec![MockCatalog::attr("accountid"), MockCatalog::attr("name")];
        store.apply_fetch_result(
            "account",
            ResourceKind::Attributes,
            Ok(FetchedData::Attributes(fetched)),
            &Preferences::default(),
        );
        assert_eq!(store.get("account").unwrap().attributes.len(), 2);
    }

    #[test]
    fn failure_marks_only_the_affected_table() {
        let mut store = store_with(&["account", "contact"]);
        for key in ["account", "contact"] {
            store.begin_fetch(key, ResourceKind::Attributes);
        }

        store.apply_fetch_result(
            "account",
            ResourceKind::Attributes,
            Err(MockCatalog::transport_error()),
            &Preferences::default(),
        );
        store.apply_fetch_result(
            "contact",
            ResourceKind::Attributes,
            Ok(FetchedData::Attributes(vec![MockCatalog::attr("contactid")])),
            &Preferences::default(),
        );

        assert!(store.get("account").unwrap().load.attributes.is_failed());
        assert!(store.get("account").unwrap().last_error.is_some());
        assert!(store.get("contact").unwrap().load.attributes.is_loaded());
    }

    #[test]
    fn apply_order_does_not_change_the_final_state() {
        let keys = ["alpha", "beta", "gamma", "delta"];
        let results: Vec<(String, Result<FetchedData, ApiError>)> = keys
            .iter()
            .map(|k| {
                (
                    k.to_string(),
                    Ok(FetchedData::Attributes(vec![
                        MockCatalog::attr(&format!("{k}id")),
                        MockCatalog::attr("name"),
                        MockCatalog::attr("createdon"),
                    ])),
                )
            })
            .collect();

        let apply_in = |order: Vec<usize>| {
            let mut store = store_with(&keys);
            for key in &keys {
                store.begin_fetch(key, ResourceKind::Attributes);
            }
            for idx in order {
                let (key, result) = &results[idx];
                let replay = match result {
                    Ok(FetchedData::Attributes(attrs)) => {
                        Ok(FetchedData::Attributes(attrs.clone()))
                    }
                    _ => unreachable!(),
                };
                store.apply_fetch_result(
                    key,
                    ResourceKind::Attributes,
                    replay,
                    &Preferences::default(),
                );
            }
            store.snapshot()
        };

        let forward = apply_in(vec![0, 1, 2, 3]);
        let backward = apply_in(vec![3, 2, 1, 0]);
        let shuffled = apply_in(vec![2, 0, 3, 1]);
        assert_eq!(forward, backward);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn replaying_the_same_result_is_idempotent() {
        let mut store = store_with(&["account"]);
        let prefs = Preferences::default();
        store.begin_fetch("account", ResourceKind::Attributes);
        store.apply_fetch_result(
            "account",
            ResourceKind::Attributes,
            Ok(FetchedData::Attributes(standard_attributes())),
            &prefs,
        );
        let first = store.snapshot();

        store.apply_fetch_result(
            "account",
            ResourceKind::Attributes,
            Ok(FetchedData::Attributes(standard_attributes())),
            &prefs,
        );
        assert_eq!(store.snapshot(), first);
    }

    #[test]
    fn forms_and_views_reconcile_on_apply() {
        let mut store = store_with(&["account"]);
        let mut prefs = Preferences::default();
        prefs.table_forms.insert("account".into(), "F1".into());

        // F1 is gone upstream; first form wins. No saved view; the default
        // flag wins.
        store.begin_fetch("account", ResourceKind::FormsAndViews);
        store.apply_fetch_result(
            "account",
            ResourceKind::FormsAndViews,
            Ok(FetchedData::FormsAndViews {
                forms: vec![MockCatalog::form("F2", "Main"), MockCatalog::form("F3", "Alt")],
                views: vec![
                    MockCatalog::view("V1", "All", false),
                    MockCatalog::view("V2", "Active", true),
                ],
            }),
            &prefs,
        );

        let state = store.get("account").unwrap();
        assert_eq!(state.selection.form_id.as_deref(), Some("F2"));
        assert_eq!(state.selection.view_id.as_deref(), Some("V2"));
        assert!(state.load.forms_and_views.is_loaded());
    }

    #[test]
    fn select_form_and_view_validate_membership() {
        let mut store = store_with(&["account"]);
        store.begin_fetch("account", ResourceKind::FormsAndViews);
        store.apply_fetch_result(
            "account",
            ResourceKind::FormsAndViews,
            Ok(FetchedData::FormsAndViews {
                forms: vec![MockCatalog::form("F1", "Main")],
                views: vec![MockCatalog::view("V1", "Active", true)],
            }),
            &Preferences::default(),
        );

        assert!(store.select_form("account", "F1"));
        assert!(!store.select_form("account", "F9"));
        assert!(store.select_view("account", "V1"));
        assert!(!store.select_view("account", "V9"));
        assert_eq!(
            store.get("account").unwrap().selection.form_id.as_deref(),
            Some("F1")
        );
    }

    #[test]
    fn apply_form_fields_unions_into_selection() {
        let mut store = loaded_store("account");
        store.clear_attribute_selection("account");

        let fields: HashSet<String> = ["createdon", "custom_field", "not_an_attribute"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let count = store.apply_form_fields("account", &fields);

        let selection = &store.get("account").unwrap().selection.attributes;
        assert_eq!(count, selection.len());
        assert!(selection.contains("createdon"));
        assert!(selection.contains("custom_field"));
        assert!(selection.contains("accountid"));
        assert!(!selection.contains("not_an_attribute"));
    }

    #[test]
    fn export_ready_requires_every_table_loaded() {
        let mut store = store_with(&["account", "contact"]);
        assert!(!store.export_ready());

        for key in ["account", "contact"] {
            store.begin_fetch(key, ResourceKind::Attributes);
        }
        store.apply_fetch_result(
            "account",
            ResourceKind::Attributes,
            Ok(FetchedData::Attributes(standard_attributes())),
            &Preferences::default(),
        );
        assert!(!store.export_ready());

        store.apply_fetch_result(
            "contact",
            ResourceKind::Attributes,
            Ok(FetchedData::Attributes(vec![MockCatalog::attr("contactid")])),
            &Preferences::default(),
        );
        assert!(store.export_ready());
    }

    #[test]
    fn export_ready_is_false_for_an_empty_store() {
        assert!(!SessionStore::new().export_ready());
    }
}
