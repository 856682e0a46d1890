//! Session coordinator.
//!
//! One [`MetadataSession`] owns the session store and performs every
//! mutation; fetch workers spawned through the orchestrator only talk to the
//! catalog client and hand results back over the session's result channel.
//! Callers drive completions with [`MetadataSession::process_next`] (or
//! [`MetadataSession::wait_until_idle`]), so all business logic runs on the
//! coordinator regardless of how the fetches interleave.
//!
//! Preferences are written through after every selection mutation and the
//! metadata cache after every forms/views load; both writes are
//! fire-and-forget and never block or fail the session.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::api::{ApiError, CatalogClient, TableMetadata, extract_form_fields};
use crate::config::{MetadataCache, Preferences, SettingsStore};
use crate::export::{self, MetadataDocument};

use super::load_state::ResourceKind;
use super::orchestrator::{FetchOrchestrator, FetchOutcome, FetchedData};
use super::store::{SelectionSnapshot, SessionStore};

/// Coordinator for one session against one (environment, solution) pair.
pub struct MetadataSession {
    client: Arc<dyn CatalogClient>,
    store: SessionStore,
    settings: SettingsStore,
    preferences: Preferences,
    orchestrator: FetchOrchestrator,
    results: mpsc::UnboundedReceiver<FetchOutcome>,
    in_flight: usize,
    /// Every table the solution offers, as last listed.
    catalog: Vec<TableMetadata>,
    environment_url: String,
    solution: String,
    status: String,
}

impl MetadataSession {
    pub fn new(
        client: Arc<dyn CatalogClient>,
        settings: SettingsStore,
        environment_url: impl Into<String>,
        solution: impl Into<String>,
    ) -> Self {
        let preferences = settings.load_preferences();
        let (results_tx, results) = mpsc::unbounded_channel();
        let orchestrator = FetchOrchestrator::new(Arc::clone(&client), results_tx);

        Self {
            client,
            store: SessionStore::new(),
            settings,
            preferences,
            orchestrator,
            results,
            in_flight: 0,
            catalog: Vec::new(),
            environment_url: environment_url.into(),
            solution: solution.into(),
            status: "Ready".into(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn catalog(&self) -> &[TableMetadata] {
        &self.catalog
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Number of fetches spawned but not yet applied.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Seed the session from the durable metadata cache, when it is valid
    /// for this (environment, solution) pair. Returns whether anything was
    /// restored; an invalid or missing cache is simply skipped.
    pub fn restore_from_cache(&mut self) -> bool {
        let cache = self.settings.load_cache();
        if !cache.is_valid_for(&self.environment_url, &self.solution) {
            return false;
        }

        self.catalog = cache.tables.clone();

        let mut keys: Vec<String> = cache.table_data.keys().cloned().collect();
        keys.sort();

        for key in &keys {
            let Some(metadata) = cache.table_data.get(key) else {
                continue;
            };
            self.store.add_tables(vec![metadata.clone()]);

            if let Some(attributes) = cache.table_attributes.get(key) {
                if !attributes.is_empty() && self.store.begin_fetch(key, ResourceKind::Attributes)
                {
                    self.store.apply_fetch_result(
                        key,
                        ResourceKind::Attributes,
                        Ok(FetchedData::Attributes(attributes.clone())),
                        &self.preferences,
                    );
                }
            }

            let forms = cache.table_forms.get(key).cloned().unwrap_or_default();
            let views = cache.table_views.get(key).cloned().unwrap_or_default();
            if (!forms.is_empty() || !views.is_empty())
                && self.store.begin_fetch(key, ResourceKind::FormsAndViews)
            {
                self.store.apply_fetch_result(
                    key,
                    ResourceKind::FormsAndViews,
                    Ok(FetchedData::FormsAndViews { forms, views }),
                    &self.preferences,
                );
            }
        }

        self.status = format!("Restored {} table(s) from cache", keys.len());
        self.sync_preferences();
        !keys.is_empty()
    }

    /// Fetch the solution's table list. Failure here is session-level (there
    /// is nothing to confine it to) and is returned to the caller.
    pub async fn load_catalog(&mut self) -> Result<usize, ApiError> {
        self.status = format!("Loading tables from {}...", self.solution);
        let tables = self.client.list_tables(&self.solution).await?;
        let count = tables.len();
        self.catalog = tables;
        self.status = format!("Loaded {} table(s)", count);
        Ok(count)
    }

    /// Add tables to the selection and start loading their attributes.
    /// Idempotent per key; keys not present in the catalog are ignored.
    /// Returns how many tables were actually added.
    pub fn add_tables(&mut self, keys: &[String]) -> usize {
        let to_add: Vec<TableMetadata> = keys
            .iter()
            .filter(|key| !self.store.contains(key))
            .filter_map(|key| {
                self.catalog
                    .iter()
                    .find(|table| &table.logical_name == key)
                    .cloned()
            })
            .collect();

        let added = self.store.add_tables(to_add);
        for key in &added {
            self.begin(key.clone(), ResourceKind::Attributes);
        }

        if !added.is_empty() {
            self.status = format!("Loading attributes for {} table(s)...", added.len());
            self.sync_preferences();
        }
        added.len()
    }

    /// Re-add the tables remembered in preferences, as far as the catalog
    /// still offers them. Returns how many were added.
    pub fn restore_saved_selection(&mut self) -> usize {
        let saved = self.preferences.selected_tables.clone();
        self.add_tables(&saved)
    }

    /// Remove a table and drop interest in any fetch still in flight for it;
    /// the late result will be discarded on arrival.
    pub fn remove_table(&mut self, key: &str) -> bool {
        if !self.store.remove_table(key) {
            return false;
        }
        self.status = format!("Removed {}", key);
        self.sync_preferences();
        true
    }

    /// Start a fresh fetch for a table that is already selected: a retry
    /// after a failure, or a refresh of loaded data. Rejected while a fetch
    /// for the table's attributes is in flight. Forms and views reload
    /// automatically once the attributes arrive.
    pub fn reload_table(&mut self, key: &str) -> bool {
        if !self.store.contains(key) {
            return false;
        }
        let started = self.begin(key.to_string(), ResourceKind::Attributes);
        if started {
            self.status = format!("Reloading {}...", key);
        }
        started
    }

    pub fn toggle_attribute(&mut self, key: &str, attribute: &str) -> bool {
        let changed = self.store.toggle_attribute(key, attribute);
        if changed {
            self.sync_preferences();
        }
        changed
    }

    pub fn select_all_attributes(&mut self, key: &str) -> bool {
        let changed = self.store.select_all_attributes(key);
        if changed {
            self.sync_preferences();
        }
        changed
    }

    pub fn clear_attribute_selection(&mut self, key: &str) -> bool {
        let changed = self.store.clear_attribute_selection(key);
        if changed {
            self.sync_preferences();
        }
        changed
    }

    pub fn select_form(&mut self, key: &str, form_id: &str) -> bool {
        let changed = self.store.select_form(key, form_id);
        if changed {
            self.sync_preferences();
        }
        changed
    }

    pub fn select_view(&mut self, key: &str, view_id: &str) -> bool {
        let changed = self.store.select_view(key, view_id);
        if changed {
            self.sync_preferences();
        }
        changed
    }

    /// Select every attribute that appears on the table's chosen form,
    /// fetching the form markup on demand when the listing did not include
    /// it. Returns the selection size afterwards.
    pub async fn select_from_form(&mut self, key: &str) -> Result<usize, ApiError> {
        let Some(state) = self.store.get(key) else {
            return Ok(0);
        };
        let Some(form_id) = state.selection.form_id.clone() else {
            return Ok(0);
        };

        let cached = state
            .forms
            .iter()
            .find(|f| f.id == form_id)
            .and_then(|f| f.form_xml.clone());
        let form_xml = match cached {
            Some(xml) => xml,
            None => {
                let xml = self.client.get_form_xml(&form_id).await?;
                self.store.cache_form_xml(key, &form_id, xml.clone());
                xml
            }
        };

        let fields = extract_form_fields(&form_xml);
        let count = self.store.apply_form_fields(key, &fields);
        self.status = format!("Selected {} field(s) from form", fields.len());
        self.sync_preferences();
        Ok(count)
    }

    /// Apply the next fetch completion. Returns the (table, kind) that was
    /// applied, or `None` when nothing is in flight.
    ///
    /// A successful attribute load chains the table's forms/views load; a
    /// forms/views load refreshes the durable metadata cache.
    pub async fn process_next(&mut self) -> Option<(String, ResourceKind)> {
        if self.in_flight == 0 {
            return None;
        }
        let FetchOutcome {
            table,
            kind,
            result,
        } = self.results.recv().await?;
        self.in_flight -= 1;

        let succeeded = result.is_ok();
        if !succeeded {
            self.status = format!("Failed to load {} for {}", kind.label(), table);
        }
        self.store
            .apply_fetch_result(&table, kind, result, &self.preferences);

        if succeeded && kind == ResourceKind::Attributes && self.store.contains(&table) {
            self.begin(table.clone(), ResourceKind::FormsAndViews);
        }
        if kind == ResourceKind::FormsAndViews {
            self.sync_cache();
        }
        self.sync_preferences();

        Some((table, kind))
    }

    /// Drive fetch completions until nothing is in flight.
    pub async fn wait_until_idle(&mut self) {
        while self.process_next().await.is_some() {}
    }

    pub fn snapshot(&self) -> Vec<SelectionSnapshot> {
        self.store.snapshot()
    }

    /// True once every selected table's attributes are loaded.
    pub fn export_ready(&self) -> bool {
        self.store.export_ready()
    }

    /// Remember output choices across sessions.
    pub fn remember_output(&mut self, output_folder: &str, project_name: &str) {
        self.preferences.output_folder = output_folder.to_string();
        self.preferences.project_name = project_name.to_string();
        self.settings.save_preferences(&self.preferences);
    }

    /// Assemble the export document. All-or-nothing: any missing detail
    /// fetch or not-yet-loaded table aborts the export with a single error.
    pub async fn build_export(&self, project_name: &str) -> anyhow::Result<MetadataDocument> {
        export::build_document(
            &self.store,
            self.client.as_ref(),
            &self.environment_url,
            &self.solution,
            project_name,
        )
        .await
    }

    /// Wait until queued settings writes have been attempted. Intended for
    /// shutdown and tests; the session itself never blocks on persistence.
    pub async fn flush_settings(&self) {
        self.settings.flush().await;
    }

    /// Guarded spawn: only starts a worker when the store accepts the
    /// `Loading` transition for this (table, kind).
    fn begin(&mut self, table: String, kind: ResourceKind) -> bool {
        if !self.store.begin_fetch(&table, kind) {
            return false;
        }
        self.orchestrator.spawn_one(table, kind);
        self.in_flight += 1;
        true
    }

    /// Write preferences through after a mutation. Entries of tables whose
    /// data has not finished loading are left as previously saved, so a
    /// crash mid-load never clobbers the last session's choices.
    fn sync_preferences(&mut self) {
        self.preferences.environment_url = self.environment_url.clone();
        self.preferences.last_solution = self.solution.clone();
        self.preferences.selected_tables = self.store.table_keys();

        for state in self.store.tables() {
            let key = &state.metadata.logical_name;
            if state.load.attributes.is_loaded() {
                let mut attributes: Vec<String> =
                    state.selection.attributes.iter().cloned().collect();
                attributes.sort();
                self.preferences
                    .table_attributes
                    .insert(key.clone(), attributes);
            }
            if state.load.forms_and_views.is_loaded() {
                match &state.selection.form_id {
                    Some(form_id) => {
                        self.preferences
                            .table_forms
                            .insert(key.clone(), form_id.clone());
                    }
                    None => {
                        self.preferences.table_forms.remove(key);
                    }
                }
                match &state.selection.view_id {
                    Some(view_id) => {
                        self.preferences
                            .table_views
                            .insert(key.clone(), view_id.clone());
                    }
                    None => {
                        self.preferences.table_views.remove(key);
                    }
                }
            }
        }

        self.settings.save_preferences(&self.preferences);
    }

    /// Snapshot fetched metadata into the durable cache.
    fn sync_cache(&self) {
        if self.catalog.is_empty() {
            return;
        }

        let mut cache = MetadataCache {
            environment_url: self.environment_url.clone(),
            solution_name: self.solution.clone(),
            tables: self.catalog.clone(),
            ..Default::default()
        };

        for state in self.store.tables() {
            let key = state.metadata.logical_name.clone();
            cache
                .table_data
                .insert(key.clone(), state.metadata.clone());
            if state.load.attributes.is_loaded() {
                cache
                    .table_attributes
                    .insert(key.clone(), state.attributes.clone());
            }
            if state.load.forms_and_views.is_loaded() {
                cache.table_forms.insert(key.clone(), state.forms.clone());
                cache.table_views.insert(key, state.views.clone());
            }
        }

        self.settings.save_cache(&cache);
    }
}
