//! In-memory [`CatalogClient`] for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::client::CatalogClient;
use super::error::ApiError;
use super::models::{AttributeMetadata, FormMetadata, SolutionInfo, TableMetadata, ViewMetadata};

/// Scripted catalog: canned collections per table, with switches to fail
/// individual fetches and counters to observe worker concurrency.
#[derive(Default)]
pub(crate) struct MockCatalog {
    pub tables: Vec<TableMetadata>,
    pub attributes: HashMap<String, Vec<AttributeMetadata>>,
    pub forms: HashMap<String, Vec<FormMetadata>>,
    pub views: HashMap<String, Vec<ViewMetadata>>,
    pub form_xml: HashMap<String, String>,
    pub view_fetch_xml: HashMap<String, String>,
    /// Tables whose attribute listing fails with a transport error.
    pub fail_attributes: HashSet<String>,
    /// Tables whose form/view listings fail with a transport error.
    pub fail_forms: HashSet<String>,
    /// Fail every detail (form XML / FetchXML) request.
    pub fail_details: bool,
    /// Artificial latency per call, to force overlap between workers.
    pub delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockCatalog {
    pub fn table(logical_name: &str, primary_id: &str, primary_name: &str) -> TableMetadata {
        TableMetadata {
            logical_name: logical_name.into(),
            display_name: logical_name.to_uppercase(),
            schema_name: Some(logical_name.into()),
            object_type_code: Some(1),
            primary_id_attribute: Some(primary_id.into()),
            primary_name_attribute: Some(primary_name.into()),
        }
    }

    pub fn attr(logical_name: &str) -> AttributeMetadata {
        AttributeMetadata {
            logical_name: logical_name.into(),
            schema_name: Some(logical_name.into()),
            display_name: Some(logical_name.into()),
            attribute_type: Some("String".into()),
            is_custom: logical_name.starts_with("custom_") || logical_name.starts_with("new_"),
        }
    }

    pub fn form(id: &str, name: &str) -> FormMetadata {
        FormMetadata {
            id: id.into(),
            name: name.into(),
            form_xml: None,
        }
    }

    pub fn view(id: &str, name: &str, is_default: bool) -> ViewMetadata {
        ViewMetadata {
            id: id.into(),
            name: name.into(),
            is_default,
            fetch_xml: None,
        }
    }

    pub fn transport_error() -> ApiError {
        ApiError::Transport {
            message: "connection reset by peer".into(),
            timed_out: false,
        }
    }

    pub fn max_observed_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn pace(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CatalogClient for MockCatalog {
    async fn list_solutions(&self) -> Result<Vec<SolutionInfo>, ApiError> {
        Ok(vec![SolutionInfo {
            unique_name: "testsolution".into(),
            friendly_name: "Test Solution".into(),
            version: Some("1.0.0.0".into()),
        }])
    }

    async fn list_tables(&self, _solution: &str) -> Result<Vec<TableMetadata>, ApiError> {
        self.pace().await;
        Ok(self.tables.clone())
    }

    async fn list_attributes(&self, table: &str) -> Result<Vec<AttributeMetadata>, ApiError> {
        self.pace().await;
        if self.fail_attributes.contains(table) {
            return Err(Self::transport_error());
        }
        Ok(self.attributes.get(table).cloned().unwrap_or_default())
    }

    async fn list_forms(
        &self,
        table: &str,
        _include_xml: bool,
    ) -> Result<Vec<FormMetadata>, ApiError> {
        self.pace().await;
        if self.fail_forms.contains(table) {
            return Err(Self::transport_error());
        }
        Ok(self.forms.get(table).cloned().unwrap_or_default())
    }

    async fn get_form_xml(&self, form_id: &str) -> Result<String, ApiError> {
        if self.fail_details {
            return Err(Self::transport_error());
        }
        Ok(self.form_xml.get(form_id).cloned().unwrap_or_default())
    }

    async fn list_views(
        &self,
        table: &str,
        _include_fetch_xml: bool,
    ) -> Result<Vec<ViewMetadata>, ApiError> {
        self.pace().await;
        if self.fail_forms.contains(table) {
            return Err(Self::transport_error());
        }
        Ok(self.views.get(table).cloned().unwrap_or_default())
    }

    async fn get_view_fetch_xml(&self, view_id: &str) -> Result<String, ApiError> {
        if self.fail_details {
            return Err(Self::transport_error());
        }
        Ok(self.view_fetch_xml.get(view_id).cloned().unwrap_or_default())
    }
}
