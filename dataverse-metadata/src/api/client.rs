//! Abstract access to the remote schema catalog.

use async_trait::async_trait;

use super::error::ApiError;
use super::models::{AttributeMetadata, FormMetadata, SolutionInfo, TableMetadata, ViewMetadata};

/// Stateless request/response access to the remote schema catalog.
///
/// One method per collection or detail query; every call can fail
/// independently of the others. Implementations must not retry on their own,
/// retrying is a caller decision (typically a user-initiated re-fetch).
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// All unmanaged, visible solutions, ordered by friendly name.
    async fn list_solutions(&self) -> Result<Vec<SolutionInfo>, ApiError>;

    /// All tables belonging to a solution, ordered by display label.
    async fn list_tables(&self, solution: &str) -> Result<Vec<TableMetadata>, ApiError>;

    /// All readable attributes of a table, ordered by display label.
    async fn list_attributes(&self, table: &str) -> Result<Vec<AttributeMetadata>, ApiError>;

    /// Main forms of a table. `include_xml` pulls the form markup inline,
    /// which is expensive; pass `false` when only names are needed.
    async fn list_forms(&self, table: &str, include_xml: bool)
    -> Result<Vec<FormMetadata>, ApiError>;

    /// Form markup for a single form.
    async fn get_form_xml(&self, form_id: &str) -> Result<String, ApiError>;

    /// Public views of a table. `include_fetch_xml` pulls the query markup
    /// inline; pass `false` when only names are needed.
    async fn list_views(
        &self,
        table: &str,
        include_fetch_xml: bool,
    ) -> Result<Vec<ViewMetadata>, ApiError>;

    /// Query markup for a single view.
    async fn get_view_fetch_xml(&self, view_id: &str) -> Result<String, ApiError>;
}
