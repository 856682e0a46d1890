//! Export artifact: the metadata dictionary document.
//!
//! Unlike per-table fetches, export is all-or-nothing: a single failed detail
//! fetch or write aborts the whole export with one error. Heavy detail blobs
//! (form markup, view FetchXML) are fetched here, at export time, when the
//! session did not already hold them.

use std::path::{Path, PathBuf};

use anyhow::Context;
use futures::future::try_join_all;
use serde::Serialize;

use crate::api::{AttributeMetadata, CatalogClient, extract_form_fields};
use crate::session::{SessionStore, TableState};

/// Root of the exported metadata dictionary. Field names serialize in
/// PascalCase; the on-disk shape is a stable external contract.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetadataDocument {
    pub environment: String,
    pub solution: String,
    pub project_name: String,
    pub tables: Vec<TableExport>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableExport {
    pub logical_name: String,
    pub display_name: String,
    pub schema_name: Option<String>,
    pub object_type_code: Option<i64>,
    pub primary_id_attribute: Option<String>,
    pub primary_name_attribute: Option<String>,
    pub forms: Vec<FormExport>,
    pub view: Option<ViewExport>,
    pub attributes: Vec<AttributeExport>,
}

/// Summary of the chosen form: identity plus how many fields its markup
/// binds.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FormExport {
    pub form_id: String,
    pub form_name: String,
    pub field_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ViewExport {
    pub view_id: String,
    pub view_name: String,
    pub fetch_xml: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeExport {
    pub logical_name: String,
    pub schema_name: Option<String>,
    pub display_name: Option<String>,
    pub attribute_type: Option<String>,
    pub is_custom: bool,
}

impl From<&AttributeMetadata> for AttributeExport {
    fn from(attr: &AttributeMetadata) -> Self {
        Self {
            logical_name: attr.logical_name.clone(),
            schema_name: attr.schema_name.clone(),
            display_name: attr.display_name.clone(),
            attribute_type: attr.attribute_type.clone(),
            is_custom: attr.is_custom,
        }
    }
}

/// Assemble the export document for every selected table.
pub async fn build_document(
    store: &SessionStore,
    client: &dyn CatalogClient,
    environment: &str,
    solution: &str,
    project_name: &str,
) -> anyhow::Result<MetadataDocument> {
    anyhow::ensure!(!store.is_empty(), "No tables selected");
    anyhow::ensure!(
        store.export_ready(),
        "Attributes are still loading (or failed) for some selected tables"
    );

    let tables = try_join_all(store.tables().map(|state| export_table(state, client))).await?;

    Ok(MetadataDocument {
        environment: environment.to_string(),
        solution: solution.to_string(),
        project_name: project_name.to_string(),
        tables,
    })
}

async fn export_table(
    state: &TableState,
    client: &dyn CatalogClient,
) -> anyhow::Result<TableExport> {
    let table = &state.metadata;

    let mut forms = Vec::new();
    if let Some(form_id) = &state.selection.form_id {
        if let Some(form) = state.forms.iter().find(|f| &f.id == form_id) {
            let form_xml = match &form.form_xml {
                Some(xml) => xml.clone(),
                None => client.get_form_xml(&form.id).await.with_context(|| {
                    format!("Failed to fetch form markup for {}", table.logical_name)
                })?,
            };
            forms.push(FormExport {
                form_id: form.id.clone(),
                form_name: form.name.clone(),
                field_count: extract_form_fields(&form_xml).len(),
            });
        }
    }

    let mut view = None;
    if let Some(view_id) = &state.selection.view_id {
        if let Some(chosen) = state.views.iter().find(|v| &v.id == view_id) {
            let fetch_xml = match &chosen.fetch_xml {
                Some(xml) => xml.clone(),
                None => client.get_view_fetch_xml(&chosen.id).await.with_context(|| {
                    format!("Failed to fetch view query for {}", table.logical_name)
                })?,
            };
            view = Some(ViewExport {
                view_id: chosen.id.clone(),
                view_name: chosen.name.clone(),
                fetch_xml: Some(fetch_xml),
            });
        }
    }

    let attributes = state
        .attributes
        .iter()
        .filter(|a| state.selection.attributes.contains(&a.logical_name))
        .map(AttributeExport::from)
        .collect();

    Ok(TableExport {
        logical_name: table.logical_name.clone(),
        display_name: table.display_name.clone(),
        schema_name: table.schema_name.clone(),
        object_type_code: table.object_type_code,
        primary_id_attribute: table.primary_id_attribute.clone(),
        primary_name_attribute: table.primary_name_attribute.clone(),
        forms,
        view,
        attributes,
    })
}

/// Write the document (and the environment URL sidecar) into the output
/// folder. Returns the path of the dictionary file.
pub fn write_document(
    document: &MetadataDocument,
    output_folder: &Path,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(output_folder).with_context(|| {
        format!("Failed to create output folder {}", output_folder.display())
    })?;

    let path = output_folder.join(format!("{} Metadata Dictionary.json", document.project_name));
    let payload =
        serde_json::to_string_pretty(document).context("Failed to encode export document")?;
    std::fs::write(&path, payload)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    std::fs::write(output_folder.join("DataverseURL.txt"), &document.environment)
        .context("Failed to write DataverseURL.txt")?;

    Ok(path)
}
