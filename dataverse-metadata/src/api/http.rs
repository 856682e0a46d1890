//! Dataverse Web API implementation of [`CatalogClient`].
//!
//! Thin request/response plumbing: every method issues one or more OData GET
//! requests and maps the payload into the records in [`super::models`]. No
//! state is kept beyond the HTTP connection pool and the bearer token.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;

use super::client::CatalogClient;
use super::error::ApiError;
use super::models::{AttributeMetadata, FormMetadata, SolutionInfo, TableMetadata, ViewMetadata};

const API_VERSION: &str = "v9.2";

/// Fixed per-request timeout; a timeout surfaces as a per-entity transport
/// failure like any other fetch error.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// EntityDefinitions lookups are batched to keep the `$filter` clause within
/// URL length limits.
const ENTITY_BATCH_SIZE: usize = 50;

/// Client for the Dataverse Web API.
pub struct DataverseClient {
    http: reqwest::Client,
    api_url: String,
    access_token: String,
}

impl DataverseClient {
    /// Build a client for one environment from an already-acquired bearer
    /// token. The interactive login flow that yields the token lives outside
    /// this crate.
    pub fn new(environment_url: &str, access_token: &str) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("OData-MaxVersion", HeaderValue::from_static("4.0"));
        headers.insert("OData-Version", HeaderValue::from_static("4.0"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers.insert(
            "Prefer",
            HeaderValue::from_static("odata.include-annotations=*"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = environment_url.trim_end_matches('/');
        Ok(Self {
            http,
            api_url: format!("{}/api/data/{}", base_url, API_VERSION),
            access_token: access_token.to_string(),
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value, ApiError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::not_found("resource", url));
        }

        let response = response.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Fetch an OData collection response and return its `value` array.
    async fn get_collection(&self, url: &str) -> Result<Vec<Value>, ApiError> {
        let body = self.get_json(url).await?;
        match body.get("value").and_then(Value::as_array) {
            Some(items) => Ok(items.clone()),
            None => Err(ApiError::Payload(format!(
                "collection response from {} is missing 'value'",
                url
            ))),
        }
    }

    async fn solution_id(&self, solution: &str) -> Result<String, ApiError> {
        let filter = format!("uniquename eq '{}'", solution);
        let url = format!(
            "{}/solutions?$select=solutionid&$filter={}",
            self.api_url,
            urlencoding::encode(&filter)
        );
        let solutions = self.get_collection(&url).await?;

        solutions
            .first()
            .and_then(|s| s.get("solutionid"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::not_found("solution", solution))
    }

    /// Fetch entity definitions for a batch of MetadataIds.
    async fn entity_definitions(&self, ids: &[String]) -> Result<Vec<Value>, ApiError> {
        let id_filter = ids
            .iter()
            .map(|id| format!("MetadataId eq {}", id))
            .collect::<Vec<_>>()
            .join(" or ");
        let url = format!(
            "{}/EntityDefinitions?$filter=({})&$select={}",
            self.api_url,
            urlencoding::encode(&id_filter),
            "LogicalName,SchemaName,DisplayName,ObjectTypeCode,PrimaryIdAttribute,\
             PrimaryNameAttribute,IsActivity,IsIntersect,MetadataId",
        );
        self.get_collection(&url).await
    }
}

#[async_trait]
impl CatalogClient for DataverseClient {
    async fn list_solutions(&self) -> Result<Vec<SolutionInfo>, ApiError> {
        let filter = "isvisible eq true and ismanaged eq false";
        let url = format!(
            "{}/solutions?$select=solutionid,uniquename,friendlyname,version,ismanaged\
             &$filter={}&$orderby=friendlyname",
            self.api_url,
            urlencoding::encode(filter)
        );
        let items = self.get_collection(&url).await?;
        Ok(items.iter().filter_map(parse_solution).collect())
    }

    async fn list_tables(&self, solution: &str) -> Result<Vec<TableMetadata>, ApiError> {
        let solution_id = self.solution_id(solution).await?;

        // Solution components of type 1 are entities.
        let filter = format!(
            "_solutionid_value eq {} and componenttype eq 1",
            solution_id
        );
        let url = format!(
            "{}/solutioncomponents?$select=objectid&$filter={}",
            self.api_url,
            urlencoding::encode(&filter)
        );
        let components = self.get_collection(&url).await?;

        let entity_ids: Vec<String> = components
            .iter()
            .filter_map(|c| c.get("objectid").and_then(Value::as_str))
            .map(str::to_string)
            .collect();

        let mut tables = Vec::new();
        for batch in entity_ids.chunks(ENTITY_BATCH_SIZE) {
            match self.entity_definitions(batch).await {
                Ok(entities) => tables.extend(entities.iter().filter_map(parse_table)),
                Err(err) => {
                    log::warn!("Could not fetch entity definition batch: {}", err);
                }
            }
        }

        tables.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(tables)
    }

    async fn list_attributes(&self, table: &str) -> Result<Vec<AttributeMetadata>, ApiError> {
        let url = format!(
            "{}/EntityDefinitions(LogicalName='{}')/Attributes?$select={}",
            self.api_url,
            table,
            "LogicalName,SchemaName,DisplayName,AttributeType,IsValidForRead,IsCustomAttribute",
        );
        let items = self.get_collection(&url).await?;

        let mut attributes: Vec<AttributeMetadata> =
            items.iter().filter_map(parse_attribute).collect();
        attributes.sort_by(|a, b| a.label().to_lowercase().cmp(&b.label().to_lowercase()));
        Ok(attributes)
    }

    async fn list_forms(
        &self,
        table: &str,
        include_xml: bool,
    ) -> Result<Vec<FormMetadata>, ApiError> {
        let mut select = "formid,name".to_string();
        if include_xml {
            select.push_str(",formxml");
        }

        // Form type 2 is the main form.
        let filter = format!("objecttypecode eq '{}' and type eq 2", table);
        let url = format!(
            "{}/systemforms?$select={}&$filter={}&$orderby=name",
            self.api_url,
            select,
            urlencoding::encode(&filter)
        );
        let items = self.get_collection(&url).await?;
        Ok(items.iter().filter_map(parse_form).collect())
    }

    async fn get_form_xml(&self, form_id: &str) -> Result<String, ApiError> {
        let url = format!("{}/systemforms({})?$select=formxml", self.api_url, form_id);
        let body = self.get_json(&url).await?;
        Ok(body
            .get("formxml")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn list_views(
        &self,
        table: &str,
        include_fetch_xml: bool,
    ) -> Result<Vec<ViewMetadata>, ApiError> {
        let mut select = "savedqueryid,name,isdefault,querytype".to_string();
        if include_fetch_xml {
            select.push_str(",fetchxml");
        }

        let filter = format!("returnedtypecode eq '{}' and statecode eq 0", table);
        let url = format!(
            "{}/savedqueries?$select={}&$filter={}&$orderby=name",
            self.api_url,
            select,
            urlencoding::encode(&filter)
        );
        let items = self.get_collection(&url).await?;

        // Query type 0 is a public view.
        Ok(items
            .iter()
            .filter(|v| v.get("querytype").and_then(Value::as_i64) == Some(0))
            .filter_map(parse_view)
            .collect())
    }

    async fn get_view_fetch_xml(&self, view_id: &str) -> Result<String, ApiError> {
        let url = format!(
            "{}/savedqueries({})?$select=fetchxml",
            self.api_url, view_id
        );
        let body = self.get_json(&url).await?;
        Ok(body
            .get("fetchxml")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

/// Unwrap the nested `DisplayName.UserLocalizedLabel.Label` structure.
fn localized_label(value: &Value) -> Option<String> {
    value
        .get("DisplayName")?
        .get("UserLocalizedLabel")?
        .get("Label")?
        .as_str()
        .map(str::to_string)
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn parse_solution(value: &Value) -> Option<SolutionInfo> {
    Some(SolutionInfo {
        unique_name: string_field(value, "uniquename")?,
        friendly_name: string_field(value, "friendlyname").unwrap_or_default(),
        version: string_field(value, "version"),
    })
}

/// Returns `None` for activity and intersect entities, which are never
/// offered for selection.
fn parse_table(value: &Value) -> Option<TableMetadata> {
    if value.get("IsActivity").and_then(Value::as_bool) == Some(true)
        || value.get("IsIntersect").and_then(Value::as_bool) == Some(true)
    {
        return None;
    }

    let logical_name = string_field(value, "LogicalName")?;
    let display_name = localized_label(value).unwrap_or_else(|| logical_name.clone());

    Some(TableMetadata {
        display_name,
        schema_name: string_field(value, "SchemaName"),
        object_type_code: value.get("ObjectTypeCode").and_then(Value::as_i64),
        primary_id_attribute: string_field(value, "PrimaryIdAttribute"),
        primary_name_attribute: string_field(value, "PrimaryNameAttribute"),
        logical_name,
    })
}

/// Returns `None` for attributes that cannot be read.
fn parse_attribute(value: &Value) -> Option<AttributeMetadata> {
    if value.get("IsValidForRead").and_then(Value::as_bool) != Some(true) {
        return None;
    }

    Some(AttributeMetadata {
        logical_name: string_field(value, "LogicalName")?,
        schema_name: string_field(value, "SchemaName"),
        display_name: localized_label(value),
        attribute_type: string_field(value, "AttributeType"),
        is_custom: value.get("IsCustomAttribute").and_then(Value::as_bool) == Some(true),
    })
}

fn parse_form(value: &Value) -> Option<FormMetadata> {
    Some(FormMetadata {
        id: string_field(value, "formid")?,
        name: string_field(value, "name").unwrap_or_else(|| "Unnamed".into()),
        form_xml: string_field(value, "formxml"),
    })
}

fn parse_view(value: &Value) -> Option<ViewMetadata> {
    Some(ViewMetadata {
        id: string_field(value, "savedqueryid")?,
        name: string_field(value, "name").unwrap_or_else(|| "Unnamed".into()),
        is_default: value.get("isdefault").and_then(Value::as_bool) == Some(true),
        fetch_xml: string_field(value, "fetchxml"),
    })
}
