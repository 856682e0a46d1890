//! Remote schema catalog access.
//!
//! The session engine consumes the catalog only through the [`CatalogClient`]
//! trait; [`DataverseClient`] is the Dataverse Web API implementation used by
//! the real application. Data records live in [`models`], the fetch error
//! taxonomy in [`error`].

pub mod client;
pub mod error;
pub mod formxml;
pub mod http;
pub mod models;

#[cfg(test)]
pub(crate) mod testing;

pub use client::CatalogClient;
pub use error::ApiError;
pub use formxml::extract_form_fields;
pub use http::DataverseClient;
pub use models::{AttributeMetadata, FormMetadata, SolutionInfo, TableMetadata, ViewMetadata};
