//! Bounded fan-out of catalog fetches.
//!
//! Workers only call the catalog client and hand raw results back over a
//! channel; every state mutation stays with the coordinator that owns the
//! receiving end. One key's failure is one key's result, it never aborts or
//! delays the rest of a batch, and no completion order is guaranteed.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};

use crate::api::{ApiError, AttributeMetadata, CatalogClient, FormMetadata, ViewMetadata};

use super::load_state::ResourceKind;

/// Fixed number of concurrently in-flight catalog calls, independent of how
/// many tables a batch contains.
pub const FETCH_CONCURRENCY: usize = 5;

/// Raw collections handed back by one worker.
#[derive(Debug, Clone)]
pub enum FetchedData {
    Attributes(Vec<AttributeMetadata>),
    FormsAndViews {
        forms: Vec<FormMetadata>,
        views: Vec<ViewMetadata>,
    },
}

/// Completion message for one (table, kind) fetch.
#[derive(Debug)]
pub struct FetchOutcome {
    pub table: String,
    pub kind: ResourceKind,
    pub result: Result<FetchedData, ApiError>,
}

/// Spawns fetch workers onto the runtime, capped by a shared semaphore.
#[derive(Clone)]
pub struct FetchOrchestrator {
    client: Arc<dyn CatalogClient>,
    limiter: Arc<Semaphore>,
    results: mpsc::UnboundedSender<FetchOutcome>,
}

impl FetchOrchestrator {
    pub fn new(client: Arc<dyn CatalogClient>, results: mpsc::UnboundedSender<FetchOutcome>) -> Self {
        Self {
            client,
            limiter: Arc::new(Semaphore::new(FETCH_CONCURRENCY)),
            results,
        }
    }

    /// Spawn one worker per key and return how many were spawned.
    ///
    /// Callers must have moved each key's load state to `Loading` first; the
    /// orchestrator itself holds no per-key state.
    pub fn spawn_batch<I>(&self, keys: I, kind: ResourceKind) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut spawned = 0;
        for key in keys {
            self.spawn_one(key, kind);
            spawned += 1;
        }
        spawned
    }

    /// Spawn a single fetch worker for one (table, kind) pair.
    pub fn spawn_one(&self, table: String, kind: ResourceKind) {
        let client = Arc::clone(&self.client);
        let limiter = Arc::clone(&self.limiter);
        let results = self.results.clone();

        tokio::spawn(async move {
            let Ok(_permit) = limiter.acquire_owned().await else {
                return;
            };

            let result = fetch_kind(client.as_ref(), &table, kind).await;
            // A closed channel means the session is gone; the result is
            // nobody's business anymore.
            let _ = results.send(FetchOutcome {
                table,
                kind,
                result,
            });
        });
    }
}

async fn fetch_kind(
    client: &dyn CatalogClient,
    table: &str,
    kind: ResourceKind,
) -> Result<FetchedData, ApiError> {
    match kind {
        ResourceKind::Attributes => {
            let attributes = client.list_attributes(table).await?;
            Ok(FetchedData::Attributes(attributes))
        }
        ResourceKind::FormsAndViews => {
            // Form markup is pulled inline so "select from form" works
            // without a second round-trip; view FetchXML stays lazy until
            // export.
            let forms = client.list_forms(table, true).await?;
            let views = client.list_views(table, false).await?;
            Ok(FetchedData::FormsAndViews { forms, views })
        }
    }
}
