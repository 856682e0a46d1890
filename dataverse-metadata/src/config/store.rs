//! File-backed persistence for preferences and the metadata cache.
//!
//! Reads happen once at session start and fall back to defaults on any
//! failure. Writes are fire-and-forget: they are queued to a single writer
//! task so that consecutive saves of the same record serialize (last write
//! wins) and the caller never blocks on disk I/O. A failed write is logged
//! and never surfaced to the session.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::models::{MetadataCache, Preferences};

const SETTINGS_FILE: &str = "settings.json";
const CACHE_FILE: &str = "metadata-cache.json";

/// Durable read/write failure. Always handled by logging and continuing with
/// in-memory state; never propagated into the interactive session.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

enum WriteJob {
    Record { path: PathBuf, payload: String },
    Flush(oneshot::Sender<()>),
}

/// Handle to the settings directory and its background writer.
///
/// Must be created inside a tokio runtime; the writer task lives until the
/// last handle is dropped.
#[derive(Clone)]
pub struct SettingsStore {
    dir: PathBuf,
    jobs: mpsc::UnboundedSender<WriteJob>,
}

impl SettingsStore {
    /// Store rooted at the platform config directory.
    pub fn new() -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::with_dir(base.join("dataverse-metadata"))
    }

    /// Store rooted at an explicit directory.
    pub fn with_dir(dir: PathBuf) -> Self {
        let (jobs, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    WriteJob::Record { path, payload } => {
                        if let Err(err) = write_record(&path, &payload).await {
                            log::error!("Could not save settings: {}", err);
                        }
                    }
                    // All queued writes before the flush have completed by
                    // the time the ack is sent.
                    WriteJob::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self { dir, jobs }
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    /// Read preferences, yielding defaults when the record is missing or
    /// unreadable.
    pub fn load_preferences(&self) -> Preferences {
        load_record(&self.preferences_path())
    }

    /// Read the metadata cache, yielding an (invalid) empty cache when the
    /// record is missing or unreadable.
    pub fn load_cache(&self) -> MetadataCache {
        load_record(&self.cache_path())
    }

    /// Queue a preferences write. Returns immediately.
    pub fn save_preferences(&self, preferences: &Preferences) {
        self.queue(self.preferences_path(), preferences);
    }

    /// Queue a cache write. Returns immediately.
    pub fn save_cache(&self, cache: &MetadataCache) {
        self.queue(self.cache_path(), cache);
    }

    /// Wait until every previously queued write has been attempted.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.jobs.send(WriteJob::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    fn queue<T: Serialize>(&self, path: PathBuf, record: &T) {
        match serde_json::to_string_pretty(record) {
            Ok(payload) => {
                // The writer task outlives every handle, so this only fails
                // during shutdown.
                let _ = self.jobs.send(WriteJob::Record { path, payload });
            }
            Err(source) => {
                log::error!(
                    "Could not save settings: {}",
                    PersistenceError::Encode { path, source }
                );
            }
        }
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

fn load_record<T: DeserializeOwned + Default>(path: &Path) -> T {
    match read_record(path) {
        Ok(Some(record)) => record,
        Ok(None) => T::default(),
        Err(err) => {
            log::warn!("Could not load settings: {}", err);
            T::default()
        }
    }
}

fn read_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::Io {
                action: "read",
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| PersistenceError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

fn io_error(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError {
    let path = path.to_path_buf();
    move |source| PersistenceError::Io {
        action,
        path,
        source,
    }
}

/// Write via a temp file and rename so readers never observe a torn record.
async fn write_record(path: &Path, payload: &str) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(io_error("create directory for", path))?;
    }

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, payload)
        .await
        .map_err(io_error("write", path))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(io_error("replace", path))?;
    Ok(())
}
