//! Headless metadata extraction.
//!
//! Loads every table of a solution, applies saved (or default) attribute
//! selections, and writes the metadata dictionary. The interactive login
//! flow lives outside this tool: it expects a ready bearer token in
//! `DATAVERSE_ACCESS_TOKEN`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use dataverse_metadata::{DataverseClient, MetadataSession, SettingsStore, write_document};

#[derive(Parser)]
#[command(name = "dataverse-metadata", version, about = "Export Dataverse schema metadata")]
struct Args {
    /// Environment URL, e.g. https://yourorg.crm.dynamics.com
    environment_url: String,

    /// Unique name of the solution (not the display name)
    solution: String,

    /// Folder for the exported dictionary
    #[arg(long, default_value = ".")]
    output: PathBuf,

    /// Project name used in the dictionary; defaults to the solution name
    #[arg(long)]
    project: Option<String>,

    /// Ignore the local metadata cache and fetch everything fresh
    #[arg(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let token = std::env::var("DATAVERSE_ACCESS_TOKEN")
        .context("DATAVERSE_ACCESS_TOKEN must hold a bearer token for the environment")?;

    let client = Arc::new(DataverseClient::new(&args.environment_url, &token)?);
    let settings = SettingsStore::new();
    let mut session =
        MetadataSession::new(client, settings, &args.environment_url, &args.solution);

    let restored = !args.no_cache && session.restore_from_cache();
    if restored {
        log::info!("{}", session.status());
    } else {
        let count = session.load_catalog().await?;
        log::info!("Loaded {} table(s) from {}", count, args.solution);

        let keys: Vec<String> = session
            .catalog()
            .iter()
            .map(|t| t.logical_name.clone())
            .collect();
        session.add_tables(&keys);
        session.wait_until_idle().await;
    }

    let failed: Vec<String> = session
        .store()
        .tables()
        .filter(|state| {
            state.load.attributes.is_failed() || state.load.forms_and_views.is_failed()
        })
        .map(|state| state.metadata.logical_name.clone())
        .collect();
    if !failed.is_empty() {
        anyhow::bail!(
            "Metadata could not be loaded for: {}. Re-run to retry.",
            failed.join(", ")
        );
    }

    let project = args.project.unwrap_or_else(|| args.solution.clone());
    let document = session.build_export(&project).await?;
    let path = write_document(&document, &args.output)?;

    session.remember_output(&args.output.to_string_lossy(), &project);
    session.flush_settings().await;

    let total_attributes: usize = document.tables.iter().map(|t| t.attributes.len()).sum();
    println!(
        "Exported {} table(s), {} attribute(s) to {}",
        document.tables.len(),
        total_attributes,
        path.display()
    );
    Ok(())
}
