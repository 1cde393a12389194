//! Install and activate procedures.
//!
//! Install seeds the static generation from the manifest and pre-populates
//! external resources into the dynamic generation. Every item succeeds or
//! fails on its own; a partial seed is still a completed install.
//!
//! Activate deletes every generation whose name is not current for this
//! version, so storage never accumulates across version bumps.

use futures_util::future::{join, join_all};
use relaycache_core::{CacheStore, Error, ResourceRequest};
use serde::Serialize;
use url::Url;

use crate::fetch::Network;

/// Result of seeding one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-item results of an install.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub static_entries: Vec<ItemOutcome>,
    pub external_entries: Vec<ItemOutcome>,
}

impl InstallReport {
    pub fn seeded(&self) -> usize {
        self.static_entries.iter().chain(&self.external_entries).filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.static_entries.len() + self.external_entries.len() - self.seeded()
    }
}

/// Generations removed and kept by an activation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivateReport {
    pub deleted: Vec<String>,
    pub retained: Vec<String>,
}

async fn seed(store: &CacheStore, network: &dyn Network, generation: &str, url: &Url) -> ItemOutcome {
    let request = ResourceRequest::get(url.clone());
    let result: Result<(), Error> = async {
        let response = network.fetch(&request).await?;
        if !response.is_success() {
            return Err(Error::HttpStatus { status: response.status, url: url.to_string() });
        }
        store.put(generation, &request, &response).await
    }
    .await;

    match result {
        Ok(()) => ItemOutcome { url: url.to_string(), error: None },
        Err(err) => {
            tracing::warn!(url = %url, generation, error = %err, "failed to cache during install");
            ItemOutcome { url: url.to_string(), error: Some(err.to_string()) }
        }
    }
}

/// Seed the current generations.
///
/// # Errors
///
/// Fails only if a generation cannot be opened; individual seed failures
/// are recorded in the report instead.
pub async fn install(
    store: &CacheStore, network: &dyn Network, manifest: &[Url], external: &[Url],
) -> Result<InstallReport, Error> {
    let names = store.names();
    store.open_generation(&names.static_name).await?;
    store.open_generation(&names.dynamic_name).await?;

    tracing::info!(generation = %names.static_name, count = manifest.len(), "caching static assets");
    tracing::info!(generation = %names.dynamic_name, count = external.len(), "caching external resources");

    let (static_entries, external_entries) = join(
        join_all(manifest.iter().map(|url| seed(store, network, &names.static_name, url))),
        join_all(external.iter().map(|url| seed(store, network, &names.dynamic_name, url))),
    )
    .await;

    let report = InstallReport { static_entries, external_entries };
    tracing::info!(seeded = report.seeded(), failed = report.failed(), "installation complete");
    Ok(report)
}

/// Purge every generation that is not current.
///
/// # Errors
///
/// Fails if the generation names cannot be listed. A failed delete is logged
/// and the generation is reported as retained.
pub async fn activate(store: &CacheStore) -> Result<ActivateReport, Error> {
    let names = store.names();
    let mut report = ActivateReport::default();

    for name in store.list_generation_names().await? {
        if names.is_current(&name) {
            report.retained.push(name);
            continue;
        }

        tracing::info!(generation = %name, "deleting old cache");
        match store.delete_generation(&name).await {
            Ok(_) => report.deleted.push(name),
            Err(err) => {
                tracing::warn!(generation = %name, error = %err, "failed to delete old cache");
                report.retained.push(name);
            }
        }
    }

    tracing::info!(deleted = report.deleted.len(), "activation complete");
    Ok(report)
}
