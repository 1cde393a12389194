//! Deferred resubmission of analytics-class requests on reconnect.
//!
//! One attempt per request per signal. Nothing is written back to the cache
//! and failures are only logged.

use relaycache_core::CacheStore;
use serde::Serialize;

use crate::fetch::Network;
use crate::lifecycle::ItemOutcome;

/// What a resync pass attempted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResyncReport {
    pub attempts: Vec<ItemOutcome>,
}

impl ResyncReport {
    pub fn delivered(&self) -> usize {
        self.attempts.iter().filter(|a| a.is_ok()).count()
    }
}

/// Whether `url` looks like telemetry worth replaying.
pub fn is_analytics(url: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| url.contains(p.as_str()))
}

/// Re-issue every analytics-class request stored in the dynamic generation.
pub async fn resubmit(store: &CacheStore, network: &dyn Network, patterns: &[String]) -> ResyncReport {
    let generation = &store.names().dynamic_name;
    let requests = match store.keys(generation).await {
        Ok(requests) => requests,
        Err(err) => {
            tracing::error!(generation = %generation, error = %err, "performance sync failed");
            return ResyncReport::default();
        }
    };

    let mut report = ResyncReport::default();
    for request in requests.into_iter().filter(|r| is_analytics(r.url.as_str(), patterns)) {
        let error = match network.fetch(&request).await {
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(url = %request.url, error = %err, "failed to sync");
                Some(err.to_string())
            }
        };
        report.attempts.push(ItemOutcome { url: request.url.to_string(), error });
    }

    tracing::debug!(attempted = report.attempts.len(), delivered = report.delivered(), "resync finished");
    report
}
