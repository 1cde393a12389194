//! Caching strategies.
//!
//! | strategy               | reads                     | writes            |
//! |------------------------|---------------------------|-------------------|
//! | network-first          | dynamic, then any on miss | dynamic           |
//! | cache-first            | any                       | static            |
//! | stale-while-revalidate | any                       | dynamic, detached |
//!
//! "Any" means the current static generation, then the current dynamic one.
//! Storage failures are logged and never fail the response.

use std::sync::Arc;

use relaycache_core::{CacheStore, Error, ResourceRequest, ResourceResponse, StrategyKind};

use crate::fetch::Network;

/// Runs a strategy against the generation store and the network.
#[derive(Clone)]
pub struct StrategyExecutor {
    store: CacheStore,
    network: Arc<dyn Network>,
}

impl StrategyExecutor {
    pub fn new(store: CacheStore, network: Arc<dyn Network>) -> Self {
        Self { store, network }
    }

    /// Produce a response for `request` using `strategy`.
    ///
    /// Fails only when neither the network nor the cache can answer.
    pub async fn execute(&self, request: &ResourceRequest, strategy: StrategyKind) -> Result<ResourceResponse, Error> {
        match strategy {
            StrategyKind::NetworkFirst => self.network_first(request).await,
            StrategyKind::CacheFirst => self.cache_first(request).await,
            StrategyKind::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }

    async fn network_first(&self, request: &ResourceRequest) -> Result<ResourceResponse, Error> {
        match self.network.fetch(request).await {
            Ok(response) if response.is_success() => {
                store_best_effort(&self.store, &self.store.names().dynamic_name, request, &response).await;
                Ok(response)
            }
            Ok(response) => {
                tracing::debug!(url = %request.url, status = response.status, "upstream error, trying cache");
                Ok(self.cached_after_network_failure(request).await.unwrap_or(response))
            }
            Err(err) => {
                tracing::info!(url = %request.url, error = %err, "network failed, trying cache");
                self.cached_after_network_failure(request).await.ok_or(err)
            }
        }
    }

    async fn cache_first(&self, request: &ResourceRequest) -> Result<ResourceResponse, Error> {
        if let Some(hit) = self.match_any(request).await {
            return Ok(hit);
        }

        let response = self.network.fetch(request).await.inspect_err(|err| {
            tracing::warn!(url = %request.url, error = %err, "cache-first fetch failed");
        })?;

        if response.is_success() {
            store_best_effort(&self.store, &self.store.names().static_name, request, &response).await;
        }

        Ok(response)
    }

    async fn stale_while_revalidate(&self, request: &ResourceRequest) -> Result<ResourceResponse, Error> {
        let cached = self.match_any(request).await;

        // Started before answering so the refresh runs even on a cache hit.
        let revalidation = tokio::spawn(revalidate(self.store.clone(), self.network.clone(), request.clone()));

        if let Some(hit) = cached {
            return Ok(hit);
        }

        revalidation.await.map_err(|e| Error::TaskFailed(e.to_string()))?
    }

    async fn cached_after_network_failure(&self, request: &ResourceRequest) -> Option<ResourceResponse> {
        match self.store.get(&self.store.names().dynamic_name, request).await {
            Ok(Some(hit)) => return Some(hit),
            Ok(None) => {}
            Err(err) => tracing::warn!(url = %request.url, error = %err, "dynamic cache lookup failed"),
        }
        self.match_any(request).await
    }

    async fn match_any(&self, request: &ResourceRequest) -> Option<ResourceResponse> {
        self.store
            .match_any(request)
            .await
            .inspect_err(|err| tracing::warn!(url = %request.url, error = %err, "cache lookup failed"))
            .ok()
            .flatten()
    }
}

/// Fetch `request` and schedule a dynamic-generation write on success.
///
/// The write is a detached task; this returns as soon as the network answers.
async fn revalidate(
    store: CacheStore, network: Arc<dyn Network>, request: ResourceRequest,
) -> Result<ResourceResponse, Error> {
    let response = network.fetch(&request).await.inspect_err(|err| {
        tracing::warn!(url = %request.url, error = %err, "background update failed");
    })?;

    if response.is_success() {
        let copy = response.clone();
        tokio::spawn(async move {
            let generation = store.names().dynamic_name.clone();
            store_best_effort(&store, &generation, &request, &copy).await;
        });
    }

    Ok(response)
}

async fn store_best_effort(store: &CacheStore, generation: &str, request: &ResourceRequest, response: &ResourceResponse) {
    if let Err(err) = store.put(generation, request, response).await {
        tracing::warn!(url = %request.url, generation, error = %err, "failed to cache response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedNetwork;
    use relaycache_core::CacheNames;
    use std::time::Duration;
    use url::Url;

    const FEED: &str = "http://localhost:8080/articles.json";
    const SHELL: &str = "http://localhost:8080/index.html";
    const GTAG: &str = "https://www.googletagmanager.com/gtag/js";

    async fn setup() -> (CacheStore, Arc<ScriptedNetwork>, StrategyExecutor) {
        let store = CacheStore::open_in_memory(CacheNames::for_version("tech-news", "v2")).await.unwrap();
        let network = ScriptedNetwork::new();
        let executor = StrategyExecutor::new(store.clone(), network.clone());
        (store, network, executor)
    }

    fn request(url: &str) -> ResourceRequest {
        ResourceRequest::get(Url::parse(url).unwrap())
    }

    async fn wait_for_body(store: &CacheStore, generation: &str, req: &ResourceRequest, expected: &[u8]) {
        for _ in 0..100 {
            if let Some(hit) = store.get(generation, req).await.unwrap()
                && hit.body.as_ref() == expected
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{generation} never stored expected body for {}", req.url);
    }

    #[tokio::test]
    async fn test_network_first_stores_in_dynamic() {
        let (store, network, executor) = setup().await;
        network.respond(FEED, ResourceResponse::ok(r#"{"articles":[]}"#));
        let req = request(FEED);

        let response = executor.execute(&req, StrategyKind::NetworkFirst).await.unwrap();

        assert_eq!(&response.body[..], br#"{"articles":[]}"#);
        let stored = store.get("dynamic-v2", &req).await.unwrap().unwrap();
        assert_eq!(stored, response);
        assert!(store.get("static-v2", &req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_network_first_offline_serves_dynamic_entry() {
        let (store, network, executor) = setup().await;
        let req = request(FEED);
        store.put("dynamic-v2", &req, &ResourceResponse::ok("cached feed")).await.unwrap();
        network.fail(FEED);

        let response = executor.execute(&req, StrategyKind::NetworkFirst).await.unwrap();
        assert_eq!(&response.body[..], b"cached feed");
    }

    #[tokio::test]
    async fn test_network_first_offline_falls_back_to_static() {
        let (store, _network, executor) = setup().await;
        let req = request(FEED);
        store.put("static-v2", &req, &ResourceResponse::ok("seeded feed")).await.unwrap();

        let response = executor.execute(&req, StrategyKind::NetworkFirst).await.unwrap();
        assert_eq!(&response.body[..], b"seeded feed");
    }

    #[tokio::test]
    async fn test_network_first_offline_empty_cache_fails() {
        let (_store, _network, executor) = setup().await;
        let result = executor.execute(&request(FEED), StrategyKind::NetworkFirst).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_network_first_error_status_prefers_cache() {
        let (store, network, executor) = setup().await;
        let req = request(FEED);
        store.put("dynamic-v2", &req, &ResourceResponse::ok("last good")).await.unwrap();
        network.respond(FEED, ResourceResponse::new(500, "Internal Server Error", "boom"));

        let response = executor.execute(&req, StrategyKind::NetworkFirst).await.unwrap();
        assert_eq!(&response.body[..], b"last good");
        let stored = store.get("dynamic-v2", &req).await.unwrap().unwrap();
        assert_eq!(&stored.body[..], b"last good");
    }

    #[tokio::test]
    async fn test_network_first_error_status_without_cache_passes_through() {
        let (store, network, executor) = setup().await;
        let req = request(FEED);
        network.respond(FEED, ResourceResponse::new(404, "Not Found", "missing"));

        let response = executor.execute(&req, StrategyKind::NetworkFirst).await.unwrap();
        assert_eq!(response.status, 404);
        assert!(store.get("dynamic-v2", &req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_first_hit_skips_network() {
        let (store, network, executor) = setup().await;
        let req = request(SHELL);
        let body: Vec<u8> = vec![0, 159, 146, 150, 255];
        store.put("static-v2", &req, &ResourceResponse::ok(body.clone())).await.unwrap();
        network.respond(SHELL, ResourceResponse::ok("fresh"));

        let response = executor.execute(&req, StrategyKind::CacheFirst).await.unwrap();

        assert_eq!(response.body.as_ref(), body.as_slice());
        assert!(network.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cache_first_hit_in_dynamic() {
        let (store, network, executor) = setup().await;
        let req = request(SHELL);
        store.put("dynamic-v2", &req, &ResourceResponse::ok("dyn")).await.unwrap();

        let response = executor.execute(&req, StrategyKind::CacheFirst).await.unwrap();
        assert_eq!(&response.body[..], b"dyn");
        assert_eq!(network.call_count(SHELL), 0);
    }

    #[tokio::test]
    async fn test_cache_first_miss_stores_in_static() {
        let (store, network, executor) = setup().await;
        let req = request(SHELL);
        network.respond(SHELL, ResourceResponse::ok("<html>"));

        let response = executor.execute(&req, StrategyKind::CacheFirst).await.unwrap();

        assert_eq!(&response.body[..], b"<html>");
        assert!(store.get("static-v2", &req).await.unwrap().is_some());
        assert!(store.get("dynamic-v2", &req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_first_miss_offline_fails() {
        let (_store, _network, executor) = setup().await;
        let result = executor.execute(&request(SHELL), StrategyKind::CacheFirst).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cache_first_does_not_store_error_status() {
        let (store, network, executor) = setup().await;
        let req = request(SHELL);
        network.respond(SHELL, ResourceResponse::new(503, "Service Unavailable", ""));

        let response = executor.execute(&req, StrategyKind::CacheFirst).await.unwrap();
        assert_eq!(response.status, 503);
        assert!(store.match_any(&req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_swr_returns_cached_without_waiting() {
        let (store, network, executor) = setup().await;
        let req = request(GTAG);
        store.put("dynamic-v2", &req, &ResourceResponse::ok("stale script")).await.unwrap();
        network.respond(GTAG, ResourceResponse::ok("fresh script"));
        let gate = network.gate(GTAG);

        // The fetch is parked on the gate, so this only returns if it does not wait.
        let response = tokio::time::timeout(Duration::from_secs(1), executor.execute(&req, StrategyKind::StaleWhileRevalidate))
            .await
            .expect("stale-while-revalidate waited on the network")
            .unwrap();
        assert_eq!(&response.body[..], b"stale script");

        // Nothing has been written yet.
        let current = store.get("dynamic-v2", &req).await.unwrap().unwrap();
        assert_eq!(&current.body[..], b"stale script");

        gate.notify_one();
        wait_for_body(&store, "dynamic-v2", &req, b"fresh script").await;
        assert_eq!(network.call_count(GTAG), 1);
    }

    #[tokio::test]
    async fn test_swr_miss_waits_for_network() {
        let (store, network, executor) = setup().await;
        let req = request(GTAG);
        network.respond(GTAG, ResourceResponse::ok("script"));

        let response = executor.execute(&req, StrategyKind::StaleWhileRevalidate).await.unwrap();

        assert_eq!(&response.body[..], b"script");
        wait_for_body(&store, "dynamic-v2", &req, b"script").await;
    }

    #[tokio::test]
    async fn test_swr_miss_offline_fails() {
        let (_store, _network, executor) = setup().await;
        let result = executor.execute(&request(GTAG), StrategyKind::StaleWhileRevalidate).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_swr_hit_offline_still_serves_cache() {
        let (store, network, executor) = setup().await;
        let req = request(GTAG);
        store.put("static-v2", &req, &ResourceResponse::ok("seeded")).await.unwrap();
        network.fail(GTAG);

        let response = executor.execute(&req, StrategyKind::StaleWhileRevalidate).await.unwrap();
        assert_eq!(&response.body[..], b"seeded");
    }
}
