//! Offline fallback for requests no strategy could answer.
//!
//! The branch is chosen by request intent, not classification:
//! - navigations get the cached root document, else the cached index document
//! - JSON paths get one more cache lookup, else a synthesized 503 payload
//! - anything else keeps the original failure

use chrono::{SecondsFormat, Utc};
use relaycache_core::{CacheStore, Error, ResourceRequest, ResourceResponse};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::fetch::resolve;

/// Shell documents tried for navigations, in order.
const SHELL_PATHS: [&str; 2] = ["/", "/index.html"];

/// Error tag of every synthesized payload.
pub const OFFLINE_ERROR: &str = "Offline";

/// Body of the synthesized offline response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackPayload {
    pub error: String,
    pub message: String,
    /// ISO-8601, millisecond precision, UTC.
    pub timestamp: String,
}

impl FallbackPayload {
    pub fn offline(message: &str) -> Self {
        Self {
            error: OFFLINE_ERROR.to_string(),
            message: message.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// The payload as a 503 JSON response.
    pub fn into_response(self) -> Result<ResourceResponse, Error> {
        let body = serde_json::to_vec(&self).map_err(|e| Error::Internal(format!("offline payload: {e}")))?;
        Ok(ResourceResponse::new(503, "Service Unavailable", body).with_header("content-type", "application/json"))
    }
}

/// Last-resort responder consulted after a strategy failed.
#[derive(Clone)]
pub struct OfflineFallback {
    store: CacheStore,
    origin: Url,
    message: String,
}

impl OfflineFallback {
    pub fn new(store: CacheStore, origin: Url, message: impl Into<String>) -> Self {
        Self { store, origin, message: message.into() }
    }

    /// Answer `request` after `cause` left it unanswered.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoOfflineFallback` for a navigation with no cached shell,
    /// and `cause` itself for content with no defined fallback shape.
    pub async fn respond(&self, request: &ResourceRequest, cause: Error) -> Result<ResourceResponse, Error> {
        if request.is_navigation() {
            return match self.cached_shell().await {
                Some(shell) => {
                    tracing::info!(url = %request.url, "serving cached shell while offline");
                    Ok(shell)
                }
                None => Err(Error::NoOfflineFallback(format!("no cached shell for {} ({cause})", request.url))),
            };
        }

        if request.is_json() {
            if let Some(hit) = self.lookup(request).await {
                return Ok(hit);
            }
            tracing::info!(url = %request.url, "synthesizing offline payload");
            return FallbackPayload::offline(&self.message).into_response();
        }

        tracing::debug!(url = %request.url, error = %cause, "no offline fallback for content type");
        Err(cause)
    }

    async fn cached_shell(&self) -> Option<ResourceResponse> {
        for path in SHELL_PATHS {
            let url = match resolve(&self.origin, path) {
                Ok(url) => url,
                Err(err) => {
                    tracing::warn!(path, error = %err, "cannot resolve shell path");
                    continue;
                }
            };
            if let Some(hit) = self.lookup(&ResourceRequest::get(url)).await {
                return Some(hit);
            }
        }
        None
    }

    async fn lookup(&self, request: &ResourceRequest) -> Option<ResourceResponse> {
        self.store
            .match_any(request)
            .await
            .inspect_err(|err| tracing::warn!(url = %request.url, error = %err, "fallback cache lookup failed"))
            .ok()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaycache_core::CacheNames;

    const MESSAGE: &str = "オフライン中です。キャッシュされたコンテンツを表示しています。";

    async fn setup() -> (CacheStore, OfflineFallback) {
        let store = CacheStore::open_in_memory(CacheNames::for_version("tech-news", "v2")).await.unwrap();
        let origin = Url::parse("http://localhost:8080").unwrap();
        let fallback = OfflineFallback::new(store.clone(), origin, MESSAGE);
        (store, fallback)
    }

    fn url(path: &str) -> Url {
        Url::parse(&format!("http://localhost:8080{path}")).unwrap()
    }

    fn offline() -> Error {
        Error::Network("unreachable".into())
    }

    #[tokio::test]
    async fn test_navigation_prefers_root_document() {
        let (store, fallback) = setup().await;
        store.put("static-v2", &ResourceRequest::get(url("/")), &ResourceResponse::ok("root")).await.unwrap();
        store.put("static-v2", &ResourceRequest::get(url("/index.html")), &ResourceResponse::ok("index")).await.unwrap();

        let response = fallback.respond(&ResourceRequest::navigate(url("/articles/some-slug")), offline()).await.unwrap();
        assert_eq!(&response.body[..], b"root");
    }

    #[tokio::test]
    async fn test_navigation_uses_index_when_root_missing() {
        let (store, fallback) = setup().await;
        store.put("static-v2", &ResourceRequest::get(url("/index.html")), &ResourceResponse::ok("index")).await.unwrap();

        let response = fallback.respond(&ResourceRequest::navigate(url("/spa.html")), offline()).await.unwrap();
        assert_eq!(&response.body[..], b"index");
    }

    #[tokio::test]
    async fn test_navigation_without_shell_fails() {
        let (_store, fallback) = setup().await;
        let result = fallback.respond(&ResourceRequest::navigate(url("/")), offline()).await;
        assert!(matches!(result, Err(Error::NoOfflineFallback(_))));
    }

    #[tokio::test]
    async fn test_json_empty_cache_synthesizes_503() {
        let (_store, fallback) = setup().await;
        let response = fallback.respond(&ResourceRequest::get(url("/articles.json")), offline()).await.unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(response.status_text, "Service Unavailable");
        assert_eq!(response.content_type(), Some("application/json"));

        let payload: FallbackPayload = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(payload.error, "Offline");
        assert_eq!(payload.message, MESSAGE);
        assert!(chrono::DateTime::parse_from_rfc3339(&payload.timestamp).is_ok());
        assert!(payload.timestamp.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_json_served_from_cache_when_present() {
        let (store, fallback) = setup().await;
        let req = ResourceRequest::get(url("/performance.json"));
        store.put("dynamic-v2", &req, &ResourceResponse::ok("{\"lcp\":1.2}")).await.unwrap();

        let response = fallback.respond(&req, offline()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"{\"lcp\":1.2}");
    }

    #[tokio::test]
    async fn test_other_content_keeps_original_error() {
        let (store, fallback) = setup().await;
        store.put("static-v2", &ResourceRequest::get(url("/")), &ResourceResponse::ok("root")).await.unwrap();

        let result = fallback.respond(&ResourceRequest::get(url("/app.js")), offline()).await;
        assert!(matches!(result, Err(Error::Network(msg)) if msg == "unreachable"));
    }

    #[test]
    fn test_payload_into_response_round_trips() {
        let payload = FallbackPayload::offline(MESSAGE);
        let response = payload.clone().into_response().unwrap();
        let decoded: FallbackPayload = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_payload_shape() {
        let value = serde_json::to_value(FallbackPayload::offline("m")).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(obj["error"], "Offline");
        assert_eq!(obj["message"], "m");
        assert!(obj["timestamp"].is_string());
    }
}
