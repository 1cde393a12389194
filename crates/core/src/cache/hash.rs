//! Request identity keys for generation entries.

use sha2::{Digest, Sha256};

use crate::resource::ResourceRequest;

/// Compute the entry key for a request identity.
///
/// The identity is the upper-cased method, the URL without its fragment, and
/// a vary string. Callers that do not vary on headers pass `""`.
pub fn compute_request_key(method: &str, url: &str, vary: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(vary.as_bytes());
    hex::encode(hasher.finalize())
}

/// Entry key for a request. Headers are not part of the match.
pub fn request_key(request: &ResourceRequest) -> String {
    let mut url = request.url.clone();
    url.set_fragment(None);
    compute_request_key(&request.method, url.as_str(), "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_request_key("GET", "https://example.com/", "");
        let hash2 = compute_request_key("GET", "https://example.com/", "");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_method_case_insensitive() {
        assert_eq!(
            compute_request_key("get", "https://example.com/", ""),
            compute_request_key("GET", "https://example.com/", "")
        );
    }

    #[test]
    fn test_hash_different_method() {
        assert_ne!(
            compute_request_key("GET", "https://example.com/", ""),
            compute_request_key("HEAD", "https://example.com/", "")
        );
    }

    #[test]
    fn test_hash_different_vary() {
        let hash1 = compute_request_key("GET", "https://example.com/", "gzip");
        let hash2 = compute_request_key("GET", "https://example.com/", "br");
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_request_key("GET", "https://example.com/", "");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_request_key_ignores_fragment_and_headers() {
        let plain = ResourceRequest::get(Url::parse("https://example.com/index.html").unwrap());
        let decorated = ResourceRequest::navigate(Url::parse("https://example.com/index.html#top").unwrap())
            .with_header("accept", "text/html");
        assert_eq!(request_key(&plain), request_key(&decorated));
    }
}
