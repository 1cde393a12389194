//! Request classification by URL shape.
//!
//! Every URL maps to exactly one [`ResourceClass`]; the class picks the
//! caching strategy. Checks run in this order:
//!
//! 1. path matches a dynamic pattern → `Dynamic`
//! 2. path is `/` or ends in a static suffix → `Static`
//! 3. origin in the external allowlist → `External`
//! 4. anything else → `Other`

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::{Origin, Url};

use crate::Error;
use crate::config::AppConfig;

/// Content role of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    Static,
    Dynamic,
    External,
    Other,
}

/// Caching strategy applied to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    NetworkFirst,
    CacheFirst,
    StaleWhileRevalidate,
}

impl ResourceClass {
    /// Strategy for this class; unclassified traffic defaults to network-first.
    pub fn strategy(self) -> StrategyKind {
        match self {
            ResourceClass::Dynamic | ResourceClass::Other => StrategyKind::NetworkFirst,
            ResourceClass::Static => StrategyKind::CacheFirst,
            ResourceClass::External => StrategyKind::StaleWhileRevalidate,
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceClass::Static => write!(f, "static"),
            ResourceClass::Dynamic => write!(f, "dynamic"),
            ResourceClass::External => write!(f, "external"),
            ResourceClass::Other => write!(f, "other"),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::NetworkFirst => write!(f, "network-first"),
            StrategyKind::CacheFirst => write!(f, "cache-first"),
            StrategyKind::StaleWhileRevalidate => write!(f, "stale-while-revalidate"),
        }
    }
}

/// Compiled classification rules.
#[derive(Debug, Clone)]
pub struct Classifier {
    dynamic_patterns: Vec<Regex>,
    static_suffixes: Vec<String>,
    external_origins: Vec<Origin>,
}

impl Classifier {
    /// Compile the rule set.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPattern` for a pattern that does not compile and
    /// `Error::InvalidUrl` for an external resource that does not parse.
    pub fn new<P, S, E>(dynamic_patterns: P, static_suffixes: S, external_resources: E) -> Result<Self, Error>
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: Into<String>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let dynamic_patterns = dynamic_patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()).map_err(|e| Error::InvalidPattern(format!("{}: {e}", p.as_ref()))))
            .collect::<Result<Vec<_>, _>>()?;

        let mut external_origins: Vec<Origin> = Vec::new();
        for resource in external_resources {
            let url = Url::parse(resource.as_ref()).map_err(|e| Error::InvalidUrl(format!("{}: {e}", resource.as_ref())))?;
            let origin = url.origin();
            if !external_origins.contains(&origin) {
                external_origins.push(origin);
            }
        }

        Ok(Self { dynamic_patterns, static_suffixes: static_suffixes.into_iter().map(Into::into).collect(), external_origins })
    }

    /// Build from the loaded configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Self::new(&config.dynamic_patterns, config.static_suffixes.iter().cloned(), &config.external_resources)
    }

    /// Classify a URL. Total and side-effect free.
    pub fn classify(&self, url: &Url) -> ResourceClass {
        let path = url.path();
        if self.dynamic_patterns.iter().any(|p| p.is_match(path)) {
            return ResourceClass::Dynamic;
        }

        if path == "/" || self.static_suffixes.iter().any(|s| path.ends_with(s.as_str())) {
            return ResourceClass::Static;
        }

        if self.is_external(url) {
            return ResourceClass::External;
        }

        ResourceClass::Other
    }

    fn is_external(&self, url: &Url) -> bool {
        let origin = url.origin();
        origin.is_tuple() && self.external_origins.contains(&origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::from_config(&AppConfig::default()).unwrap()
    }

    fn classify(s: &str) -> ResourceClass {
        classifier().classify(&Url::parse(s).unwrap())
    }

    #[test]
    fn test_dynamic_patterns() {
        for path in ["/articles.json", "/sitemap.xml", "/performance.json", "/news_sitemap.xml", "/sitemap_index.xml"] {
            assert_eq!(classify(&format!("http://localhost:8080{path}")), ResourceClass::Dynamic, "{path}");
        }
    }

    #[test]
    fn test_dynamic_wins_over_static_manifest_membership() {
        // /articles.json is seeded statically but still served network-first.
        assert_eq!(classify("http://localhost:8080/articles.json?v=3"), ResourceClass::Dynamic);
    }

    #[test]
    fn test_static_suffixes_and_root() {
        for path in ["/", "/index.html", "/spa.html", "/articles/2024/slug.html", "/favicon.ico", "/robots.txt"] {
            assert_eq!(classify(&format!("http://localhost:8080{path}")), ResourceClass::Static, "{path}");
        }
    }

    #[test]
    fn test_external_origins() {
        assert_eq!(classify("https://www.googletagmanager.com/gtag/js?id=G-XYZ"), ResourceClass::External);
        assert_eq!(classify("https://pagead2.googlesyndication.com/pagead/js/adsbygoogle.js"), ResourceClass::External);
    }

    #[test]
    fn test_path_rules_win_over_external_origin() {
        assert_eq!(classify("https://www.googletagmanager.com/"), ResourceClass::Static);
        assert_eq!(classify("https://www.googletagmanager.com/ns.html?id=GTM-1"), ResourceClass::Static);
        assert_eq!(classify("https://pagead2.googlesyndication.com/sitemap.xml"), ResourceClass::Dynamic);
    }

    #[test]
    fn test_external_origin_requires_scheme_match() {
        assert_eq!(classify("http://www.googletagmanager.com/gtag/js"), ResourceClass::Other);
    }

    #[test]
    fn test_other() {
        assert_eq!(classify("http://localhost:8080/app.c75884a6.js"), ResourceClass::Other);
        assert_eq!(classify("http://localhost:8080/styles.css"), ResourceClass::Other);
        assert_eq!(classify("https://cdn.example.com/lib.js"), ResourceClass::Other);
        assert_eq!(classify("http://localhost:8080/articles.json.bak"), ResourceClass::Other);
    }

    #[test]
    fn test_strategy_mapping() {
        assert_eq!(ResourceClass::Dynamic.strategy(), StrategyKind::NetworkFirst);
        assert_eq!(ResourceClass::Static.strategy(), StrategyKind::CacheFirst);
        assert_eq!(ResourceClass::External.strategy(), StrategyKind::StaleWhileRevalidate);
        assert_eq!(ResourceClass::Other.strategy(), StrategyKind::NetworkFirst);
    }

    #[test]
    fn test_deterministic() {
        let c = classifier();
        let url = Url::parse("http://localhost:8080/sitemap.xml").unwrap();
        assert_eq!(c.classify(&url), c.classify(&url));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = Classifier::new(["("], Vec::<String>::new(), Vec::<String>::new());
        assert!(matches!(result, Err(Error::InvalidPattern(_))));
    }

    #[test]
    fn test_display() {
        assert_eq!(ResourceClass::External.to_string(), "external");
        assert_eq!(StrategyKind::StaleWhileRevalidate.to_string(), "stale-while-revalidate");
    }
}
