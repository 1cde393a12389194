//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (RELAYCACHE_*)
//! 2. TOML config file (if RELAYCACHE_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! List-valued settings (manifest, patterns, allowlist) are meant to be set
//! from the TOML file.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::CacheNames;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (RELAYCACHE_*)
/// 2. TOML config file (if RELAYCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin the worker is installed for; manifest paths resolve against it.
    ///
    /// Set via RELAYCACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path to SQLite cache database.
    ///
    /// Set via RELAYCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Version tag embedded in every generation name.
    ///
    /// Set via RELAYCACHE_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Prefix of the legacy umbrella generation kept alive across activation.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via RELAYCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via RELAYCACHE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via RELAYCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Paths fetched into the static generation at install time.
    #[serde(default = "default_static_manifest")]
    pub static_manifest: Vec<String>,

    /// Path suffixes classified as long-lived static assets.
    #[serde(default = "default_static_suffixes")]
    pub static_suffixes: Vec<String>,

    /// Regular expressions over the URL path for frequently-changing documents.
    #[serde(default = "default_dynamic_patterns")]
    pub dynamic_patterns: Vec<String>,

    /// Third-party resources pre-cached at install; their origins form the
    /// external allowlist.
    #[serde(default = "default_external_resources")]
    pub external_resources: Vec<String>,

    /// Tag of the reconnect signal that triggers resubmission.
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,

    /// URL substrings marking analytics-class requests for resubmission.
    #[serde(default = "default_resync_patterns")]
    pub resync_patterns: Vec<String>,

    /// Message placed in the synthesized offline payload.
    #[serde(default = "default_offline_message")]
    pub offline_message: String,

    /// Push notification presentation.
    #[serde(default)]
    pub notification: NotificationConfig,
}

/// Presentation defaults for push notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_notification_title")]
    pub title: String,
    #[serde(default = "default_notification_body")]
    pub body: String,
    #[serde(default = "default_notification_icon")]
    pub icon: String,
    #[serde(default = "default_notification_tag")]
    pub tag: String,
    #[serde(default = "default_view_title")]
    pub view_title: String,
    #[serde(default = "default_close_title")]
    pub close_title: String,
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./relaycache.sqlite")
}

fn default_cache_version() -> String {
    "v1.2".into()
}

fn default_app_name() -> String {
    "tech-news".into()
}

fn default_user_agent() -> String {
    "relaycache/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_static_manifest() -> Vec<String> {
    ["/", "/index.html", "/spa.html", "/articles.json", "/favicon.ico", "/sitemap.xml", "/robots.txt"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_static_suffixes() -> Vec<String> {
    [".html", ".ico", ".txt"].into_iter().map(String::from).collect()
}

fn default_dynamic_patterns() -> Vec<String> {
    [
        r"/articles\.json$",
        r"/sitemap\.xml$",
        r"/performance\.json$",
        r"/news_sitemap\.xml$",
        r"/sitemap_index\.xml$",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_external_resources() -> Vec<String> {
    [
        "https://www.googletagmanager.com/gtag/js",
        "https://pagead2.googlesyndication.com/pagead/js/adsbygoogle.js",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_sync_tag() -> String {
    "performance-sync".into()
}

fn default_resync_patterns() -> Vec<String> {
    vec!["analytics".into(), "gtag".into()]
}

fn default_offline_message() -> String {
    "オフライン中です。キャッシュされたコンテンツを表示しています。".into()
}

fn default_notification_title() -> String {
    "日本のテックニュース速報".into()
}

fn default_notification_body() -> String {
    "新しいテックニュースが更新されました".into()
}

fn default_notification_icon() -> String {
    "/favicon.ico".into()
}

fn default_notification_tag() -> String {
    "tech-news-update".into()
}

fn default_view_title() -> String {
    "記事を見る".into()
}

fn default_close_title() -> String {
    "閉じる".into()
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: default_notification_title(),
            body: default_notification_body(),
            icon: default_notification_icon(),
            tag: default_notification_tag(),
            view_title: default_view_title(),
            close_title: default_close_title(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            db_path: default_db_path(),
            cache_version: default_cache_version(),
            app_name: default_app_name(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            static_manifest: default_static_manifest(),
            static_suffixes: default_static_suffixes(),
            dynamic_patterns: default_dynamic_patterns(),
            external_resources: default_external_resources(),
            sync_tag: default_sync_tag(),
            resync_patterns: default_resync_patterns(),
            offline_message: default_offline_message(),
            notification: NotificationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Current generation names derived from the version tag.
    pub fn cache_names(&self) -> CacheNames {
        CacheNames::for_version(&self.app_name, &self.cache_version)
    }

    /// The configured origin as a parsed URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin does not parse.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin).map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `RELAYCACHE_`
    /// 2. TOML file from `RELAYCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("RELAYCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("RELAYCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
