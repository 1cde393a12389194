//! Core types and shared functionality for relaycache.
//!
//! This crate provides:
//! - Request/response snapshots
//! - Resource classification
//! - Cache generation store with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod resource;

pub use cache::{CacheNames, CacheStore};
pub use classify::{Classifier, ResourceClass, StrategyKind};
pub use config::{AppConfig, ConfigError, NotificationConfig};
pub use error::Error;
pub use resource::{RequestMode, ResourceRequest, ResourceResponse};
