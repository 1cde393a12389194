//! Client side of relaycache.
//!
//! This crate holds the network seam, the caching strategies, the offline
//! fallback, the lifecycle procedures and the [`CacheWorker`] that ties them
//! together behind a single signal dispatch.

pub mod fallback;
pub mod fetch;
pub mod lifecycle;
pub mod notify;
pub mod resync;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod testing;

pub use fallback::{FallbackPayload, OfflineFallback};
pub use fetch::{FetchClient, FetchConfig, Network};
pub use lifecycle::{ActivateReport, InstallReport, ItemOutcome};
pub use notify::{Notification, NotificationDispatcher};
pub use resync::ResyncReport;
pub use strategy::StrategyExecutor;
pub use worker::{CacheWorker, Dispatched, FetchOutcome, HostAction, Signal, SignalOutcome, WorkerState};
