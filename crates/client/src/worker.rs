//! The caching worker and its signal dispatch.
//!
//! The host runtime drives the worker with [`Signal`]s. Lifecycle signals move
//! it through [`WorkerState`]; fetches are intercepted only once it is
//! activated. Everything the host must do in response (skip waiting, claim
//! clients, show a notification...) comes back as [`HostAction`]s.

use std::fmt;
use std::sync::{Arc, Mutex};

use relaycache_core::{AppConfig, CacheStore, Classifier, Error, ResourceClass, ResourceRequest, ResourceResponse};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::fallback::OfflineFallback;
use crate::fetch::{Network, is_interceptable, resolve};
use crate::lifecycle::{self, ActivateReport, InstallReport};
use crate::notify::{Notification, NotificationDispatcher};
use crate::resync::{self, ResyncReport};
use crate::strategy::StrategyExecutor;

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Created, nothing cached yet.
    Parsed,
    Installing,
    /// Seeded and waiting for activation.
    Installed,
    Activating,
    /// Stale generations purged; fetches are intercepted.
    Activated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
        }
    }
}

/// Inbound signal from the host runtime.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    Install,
    Activate,
    Fetch {
        request: ResourceRequest,
    },
    /// Connectivity probably restored.
    Sync {
        tag: String,
    },
    Push {
        #[serde(default)]
        data: Option<serde_json::Value>,
    },
    NotificationClick {
        #[serde(default)]
        action: Option<String>,
    },
}

/// Something the host runtime must do on the worker's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HostAction {
    /// Activate without waiting for older instances to finish.
    SkipWaiting,
    /// Take control of already-open clients.
    ClaimClients,
    ShowNotification { notification: Notification },
    CloseNotification,
    OpenWindow { url: String },
}

/// How a fetch was handled.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Not intercepted; the host performs the request itself.
    Passthrough,
    Respond { class: ResourceClass, response: ResourceResponse },
}

/// What a signal produced.
#[derive(Debug, Clone)]
pub enum SignalOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetch(FetchOutcome),
    /// `None` when the sync tag is not ours.
    Synced(Option<ResyncReport>),
    /// `None` for a push without data.
    Pushed(Option<Notification>),
    Clicked,
}

/// Outcome plus the host actions it requires.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub outcome: SignalOutcome,
    pub actions: Vec<HostAction>,
}

impl Dispatched {
    fn new(outcome: SignalOutcome) -> Self {
        Self { outcome, actions: Vec::new() }
    }
}

/// The resource-caching worker.
pub struct CacheWorker {
    store: CacheStore,
    network: Arc<dyn Network>,
    classifier: Classifier,
    executor: StrategyExecutor,
    fallback: OfflineFallback,
    notifications: NotificationDispatcher,
    manifest: Vec<Url>,
    external: Vec<Url>,
    sync_tag: String,
    resync_patterns: Vec<String>,
    state: Mutex<WorkerState>,
}

impl CacheWorker {
    /// Build a worker for `config` over an open store.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin, a manifest entry, an external resource
    /// or a classification pattern is invalid.
    pub fn new(config: &AppConfig, store: CacheStore, network: Arc<dyn Network>) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let resolve_all = |entries: &[String]| -> Result<Vec<Url>, Error> {
            entries
                .iter()
                .map(|entry| resolve(&origin, entry).map_err(|e| Error::InvalidUrl(format!("{entry}: {e}"))))
                .collect()
        };
        let manifest = resolve_all(&config.static_manifest)?;
        let external = resolve_all(&config.external_resources)?;
        let root = resolve(&origin, "/").map_err(|e| Error::InvalidUrl(e.to_string()))?;

        Ok(Self {
            classifier: Classifier::from_config(config)?,
            executor: StrategyExecutor::new(store.clone(), network.clone()),
            fallback: OfflineFallback::new(store.clone(), origin, config.offline_message.clone()),
            notifications: NotificationDispatcher::new(config.notification.clone(), root.path()),
            store,
            network,
            manifest,
            external,
            sync_tag: config.sync_tag.clone(),
            resync_patterns: config.resync_patterns.clone(),
            state: Mutex::new(WorkerState::Parsed),
        })
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    /// Move from one of `from` to `to`, or report the state we are in.
    fn transition(&self, from: &[WorkerState], to: WorkerState) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !from.contains(&state) {
            return Err(Error::InvalidState(format!("cannot enter {to} from {}", *state)));
        }
        *state = to;
        Ok(())
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Route one signal to the component that handles it.
    pub async fn dispatch(&self, signal: Signal) -> Result<Dispatched, Error> {
        match signal {
            Signal::Install => {
                let report = self.install().await?;
                Ok(Dispatched { outcome: SignalOutcome::Installed(report), actions: vec![HostAction::SkipWaiting] })
            }
            Signal::Activate => {
                let report = self.activate().await?;
                Ok(Dispatched { outcome: SignalOutcome::Activated(report), actions: vec![HostAction::ClaimClients] })
            }
            Signal::Fetch { request } => Ok(Dispatched::new(SignalOutcome::Fetch(self.handle_fetch(&request).await?))),
            Signal::Sync { tag } => Ok(Dispatched::new(SignalOutcome::Synced(self.sync(&tag).await))),
            Signal::Push { data } => {
                let notification = self.notifications.render(data.as_ref())?;
                let actions = notification
                    .iter()
                    .map(|n| HostAction::ShowNotification { notification: n.clone() })
                    .collect();
                Ok(Dispatched { outcome: SignalOutcome::Pushed(notification), actions })
            }
            Signal::NotificationClick { action } => {
                Ok(Dispatched { outcome: SignalOutcome::Clicked, actions: self.notifications.click(action.as_deref()) })
            }
        }
    }

    /// Seed the current generations and become eligible for activation.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.transition(&[WorkerState::Parsed, WorkerState::Installed], WorkerState::Installing)?;
        tracing::info!("installing");

        match lifecycle::install(&self.store, self.network.as_ref(), &self.manifest, &self.external).await {
            Ok(report) => {
                self.set_state(WorkerState::Installed);
                Ok(report)
            }
            Err(err) => {
                tracing::error!(error = %err, "installation failed");
                self.set_state(WorkerState::Parsed);
                Err(err)
            }
        }
    }

    /// Purge stale generations and start intercepting.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.transition(&[WorkerState::Installed], WorkerState::Activating)?;
        tracing::info!("activating");

        match lifecycle::activate(&self.store).await {
            Ok(report) => {
                self.set_state(WorkerState::Activated);
                Ok(report)
            }
            Err(err) => {
                tracing::error!(error = %err, "activation failed");
                self.set_state(WorkerState::Installed);
                Err(err)
            }
        }
    }

    /// Answer an intercepted request.
    ///
    /// # Errors
    ///
    /// Fails only when the strategy and the offline fallback both fail.
    pub async fn handle_fetch(&self, request: &ResourceRequest) -> Result<FetchOutcome, Error> {
        if !request.is_get() || !is_interceptable(&request.url) || self.state() != WorkerState::Activated {
            return Ok(FetchOutcome::Passthrough);
        }

        let class = self.classifier.classify(&request.url);
        let strategy = class.strategy();
        tracing::debug!(url = %request.url, %class, %strategy, "intercepted");

        let response = match self.executor.execute(request, strategy).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(url = %request.url, error = %err, "fetch error");
                self.fallback.respond(request, err).await?
            }
        };

        Ok(FetchOutcome::Respond { class, response })
    }

    /// Resubmit analytics requests if `tag` is the configured sync tag.
    pub async fn sync(&self, tag: &str) -> Option<ResyncReport> {
        if tag != self.sync_tag {
            tracing::debug!(tag, "ignoring unknown sync tag");
            return None;
        }
        Some(resync::resubmit(&self.store, self.network.as_ref(), &self.resync_patterns).await)
    }
}
