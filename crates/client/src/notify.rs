//! Push notification rendering and click routing.

use relaycache_core::{Error, NotificationConfig};
use serde::{Deserialize, Serialize};

use crate::worker::HostAction;

pub const ACTION_VIEW: &str = "view";
pub const ACTION_CLOSE: &str = "close";

/// Inbound push data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// A notification ready for the host to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub renotify: bool,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
}

/// Stateless translator from push data and clicks to host actions.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    config: NotificationConfig,
    root: String,
}

impl NotificationDispatcher {
    pub fn new(config: NotificationConfig, root: impl Into<String>) -> Self {
        Self { config, root: root.into() }
    }

    /// Build the notification for a push. No data means nothing to show.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the data is not a `{title?, body?}` object.
    pub fn render(&self, data: Option<&serde_json::Value>) -> Result<Option<Notification>, Error> {
        let Some(data) = data else {
            return Ok(None);
        };

        let payload = PushPayload::deserialize(data).map_err(|e| Error::InvalidInput(format!("push payload: {e}")))?;

        Ok(Some(Notification {
            title: payload.title.unwrap_or_else(|| self.config.title.clone()),
            body: payload.body.unwrap_or_else(|| self.config.body.clone()),
            icon: self.config.icon.clone(),
            badge: self.config.icon.clone(),
            tag: self.config.tag.clone(),
            renotify: true,
            require_interaction: false,
            actions: vec![
                NotificationAction { action: ACTION_VIEW.into(), title: self.config.view_title.clone() },
                NotificationAction { action: ACTION_CLOSE.into(), title: self.config.close_title.clone() },
            ],
        }))
    }

    /// Actions for a click. The notification always closes; "view" also
    /// opens the application root.
    pub fn click(&self, action: Option<&str>) -> Vec<HostAction> {
        let mut actions = vec![HostAction::CloseNotification];
        if action == Some(ACTION_VIEW) {
            actions.push(HostAction::OpenWindow { url: self.root.clone() });
        }
        actions
    }
}
