//! Notification system for connections that need a user decision.
//!
//! The engine never alerts anyone itself: it only reports whether a flow was
//! queued for the first time. The inspection loop turns that signal into a
//! [`NotificationEvent::NewPendingConnection`] and hands it to every
//! configured [`Notifier`]. Notifications are **fire-and-forget**: they run as
//! background tasks and never delay a verdict.
//!
//! Backends:
//!
//! - [`LogNotifier`] writes events to the tracing log.
//! - [`webhook::WebhookNotifier`] posts them as JSON to an HTTP endpoint.

pub mod webhook;

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::NotificationConfig;
use crate::error::Result;

/// Events that can trigger notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A flow no rule applied to was queued for review.
    NewPendingConnection {
        process: String,
        endpoint_addr: String,
        endpoint_port: String,
    },
    /// The inspection loop started.
    InspectorStarted { storage_dir: String },
    /// The inspection loop is shutting down.
    InspectorStopped,
}

/// Trait for notification backends.
///
/// Implementations must be `Send + Sync` for use across async tasks.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Send a notification for the given event.
    async fn notify(&self, event: &NotificationEvent) -> Result<()>;
    /// Return the backend name (e.g., `"webhook"`).
    fn name(&self) -> &str;
}

/// Format a [`NotificationEvent`] into a human-readable Markdown message.
pub fn format_message(event: &NotificationEvent) -> String {
    match event {
        NotificationEvent::NewPendingConnection {
            process,
            endpoint_addr,
            endpoint_port,
        } => format!(
            "🔔 *New Connection*\n`{}` wants to connect to `{}:{}`\nReview with `flowguard pending review`",
            process, endpoint_addr, endpoint_port
        ),
        NotificationEvent::InspectorStarted { storage_dir } => {
            format!("✅ *FlowGuard Started*\nState in `{}`", storage_dir)
        }
        NotificationEvent::InspectorStopped => "⏹ *FlowGuard Stopped*".to_string(),
    }
}

/// Writes events to the log at `info` level.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<()> {
        info!("{}", format_message(event).replace('\n', " | "));
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Build the notifiers enabled by `config`. The log notifier is always
/// present; the webhook is added when notifications are enabled and a
/// webhook is configured.
pub fn from_config(config: &NotificationConfig) -> Vec<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
    if config.enabled {
        if let Some(hook) = &config.webhook {
            notifiers.push(Arc::new(webhook::WebhookNotifier::new(
                hook.url.clone(),
                hook.bearer_token.clone(),
            )));
        }
    }
    notifiers
}

/// Send `event` to every notifier and wait for all of them. Failures are
/// logged and otherwise ignored.
pub async fn notify_all(notifiers: &[Arc<dyn Notifier>], event: &NotificationEvent) {
    for notifier in notifiers {
        if let Err(e) = notifier.notify(event).await {
            warn!("Notifier {} failed: {}", notifier.name(), e);
        }
    }
}
