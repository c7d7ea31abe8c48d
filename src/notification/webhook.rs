use std::time::Duration;

use crate::error::{FlowGuardError, Result};
use crate::notification::{format_message, NotificationEvent, Notifier};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts each event as JSON to an HTTP endpoint.
///
/// The body carries the structured event alongside a rendered `text` field,
/// so chat bridges can forward `text` while other consumers read the fields:
///
/// ```json
/// {
///   "event": "new_pending_connection",
///   "process": "com.example.app",
///   "endpoint_addr": "tracker.net",
///   "endpoint_port": "443",
///   "text": "🔔 *New Connection* ..."
/// }
/// ```
pub struct WebhookNotifier {
    url: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String, bearer_token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url,
            bearer_token,
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// JSON body for an event.
pub fn payload(event: &NotificationEvent) -> serde_json::Value {
    let mut body = serde_json::to_value(event).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(map) = body.as_object_mut() {
        map.insert(
            "text".to_string(),
            serde_json::Value::String(format_message(event)),
        );
    }
    body
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<()> {
        let mut req = self.client.post(&self.url).json(&payload(event));
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| FlowGuardError::Notification(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(FlowGuardError::Notification(format!(
                "Webhook {} returned {}: {}",
                self.url, status, body
            )));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_tagged_and_has_text() {
        let event = NotificationEvent::NewPendingConnection {
            process: "com.example.app".to_string(),
            endpoint_addr: "tracker.net".to_string(),
            endpoint_port: "443".to_string(),
        };
        let body = payload(&event);
        assert_eq!(body["event"], "new_pending_connection");
        assert_eq!(body["endpoint_addr"], "tracker.net");
        assert!(body["text"].as_str().unwrap().contains("tracker.net:443"));
    }

    #[test]
    fn unit_event_payload() {
        let body = payload(&NotificationEvent::InspectorStopped);
        assert_eq!(body["event"], "inspector_stopped");
        assert!(body["text"].as_str().unwrap().contains("Stopped"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_notification_error() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:1/hook".to_string(), None);
        let result = notifier.notify(&NotificationEvent::InspectorStopped).await;
        assert!(matches!(result, Err(FlowGuardError::Notification(_))));
    }
}
