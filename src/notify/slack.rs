use super::{NotificationSink, RunNotification};
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            webhook_url: webhook_url.to_string(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl NotificationSink for SlackNotifier {
    async fn notify(&self, notification: &RunNotification) -> Result<()> {
        for text in notification.messages() {
            let body = serde_json::json!({ "text": text });
            self.client
                .post(&self.webhook_url)
                .json(&body)
                .send()
                .await
                .context("slack post")?
                .error_for_status()
                .context("slack non-2xx")?;
        }
        debug!("Notification sent to Slack");
        Ok(())
    }
}
