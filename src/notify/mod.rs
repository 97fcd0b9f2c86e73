pub mod slack;

use crate::config::NotificationConfig;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

pub use slack::SlackNotifier;

/// Run lifecycle events reported to operators
#[derive(Debug, Clone, PartialEq)]
pub enum RunNotification {
    Started {
        run_id: String,
        source_id: String,
        candidate_count: usize,
    },
    Succeeded {
        run_id: String,
        source_id: String,
        item_count: usize,
    },
    Failed {
        source_id: String,
        error: String,
    },
}

impl RunNotification {
    /// Human-readable text, one line per message to send.
    ///
    /// A success with zero items produces its own "no new events" line ahead
    /// of the usual success line.
    pub fn messages(&self) -> Vec<String> {
        let now = Utc::now().to_rfc3339();
        match self {
            RunNotification::Started {
                run_id,
                source_id,
                candidate_count,
            } => vec![format!(
                "scrape run {} for {} started with {} candidate urls - {}",
                run_id, source_id, candidate_count, now
            )],
            RunNotification::Succeeded {
                run_id,
                source_id,
                item_count,
            } => {
                let mut lines = Vec::with_capacity(2);
                if *item_count == 0 {
                    lines.push(format!("no new events in scrape run {} ({}) - {}", run_id, source_id, now));
                }
                lines.push(format!(
                    "scrape run {} ({}) succeeded with {} new events - {}",
                    run_id, source_id, item_count, now
                ));
                lines
            }
            RunNotification::Failed { source_id, error } => vec![format!(
                "most recent scrape of {} failed with error: {} - {}",
                source_id, error, now
            )],
        }
    }
}

#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &RunNotification) -> anyhow::Result<()>;
}

/// Writes notifications to the log only
pub struct LogNotifier;

#[async_trait::async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, notification: &RunNotification) -> anyhow::Result<()> {
        for line in notification.messages() {
            info!("📣 {}", line);
        }
        Ok(())
    }
}

/// Slack when a webhook is configured, the log otherwise
pub fn build_notifier(config: &NotificationConfig) -> Arc<dyn NotificationSink> {
    let sink: Arc<dyn NotificationSink> =
        match config.slack_webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(url) => Arc::new(SlackNotifier::new(url)),
            None => Arc::new(LogNotifier),
        };
    sink
}
