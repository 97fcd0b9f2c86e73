//! Drives one scrape run of one source end to end.

use super::materializer::BookingMaterializer;
use super::normalize::EventNormalizer;
use super::resolver::{EntityResolver, IdentityIssuer};
use crate::ai::{GenerationOptions, TextGenerator};
use crate::apis::{RawItem, SourceAdapter};
use crate::config::{PipelineConfig, SourceConfig};
use crate::constants::DRY_RUN_ID;
use crate::error::{Result, ScraperError};
use crate::metrics::{ItemOutcome, RunMetrics};
use crate::notify::{NotificationSink, RunNotification};
use crate::storage::Storage;
use crate::types::{CanonicalEvent, ScrapeRun, SourceRecord};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Counts and ids for a run that reached the end of its item loop
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub run_id: String,
    pub source_id: String,
    pub cursor: Option<DateTime<Utc>>,
    pub candidates: usize,
    pub produced: usize,
    pub rejected: usize,
    pub failed: usize,
    pub bookings_created: usize,
    pub reviews_created: usize,
    pub unresolved_artists: Vec<String>,
    /// Artists resolved but not booked because a write failed
    pub failed_artists: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Ok,
    Error(String),
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Ok => write!(f, "ok"),
            RunStatus::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Final status of a run plus how many canonical events it produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub source_id: String,
    pub status: RunStatus,
    pub produced: usize,
}

impl RunReport {
    pub fn from_result(source_id: &str, result: &Result<RunOutcome>) -> Self {
        match result {
            Ok(outcome) => Self {
                source_id: source_id.to_string(),
                status: RunStatus::Ok,
                produced: outcome.produced,
            },
            Err(e) => Self {
                source_id: source_id.to_string(),
                status: RunStatus::Error(e.to_string()),
                produced: 0,
            },
        }
    }
}

enum ItemResult {
    Produced(CanonicalEvent),
    Rejected,
}

pub struct ScrapeRunCoordinator {
    storage: Arc<dyn Storage>,
    normalizer: EventNormalizer,
    generator: Arc<dyn TextGenerator>,
    issuer: Arc<dyn IdentityIssuer>,
    notifier: Arc<dyn NotificationSink>,
    config: PipelineConfig,
}

impl ScrapeRunCoordinator {
    pub fn new(
        storage: Arc<dyn Storage>,
        normalizer: EventNormalizer,
        generator: Arc<dyn TextGenerator>,
        issuer: Arc<dyn IdentityIssuer>,
        notifier: Arc<dyn NotificationSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            storage,
            normalizer,
            generator,
            issuer,
            notifier,
            config,
        }
    }

    /// Run one source. Item-level problems are absorbed and counted; anything
    /// that stops the run closes it with the error, notifies and is returned.
    ///
    /// With `online == false` nothing is written and nobody is notified.
    #[instrument(skip(self, source, adapter), fields(source = %source.id))]
    pub async fn run(
        &self,
        source: &SourceConfig,
        adapter: &dyn SourceAdapter,
        online: bool,
    ) -> Result<RunOutcome> {
        let timer = Instant::now();
        let run_start = Utc::now();
        info!("🚀 Starting scrape of {} [online: {}]", source.name, online);

        let run_id = if online {
            Uuid::new_v4().to_string()
        } else {
            DRY_RUN_ID.to_string()
        };

        let result = self
            .execute(source, adapter, &run_id, run_start, online)
            .await;

        let elapsed = timer.elapsed().as_secs_f64();
        match &result {
            Ok(outcome) => {
                RunMetrics::record_run(&source.id, "ok", elapsed);
                RunMetrics::record_bookings(&source.id, outcome.bookings_created);
                info!(
                    "✅ Run {} finished: {} produced, {} rejected, {} failed, {} bookings, {} reviews",
                    run_id,
                    outcome.produced,
                    outcome.rejected,
                    outcome.failed,
                    outcome.bookings_created,
                    outcome.reviews_created
                );
            }
            Err(e) => {
                RunMetrics::record_run(&source.id, "error", elapsed);
                error!("❌ Run {} failed: {}", run_id, e);
                if online {
                    self.fail_run(source, &run_id, e).await;
                }
            }
        }
        result
    }

    /// Everything between cursor computation and the success notification.
    /// Any error returned here is fatal for the run.
    async fn execute(
        &self,
        source: &SourceConfig,
        adapter: &dyn SourceAdapter,
        run_id: &str,
        run_start: DateTime<Utc>,
        online: bool,
    ) -> Result<RunOutcome> {
        let cursor = self.cursor_for(&source.id, run_start).await?;
        info!("Cursor for {}: {}", source.id, cursor);

        if online {
            self.open_run(source, run_id, run_start).await?;
        }

        let items = adapter.list(Some(cursor)).await?;
        info!("🔍 {} candidate items for {}", items.len(), source.id);

        if online {
            self.send(RunNotification::Started {
                run_id: run_id.to_string(),
                source_id: source.id.clone(),
                candidate_count: items.len(),
            })
            .await;
        }

        let resolver = Arc::new(EntityResolver::new(self.storage.clone(), self.issuer.clone()));
        let materializer = BookingMaterializer::new(
            self.storage.clone(),
            resolver,
            self.generator.clone(),
            GenerationOptions {
                temperature: self.config.review_temperature,
                model: self.config.review_model.clone(),
            },
            self.config.artist_concurrency,
        );

        let mut outcome = RunOutcome {
            run_id: run_id.to_string(),
            source_id: source.id.clone(),
            cursor: Some(cursor),
            candidates: items.len(),
            ..RunOutcome::default()
        };

        for (index, item) in items.iter().enumerate() {
            debug!("Item {}/{}: {}", index + 1, items.len(), item.source_url);
            match self.process_item(source, adapter, run_id, item, online).await {
                Ok(ItemResult::Produced(event)) => {
                    RunMetrics::record_item(&source.id, ItemOutcome::Produced);
                    outcome.produced += 1;
                    if online {
                        let derived = materializer.materialize(source, run_id, &event).await;
                        outcome.bookings_created += derived.bookings.len();
                        outcome.reviews_created += derived.reviews_created;
                        outcome.unresolved_artists.extend(derived.unresolved);
                        if !derived.failed.is_empty() {
                            warn!(
                                "⚠️ {} artist writes failed for '{}'",
                                derived.failed.len(),
                                event.title
                            );
                            outcome.failed_artists.extend(derived.failed);
                        }
                    }
                }
                Ok(ItemResult::Rejected) => {
                    RunMetrics::record_item(&source.id, ItemOutcome::Rejected);
                    outcome.rejected += 1;
                }
                Err(e) => {
                    RunMetrics::record_item(&source.id, ItemOutcome::Failed);
                    error!("❌ Failed to process {}: {}", item.source_url, e);
                    outcome.failed += 1;
                }
            }
        }

        if online {
            self.close_run(source, run_id, None).await?;
            self.send(RunNotification::Succeeded {
                run_id: run_id.to_string(),
                source_id: source.id.clone(),
                item_count: outcome.produced,
            })
            .await;
        }

        Ok(outcome)
    }

    async fn process_item(
        &self,
        source: &SourceConfig,
        adapter: &dyn SourceAdapter,
        run_id: &str,
        item: &RawItem,
        online: bool,
    ) -> Result<ItemResult> {
        let secs = self.config.item_timeout_secs;
        let extracted = tokio::time::timeout(std::time::Duration::from_secs(secs), adapter.extract(item))
            .await
            .map_err(|_| ScraperError::Timeout {
                operation: format!("extracting {}", item.source_url),
                secs,
            })??;

        let Some(event) = self.normalizer.normalize(source, item, extracted).await? else {
            return Ok(ItemResult::Rejected);
        };

        info!(
            "🎵 '{}' [{} - {}] artists: {:?}",
            event.title, event.start_time, event.end_time, event.artists
        );
        if online {
            self.storage.save_scrape_result(run_id, &event).await?;
        }
        Ok(ItemResult::Produced(event))
    }

    /// Start of the latest successful run, else `now - default_lookback_hours`
    pub async fn cursor_for(&self, source_id: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        match self.storage.get_latest_successful_run(source_id).await? {
            Some(run) => Ok(run.start_time),
            None => Ok(now - Duration::hours(self.config.default_lookback_hours)),
        }
    }

    async fn open_run(&self, source: &SourceConfig, run_id: &str, run_start: DateTime<Utc>) -> Result<()> {
        self.storage
            .create_scrape_run(&ScrapeRun {
                id: run_id.to_string(),
                source_id: source.id.clone(),
                start_time: run_start,
                end_time: None,
                error: None,
            })
            .await?;

        let mut record = self.source_record(source).await?;
        record.last_scrape_start = Some(run_start);
        self.storage.save_source_record(&record).await?;
        debug!("Opened run {} for {}", run_id, source.id);
        Ok(())
    }

    async fn close_run(&self, source: &SourceConfig, run_id: &str, error: Option<String>) -> Result<()> {
        let end = Utc::now();
        self.storage
            .complete_scrape_run(&source.id, run_id, end, error)
            .await?;

        let mut record = self.source_record(source).await?;
        record.last_scrape_end = Some(end);
        self.storage.save_source_record(&record).await
    }

    async fn source_record(&self, source: &SourceConfig) -> Result<SourceRecord> {
        Ok(self
            .storage
            .get_source_record(&source.id)
            .await?
            .unwrap_or_else(|| SourceRecord {
                id: source.id.clone(),
                name: source.name.clone(),
                url: source.url.clone(),
                last_scrape_start: None,
                last_scrape_end: None,
            }))
    }

    /// Record a fatal error on the run (if it was opened and is still open) and notify
    async fn fail_run(&self, source: &SourceConfig, run_id: &str, err: &ScraperError) {
        match self.storage.get_scrape_run(&source.id, run_id).await {
            Ok(Some(run)) if !run.is_complete() => {
                if let Err(e) = self.close_run(source, run_id, Some(err.to_string())).await {
                    error!("❌ Failed to close run {}: {}", run_id, e);
                }
            }
            Ok(_) => {}
            Err(e) => error!("❌ Failed to read run {}: {}", run_id, e),
        }

        self.send(RunNotification::Failed {
            source_id: source.id.clone(),
            error: err.to_string(),
        })
        .await;
    }

    async fn send(&self, notification: RunNotification) {
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!("⚠️ Notification failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_display() {
        assert_eq!(RunStatus::Ok.to_string(), "ok");
        assert_eq!(
            RunStatus::Error("sitemap 503".to_string()).to_string(),
            "error: sitemap 503"
        );
    }

    #[test]
    fn test_report_from_result() {
        let ok: Result<RunOutcome> = Ok(RunOutcome {
            produced: 4,
            ..RunOutcome::default()
        });
        let report = RunReport::from_result("ember", &ok);
        assert_eq!(report.status, RunStatus::Ok);
        assert_eq!(report.produced, 4);

        let failed: Result<RunOutcome> = Err(ScraperError::Parse("bad sitemap".to_string()));
        let report = RunReport::from_result("ember", &failed);
        assert_eq!(report.status.to_string(), "error: Parse error: bad sitemap");
        assert_eq!(report.produced, 0);
    }
}
