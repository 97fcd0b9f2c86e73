use crate::error::{Result, ScraperError};
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Document-store view of everything the pipeline reads and writes
#[async_trait]
pub trait Storage: Send + Sync {
    // Source operations
    async fn save_source_record(&self, record: &SourceRecord) -> Result<()>;
    async fn get_source_record(&self, source_id: &str) -> Result<Option<SourceRecord>>;

    // Run operations (runs live under their source)
    async fn create_scrape_run(&self, run: &ScrapeRun) -> Result<()>;
    async fn complete_scrape_run(
        &self,
        source_id: &str,
        run_id: &str,
        end_time: DateTime<Utc>,
        error: Option<String>,
    ) -> Result<()>;
    async fn get_scrape_run(&self, source_id: &str, run_id: &str) -> Result<Option<ScrapeRun>>;
    /// Most recent completed run without an error, by start time
    async fn get_latest_successful_run(&self, source_id: &str) -> Result<Option<ScrapeRun>>;

    // Scrape result operations (canonical events under their run)
    async fn save_scrape_result(&self, run_id: &str, event: &CanonicalEvent) -> Result<()>;
    async fn get_scrape_results(&self, source_id: &str, run_id: &str) -> Result<Vec<CanonicalEvent>>;

    // Performer operations; usernames are unique
    async fn create_performer(&self, performer: &PerformerIdentity) -> Result<()>;
    async fn get_performer_by_username(&self, username: &str) -> Result<Option<PerformerIdentity>>;
    async fn get_performer_by_id(&self, id: &str) -> Result<Option<PerformerIdentity>>;
    async fn get_all_performers(&self) -> Result<Vec<PerformerIdentity>>;

    // Booking and review operations
    async fn create_booking(&self, booking: &Booking) -> Result<()>;
    async fn get_bookings_for_run(&self, source_id: &str, run_id: &str) -> Result<Vec<Booking>>;
    async fn create_review(&self, review: &Review) -> Result<()>;
    async fn get_reviews_for_booking(&self, booking_id: &str) -> Result<Vec<Review>>;
}

type RunKey = (String, String);

/// In-memory storage with optional JSON snapshots for local use and tests
pub struct InMemoryStorage {
    sources: Arc<Mutex<HashMap<String, SourceRecord>>>,
    runs: Arc<Mutex<HashMap<String, HashMap<String, ScrapeRun>>>>,
    results: Arc<Mutex<HashMap<RunKey, Vec<CanonicalEvent>>>>,
    performers: Arc<Mutex<HashMap<String, PerformerIdentity>>>,
    bookings: Arc<Mutex<HashMap<String, Booking>>>,
    reviews: Arc<Mutex<HashMap<String, Review>>>,
}

/// Serialized form of the whole store
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreSnapshot {
    sources: Vec<SourceRecord>,
    runs: Vec<ScrapeRun>,
    results: Vec<StoredResult>,
    performers: Vec<PerformerIdentity>,
    bookings: Vec<Booking>,
    reviews: Vec<Review>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredResult {
    run_id: String,
    event: CanonicalEvent,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock()
        .map_err(|_| ScraperError::storage("store lock poisoned"))
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            sources: Arc::new(Mutex::new(HashMap::new())),
            runs: Arc::new(Mutex::new(HashMap::new())),
            results: Arc::new(Mutex::new(HashMap::new())),
            performers: Arc::new(Mutex::new(HashMap::new())),
            bookings: Arc::new(Mutex::new(HashMap::new())),
            reviews: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Load a store from a snapshot file; a missing file yields an empty store.
    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let store = Self::new();
        if !path.exists() {
            debug!("No snapshot at {}, starting empty", path.display());
            return Ok(store);
        }

        let content = fs::read_to_string(path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&content)?;
        {
            let mut sources = lock(&store.sources)?;
            for s in snapshot.sources {
                sources.insert(s.id.clone(), s);
            }
            let mut runs = lock(&store.runs)?;
            for r in snapshot.runs {
                runs.entry(r.source_id.clone())
                    .or_default()
                    .insert(r.id.clone(), r);
            }
            let mut results = lock(&store.results)?;
            for r in snapshot.results {
                results
                    .entry((r.event.source_id.clone(), r.run_id))
                    .or_default()
                    .push(r.event);
            }
            let mut performers = lock(&store.performers)?;
            for p in snapshot.performers {
                performers.insert(p.id.clone(), p);
            }
            let mut bookings = lock(&store.bookings)?;
            for b in snapshot.bookings {
                bookings.insert(b.id.clone(), b);
            }
            let mut reviews = lock(&store.reviews)?;
            for r in snapshot.reviews {
                reviews.insert(r.id.clone(), r);
            }
        }
        info!("Loaded store snapshot from {}", path.display());
        Ok(store)
    }

    /// Write the whole store to a snapshot file, creating parent directories.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = StoreSnapshot {
            sources: lock(&self.sources)?.values().cloned().collect(),
            runs: lock(&self.runs)?
                .values()
                .flat_map(|runs| runs.values().cloned())
                .collect(),
            results: lock(&self.results)?
                .iter()
                .flat_map(|((_, run_id), events)| {
                    events.iter().map(move |event| StoredResult {
                        run_id: run_id.clone(),
                        event: event.clone(),
                    })
                })
                .collect(),
            performers: lock(&self.performers)?.values().cloned().collect(),
            bookings: lock(&self.bookings)?.values().cloned().collect(),
            reviews: lock(&self.reviews)?.values().cloned().collect(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
        debug!("Saved store snapshot to {}", path.display());
        Ok(())
    }

    /// Every run of a source, oldest first
    pub fn runs_for_source(&self, source_id: &str) -> Result<Vec<ScrapeRun>> {
        let runs = lock(&self.runs)?;
        let mut list: Vec<ScrapeRun> = runs
            .get(source_id)
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by_key(|r| r.start_time);
        Ok(list)
    }

    pub fn booking_count(&self) -> Result<usize> {
        Ok(lock(&self.bookings)?.len())
    }

    pub fn review_count(&self) -> Result<usize> {
        Ok(lock(&self.reviews)?.len())
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn save_source_record(&self, record: &SourceRecord) -> Result<()> {
        lock(&self.sources)?.insert(record.id.clone(), record.clone());
        debug!("Saved source record {}", record.id);
        Ok(())
    }

    async fn get_source_record(&self, source_id: &str) -> Result<Option<SourceRecord>> {
        Ok(lock(&self.sources)?.get(source_id).cloned())
    }

    async fn create_scrape_run(&self, run: &ScrapeRun) -> Result<()> {
        let mut runs = lock(&self.runs)?;
        let source_runs = runs.entry(run.source_id.clone()).or_default();
        if source_runs.contains_key(&run.id) {
            return Err(ScraperError::Duplicate {
                collection: "scrape_runs",
                key: run.id.clone(),
            });
        }
        source_runs.insert(run.id.clone(), run.clone());

        debug!("Created scrape run {} for {}", run.id, run.source_id);
        Ok(())
    }

    async fn complete_scrape_run(
        &self,
        source_id: &str,
        run_id: &str,
        end_time: DateTime<Utc>,
        error: Option<String>,
    ) -> Result<()> {
        let mut runs = lock(&self.runs)?;
        let run = runs
            .get_mut(source_id)
            .and_then(|r| r.get_mut(run_id))
            .ok_or_else(|| {
                ScraperError::storage(format!("Unknown scrape run {source_id}/{run_id}"))
            })?;

        if run.is_complete() {
            return Err(ScraperError::storage(format!(
                "Scrape run {run_id} is already complete"
            )));
        }
        run.end_time = Some(end_time);
        run.error = error;

        debug!("Completed scrape run {} for {}", run_id, source_id);
        Ok(())
    }

    async fn get_scrape_run(&self, source_id: &str, run_id: &str) -> Result<Option<ScrapeRun>> {
        Ok(lock(&self.runs)?
            .get(source_id)
            .and_then(|r| r.get(run_id))
            .cloned())
    }

    async fn get_latest_successful_run(&self, source_id: &str) -> Result<Option<ScrapeRun>> {
        let runs = lock(&self.runs)?;
        Ok(runs.get(source_id).and_then(|r| {
            r.values()
                .filter(|run| run.is_successful())
                .max_by_key(|run| run.start_time)
                .cloned()
        }))
    }

    async fn save_scrape_result(&self, run_id: &str, event: &CanonicalEvent) -> Result<()> {
        lock(&self.results)?
            .entry((event.source_id.clone(), run_id.to_string()))
            .or_default()
            .push(event.clone());
        debug!("Saved scrape result '{}' for run {}", event.title, run_id);
        Ok(())
    }

    async fn get_scrape_results(&self, source_id: &str, run_id: &str) -> Result<Vec<CanonicalEvent>> {
        Ok(lock(&self.results)?
            .get(&(source_id.to_string(), run_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_performer(&self, performer: &PerformerIdentity) -> Result<()> {
        let mut performers = lock(&self.performers)?;
        if performers.values().any(|p| p.username == performer.username) {
            return Err(ScraperError::Duplicate {
                collection: "performers",
                key: performer.username.clone(),
            });
        }
        performers.insert(performer.id.clone(), performer.clone());

        debug!("Created performer {} with id {}", performer.username, performer.id);
        Ok(())
    }

    async fn get_performer_by_username(&self, username: &str) -> Result<Option<PerformerIdentity>> {
        Ok(lock(&self.performers)?
            .values()
            .find(|p| p.username == username)
            .cloned())
    }

    async fn get_performer_by_id(&self, id: &str) -> Result<Option<PerformerIdentity>> {
        Ok(lock(&self.performers)?.get(id).cloned())
    }

    async fn get_all_performers(&self) -> Result<Vec<PerformerIdentity>> {
        let mut all: Vec<PerformerIdentity> = lock(&self.performers)?.values().cloned().collect();
        all.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(all)
    }

    async fn create_booking(&self, booking: &Booking) -> Result<()> {
        lock(&self.bookings)?.insert(booking.id.clone(), booking.clone());
        debug!("Created booking '{}' with id {}", booking.title, booking.id);
        Ok(())
    }

    async fn get_bookings_for_run(&self, source_id: &str, run_id: &str) -> Result<Vec<Booking>> {
        let mut list: Vec<Booking> = lock(&self.bookings)?
            .values()
            .filter(|b| b.source_run_ref.source_id == source_id && b.source_run_ref.run_id == run_id)
            .cloned()
            .collect();
        list.sort_by_key(|b| b.created_at);
        Ok(list)
    }

    async fn create_review(&self, review: &Review) -> Result<()> {
        lock(&self.reviews)?.insert(review.id.clone(), review.clone());
        debug!("Created {:?} review {} for booking {}", review.role, review.id, review.booking_id);
        Ok(())
    }

    async fn get_reviews_for_booking(&self, booking_id: &str) -> Result<Vec<Review>> {
        Ok(lock(&self.reviews)?
            .values()
            .filter(|r| r.booking_id == booking_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn run(id: &str, start: DateTime<Utc>) -> ScrapeRun {
        ScrapeRun {
            id: id.to_string(),
            source_id: "ember".to_string(),
            start_time: start,
            end_time: None,
            error: None,
        }
    }

    fn performer(id: &str, username: &str) -> PerformerIdentity {
        PerformerIdentity {
            id: id.to_string(),
            username: username.to_string(),
            display_name: username.to_string(),
            email: format!("{username}@example.com"),
            bio: String::new(),
            location: Location {
                place_id: "p".to_string(),
                geohash: "g".to_string(),
                lat: 0.0,
                lng: 0.0,
            },
            unclaimed: true,
            occupations: vec![],
            profile_picture: None,
            performer_info: PerformerInfo::default(),
            deleted: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_latest_successful_run_skips_failed_and_open_runs() {
        let store = InMemoryStorage::new();
        let now = Utc::now();

        store.create_scrape_run(&run("old", now - Duration::days(3))).await.unwrap();
        store.complete_scrape_run("ember", "old", now, None).await.unwrap();

        store.create_scrape_run(&run("failed", now - Duration::days(2))).await.unwrap();
        store
            .complete_scrape_run("ember", "failed", now, Some("boom".to_string()))
            .await
            .unwrap();

        // Still in progress
        store.create_scrape_run(&run("open", now - Duration::days(1))).await.unwrap();

        let latest = store.get_latest_successful_run("ember").await.unwrap().unwrap();
        assert_eq!(latest.id, "old");
        assert!(store.get_latest_successful_run("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_completes_only_once() {
        let store = InMemoryStorage::new();
        store.create_scrape_run(&run("r1", Utc::now())).await.unwrap();
        store.complete_scrape_run("ember", "r1", Utc::now(), None).await.unwrap();

        let second = store
            .complete_scrape_run("ember", "r1", Utc::now(), Some("late".to_string()))
            .await;
        assert!(second.is_err());

        let stored = store.get_scrape_run("ember", "r1").await.unwrap().unwrap();
        assert!(stored.error.is_none());
    }

    #[tokio::test]
    async fn test_performer_username_is_unique() {
        let store = InMemoryStorage::new();
        store.create_performer(&performer("a", "the_band")).await.unwrap();

        let err = store.create_performer(&performer("b", "the_band")).await.unwrap_err();
        assert!(matches!(err, ScraperError::Duplicate { .. }));
        assert_eq!(store.get_all_performers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = InMemoryStorage::new();
        store.create_scrape_run(&run("r1", Utc::now())).await.unwrap();
        store.complete_scrape_run("ember", "r1", Utc::now(), None).await.unwrap();
        store.create_performer(&performer("a", "the_band")).await.unwrap();
        store.save_snapshot(&path).unwrap();

        let loaded = InMemoryStorage::load_snapshot(&path).unwrap();
        assert_eq!(loaded.get_latest_successful_run("ember").await.unwrap().unwrap().id, "r1");
        assert!(loaded.get_performer_by_username("the_band").await.unwrap().is_some());
    }

    #[test]
    fn test_missing_snapshot_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryStorage::load_snapshot(dir.path().join("absent.json")).unwrap();
        assert!(store.runs_for_source("ember").unwrap().is_empty());
    }
}
