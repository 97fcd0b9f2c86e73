//! Artist name to performer identity resolution.

use crate::error::{Result, ScraperError};
use crate::storage::Storage;
use crate::types::{Location, PerformerIdentity, PerformerInfo};
use chrono::Utc;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Derive the unique username for a performer name.
///
/// Lowercase, whitespace runs become `_`, anything outside `[a-z0-9_]` is dropped.
pub fn normalize_username(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    WHITESPACE_RE
        .replace_all(&lowered, "_")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

/// Credentials for a freshly created account
#[derive(Debug, Clone)]
pub struct IssuedIdentity {
    pub uid: String,
    pub email: String,
}

/// Creates the account an unclaimed performer profile hangs off
#[async_trait::async_trait]
pub trait IdentityIssuer: Send + Sync {
    async fn issue(&self, username: &str) -> Result<IssuedIdentity>;
}

/// Issues local uids with placeholder emails `<username>-<n>@<domain>`
pub struct LocalIdentityIssuer {
    email_domain: String,
}

impl LocalIdentityIssuer {
    pub fn new(email_domain: impl Into<String>) -> Self {
        Self {
            email_domain: email_domain.into(),
        }
    }
}

#[async_trait::async_trait]
impl IdentityIssuer for LocalIdentityIssuer {
    async fn issue(&self, username: &str) -> Result<IssuedIdentity> {
        let n: u32 = rand::thread_rng().gen_range(0..100);
        Ok(IssuedIdentity {
            uid: Uuid::new_v4().to_string(),
            email: format!("{}-{}@{}", username, n, self.email_domain),
        })
    }
}

/// One async mutex per key, created on first use
#[derive(Default)]
struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(key.to_string()).or_default().clone()
    }
}

/// Finds or creates performer identities for one run.
///
/// Resolution of the same username is serialized through a keyed lock, and the
/// store's username uniqueness backs that up across processes.
pub struct EntityResolver {
    storage: Arc<dyn Storage>,
    issuer: Arc<dyn IdentityIssuer>,
    locks: KeyedLocks,
}

impl EntityResolver {
    pub fn new(storage: Arc<dyn Storage>, issuer: Arc<dyn IdentityIssuer>) -> Self {
        Self {
            storage,
            issuer,
            locks: KeyedLocks::default(),
        }
    }

    /// Id of the performer called `name`, creating an unclaimed profile if needed.
    /// `None` when the name is unusable or creation failed.
    pub async fn get_or_create_artist(&self, name: &str, location: &Location, bio: &str) -> Option<String> {
        let username = normalize_username(name);
        if username.is_empty() {
            warn!("⚠️ '{}' has no usable username", name);
            return None;
        }

        let lock = self.locks.lock_for(&username);
        let _guard = lock.lock().await;

        match self.storage.get_performer_by_username(&username).await {
            Ok(Some(existing)) => {
                info!("🔗 Artist already exists: {}", name);
                return Some(existing.id);
            }
            Ok(None) => {}
            Err(e) => {
                error!("❌ Failed to look up artist {}: {}", name, e);
                return None;
            }
        }

        match self.create_artist(name, &username, location, bio).await {
            Ok(id) => {
                info!("🆕 Created artist: {} ({})", name, id);
                Some(id)
            }
            Err(ScraperError::Duplicate { .. }) => {
                info!("🔗 Artist {} was created concurrently", name);
                match self.storage.get_performer_by_username(&username).await {
                    Ok(found) => found.map(|p| p.id),
                    Err(e) => {
                        error!("❌ Failed to re-read artist {}: {}", name, e);
                        None
                    }
                }
            }
            Err(e) => {
                error!("❌ Failed to create artist {}: {}", name, e);
                None
            }
        }
    }

    async fn create_artist(&self, name: &str, username: &str, location: &Location, bio: &str) -> Result<String> {
        let issued = self.issuer.issue(username).await?;
        let performer = PerformerIdentity {
            id: issued.uid,
            username: username.to_string(),
            display_name: name.trim().to_string(),
            email: issued.email,
            bio: bio.to_string(),
            location: location.clone(),
            unclaimed: true,
            occupations: Vec::new(),
            profile_picture: None,
            performer_info: PerformerInfo::default(),
            deleted: false,
            created_at: Utc::now(),
        };
        self.storage.create_performer(&performer).await?;
        Ok(performer.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    struct FailingIssuer;

    #[async_trait::async_trait]
    impl IdentityIssuer for FailingIssuer {
        async fn issue(&self, _username: &str) -> Result<IssuedIdentity> {
            Err(ScraperError::api("auth service unavailable"))
        }
    }

    fn resolver(storage: Arc<InMemoryStorage>) -> EntityResolver {
        EntityResolver::new(storage, Arc::new(LocalIdentityIssuer::new("unclaimed.invalid")))
    }

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username("The  Beatles!"), "the_beatles");
        assert_eq!(normalize_username("  MJ Lenderman "), "mj_lenderman");
        assert_eq!(normalize_username("Sigur Rós"), "sigur_rs");
        assert_eq!(normalize_username("!!!"), "");
    }

    #[tokio::test]
    async fn test_creates_then_reuses() {
        let storage = Arc::new(InMemoryStorage::new());
        let resolver = resolver(storage.clone());
        let location = Location::default();

        let first = resolver
            .get_or_create_artist("Wet Leg", &location, "bio")
            .await
            .unwrap();
        let second = resolver
            .get_or_create_artist("wet   leg", &location, "other bio")
            .await
            .unwrap();
        assert_eq!(first, second);

        let performer = storage.get_performer_by_id(&first).await.unwrap().unwrap();
        assert_eq!(performer.username, "wet_leg");
        assert_eq!(performer.display_name, "Wet Leg");
        assert!(performer.unclaimed);
        assert!(performer.email.starts_with("wet_leg-"));
        assert!(performer.email.ends_with("@unclaimed.invalid"));
        assert_eq!(performer.performer_info.genres, vec!["edm"]);
        assert_eq!(performer.performer_info.review_count, 1);
    }

    #[tokio::test]
    async fn test_empty_username_resolves_to_none() {
        let storage = Arc::new(InMemoryStorage::new());
        assert!(resolver(storage)
            .get_or_create_artist("???", &Location::default(), "")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_creation_failure_is_soft() {
        let storage = Arc::new(InMemoryStorage::new());
        let resolver = EntityResolver::new(storage.clone(), Arc::new(FailingIssuer));
        assert!(resolver
            .get_or_create_artist("Wet Leg", &Location::default(), "")
            .await
            .is_none());
        assert!(storage.get_all_performers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_resolution_creates_one_identity() {
        let storage = Arc::new(InMemoryStorage::new());
        let resolver = Arc::new(resolver(storage.clone()));

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let resolver = resolver.clone();
            set.spawn(async move {
                resolver
                    .get_or_create_artist("Alvvays", &Location::default(), "")
                    .await
            });
        }

        let mut ids = Vec::new();
        while let Some(res) = set.join_next().await {
            ids.push(res.unwrap().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(storage.get_all_performers().await.unwrap().len(), 1);
    }
}
