use super::resolver::{normalize_username, EntityResolver};
use crate::ai::{GenerationOptions, TextGenerator};
use crate::config::SourceConfig;
use crate::constants::{BOOKING_STATUS_CONFIRMED, DEFAULT_BOOKING_RATE, SEEDED_REVIEW_RATING};
use crate::error::Result;
use crate::storage::Storage;
use crate::types::{Booking, CanonicalEvent, Review, ReviewRole, SourceRunRef};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What materializing one event produced
#[derive(Debug, Default)]
pub struct MaterializeOutcome {
    /// In the event's artist order
    pub bookings: Vec<Booking>,
    pub unresolved: Vec<String>,
    /// Artists whose booking could not be written
    pub failed: Vec<String>,
    pub reviews_created: usize,
}

enum ArtistOutcome {
    Booked { booking: Booking, reviews: usize },
    Unresolved(String),
    Failed(String),
}

/// Shared state handed to every artist task of one event
struct EventContext {
    storage: Arc<dyn Storage>,
    resolver: Arc<EntityResolver>,
    generator: Arc<dyn TextGenerator>,
    review_options: GenerationOptions,
    source: SourceConfig,
    run_id: String,
    event: CanonicalEvent,
}

pub fn performer_review_prompt(performer_name: &str) -> String {
    format!(
        "imagine you're a venue that just recently booked a musician, named {} to perform at your venue. \
you want to leave a very positive review for the musician. what would you say in one or two sentences?",
        performer_name
    )
}

pub fn booker_review_prompt(booker_name: &str) -> String {
    format!(
        "imagine you're a musician who just recently performed at a venue, called {}. \
you want to leave a very positive review for the venue. what would you say in one or two sentences?",
        booker_name
    )
}

/// Artist names with repeats of the same username removed, first spelling kept.
/// Names with no usable username pass through so they are reported as unresolved.
pub fn distinct_artists(artists: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    artists
        .iter()
        .filter(|name| {
            let username = normalize_username(name);
            username.is_empty() || seen.insert(username)
        })
        .cloned()
        .collect()
}

/// Derives bookings (and seeded reviews for past shows) from canonical events
pub struct BookingMaterializer {
    storage: Arc<dyn Storage>,
    resolver: Arc<EntityResolver>,
    generator: Arc<dyn TextGenerator>,
    review_options: GenerationOptions,
    concurrency: usize,
}

impl BookingMaterializer {
    pub fn new(
        storage: Arc<dyn Storage>,
        resolver: Arc<EntityResolver>,
        generator: Arc<dyn TextGenerator>,
        review_options: GenerationOptions,
        concurrency: usize,
    ) -> Self {
        Self {
            storage,
            resolver,
            generator,
            review_options,
            concurrency: concurrency.max(1),
        }
    }

    /// One booking per distinct resolvable artist, fanned out over at most
    /// `concurrency` tasks. Every task is joined before this returns.
    pub async fn materialize(
        &self,
        source: &SourceConfig,
        run_id: &str,
        event: &CanonicalEvent,
    ) -> MaterializeOutcome {
        let mut outcome = MaterializeOutcome::default();
        let artists = distinct_artists(&event.artists);
        if artists.is_empty() {
            debug!("'{}' lists no artists", event.title);
            return outcome;
        }

        let context = Arc::new(EventContext {
            storage: self.storage.clone(),
            resolver: self.resolver.clone(),
            generator: self.generator.clone(),
            review_options: self.review_options.clone(),
            source: source.clone(),
            run_id: run_id.to_string(),
            event: event.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, artist) in artists.iter().enumerate() {
            let context = context.clone();
            let semaphore = semaphore.clone();
            let artist = artist.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, ArtistOutcome::Failed(artist));
                };
                (index, materialize_artist(&context, &artist).await)
            });
        }

        let mut ordered: Vec<Option<ArtistOutcome>> = (0..artists.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => ordered[index] = Some(result),
                Err(e) => error!("❌ Artist task for '{}' panicked: {}", event.title, e),
            }
        }

        for (artist, result) in artists.into_iter().zip(ordered) {
            match result {
                Some(ArtistOutcome::Booked { booking, reviews }) => {
                    outcome.reviews_created += reviews;
                    outcome.bookings.push(booking);
                }
                Some(ArtistOutcome::Unresolved(name)) => outcome.unresolved.push(name),
                Some(ArtistOutcome::Failed(name)) => outcome.failed.push(name),
                // The task panicked before reporting
                None => outcome.failed.push(artist),
            }
        }

        info!(
            "📅 '{}': {} bookings, {} unresolved, {} failed, {} reviews",
            event.title,
            outcome.bookings.len(),
            outcome.unresolved.len(),
            outcome.failed.len(),
            outcome.reviews_created
        );
        outcome
    }
}

async fn materialize_artist(context: &EventContext, artist: &str) -> ArtistOutcome {
    let event = &context.event;
    let Some(performer_id) = context
        .resolver
        .get_or_create_artist(artist, &context.source.location, &event.description)
        .await
    else {
        return ArtistOutcome::Unresolved(artist.to_string());
    };

    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        source_run_ref: SourceRunRef {
            source_id: context.source.id.clone(),
            run_id: context.run_id.clone(),
        },
        service_id: None,
        requester_id: context.source.id.clone(),
        requestee_id: performer_id,
        location: context.source.location.clone(),
        title: event.title.clone(),
        note: event.description.clone(),
        status: BOOKING_STATUS_CONFIRMED.to_string(),
        rate: DEFAULT_BOOKING_RATE,
        start_time: event.start_time,
        end_time: event.end_time,
        created_at: Utc::now(),
        flier_url: event.flier_url.clone(),
    };

    if let Err(e) = context.storage.create_booking(&booking).await {
        error!("❌ Failed to create booking for {}: {}", artist, e);
        return ArtistOutcome::Failed(artist.to_string());
    }

    let reviews = if booking.start_time < booking.created_at {
        match seed_reviews(context, &booking).await {
            Ok(count) => count,
            Err(e) => {
                error!("❌ Failed to seed reviews for booking {}: {}", booking.id, e);
                0
            }
        }
    } else {
        0
    };

    ArtistOutcome::Booked { booking, reviews }
}

/// Write a performer review and a booker review for a show that already happened.
/// Returns how many reviews were written.
async fn seed_reviews(context: &EventContext, booking: &Booking) -> Result<usize> {
    let Some(performer) = context.storage.get_performer_by_id(&booking.requestee_id).await? else {
        warn!("⚠️ Performer {} does not exist, skipping reviews", booking.requestee_id);
        return Ok(0);
    };
    let performer_name = if performer.display_name.is_empty() {
        performer.username.clone()
    } else {
        performer.display_name.clone()
    };
    let booker_name = &context.source.name;

    let options = &context.review_options;
    let performer_prompt = performer_review_prompt(&performer_name);
    let booker_prompt = booker_review_prompt(booker_name);
    let texts = tokio::try_join!(
        context.generator.generate(&performer_prompt, options),
        context.generator.generate(&booker_prompt, options),
    );
    let (performer_text, booker_text) = match texts {
        Ok(texts) => texts,
        Err(e) => {
            warn!("⚠️ Review text generation failed for booking {}: {}", booking.id, e);
            return Ok(0);
        }
    };

    let now = Utc::now();
    let reviews = [
        (ReviewRole::Performer, performer_text),
        (ReviewRole::Booker, booker_text),
    ];
    for (role, text) in reviews {
        let review = Review {
            id: Uuid::new_v4().to_string(),
            booking_id: booking.id.clone(),
            performer_id: booking.requestee_id.clone(),
            booker_id: booking.requester_id.clone(),
            rating: SEEDED_REVIEW_RATING,
            text,
            role,
            created_at: now,
        };
        context.storage.create_review(&review).await?;
    }

    debug!("⭐ Seeded reviews for booking {}", booking.id);
    Ok(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_prompts_name_the_subject() {
        assert!(performer_review_prompt("Wet Leg").contains("named Wet Leg to perform"));
        assert!(booker_review_prompt("Ember Music Hall").contains("called Ember Music Hall."));
    }

    #[test]
    fn test_distinct_artists_keeps_first_spelling() {
        let names: Vec<String> = ["Gus", "Wet Leg", "gus", "GUS!", "???", "Wet  Leg", "???"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(distinct_artists(&names), vec!["Gus", "Wet Leg", "???", "???"]);
    }
}
