/// Adapter kinds understood by the source registry
pub const SITEMAP_ADAPTER: &str = "sitemap";

/// Run id used for dry runs, which never open a run record
pub const DRY_RUN_ID: &str = "dry-run";

/// Every scraped booking is confirmed on creation
pub const BOOKING_STATUS_CONFIRMED: &str = "confirmed";

/// Placeholder rate until pricing is negotiated outside the pipeline
pub const DEFAULT_BOOKING_RATE: f64 = 0.0;

/// Rating given to seeded reviews
pub const SEEDED_REVIEW_RATING: u8 = 5;

/// Length assumed for an event when only its last start time is known
pub const DEFAULT_EVENT_DURATION_MINUTES: i64 = 60;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_STORE_PATH: &str = "data/store.json";
