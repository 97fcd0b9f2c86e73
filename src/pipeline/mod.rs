// Ingestion pipeline: normalization, identity resolution, booking materialization
// and the run coordinator that drives them

pub mod coordinator;
pub mod materializer;
pub mod normalize;
pub mod resolver;

pub use coordinator::{RunOutcome, RunReport, RunStatus, ScrapeRunCoordinator};
pub use materializer::{BookingMaterializer, MaterializeOutcome};
pub use normalize::EventNormalizer;
pub use resolver::{normalize_username, EntityResolver, IdentityIssuer, LocalIdentityIssuer};
