// Capability boundaries for the external collaborators this pipeline treats
// as out of scope: platform scrapers, the visual quality analyzer, the
// commute-time estimator, image hashing, and the notifier. Each is a single
// trait so production wiring and deterministic fixtures both implement the
// same seam.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    CanonicalProperty, CommuteResult, Listing, ListingDetail, QualityAnalysis, SearchCriteria,
    Source,
};

/// Per-platform scraper. Each adapter covers exactly one `Source`.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn source(&self) -> Source;

    /// Raw listings for one search area. Adapter-level failures should be
    /// returned as `Err`; the scrape orchestrator isolates them per-adapter
    /// rather than propagating to the rest of the run.
    async fn scrape(&self, criteria: &SearchCriteria, area: &str) -> Result<Vec<Listing>>;
}

/// Per-platform detail page fetch, keyed by the listing's source URL.
#[async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch_detail(&self, source: Source, listing_url: &str) -> Result<Option<ListingDetail>>;
}

/// Fetches raw image bytes from a URL, with whatever impersonation an
/// anti-bot origin requires. Returns `None` when the origin declines rather
/// than erroring, so a single dropped image never fails a property.
#[async_trait]
pub trait ImageDownloader: Send + Sync {
    async fn download_image(&self, url: &str) -> Result<Option<Vec<u8>>>;
}

/// Perceptual hashing: `bytes → hash` plus a distance metric between two
/// hashes of the same kind.
pub trait ImageHasher: Send + Sync {
    fn hash(&self, bytes: &[u8]) -> Option<String>;
    fn distance(&self, a: &str, b: &str) -> Option<u32>;
}

/// `APIUnavailable` is the analyzer's circuit-breaker signal: the
/// orchestrator treats it as distinct from any other error and cancels the
/// remainder of the run's analysis tasks rather than retrying individually.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalyzerError {
    #[error("analyzer unavailable: {0}")]
    ApiUnavailable(String),
    #[error("analyzer error: {0}")]
    Other(String),
}

#[async_trait]
pub trait QualityAnalyzer: Send + Sync {
    /// `images_on_disk` are paths into the image cache for this property.
    async fn analyze(
        &self,
        property: &CanonicalProperty,
        images_on_disk: &[std::path::PathBuf],
    ) -> std::result::Result<QualityAnalysis, AnalyzerError>;
}

#[async_trait]
pub trait CommuteEstimator: Send + Sync {
    /// Batches all destinations into one call; `origin_postcode` geocoding
    /// is expected to be cached by the caller across the life of a run.
    async fn commute_times(
        &self,
        origin_postcode: &str,
        destinations: &[(String, String)],
        mode: &str,
        max_minutes: u32,
    ) -> Result<std::collections::HashMap<String, CommuteResult>>;
}

/// The notifier adapter. Out of scope beyond this boundary: delivery
/// mechanics, templating, and the push/email transport are external.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_notification(
        &self,
        property: &CanonicalProperty,
        analysis: &QualityAnalysis,
    ) -> Result<()>;
}
