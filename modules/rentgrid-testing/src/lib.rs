//! Deterministic fixture implementations of the capability traits in
//! `rentgrid_common::capability`, plus builders for the core entity types.
//!
//! Mirrors the teacher's `rootsignal-scout::testing`/`fixtures` modules:
//! HashMap-keyed mocks with a builder (`.on_x()`) API, no network, no
//! database — `cargo test` runs the whole pipeline in milliseconds.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use rentgrid_common::capability::{
    AnalyzerError, CommuteEstimator, DetailFetcher, ImageDownloader, ImageHasher, Notifier,
    PlatformAdapter, QualityAnalyzer,
};
use rentgrid_common::{
    CanonicalProperty, CommuteResult, EnrichmentStatus, Listing, ListingDetail,
    NotificationStatus, QualityAnalysis, Result, SearchCriteria, Source,
};

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

/// Builds a `Listing` with sensible defaults; override what the test cares
/// about with the chained setters.
pub struct ListingBuilder {
    listing: Listing,
}

impl ListingBuilder {
    pub fn new(source: Source, source_id: &str) -> Self {
        Self {
            listing: Listing {
                source,
                source_id: source_id.to_string(),
                url: format!("https://example.invalid/{source_id}"),
                title: "A flat".to_string(),
                price_pcm: 2000,
                bedrooms: 2,
                address: "42 Crown Road, London".to_string(),
                postcode: Some("E8 3RH".to_string()),
                latitude: Some(51.5465),
                longitude: Some(-0.0553),
                image_url: None,
                first_seen: fixed_time(),
            },
        }
    }

    pub fn url(mut self, url: &str) -> Self {
        self.listing.url = url.to_string();
        self
    }

    pub fn price_pcm(mut self, price: i32) -> Self {
        self.listing.price_pcm = price;
        self
    }

    pub fn bedrooms(mut self, bedrooms: i32) -> Self {
        self.listing.bedrooms = bedrooms;
        self
    }

    pub fn address(mut self, address: &str) -> Self {
        self.listing.address = address.to_string();
        self
    }

    pub fn postcode(mut self, postcode: Option<&str>) -> Self {
        self.listing.postcode = postcode.map(str::to_string);
        self
    }

    pub fn coords(mut self, lat: f64, lng: f64) -> Self {
        self.listing.latitude = Some(lat);
        self.listing.longitude = Some(lng);
        self
    }

    pub fn no_coords(mut self) -> Self {
        self.listing.latitude = None;
        self.listing.longitude = None;
        self
    }

    pub fn image_url(mut self, url: &str) -> Self {
        self.listing.image_url = Some(url.to_string());
        self
    }

    pub fn first_seen(mut self, at: DateTime<Utc>) -> Self {
        self.listing.first_seen = at;
        self
    }

    pub fn build(self) -> Listing {
        self.listing
    }
}

/// A fixed instant used as the default `first_seen` so fixture listings are
/// reproducible without reaching for the disallowed `Utc::now()` in tests
/// that compare timestamps.
pub fn fixed_time() -> DateTime<Utc> {
    "2026-01-01T00:00:00Z".parse().unwrap()
}

/// Turn a single `Listing` into a single-source `CanonicalProperty`, as the
/// deduplicator would for an unmatched singleton cluster.
pub fn canonical_from_listing(listing: &Listing) -> CanonicalProperty {
    let mut sources = std::collections::BTreeSet::new();
    sources.insert(listing.source);
    let mut source_urls = std::collections::BTreeMap::new();
    source_urls.insert(listing.source, listing.url.clone());

    CanonicalProperty {
        id: Uuid::new_v4(),
        canonical_source: listing.source,
        canonical_source_id: listing.source_id.clone(),
        title: listing.title.clone(),
        address: listing.address.clone(),
        postcode: listing.postcode.clone(),
        latitude: listing.latitude,
        longitude: listing.longitude,
        bedrooms: listing.bedrooms,
        min_price: listing.price_pcm,
        max_price: listing.price_pcm,
        sources,
        source_urls,
        source_descriptions: std::collections::BTreeMap::new(),
        features: Vec::new(),
        images: Vec::new(),
        floorplan_url: None,
        enrichment_status: EnrichmentStatus::Pending,
        enrichment_attempts: 1,
        notification_status: NotificationStatus::PendingEnrichment,
        first_seen: listing.first_seen,
    }
}

pub fn default_search_criteria() -> SearchCriteria {
    SearchCriteria {
        min_price: 0,
        max_price: 3000,
        min_bedrooms: 0,
        max_bedrooms: 4,
        min_bathrooms: 0,
        areas: vec!["hackney".to_string()],
        furnish_types: Vec::new(),
        include_let_agreed: false,
        max_per_scraper: 100,
    }
}

// ---------------------------------------------------------------------------
// MockPlatformAdapter
// ---------------------------------------------------------------------------

/// Scrape adapter fixture: `(area) -> Vec<Listing>`, with an optional
/// per-area simulated failure (isolated by the orchestrator, never panics
/// the run).
pub struct MockPlatformAdapter {
    source: Source,
    by_area: HashMap<String, Vec<Listing>>,
    failing_areas: std::collections::HashSet<String>,
}

impl MockPlatformAdapter {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            by_area: HashMap::new(),
            failing_areas: std::collections::HashSet::new(),
        }
    }

    pub fn on_area(mut self, area: &str, listings: Vec<Listing>) -> Self {
        self.by_area.insert(area.to_string(), listings);
        self
    }

    pub fn failing_on(mut self, area: &str) -> Self {
        self.failing_areas.insert(area.to_string());
        self
    }
}

#[async_trait]
impl PlatformAdapter for MockPlatformAdapter {
    fn source(&self) -> Source {
        self.source
    }

    async fn scrape(&self, _criteria: &SearchCriteria, area: &str) -> Result<Vec<Listing>> {
        if self.failing_areas.contains(area) {
            return Err(rentgrid_common::RentGridError::Scraping(format!(
                "{:?} adapter unavailable for {area}",
                self.source
            )));
        }
        // Returns everything registered for the area uncapped: the per-area
        // cap is the orchestrator's responsibility (spec.md §4.1), not the
        // adapter's, so this fixture deliberately doesn't enforce it.
        Ok(self.by_area.get(area).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockDetailFetcher
// ---------------------------------------------------------------------------

pub struct MockDetailFetcher {
    by_url: HashMap<String, ListingDetail>,
    failing_urls: std::collections::HashSet<String>,
}

impl MockDetailFetcher {
    pub fn new() -> Self {
        Self {
            by_url: HashMap::new(),
            failing_urls: std::collections::HashSet::new(),
        }
    }

    pub fn on_url(mut self, url: &str, detail: ListingDetail) -> Self {
        self.by_url.insert(url.to_string(), detail);
        self
    }

    pub fn failing_on(mut self, url: &str) -> Self {
        self.failing_urls.insert(url.to_string());
        self
    }
}

impl Default for MockDetailFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DetailFetcher for MockDetailFetcher {
    async fn fetch_detail(&self, _source: Source, listing_url: &str) -> Result<Option<ListingDetail>> {
        if self.failing_urls.contains(listing_url) {
            return Err(rentgrid_common::RentGridError::Enrichment(format!(
                "detail fetch failed for {listing_url}"
            )));
        }
        Ok(self.by_url.get(listing_url).cloned())
    }
}

// ---------------------------------------------------------------------------
// MockImageDownloader / MockImageHasher
// ---------------------------------------------------------------------------

pub struct MockImageDownloader {
    by_url: HashMap<String, Vec<u8>>,
}

impl MockImageDownloader {
    pub fn new() -> Self {
        Self { by_url: HashMap::new() }
    }

    /// Registers `url` to return `bytes` derived from a short tag, so tests
    /// can assert on cache contents without shipping real image fixtures.
    pub fn on_url(mut self, url: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.by_url.insert(url.to_string(), bytes.into());
        self
    }
}

impl Default for MockImageDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageDownloader for MockImageDownloader {
    async fn download_image(&self, url: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.by_url.get(url).cloned())
    }
}

/// Deterministic stand-in for a perceptual hash: first 8 bytes of the input
/// (zero-padded), rendered as hex. Two byte-identical fixtures hash equal;
/// two fixtures sharing a prefix hash close, which is all the dedup tests
/// need from a "perceptual" hash.
pub struct MockImageHasher;

impl ImageHasher for MockImageHasher {
    fn hash(&self, bytes: &[u8]) -> Option<String> {
        if bytes.is_empty() {
            return None;
        }
        let mut buf = [0u8; 8];
        for (i, b) in bytes.iter().take(8).enumerate() {
            buf[i] = *b;
        }
        Some(hex::encode(buf))
    }

    fn distance(&self, a: &str, b: &str) -> Option<u32> {
        let a = u64::from_str_radix(a, 16).ok()?;
        let b = u64::from_str_radix(b, 16).ok()?;
        Some((a ^ b).count_ones())
    }
}

mod hex {
    pub fn encode(bytes: [u8; 8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

// ---------------------------------------------------------------------------
// MockQualityAnalyzer
// ---------------------------------------------------------------------------

pub struct MockQualityAnalyzer {
    by_property: Mutex<HashMap<Uuid, std::result::Result<QualityAnalysis, AnalyzerError>>>,
    calls: Mutex<Vec<Uuid>>,
}

impl MockQualityAnalyzer {
    pub fn new() -> Self {
        Self {
            by_property: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_property(self, id: Uuid, analysis: QualityAnalysis) -> Self {
        self.by_property.lock().unwrap().insert(id, Ok(analysis));
        self
    }

    pub fn unavailable_for(self, id: Uuid) -> Self {
        self.by_property
            .lock()
            .unwrap()
            .insert(id, Err(AnalyzerError::ApiUnavailable("fixture".to_string())));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockQualityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QualityAnalyzer for MockQualityAnalyzer {
    async fn analyze(
        &self,
        property: &CanonicalProperty,
        _images_on_disk: &[std::path::PathBuf],
    ) -> std::result::Result<QualityAnalysis, AnalyzerError> {
        self.calls.lock().unwrap().push(property.id);
        match self.by_property.lock().unwrap().get(&property.id) {
            Some(Ok(analysis)) => Ok(analysis.clone()),
            Some(Err(e)) => Err(e.clone()),
            None => Err(AnalyzerError::Other(format!("no fixture analysis for {}", property.id))),
        }
    }
}

// ---------------------------------------------------------------------------
// MockCommuteEstimator
// ---------------------------------------------------------------------------

pub struct MockCommuteEstimator {
    by_destination: HashMap<String, u32>,
}

impl MockCommuteEstimator {
    pub fn new() -> Self {
        Self { by_destination: HashMap::new() }
    }

    pub fn on_destination(mut self, destination_id: &str, minutes: u32) -> Self {
        self.by_destination.insert(destination_id.to_string(), minutes);
        self
    }
}

impl Default for MockCommuteEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommuteEstimator for MockCommuteEstimator {
    async fn commute_times(
        &self,
        _origin_postcode: &str,
        destinations: &[(String, String)],
        _mode: &str,
        max_minutes: u32,
    ) -> Result<HashMap<String, CommuteResult>> {
        Ok(destinations
            .iter()
            .filter_map(|(id, _postcode)| {
                let minutes = *self.by_destination.get(id)?;
                if minutes > max_minutes {
                    return None;
                }
                Some((
                    id.clone(),
                    CommuteResult {
                        destination_id: id.clone(),
                        minutes,
                    },
                ))
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MockNotifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<Uuid>>,
    permanently_failing: std::collections::HashSet<Uuid>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_permanently_for(mut self, id: Uuid) -> Self {
        self.permanently_failing.insert(id);
        self
    }

    pub fn sent_ids(&self) -> Vec<Uuid> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_notification(
        &self,
        property: &CanonicalProperty,
        _analysis: &QualityAnalysis,
    ) -> Result<()> {
        if self.permanently_failing.contains(&property.id) {
            return Err(rentgrid_common::RentGridError::PermanentDeliveryFailure(format!(
                "fixture permanent failure for {}",
                property.id
            )));
        }
        self.sent.lock().unwrap().push(property.id);
        Ok(())
    }
}
