use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed enum of supported listing platforms.
///
/// Order here doubles as the static platform-priority ranking used to break
/// canonical-selection ties (earlier variants rank higher).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Rightmove,
    Zoopla,
    Openrent,
    Spareroom,
}

impl Source {
    /// Lower rank sorts first; used as the platform-priority tiebreaker in
    /// canonical selection when `first_seen` timestamps are equal.
    pub fn priority_rank(self) -> u8 {
        match self {
            Source::Rightmove => 0,
            Source::Zoopla => 1,
            Source::Openrent => 2,
            Source::Spareroom => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Gallery,
    Floorplan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Pending,
    Enriched,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    PendingEnrichment,
    PendingAnalysis,
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    /// `sent` and `failed` are both terminal; an upsert must never move a
    /// row out of either except via the notifier's own explicit calls.
    pub fn is_terminal(self) -> bool {
        matches!(self, NotificationStatus::Sent | NotificationStatus::Failed)
    }
}

/// One observation of a property from one platform. Raw and immutable: a
/// listing is never mutated after a scrape produces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub source: Source,
    pub source_id: String,
    pub url: String,
    pub title: String,
    /// Monthly GBP rent. Weekly prices must already be converted by the
    /// adapter: `round(pw * 52 / 12)`.
    pub price_pcm: i32,
    /// Studio flats report 0.
    pub bedrooms: i32,
    pub address: String,
    /// Normalized uppercase, single internal space (e.g. `"E8 3RH"`).
    pub postcode: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image_url: Option<String>,
    pub first_seen: DateTime<Utc>,
}

impl Listing {
    pub fn identity(&self) -> (Source, &str) {
        (self.source, &self.source_id)
    }

    pub fn has_coords(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyImage {
    pub owning_source: Source,
    pub url: String,
    pub image_type: ImageType,
}

/// A cluster of one or more listings believed to describe the same physical
/// dwelling. Never destroyed once persisted; its source set and price range
/// only grow across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProperty {
    pub id: Uuid,
    /// Identity of the chosen canonical listing.
    pub canonical_source: Source,
    pub canonical_source_id: String,
    pub title: String,
    pub address: String,
    pub postcode: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub bedrooms: i32,
    pub min_price: i32,
    pub max_price: i32,
    pub sources: BTreeSet<Source>,
    pub source_urls: BTreeMap<Source, String>,
    pub source_descriptions: BTreeMap<Source, String>,
    pub features: Vec<String>,
    pub images: Vec<PropertyImage>,
    pub floorplan_url: Option<String>,
    pub enrichment_status: EnrichmentStatus,
    pub enrichment_attempts: i32,
    pub notification_status: NotificationStatus,
    pub first_seen: DateTime<Utc>,
}

impl CanonicalProperty {
    /// Filesystem-safe rendering of this property's identity, used as the
    /// image cache directory name.
    pub fn safe_id(&self) -> String {
        crate::geo::safe_id(self.canonical_source, &self.canonical_source_id)
    }

    pub fn identity(&self) -> (Source, &str) {
        (self.canonical_source, &self.canonical_source_id)
    }
}

/// Structured output of the external visual quality analyzer. A null
/// `overall_rating` marks a fallback row inserted when the analyzer was
/// unavailable at save time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAnalysis {
    pub property_id: Uuid,
    pub overall_rating: Option<i32>,
    pub concerns: Vec<String>,
    pub observations: AnalysisObservations,
    pub fit_score: Option<i32>,
    pub reanalysis_requested_at: Option<DateTime<Utc>>,
}

/// The per-dimension observations the fit scorer consumes. Any field may be
/// `None` ("unknown"); the scorer treats unknown dimensions as contributing
/// zero weight rather than zero score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisObservations {
    pub hob_type: Option<HobType>,
    pub kitchen_condition_good: Option<bool>,
    pub has_dishwasher_or_washer: Option<bool>,
    pub double_glazing: Option<bool>,
    pub construction_type: Option<ConstructionType>,
    pub noise_indicators: Option<bool>,
    pub natural_light_grade: Option<u8>,
    pub ceiling_height_grade: Option<u8>,
    pub floor_level: Option<i32>,
    pub has_desk_space: Option<bool>,
    pub spacious: Option<bool>,
    pub open_layout: Option<bool>,
    pub character_property: Option<bool>,
    pub highlight_keywords_present: Option<bool>,
    pub outdoor_space: Option<bool>,
    pub condition_concerns: Option<bool>,
    pub condition_severity: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HobType {
    Gas,
    Induction,
    Electric,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstructionType {
    Period,
    Modern,
    NewBuild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IconState {
    Good,
    Neutral,
    Concern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifestyleIcon {
    pub state: IconState,
    pub tooltip: String,
}

/// The fit scorer's full output: the 0-100 score (or null) plus the five
/// lifestyle icons, each independently derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub score: Option<i32>,
    pub kitchen: LifestyleIcon,
    pub light_and_space: LifestyleIcon,
    pub workspace: LifestyleIcon,
    pub hosting: LifestyleIcon,
    pub vibe: LifestyleIcon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// One row per orchestrator invocation; counts are filled in as each stage
/// completes and the row is updated (not just inserted) at run end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub scraped_count: i32,
    pub criteria_pass_count: i32,
    pub dedup_merged_count: i32,
    pub enriched_count: i32,
    pub analyzed_count: i32,
    pub notified_count: i32,
    pub error_message: Option<String>,
    pub duration_seconds: Option<f64>,
}

impl PipelineRun {
    pub fn new(id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at,
            completed_at: None,
            status: RunStatus::Running,
            scraped_count: 0,
            criteria_pass_count: 0,
            dedup_merged_count: 0,
            enriched_count: 0,
            analyzed_count: 0,
            notified_count: 0,
            error_message: None,
            duration_seconds: None,
        }
    }
}

/// Search criteria handed to the scrape orchestrator and the criteria gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub min_price: i32,
    pub max_price: i32,
    pub min_bedrooms: i32,
    pub max_bedrooms: i32,
    pub min_bathrooms: i32,
    pub areas: Vec<String>,
    pub furnish_types: Vec<String>,
    pub include_let_agreed: bool,
    pub max_per_scraper: usize,
}

/// Per-source detail payload returned by the detail-fetch capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingDetail {
    pub floorplan_url: Option<String>,
    pub gallery_urls: Vec<String>,
    pub description: Option<String>,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommuteResult {
    pub destination_id: String,
    pub minutes: u32,
}
