//! Row structs mirroring the `properties` / `property_images` /
//! `quality_analyses` / `pipeline_runs` tables, plus conversions to and from
//! the domain types in `rentgrid_common::types`.
//!
//! Grounded on the teacher's `taproot-domains::listings::models::Listing`
//! shape: plain `#[derive(sqlx::FromRow)]` structs, conversions kept as
//! inherent methods rather than a generic `From` blanket impl so the lossy
//! bits (e.g. unknown source strings) stay visible at the call site.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rentgrid_common::{
    AnalysisObservations, CanonicalProperty, EnrichmentStatus, ImageType, NotificationStatus,
    PipelineRun, PropertyImage, QualityAnalysis, RunStatus, Source,
};

/// `Source` round-trips through Postgres as lowercase text rather than via
/// `sqlx::Type` derive, because the store also needs to serialize it inside
/// the `source_urls`/`source_descriptions` JSONB maps, where only string
/// keys are legal.
pub fn source_to_text(source: Source) -> &'static str {
    match source {
        Source::Rightmove => "rightmove",
        Source::Zoopla => "zoopla",
        Source::Openrent => "openrent",
        Source::Spareroom => "spareroom",
    }
}

pub fn source_from_text(text: &str) -> Option<Source> {
    match text {
        "rightmove" => Some(Source::Rightmove),
        "zoopla" => Some(Source::Zoopla),
        "openrent" => Some(Source::Openrent),
        "spareroom" => Some(Source::Spareroom),
        _ => None,
    }
}

fn enrichment_status_to_text(status: EnrichmentStatus) -> &'static str {
    match status {
        EnrichmentStatus::Pending => "pending",
        EnrichmentStatus::Enriched => "enriched",
        EnrichmentStatus::Failed => "failed",
    }
}

fn enrichment_status_from_text(text: &str) -> EnrichmentStatus {
    match text {
        "enriched" => EnrichmentStatus::Enriched,
        "failed" => EnrichmentStatus::Failed,
        _ => EnrichmentStatus::Pending,
    }
}

pub fn notification_status_to_text(status: NotificationStatus) -> &'static str {
    match status {
        NotificationStatus::PendingEnrichment => "pending_enrichment",
        NotificationStatus::PendingAnalysis => "pending_analysis",
        NotificationStatus::Pending => "pending",
        NotificationStatus::Sent => "sent",
        NotificationStatus::Failed => "failed",
    }
}

pub fn notification_status_from_text(text: &str) -> NotificationStatus {
    match text {
        "pending_analysis" => NotificationStatus::PendingAnalysis,
        "pending" => NotificationStatus::Pending,
        "sent" => NotificationStatus::Sent,
        "failed" => NotificationStatus::Failed,
        _ => NotificationStatus::PendingEnrichment,
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PropertyRow {
    pub id: Uuid,
    pub canonical_source: String,
    pub canonical_source_id: String,
    pub title: String,
    pub address: String,
    pub postcode: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub bedrooms: i32,
    pub min_price: i32,
    pub max_price: i32,
    pub sources: Vec<String>,
    pub source_urls: serde_json::Value,
    pub source_descriptions: serde_json::Value,
    pub features: Vec<String>,
    pub floorplan_url: Option<String>,
    pub enrichment_status: String,
    pub enrichment_attempts: i32,
    pub notification_status: String,
    pub first_seen: DateTime<Utc>,
}

impl PropertyRow {
    /// Reconstruct a `CanonicalProperty` with an empty image manifest; the
    /// caller attaches images from a separate `property_images` query
    /// (spec.md §4.7: `get_unenriched_properties` "reconstructed ... with
    /// empty image manifest").
    pub fn into_domain(self, images: Vec<PropertyImage>) -> CanonicalProperty {
        let source_urls: BTreeMap<Source, String> = match self.source_urls {
            serde_json::Value::Object(map) => map
                .into_iter()
                .filter_map(|(k, v)| Some((source_from_text(&k)?, v.as_str()?.to_string())))
                .collect(),
            _ => BTreeMap::new(),
        };
        let source_descriptions: BTreeMap<Source, String> = match self.source_descriptions {
            serde_json::Value::Object(map) => map
                .into_iter()
                .filter_map(|(k, v)| Some((source_from_text(&k)?, v.as_str()?.to_string())))
                .collect(),
            _ => BTreeMap::new(),
        };
        let sources: BTreeSet<Source> =
            self.sources.iter().filter_map(|s| source_from_text(s)).collect();

        CanonicalProperty {
            id: self.id,
            canonical_source: source_from_text(&self.canonical_source).unwrap_or(Source::Rightmove),
            canonical_source_id: self.canonical_source_id,
            title: self.title,
            address: self.address,
            postcode: self.postcode,
            latitude: self.latitude,
            longitude: self.longitude,
            bedrooms: self.bedrooms,
            min_price: self.min_price,
            max_price: self.max_price,
            sources,
            source_urls,
            source_descriptions,
            features: self.features,
            images,
            floorplan_url: self.floorplan_url,
            enrichment_status: enrichment_status_from_text(&self.enrichment_status),
            enrichment_attempts: self.enrichment_attempts,
            notification_status: notification_status_from_text(&self.notification_status),
            first_seen: self.first_seen,
        }
    }
}

/// Bind-ready scalar fields extracted from a `CanonicalProperty`, used by
/// every upsert query in `crate::store`.
pub struct PropertyBinds {
    pub id: Uuid,
    pub canonical_source: String,
    pub canonical_source_id: String,
    pub title: String,
    pub address: String,
    pub postcode: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub bedrooms: i32,
    pub min_price: i32,
    pub max_price: i32,
    pub sources: Vec<String>,
    pub source_urls: serde_json::Value,
    pub source_descriptions: serde_json::Value,
    pub features: Vec<String>,
    pub floorplan_url: Option<String>,
    pub enrichment_status: String,
    pub enrichment_attempts: i32,
    pub notification_status: String,
    pub first_seen: DateTime<Utc>,
}

impl From<&CanonicalProperty> for PropertyBinds {
    fn from(p: &CanonicalProperty) -> Self {
        let source_urls = serde_json::Value::Object(
            p.source_urls
                .iter()
                .map(|(s, url)| (source_to_text(*s).to_string(), serde_json::Value::String(url.clone())))
                .collect(),
        );
        let source_descriptions = serde_json::Value::Object(
            p.source_descriptions
                .iter()
                .map(|(s, desc)| (source_to_text(*s).to_string(), serde_json::Value::String(desc.clone())))
                .collect(),
        );
        Self {
            id: p.id,
            canonical_source: source_to_text(p.canonical_source).to_string(),
            canonical_source_id: p.canonical_source_id.clone(),
            title: p.title.clone(),
            address: p.address.clone(),
            postcode: p.postcode.clone(),
            latitude: p.latitude,
            longitude: p.longitude,
            bedrooms: p.bedrooms,
            min_price: p.min_price,
            max_price: p.max_price,
            sources: p.sources.iter().map(|s| source_to_text(*s).to_string()).collect(),
            source_urls,
            source_descriptions,
            features: p.features.clone(),
            floorplan_url: p.floorplan_url.clone(),
            enrichment_status: enrichment_status_to_text(p.enrichment_status).to_string(),
            enrichment_attempts: p.enrichment_attempts,
            notification_status: notification_status_to_text(p.notification_status).to_string(),
            first_seen: p.first_seen,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PropertyImageRow {
    pub id: Uuid,
    pub property_id: Uuid,
    pub owning_source: String,
    pub url: String,
    pub image_type: String,
}

impl PropertyImageRow {
    pub fn into_domain(self) -> PropertyImage {
        PropertyImage {
            owning_source: source_from_text(&self.owning_source).unwrap_or(Source::Rightmove),
            url: self.url,
            image_type: match self.image_type.as_str() {
                "floorplan" => ImageType::Floorplan,
                _ => ImageType::Gallery,
            },
        }
    }
}

pub fn image_type_to_text(image_type: ImageType) -> &'static str {
    match image_type {
        ImageType::Gallery => "gallery",
        ImageType::Floorplan => "floorplan",
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationsJson(pub AnalysisObservations);

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QualityAnalysisRow {
    pub property_id: Uuid,
    pub overall_rating: Option<i32>,
    pub concerns: Vec<String>,
    pub observations: serde_json::Value,
    pub fit_score: Option<i32>,
    pub reanalysis_requested_at: Option<DateTime<Utc>>,
}

impl QualityAnalysisRow {
    pub fn into_domain(self) -> QualityAnalysis {
        let observations: AnalysisObservations =
            serde_json::from_value(self.observations).unwrap_or_default();
        QualityAnalysis {
            property_id: self.property_id,
            overall_rating: self.overall_rating,
            concerns: self.concerns,
            observations,
            fit_score: self.fit_score,
            reanalysis_requested_at: self.reanalysis_requested_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PipelineRunRow {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: String,
    pub scraped_count: i32,
    pub criteria_pass_count: i32,
    pub dedup_merged_count: i32,
    pub enriched_count: i32,
    pub analyzed_count: i32,
    pub notified_count: i32,
    pub error_message: Option<String>,
    pub duration_seconds: Option<f64>,
}

impl PipelineRunRow {
    pub fn into_domain(self) -> PipelineRun {
        PipelineRun {
            id: self.id,
            started_at: self.started_at,
            completed_at: self.completed_at,
            status: match self.status.as_str() {
                "completed" => RunStatus::Completed,
                "failed" => RunStatus::Failed,
                _ => RunStatus::Running,
            },
            scraped_count: self.scraped_count,
            criteria_pass_count: self.criteria_pass_count,
            dedup_merged_count: self.dedup_merged_count,
            enriched_count: self.enriched_count,
            analyzed_count: self.analyzed_count,
            notified_count: self.notified_count,
            error_message: self.error_message,
            duration_seconds: self.duration_seconds,
        }
    }
}

pub fn run_status_to_text(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
    }
}

/// Trigger kind for a pipeline run (SPEC_FULL.md §3 supplement).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTrigger {
    Scheduled,
    Manual,
    ReanalysisSubflow,
}

impl RunTrigger {
    pub fn as_text(self) -> &'static str {
        match self {
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Manual => "manual",
            RunTrigger::ReanalysisSubflow => "reanalysis_subflow",
        }
    }
}

impl FromStr for RunTrigger {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(RunTrigger::Manual),
            "reanalysis_subflow" => Ok(RunTrigger::ReanalysisSubflow),
            _ => Ok(RunTrigger::Scheduled),
        }
    }
}
