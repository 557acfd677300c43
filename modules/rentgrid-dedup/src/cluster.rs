//! Blocking, clustering, canonical selection and merge.
//!
//! Grounded on the teacher's `pipeline::handlers::dedup` batch-orchestration
//! shape (layered passes over a candidate set, each producing typed
//! outcomes) and `scheduling::scheduler`'s deterministic-sort-then-decide
//! style — reworked here into single-pass blocking + greedy union-find
//! clustering per spec.md §4.3, since the source system's layered
//! priority-chain (URL match, then title match, then embedding) doesn't fit
//! a weighted multi-signal score.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::warn;
use uuid::Uuid;

use rentgrid_common::{is_full_postcode, outcode_of, CanonicalProperty, EnrichmentStatus, Listing, NotificationStatus, Source};

use crate::signals::{score_pair, DedupConfig, MatchCandidate, PairScore};

/// Everything the deduplicator needs for one pass: freshly scraped listings
/// (never before persisted) plus the existing canonical rows ("anchors")
/// they might match against, and any precomputed perceptual image hashes
/// keyed by candidate identity (hashing requires a network fetch, so it is
/// computed upstream and handed in rather than done here).
pub struct DedupInput {
    pub new_listings: Vec<Listing>,
    pub anchors: Vec<CanonicalProperty>,
    pub image_hashes: HashMap<(Source, String), String>,
}

/// One output cluster: the merged canonical record plus whether it absorbed
/// an existing anchor (the orchestrator uses this to decide insert vs.
/// update when persisting).
pub struct MergedCluster {
    pub property: CanonicalProperty,
    pub absorbed_anchor_id: Option<Uuid>,
}

pub struct DedupOutput {
    pub clusters: Vec<MergedCluster>,
}

/// Build a fresh singleton canonical record from a never-before-seen
/// listing: `pending` enrichment, `pending_enrichment` notification, a
/// brand new id.
pub fn singleton_from_listing(listing: &Listing) -> CanonicalProperty {
    let mut sources = BTreeSet::new();
    sources.insert(listing.source);
    let mut source_urls = BTreeMap::new();
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
        source_descriptions: BTreeMap::new(),
        features: Vec::new(),
        images: Vec::new(),
        floorplan_url: None,
        enrichment_status: EnrichmentStatus::Pending,
        enrichment_attempts: 0,
        notification_status: NotificationStatus::PendingEnrichment,
        first_seen: listing.first_seen,
    }
}

fn to_candidate(property: &CanonicalProperty, image_hash: Option<String>) -> MatchCandidate {
    MatchCandidate {
        source: property.canonical_source,
        source_id: property.canonical_source_id.clone(),
        bedrooms: property.bedrooms,
        postcode: property.postcode.clone(),
        latitude: property.latitude,
        longitude: property.longitude,
        address: property.address.clone(),
        price_pcm: property.min_price,
        image_hash,
    }
}

/// Blocking key: `(postcode granularity marker, bedrooms)`. A listing with no
/// postcode at all gets a key unique to itself, so it is never matched
/// cross-source (spec.md: "A listing without an extractable outcode is never
/// matched cross-source"). A bare outcode (`"E8"`, no incode) blocks
/// separately from a full postcode sharing the same outcode, so two
/// listings differing only in postcode precision never silently merge on
/// that basis alone.
fn block_key(property: &CanonicalProperty) -> String {
    match property.postcode.as_deref().and_then(|p| rentgrid_common::normalize_postcode(p)) {
        Some(normalized) if is_full_postcode(&normalized) => {
            let outcode = outcode_of(&normalized).unwrap_or(normalized);
            format!("FULL:{outcode}:{}", property.bedrooms)
        }
        Some(normalized) => {
            format!("OUTCODE_ONLY:{normalized}:{}", property.bedrooms)
        }
        None => {
            format!("MISSING:{}:{}:{}", property.canonical_source as u8, property.canonical_source_id, property.bedrooms)
        }
    }
}

/// Minimal union-find with path compression, indexed by position in the
/// flat candidate list.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, i: usize) -> usize {
        if self.parent[i] != i {
            self.parent[i] = self.find(self.parent[i]);
        }
        self.parent[i]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Lower index becomes the representative, keeping runs
            // deterministic independent of insertion order beyond that.
            if ra < rb {
                self.parent[rb] = ra;
            } else {
                self.parent[ra] = rb;
            }
        }
    }
}

/// Run one full dedup pass: singleton-ize new listings, pool them with
/// existing anchors, block, score pairwise within each block, cluster via
/// greedy union-find over descending score (deterministic tie-break), then
/// merge each cluster into one canonical record.
pub fn deduplicate(input: DedupInput, config: &DedupConfig) -> DedupOutput {
    let mut items: Vec<CanonicalProperty> = Vec::with_capacity(input.new_listings.len() + input.anchors.len());
    let mut is_anchor = Vec::with_capacity(items.capacity());

    for listing in &input.new_listings {
        items.push(singleton_from_listing(listing));
        is_anchor.push(false);
    }
    for anchor in input.anchors {
        items.push(anchor);
        is_anchor.push(true);
    }

    let candidates: Vec<MatchCandidate> = items
        .iter()
        .map(|p| {
            let hash = input.image_hashes.get(&(p.canonical_source, p.canonical_source_id.clone())).cloned();
            to_candidate(p, hash)
        })
        .collect();

    let mut blocks: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, item) in items.iter().enumerate() {
        blocks.entry(block_key(item)).or_default().push(idx);
    }

    let mut dsu = DisjointSet::new(items.len());

    for indices in blocks.values() {
        if indices.len() < 2 {
            continue;
        }

        let mut scored: Vec<(usize, usize, PairScore)> = Vec::new();
        for i in 0..indices.len() {
            for j in (i + 1)..indices.len() {
                let (a, b) = (indices[i], indices[j]);
                let score = score_pair(&candidates[a], &candidates[b], &config.weights);
                if score.is_match(config) {
                    scored.push((a, b, score));
                }
            }
        }

        // Highest score first; ties broken by ascending (a, b) identity for
        // a run-to-run deterministic clustering order.
        scored.sort_by(|x, y| {
            y.2.total
                .partial_cmp(&x.2.total)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| (x.0, x.1).cmp(&(y.0, y.1)))
        });

        for (a, b, _) in scored {
            dsu.union(a, b);
        }
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for idx in 0..items.len() {
        let root = dsu.find(idx);
        groups.entry(root).or_default().push(idx);
    }

    let mut clusters = Vec::with_capacity(groups.len());
    for mut members in groups.into_values() {
        members.sort_unstable();
        clusters.push(merge_cluster(&items, &is_anchor, &members));
    }

    DedupOutput { clusters }
}

/// Merge one union-find cluster's members into a single canonical record.
///
/// If the cluster contains a persisted anchor, its id, enrichment state and
/// notification state carry forward unchanged; new listings only widen the
/// source set, price range, and URL/description maps. A cluster should
/// never contain more than one anchor (each anchor is itself already the
/// merge of everything that matched it in a prior run) — if it does, the
/// earliest-first_seen anchor wins and the rest is logged, since the store
/// layer does not enforce this as a hard invariant.
fn merge_cluster(items: &[CanonicalProperty], is_anchor: &[bool], members: &[usize]) -> MergedCluster {
    let anchor_indices: Vec<usize> = members.iter().copied().filter(|&i| is_anchor[i]).collect();

    if anchor_indices.len() > 1 {
        warn!(count = anchor_indices.len(), "dedup cluster absorbed more than one existing anchor");
    }

    let anchor_idx = anchor_indices.into_iter().min_by(|&a, &b| {
        items[a]
            .first_seen
            .cmp(&items[b].first_seen)
            .then_with(|| items[a].canonical_source.priority_rank().cmp(&items[b].canonical_source.priority_rank()))
    });

    let canonical_idx = members
        .iter()
        .copied()
        .min_by(|&a, &b| {
            items[a]
                .first_seen
                .cmp(&items[b].first_seen)
                .then_with(|| items[a].canonical_source.priority_rank().cmp(&items[b].canonical_source.priority_rank()))
        })
        .expect("cluster always has at least one member");

    let base = &items[canonical_idx];
    let mut merged = base.clone();

    for &idx in members {
        if idx == canonical_idx {
            continue;
        }
        let other = &items[idx];

        merged.sources.extend(other.sources.iter().copied());
        for (source, url) in &other.source_urls {
            merged.source_urls.entry(*source).or_insert_with(|| url.clone());
        }
        for (source, description) in &other.source_descriptions {
            merged.source_descriptions.entry(*source).or_insert_with(|| description.clone());
        }

        merged.min_price = merged.min_price.min(other.min_price);
        merged.max_price = merged.max_price.max(other.max_price);

        for image in &other.images {
            if !merged.images.iter().any(|existing| existing.url == image.url) {
                merged.images.push(image.clone());
            }
        }
        if merged.floorplan_url.is_none() {
            merged.floorplan_url = other.floorplan_url.clone();
        }
        for feature in &other.features {
            if !merged.features.iter().any(|f| f == feature) {
                merged.features.push(feature.clone());
            }
        }

        if other.first_seen < merged.first_seen {
            merged.first_seen = other.first_seen;
        }
    }

    let absorbed_anchor_id = if let Some(anchor_idx) = anchor_idx {
        let anchor = &items[anchor_idx];
        merged.id = anchor.id;
        merged.enrichment_status = anchor.enrichment_status;
        merged.enrichment_attempts = anchor.enrichment_attempts;
        merged.notification_status = anchor.notification_status;
        Some(anchor.id)
    } else {
        merged.notification_status = NotificationStatus::PendingEnrichment;
        merged.enrichment_status = EnrichmentStatus::Pending;
        None
    };

    MergedCluster { property: merged, absorbed_anchor_id }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{DateTime, TimeZone, Utc};

    use rentgrid_common::Source;

    use super::*;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, hour, 0, 0).unwrap()
    }

    fn listing(source: Source, id: &str, postcode: &str, price: i32, hour: u32) -> Listing {
        Listing {
            source,
            source_id: id.to_string(),
            url: format!("https://example.test/{source:?}/{id}"),
            title: "2 bed flat".to_string(),
            price_pcm: price,
            bedrooms: 2,
            address: "42 Crown Road, London".to_string(),
            postcode: Some(postcode.to_string()),
            latitude: Some(51.5465),
            longitude: Some(-0.0553),
            image_url: None,
            first_seen: ts(hour),
        }
    }

    #[test]
    fn two_platforms_same_address_and_postcode_merge_into_one() {
        let listings = vec![
            listing(Source::Rightmove, "RM-1", "E8 3RH", 2000, 0),
            listing(Source::Openrent, "OR-1", "E8 3RH", 2010, 1),
        ];
        let input = DedupInput { new_listings: listings, anchors: Vec::new(), image_hashes: HashMap::new() };
        let output = deduplicate(input, &DedupConfig::default());

        assert_eq!(output.clusters.len(), 1);
        let merged = &output.clusters[0].property;
        assert_eq!(merged.sources.len(), 2);
        assert_eq!(merged.canonical_source, Source::Rightmove);
        assert_eq!(merged.min_price, 2000);
        assert_eq!(merged.max_price, 2010);
    }

    #[test]
    fn different_bedroom_counts_never_merge() {
        let mut listings = vec![
            listing(Source::Rightmove, "RM-1", "E8 3RH", 2000, 0),
            listing(Source::Openrent, "OR-1", "E8 3RH", 2000, 1),
        ];
        listings[1].bedrooms = 3;

        let input = DedupInput { new_listings: listings, anchors: Vec::new(), image_hashes: HashMap::new() };
        let output = deduplicate(input, &DedupConfig::default());
        assert_eq!(output.clusters.len(), 2);
    }

    #[test]
    fn outcode_only_postcode_blocks_separately_from_full_postcode() {
        let listings = vec![
            listing(Source::Rightmove, "RM-1", "E8", 2000, 0),
            listing(Source::Zoopla, "ZP-1", "E8 3RH", 2000, 1),
        ];
        let input = DedupInput { new_listings: listings, anchors: Vec::new(), image_hashes: HashMap::new() };
        let output = deduplicate(input, &DedupConfig::default());
        assert_eq!(output.clusters.len(), 2);
    }

    #[test]
    fn missing_postcode_never_matches_cross_source() {
        let mut a = listing(Source::Rightmove, "RM-1", "E8 3RH", 2000, 0);
        a.postcode = None;
        let mut b = listing(Source::Zoopla, "ZP-1", "E8 3RH", 2000, 1);
        b.postcode = None;

        let input = DedupInput { new_listings: vec![a, b], anchors: Vec::new(), image_hashes: HashMap::new() };
        let output = deduplicate(input, &DedupConfig::default());
        assert_eq!(output.clusters.len(), 2);
    }

    #[test]
    fn matching_against_an_existing_anchor_preserves_its_id_and_lifecycle() {
        let anchor = CanonicalProperty {
            id: Uuid::new_v4(),
            canonical_source: Source::Rightmove,
            canonical_source_id: "RM-1".to_string(),
            title: "2 bed flat".to_string(),
            address: "42 Crown Road, London".to_string(),
            postcode: Some("E8 3RH".to_string()),
            latitude: Some(51.5465),
            longitude: Some(-0.0553),
            bedrooms: 2,
            min_price: 2000,
            max_price: 2000,
            sources: [Source::Rightmove].into_iter().collect(),
            source_urls: [(Source::Rightmove, "https://example.test/RM-1".to_string())].into_iter().collect(),
            source_descriptions: BTreeMap::new(),
            features: Vec::new(),
            images: Vec::new(),
            floorplan_url: None,
            enrichment_status: EnrichmentStatus::Enriched,
            enrichment_attempts: 1,
            notification_status: NotificationStatus::Sent,
            first_seen: ts(0),
        };
        let anchor_id = anchor.id;

        let new_listing = listing(Source::Zoopla, "ZP-1", "E8 3RH", 2050, 5);
        let input = DedupInput { new_listings: vec![new_listing], anchors: vec![anchor], image_hashes: HashMap::new() };

        let output = deduplicate(input, &DedupConfig::default());
        assert_eq!(output.clusters.len(), 1);
        let cluster = &output.clusters[0];
        assert_eq!(cluster.absorbed_anchor_id, Some(anchor_id));
        assert_eq!(cluster.property.id, anchor_id);
        assert_eq!(cluster.property.notification_status, NotificationStatus::Sent);
        assert_eq!(cluster.property.enrichment_status, EnrichmentStatus::Enriched);
        assert_eq!(cluster.property.max_price, 2050);
        assert!(cluster.property.sources.contains(&Source::Zoopla));
    }

    #[test]
    fn non_matching_listings_stay_separate_singletons() {
        let listings = vec![
            listing(Source::Rightmove, "RM-1", "E8 3RH", 2000, 0),
            listing(Source::Openrent, "OR-2", "N16 7AA", 1800, 1),
        ];
        let input = DedupInput { new_listings: listings, anchors: Vec::new(), image_hashes: HashMap::new() };
        let output = deduplicate(input, &DedupConfig::default());
        assert_eq!(output.clusters.len(), 2);
        for cluster in &output.clusters {
            assert_eq!(cluster.property.notification_status, NotificationStatus::PendingEnrichment);
            assert!(cluster.absorbed_anchor_id.is_none());
        }
    }
}
