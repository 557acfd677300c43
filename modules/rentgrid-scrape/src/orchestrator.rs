//! Scrape fan-out: one task per `(platform, area)` pair, bounded by a
//! per-platform semaphore, with per-adapter failure isolation.
//!
//! Grounded on the teacher's `ContentFetcher`-trait-object fan-out pattern
//! (`pipeline::traits::ContentFetcher`) and its per-source concurrency
//! bound in `scheduling::budget`/`scheduling::scheduler` — here expressed
//! directly over `tokio::task::JoinSet` + `tokio::sync::Semaphore` rather
//! than the restate-durable workflow shape, per spec.md §5's cooperative
//! single-process scheduling model.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use rentgrid_common::capability::PlatformAdapter;
use rentgrid_common::{Listing, SearchCriteria, Source};

/// Per-platform scrape adapters and the concurrency bound applied across all
/// of them (spec.md §5: "default 1 — platforms rate-limit aggressively").
pub struct ScrapeOrchestrator {
    adapters: Vec<Arc<dyn PlatformAdapter>>,
    per_platform_concurrency: usize,
}

/// Outcome of one run: the merged, `(source, source_id)`-deduplicated
/// listing set, plus which `(source, area)` pairs failed (logged, not
/// propagated).
pub struct ScrapeOutcome {
    pub listings: Vec<Listing>,
    pub failed_pairs: Vec<(Source, String)>,
}

impl ScrapeOrchestrator {
    pub fn new(adapters: Vec<Arc<dyn PlatformAdapter>>, per_platform_concurrency: usize) -> Self {
        Self {
            adapters,
            per_platform_concurrency: per_platform_concurrency.max(1),
        }
    }

    /// Run every `(adapter, area)` pair concurrently (bounded per adapter),
    /// merge the results, and drop same-identity duplicates the way a
    /// platform's own paginated results might repeat a listing.
    pub async fn run(&self, criteria: &SearchCriteria) -> ScrapeOutcome {
        let mut set = tokio::task::JoinSet::new();

        for adapter in &self.adapters {
            let semaphore = Arc::new(Semaphore::new(self.per_platform_concurrency));
            for area in &criteria.areas {
                let adapter = Arc::clone(adapter);
                let semaphore = Arc::clone(&semaphore);
                let criteria = criteria.clone();
                let area = area.clone();

                set.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                    let source = adapter.source();
                    let result = adapter.scrape(&criteria, &area).await;
                    (source, area, result)
                });
            }
        }

        let mut by_identity: HashMap<(Source, String), Listing> = HashMap::new();
        let mut failed_pairs = Vec::new();

        while let Some(joined) = set.join_next().await {
            let (source, area, result) = match joined {
                Ok(v) => v,
                Err(join_err) => {
                    warn!(error = %join_err, "scrape task panicked; treated as empty");
                    continue;
                }
            };

            match result {
                Ok(listings) => {
                    // Per-area cap (spec.md §4.1: "first N listings per
                    // source, newest first where the platform supports it").
                    // Enforced here rather than left to the adapter, since
                    // the orchestrator owns the contract regardless of what
                    // a given platform adapter does on its own.
                    let capped: Vec<Listing> = listings.into_iter().take(criteria.max_per_scraper).collect();
                    info!(?source, area, count = capped.len(), "scrape adapter returned listings");
                    for listing in capped {
                        by_identity.insert(listing.identity_owned(), listing);
                    }
                }
                Err(e) => {
                    warn!(?source, area, error = %e, "scrape adapter failed; isolated from other adapters");
                    failed_pairs.push((source, area));
                }
            }
        }

        ScrapeOutcome {
            listings: by_identity.into_values().collect(),
            failed_pairs,
        }
    }
}

trait IdentityOwned {
    fn identity_owned(&self) -> (Source, String);
}

impl IdentityOwned for Listing {
    fn identity_owned(&self) -> (Source, String) {
        (self.source, self.source_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentgrid_testing::{default_search_criteria, ListingBuilder};

    #[tokio::test]
    async fn merges_listings_across_adapters_and_areas() {
        let openrent = Arc::new(
            rentgrid_testing::MockPlatformAdapter::new(Source::Openrent).on_area(
                "hackney",
                vec![ListingBuilder::new(Source::Openrent, "OR-1").build()],
            ),
        );
        let zoopla = Arc::new(
            rentgrid_testing::MockPlatformAdapter::new(Source::Zoopla).on_area(
                "hackney",
                vec![ListingBuilder::new(Source::Zoopla, "ZP-1").build()],
            ),
        );

        let orchestrator = ScrapeOrchestrator::new(vec![openrent, zoopla], 1);
        let outcome = orchestrator.run(&default_search_criteria()).await;

        assert_eq!(outcome.listings.len(), 2);
        assert!(outcome.failed_pairs.is_empty());
    }

    #[tokio::test]
    async fn one_failing_adapter_does_not_cancel_the_others() {
        let failing = Arc::new(
            rentgrid_testing::MockPlatformAdapter::new(Source::Rightmove).failing_on("hackney"),
        );
        let healthy = Arc::new(
            rentgrid_testing::MockPlatformAdapter::new(Source::Openrent).on_area(
                "hackney",
                vec![ListingBuilder::new(Source::Openrent, "OR-1").build()],
            ),
        );

        let orchestrator = ScrapeOrchestrator::new(vec![failing, healthy], 1);
        let outcome = orchestrator.run(&default_search_criteria()).await;

        assert_eq!(outcome.listings.len(), 1);
        assert_eq!(outcome.failed_pairs, vec![(Source::Rightmove, "hackney".to_string())]);
    }

    #[tokio::test]
    async fn same_identity_from_paginated_results_deduplicates() {
        let adapter = Arc::new(rentgrid_testing::MockPlatformAdapter::new(Source::Openrent).on_area(
            "hackney",
            vec![
                ListingBuilder::new(Source::Openrent, "OR-1").build(),
                ListingBuilder::new(Source::Openrent, "OR-1").price_pcm(1).build(),
            ],
        ));
        let orchestrator = ScrapeOrchestrator::new(vec![adapter], 1);
        let outcome = orchestrator.run(&default_search_criteria()).await;
        assert_eq!(outcome.listings.len(), 1);
    }

    #[tokio::test]
    async fn per_area_cap_is_enforced_by_the_orchestrator_not_the_adapter() {
        let listings = vec![
            ListingBuilder::new(Source::Openrent, "OR-1").build(),
            ListingBuilder::new(Source::Openrent, "OR-2").build(),
            ListingBuilder::new(Source::Openrent, "OR-3").build(),
        ];
        let adapter = Arc::new(
            rentgrid_testing::MockPlatformAdapter::new(Source::Openrent)
                .on_area("hackney", listings),
        );
        let orchestrator = ScrapeOrchestrator::new(vec![adapter], 1);
        let mut criteria = default_search_criteria();
        criteria.max_per_scraper = 2;

        let outcome = orchestrator.run(&criteria).await;
        assert_eq!(outcome.listings.len(), 2);
    }
}
