//! The main pipeline run: scrape → gate → dedup → save → enrich →
//! commute → save-pre-analysis → analyze → finalize, exactly the stage
//! order spec.md §5 requires ("within a single pipeline run, stages execute
//! strictly in order").

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use rentgrid_analyzer::{AnalyzerConfig, AnalyzerRunner};
use rentgrid_commute::CommuteAdapter;
use rentgrid_common::capability::{
    DetailFetcher, ImageDownloader, ImageHasher, PlatformAdapter, QualityAnalyzer,
};
use rentgrid_common::{Config, PipelineRun, RentGridError, RunStatus, SearchCriteria};
use rentgrid_dedup::{DedupConfig, DedupInput, SignalWeights};
use rentgrid_enrich::{EnrichConfig, Enricher};
use rentgrid_scrape::{OutcodeMode, ScrapeOrchestrator};
use rentgrid_store::{RunTrigger, Store};

/// A cross-run "anchor" lookback window for the dedup stage. Not named as a
/// configuration field in spec.md §6's list, so it is a constant rather
/// than a guessed env var; see DESIGN.md's open-question notes.
const ANCHOR_LOOKBACK_DAYS: i64 = 30;

pub struct PipelineDeps {
    pub store: Store,
    pub config: Config,
    pub adapters: Vec<Arc<dyn PlatformAdapter>>,
    pub detail_fetcher: Arc<dyn DetailFetcher>,
    pub image_downloader: Arc<dyn ImageDownloader>,
    pub image_hasher: Arc<dyn ImageHasher>,
    pub analyzer: Arc<dyn QualityAnalyzer>,
    /// `None` when no destination postcode is configured: the commute
    /// stage is skipped entirely (spec.md doesn't require it be present).
    pub commute: Option<CommuteAdapter>,
}

pub struct RunOutcome {
    pub run: PipelineRun,
}

enum StageFailure {
    Cancelled,
    Fatal(anyhow::Error),
}

fn fatal(e: RentGridError) -> StageFailure {
    StageFailure::Fatal(e.into())
}

pub struct PipelineOrchestrator {
    deps: PipelineDeps,
}

impl PipelineOrchestrator {
    pub fn new(deps: PipelineDeps) -> Self {
        Self { deps }
    }

    /// Runs one full pipeline invocation. `cancel` is checked cooperatively
    /// between stages (spec.md §5: "checked at every suspension point");
    /// a SIGINT handler in the binary crate cancels it.
    pub async fn run(&self, trigger: RunTrigger, cancel: CancellationToken) -> anyhow::Result<RunOutcome> {
        let store = &self.deps.store;

        let reset = store.reset_failed_analyses().await?;
        if reset > 0 {
            info!(reset, "fallback analyses reset to pending_analysis on startup");
        }

        let mut run = PipelineRun::new(Uuid::new_v4(), Utc::now());
        store.start_run(&run, trigger).await?;

        let outcome = self.run_inner(&mut run, &cancel).await;

        match outcome {
            Ok(()) => {
                run.status = RunStatus::Completed;
            }
            Err(StageFailure::Cancelled) => {
                run.status = RunStatus::Failed;
                run.error_message = Some("cancelled".to_string());
            }
            Err(StageFailure::Fatal(e)) => {
                run.status = RunStatus::Failed;
                run.error_message = Some(e.to_string());
                run.completed_at = Some(Utc::now());
                run.duration_seconds = Some(duration_seconds(&run));
                store.finish_run(&run).await?;
                return Err(e);
            }
        }

        run.completed_at = Some(Utc::now());
        run.duration_seconds = Some(duration_seconds(&run));
        store.finish_run(&run).await?;
        Ok(RunOutcome { run })
    }

    async fn run_inner(&self, run: &mut PipelineRun, cancel: &CancellationToken) -> Result<(), StageFailure> {
        let deps = &self.deps;
        let config = &deps.config;

        let criteria = search_criteria(config);

        // 1. Scrape.
        let scrape_orchestrator = ScrapeOrchestrator::new(deps.adapters.clone(), config.scrape_concurrency);
        let scrape_outcome = scrape_orchestrator.run(&criteria).await;
        run.scraped_count = scrape_outcome.listings.len() as i32;
        info!(scraped = run.scraped_count, failed_pairs = scrape_outcome.failed_pairs.len(), "scrape stage complete");

        if cancel.is_cancelled() {
            return Err(StageFailure::Cancelled);
        }

        // 2. Criteria & location gate.
        let allowed_outcodes = rentgrid_scrape::resolve_outcodes(&criteria.areas);
        let (passed, gate_stats) = rentgrid_scrape::filter_listings(
            scrape_outcome.listings,
            &criteria,
            &allowed_outcodes,
            OutcodeMode::Strict,
        );
        run.criteria_pass_count = gate_stats.passed as i32;
        info!(
            passed = gate_stats.passed,
            rejected_price = gate_stats.rejected_price,
            rejected_bedrooms = gate_stats.rejected_bedrooms,
            rejected_location = gate_stats.rejected_location,
            "gate stage complete"
        );

        // 3. Best-effort image hashing for the new listings, ahead of dedup
        // (spec.md §9: "image hashing is cheap enough to run on the main
        // task"). A failed download or missing thumbnail just means that
        // listing contributes no image-hash signal to scoring.
        let mut image_hashes = HashMap::new();
        for listing in &passed {
            let Some(url) = &listing.image_url else { continue };
            match deps.image_downloader.download_image(url).await {
                Ok(Some(bytes)) => {
                    if let Some(hash) = deps.image_hasher.hash(&bytes) {
                        image_hashes.insert((listing.source, listing.source_id.clone()), hash);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, url, "pre-dedup image download failed; hash signal skipped"),
            }
        }

        if cancel.is_cancelled() {
            return Err(StageFailure::Cancelled);
        }

        // 4. Deduplicate against recent anchors and persist.
        let anchors = deps
            .store
            .get_recent_properties_for_dedup(ANCHOR_LOOKBACK_DAYS)
            .await
            .map_err(fatal)?;

        let dedup_config = DedupConfig {
            weights: SignalWeights::default(),
            match_threshold: config.match_threshold,
            min_signals: config.min_signals,
        };
        let dedup_output = rentgrid_dedup::deduplicate(
            DedupInput { new_listings: passed, anchors, image_hashes },
            &dedup_config,
        );

        let mut merged_count = 0;
        for cluster in &dedup_output.clusters {
            if cluster.absorbed_anchor_id.is_some() || cluster.property.sources.len() > 1 {
                merged_count += 1;
            }
            // An absorbed anchor already carries its real lifecycle state
            // forward (rentgrid-dedup::cluster::merge_cluster); a brand new
            // cluster is always freshly pending. Route each to the store
            // method whose upsert semantics matches that state.
            let save_result = if cluster.absorbed_anchor_id.is_some() {
                deps.store.save_merged_property(&cluster.property).await
            } else {
                deps.store.save_unenriched_property(&cluster.property).await
            };
            if let Err(e) = save_result {
                warn!(error = %e, property_id = %cluster.property.id, "failed to persist dedup cluster");
            }
        }
        run.dedup_merged_count = merged_count;
        info!(clusters = dedup_output.clusters.len(), merged = merged_count, "dedup stage complete");

        if cancel.is_cancelled() {
            return Err(StageFailure::Cancelled);
        }

        // 5. Detail enrichment.
        let unenriched = deps
            .store
            .get_unenriched_properties(config.max_enrichment_attempts)
            .await
            .map_err(fatal)?;

        let enricher = Enricher::new(
            Arc::clone(&deps.detail_fetcher),
            Arc::clone(&deps.image_downloader),
            EnrichConfig {
                data_dir: PathBuf::from(&config.data_dir),
                property_concurrency: config.enrich_concurrency,
                image_concurrency: config.enrich_image_concurrency,
            },
        );
        let enrich_outcome = enricher.enrich_batch(unenriched, |_| false).await;

        for property in &enrich_outcome.enriched {
            if let Err(e) = deps.store.save_merged_property(property).await {
                warn!(error = %e, property_id = %property.id, "failed to sync image manifest");
            }
            if let Err(e) = deps.store.mark_enriched(property.id).await {
                warn!(error = %e, property_id = %property.id, "failed to mark enriched");
            }
        }
        for property in &enrich_outcome.failed {
            if let Err(e) = deps.store.save_unenriched_property(property).await {
                warn!(error = %e, property_id = %property.id, "failed to record enrichment retry");
            }
        }
        run.enriched_count = enrich_outcome.enriched.len() as i32;

        let expired = deps
            .store
            .expire_unenriched(config.max_enrichment_attempts)
            .await
            .map_err(fatal)?;
        info!(enriched = run.enriched_count, failed = enrich_outcome.failed.len(), expired, "enrich stage complete");

        if cancel.is_cancelled() {
            return Err(StageFailure::Cancelled);
        }

        // 6. Commute estimation, then the pre-analysis save that must land
        // before the analyzer runs (spec.md §4.5's `save_before_analyze`
        // edge, so a crash mid-analysis is recoverable next run).
        let mut commute_map = HashMap::new();
        if let Some(commute) = &deps.commute {
            for property in &enrich_outcome.enriched {
                let Some(postcode) = &property.postcode else { continue };
                match commute.estimate(postcode).await {
                    Ok(results) => {
                        if let Some(result) = results.into_values().next() {
                            commute_map.insert(property.id, result);
                        }
                    }
                    Err(e) => warn!(error = %e, property_id = %property.id, "commute estimation failed"),
                }
            }
        }
        deps.store
            .save_pre_analysis_properties(&enrich_outcome.enriched, &commute_map)
            .await
            .map_err(fatal)?;

        if cancel.is_cancelled() {
            return Err(StageFailure::Cancelled);
        }

        // 7. Analyze, score fit, complete.
        let pending_analysis = deps.store.get_pending_analysis_properties().await.map_err(fatal)?;
        let bedrooms_by_id: HashMap<Uuid, i32> =
            pending_analysis.iter().map(|p| (p.id, p.bedrooms)).collect();
        let data_dir = PathBuf::from(&config.data_dir);

        let analyzer_runner = AnalyzerRunner::new(
            Arc::clone(&deps.analyzer),
            AnalyzerConfig { concurrency: config.analyzer_concurrency, max_images: config.analyzer_max_images },
        );
        let analysis_outcome = analyzer_runner
            .analyze_batch(pending_analysis, |p| crate::images::cached_image_paths(&data_dir, p))
            .await;

        run.analyzed_count = analysis_outcome.analyzed.len() as i32;

        for (property_id, mut analysis) in analysis_outcome.analyzed {
            let bedrooms = bedrooms_by_id.get(&property_id).copied().unwrap_or(0);
            let fit = rentgrid_fit::compute_fit(&analysis.observations, bedrooms);
            analysis.fit_score = fit.score;
            if let Err(e) = deps.store.complete_analysis(property_id, Some(&analysis)).await {
                warn!(error = %e, property_id = %property_id, "failed to complete analysis");
            }
        }

        // An APIUnavailable circuit trip is not a fatal run error: the run
        // still completes, with the tripped properties left pending_analysis
        // for the next run to pick up via get_pending_analysis_properties
        // (spec.md §5: "completes the run as completed (partial)").
        if analysis_outcome.circuit_tripped {
            run.error_message = Some(format!(
                "analyzer unavailable; {} properties remain pending_analysis",
                analysis_outcome.still_pending.len()
            ));
            warn!(still_pending = analysis_outcome.still_pending.len(), "analysis circuit breaker tripped; run completing partial");
        }

        info!(analyzed = run.analyzed_count, "analyze stage complete");
        Ok(())
    }
}

fn search_criteria(config: &Config) -> SearchCriteria {
    SearchCriteria {
        min_price: config.min_price,
        max_price: config.max_price,
        min_bedrooms: config.min_bedrooms,
        max_bedrooms: config.max_bedrooms,
        min_bathrooms: config.min_bathrooms,
        areas: config.search_areas.clone(),
        furnish_types: config.furnish_types.clone(),
        include_let_agreed: config.include_let_agreed,
        max_per_scraper: config.max_per_scraper,
    }
}

fn duration_seconds(run: &PipelineRun) -> f64 {
    let completed = run.completed_at.unwrap_or_else(Utc::now);
    (completed - run.started_at).num_milliseconds() as f64 / 1000.0
}
