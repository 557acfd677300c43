//! Quality-analyzer runner: per-property tasks under a concurrency bound,
//! a minimum inter-call delay, and circuit-breaker handling for
//! `AnalyzerError::ApiUnavailable` (spec.md §4.5, §5).
//!
//! Grounded on `rentgrid-scrape::orchestrator`'s `JoinSet` + `Semaphore`
//! fan-out shape, extended with a `tokio_util::sync::CancellationToken`
//! (SPEC_FULL.md §5) so an unavailable analyzer stops spawning new work
//! cooperatively instead of needing every in-flight task aborted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use rentgrid_common::capability::{AnalyzerError, QualityAnalyzer};
use rentgrid_common::{AnalysisObservations, CanonicalProperty, QualityAnalysis};

/// Minimum delay between analyzer calls (spec.md §5: "≥ 1 s").
const INTER_CALL_DELAY: Duration = Duration::from_secs(1);

pub struct AnalyzerConfig {
    pub concurrency: usize,
    pub max_images: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self { concurrency: 3, max_images: 10 }
    }
}

/// One property's outcome: either a completed analysis (real or a
/// null-rating fallback, per spec.md §9's "fallback analysis" case) or
/// "still pending" because the circuit breaker tripped before its task ran.
pub struct AnalysisOutcome {
    pub analyzed: Vec<(Uuid, QualityAnalysis)>,
    pub still_pending: Vec<Uuid>,
    pub circuit_tripped: bool,
}

pub struct AnalyzerRunner {
    analyzer: Arc<dyn QualityAnalyzer>,
    config: AnalyzerConfig,
}

impl AnalyzerRunner {
    pub fn new(analyzer: Arc<dyn QualityAnalyzer>, config: AnalyzerConfig) -> Self {
        Self { analyzer, config }
    }

    /// `images_on_disk` maps property id to the cached image paths the
    /// analyzer should see, truncated to `config.max_images`.
    pub async fn analyze_batch(
        &self,
        properties: Vec<CanonicalProperty>,
        images_on_disk: impl Fn(&CanonicalProperty) -> Vec<std::path::PathBuf>,
    ) -> AnalysisOutcome {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let cancel = CancellationToken::new();
        let circuit_tripped = Arc::new(AtomicBool::new(false));
        let max_images = self.config.max_images;

        let mut set = tokio::task::JoinSet::new();
        for property in properties {
            let semaphore = Arc::clone(&semaphore);
            let analyzer = Arc::clone(&self.analyzer);
            let cancel = cancel.clone();
            let circuit_tripped = Arc::clone(&circuit_tripped);
            let mut images = images_on_disk(&property);
            images.truncate(max_images);
            let property_id = property.id;

            set.spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => (property_id, None),
                    permit = semaphore.acquire_owned() => {
                        let _permit = permit.expect("semaphore not closed");
                        if cancel.is_cancelled() {
                            return (property_id, None);
                        }
                        tokio::time::sleep(INTER_CALL_DELAY).await;
                        match analyzer.analyze(&property, &images).await {
                            Ok(analysis) => (property_id, Some(Ok(analysis))),
                            Err(AnalyzerError::ApiUnavailable(msg)) => {
                                warn!(%property_id, %msg, "analyzer unavailable; tripping circuit breaker");
                                circuit_tripped.store(true, Ordering::SeqCst);
                                cancel.cancel();
                                (property_id, None)
                            }
                            Err(AnalyzerError::Other(msg)) => (property_id, Some(Err(msg))),
                        }
                    }
                }
            });
        }

        let mut analyzed = Vec::new();
        let mut still_pending = Vec::new();

        while let Some(joined) = set.join_next().await {
            let (property_id, outcome) = match joined {
                Ok(v) => v,
                Err(join_err) => {
                    warn!(error = %join_err, "analyzer task panicked");
                    continue;
                }
            };

            match outcome {
                Some(Ok(analysis)) => analyzed.push((property_id, analysis)),
                Some(Err(msg)) => analyzed.push((property_id, fallback_analysis(property_id, &msg))),
                None => still_pending.push(property_id),
            }
        }

        let tripped = circuit_tripped.load(Ordering::SeqCst);
        info!(analyzed = analyzed.len(), still_pending = still_pending.len(), circuit_tripped = tripped, "analysis batch complete");
        AnalysisOutcome { analyzed, still_pending, circuit_tripped: tripped }
    }
}

/// A placeholder analysis row (null `overall_rating`) inserted when the
/// analyzer returned a non-circuit-breaking error, so the property still
/// completes this run's analysis stage and surfaces a notification; the
/// row is cleared and reprocessed by `Store::reset_failed_analyses`.
fn fallback_analysis(property_id: Uuid, reason: &str) -> QualityAnalysis {
    QualityAnalysis {
        property_id,
        overall_rating: None,
        concerns: vec![format!("analysis failed: {reason}")],
        observations: AnalysisObservations::default(),
        fit_score: None,
        reanalysis_requested_at: None,
    }
}
