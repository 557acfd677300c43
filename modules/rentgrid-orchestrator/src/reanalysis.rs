//! The reanalysis subflow: spec.md §4.5's `reanalysis_request` edge. Reads
//! properties whose analysis row has a pending `reanalysis_requested_at`,
//! reruns the analyzer, writes the result, clears the timestamp. Never
//! touches `notification_status` (spec.md §8, invariant 8).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use rentgrid_analyzer::{AnalyzerConfig, AnalyzerRunner};

use crate::pipeline::PipelineDeps;

pub struct ReanalysisOutcome {
    pub reanalyzed: usize,
    pub still_pending: usize,
    pub circuit_tripped: bool,
}

/// `outcode_prefix` filters the queue the way `Store::get_reanalysis_queue`
/// does; pass `None` to reanalyze the whole queue.
pub async fn run_reanalysis(deps: &PipelineDeps, outcode_prefix: Option<&str>) -> anyhow::Result<ReanalysisOutcome> {
    let queue = deps.store.get_reanalysis_queue(outcode_prefix).await?;
    let bedrooms_by_id: HashMap<Uuid, i32> = queue.iter().map(|p| (p.id, p.bedrooms)).collect();
    let data_dir = PathBuf::from(&deps.config.data_dir);

    let runner = AnalyzerRunner::new(
        Arc::clone(&deps.analyzer),
        AnalyzerConfig { concurrency: deps.config.analyzer_concurrency, max_images: deps.config.analyzer_max_images },
    );
    let outcome = runner
        .analyze_batch(queue, |p| crate::images::cached_image_paths(&data_dir, p))
        .await;

    let reanalyzed = outcome.analyzed.len();
    for (property_id, mut analysis) in outcome.analyzed {
        let bedrooms = bedrooms_by_id.get(&property_id).copied().unwrap_or(0);
        let fit = rentgrid_fit::compute_fit(&analysis.observations, bedrooms);
        analysis.fit_score = fit.score;
        if let Err(e) = deps.store.complete_reanalysis(property_id, &analysis).await {
            warn!(error = %e, property_id = %property_id, "failed to complete reanalysis");
        }
    }

    if outcome.circuit_tripped {
        warn!(still_pending = outcome.still_pending.len(), "reanalysis circuit breaker tripped");
    }
    info!(reanalyzed, still_pending = outcome.still_pending.len(), "reanalysis subflow complete");

    Ok(ReanalysisOutcome {
        reanalyzed,
        still_pending: outcome.still_pending.len(),
        circuit_tripped: outcome.circuit_tripped,
    })
}
