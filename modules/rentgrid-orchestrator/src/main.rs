//! The orchestrator binary: loads configuration, wires the capability
//! traits, and drives one of three run modes via `clap` subcommands,
//! matching the teacher's `dev/cli` and `rootsignal-scout::main` shape.
//!
//! Production scraper/analyzer/commute/notifier adapters are external
//! collaborators out of scope for this workspace (see SPEC_FULL.md's
//! Non-goals) — this binary wires `rentgrid-testing`'s deterministic
//! fixtures in their place. Swapping in real adapters means implementing
//! the traits in `rentgrid_common::capability` and constructing
//! `PipelineDeps` with them instead.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rentgrid_commute::{CommuteAdapter, Destination};
use rentgrid_common::Config;
use rentgrid_orchestrator::{run_reanalysis, PipelineDeps, PipelineOrchestrator};
use rentgrid_store::{RunTrigger, Store};
use rentgrid_testing::{MockCommuteEstimator, MockDetailFetcher, MockImageDownloader, MockImageHasher, MockPlatformAdapter, MockQualityAnalyzer};

#[derive(Parser)]
#[command(name = "rentgrid-orchestrator")]
#[command(about = "Runs the rentgrid aggregation/enrichment/analysis pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline once (scrape → gate → dedup → enrich →
    /// commute → analyze).
    Run,

    /// Run the reanalysis subflow over properties with a pending
    /// `reanalysis_requested_at`.
    Reanalyze {
        /// Restrict to one outcode prefix (e.g. "E8").
        #[arg(short, long)]
        outcode: Option<String>,
    },

    /// Reset fallback (null-rating) analyses back to `pending_analysis`
    /// without running a full pipeline pass.
    ResetFailedAnalyses,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rentgrid=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::orchestrator_from_env();
    config.log_redacted();

    let store = Store::connect(&config.database_url).await?;
    store.run_migrations().await?;

    match cli.command {
        Commands::Run => {
            let deps = build_deps(store, config);
            let orchestrator = PipelineOrchestrator::new(deps);
            let cancel = CancellationToken::new();
            let cancel_for_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("received SIGINT; cancelling in-flight run");
                    cancel_for_signal.cancel();
                }
            });

            let outcome = orchestrator.run(RunTrigger::Manual, cancel).await?;
            info!(
                run_id = %outcome.run.id,
                status = ?outcome.run.status,
                scraped = outcome.run.scraped_count,
                dedup_merged = outcome.run.dedup_merged_count,
                enriched = outcome.run.enriched_count,
                analyzed = outcome.run.analyzed_count,
                "pipeline run finished"
            );
        }
        Commands::Reanalyze { outcode } => {
            let deps = build_deps(store, config);
            let outcome = run_reanalysis(&deps, outcode.as_deref()).await?;
            info!(reanalyzed = outcome.reanalyzed, still_pending = outcome.still_pending, "reanalysis subflow finished");
        }
        Commands::ResetFailedAnalyses => {
            let reset = store.reset_failed_analyses().await?;
            info!(reset, "fallback analyses reset to pending_analysis");
        }
    }

    Ok(())
}

fn build_deps(store: Store, config: Config) -> PipelineDeps {
    let adapters: Vec<Arc<dyn rentgrid_common::capability::PlatformAdapter>> = vec![
        Arc::new(MockPlatformAdapter::new(rentgrid_common::Source::Rightmove)),
        Arc::new(MockPlatformAdapter::new(rentgrid_common::Source::Zoopla)),
        Arc::new(MockPlatformAdapter::new(rentgrid_common::Source::Openrent)),
        Arc::new(MockPlatformAdapter::new(rentgrid_common::Source::Spareroom)),
    ];

    let commute = if config.destination_postcode.is_empty() {
        None
    } else {
        Some(CommuteAdapter::new(
            Box::new(MockCommuteEstimator::new()),
            vec![Destination { id: "primary".to_string(), postcode: config.destination_postcode.clone() }],
            config.transport_modes.clone(),
            config.commute_max_minutes,
        ))
    };

    PipelineDeps {
        store,
        config,
        adapters,
        detail_fetcher: Arc::new(MockDetailFetcher::new()),
        image_downloader: Arc::new(MockImageDownloader::new()),
        image_hasher: Arc::new(MockImageHasher),
        analyzer: Arc::new(MockQualityAnalyzer::new()),
        commute,
    }
}
