//! Pipeline composition: wires the capability-boundary crates
//! (`rentgrid-scrape`, `rentgrid-dedup`, `rentgrid-enrich`,
//! `rentgrid-commute`, `rentgrid-analyzer`, `rentgrid-fit`) to
//! `rentgrid-store` and drives the lifecycle state machine spec.md §4.5
//! describes.
//!
//! Grounded on `rootsignal-scout::workflows::full_run` for the overall run
//! shape (reap → schedule → scrape → enrich → analyze → finalize) and
//! `rootsignal-scout::scheduling::budget`/`scheduling::scheduler` for the
//! concurrency idiom, expressed over `tokio::task::JoinSet` +
//! `tokio::sync::Semaphore` rather than the teacher's restate-durable
//! workflow runtime (this workspace has no restate-sdk dependency).

pub mod images;
pub mod notify;
pub mod pipeline;
pub mod reanalysis;

pub use notify::{notify_pending, NotifyOutcome};
pub use pipeline::{PipelineDeps, PipelineOrchestrator, RunOutcome};
pub use reanalysis::{run_reanalysis, ReanalysisOutcome};
