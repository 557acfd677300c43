//! Durable persistence for the rental-listing pipeline: the `properties`,
//! `property_images`, `quality_analyses` and `pipeline_runs` tables, and the
//! upsert/transition operations that encode the lifecycle invariants of
//! spec.md §4.7 and §9 (enrichment never regresses, notification status
//! never downgrades, reanalysis preserves a prior `sent` notification).

pub mod models;
pub mod store;

pub use models::RunTrigger;
pub use store::Store;
