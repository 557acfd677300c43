//! Cross-source deduplicator: blocking, pairwise weighted scoring, greedy
//! union-find clustering, and canonical merge. See spec.md §4.3.

pub mod cluster;
pub mod signals;
pub mod street;

pub use cluster::{deduplicate, singleton_from_listing, DedupInput, DedupOutput, MergedCluster};
pub use signals::{score_pair, DedupConfig, MatchCandidate, PairScore, SignalWeights};
