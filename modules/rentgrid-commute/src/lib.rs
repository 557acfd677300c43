//! Commute-time adapter: batches all destinations into one call per
//! `(origin postcode, transport mode)` pair, with a process-wide cache so a
//! run full of properties sharing an outcode doesn't repeat the call
//! (spec.md §5: "geocoding of the origin postcode is cached process-wide
//! for the life of the run").
//!
//! Grounded on `rentgrid-scrape::orchestrator`'s adapter-wrapping shape; the
//! cache itself mirrors the teacher's "in-process caches ... process-
//! lifetime, appended-to only, monotonic" resource model (spec.md §5).

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use rentgrid_common::capability::CommuteEstimator;
use rentgrid_common::{CommuteResult, Result};

/// One destination the pipeline estimates commute time to, e.g. a partner's
/// workplace postcode.
#[derive(Debug, Clone)]
pub struct Destination {
    pub id: String,
    pub postcode: String,
}

pub struct CommuteAdapter {
    estimator: Box<dyn CommuteEstimator>,
    destinations: Vec<Destination>,
    modes: Vec<String>,
    max_minutes: u32,
    cache: Mutex<HashMap<(String, String), HashMap<String, CommuteResult>>>,
}

impl CommuteAdapter {
    pub fn new(
        estimator: Box<dyn CommuteEstimator>,
        destinations: Vec<Destination>,
        modes: Vec<String>,
        max_minutes: u32,
    ) -> Self {
        Self { estimator, destinations, modes, max_minutes, cache: Mutex::new(HashMap::new()) }
    }

    /// Best commute result per destination across every configured
    /// transport mode (fastest admissible mode wins), for one origin
    /// postcode. Cached process-wide: a second call with the same origin
    /// reuses the first call's results rather than hitting the estimator
    /// again.
    pub async fn estimate(&self, origin_postcode: &str) -> Result<HashMap<String, CommuteResult>> {
        let mut best: HashMap<String, CommuteResult> = HashMap::new();

        for mode in &self.modes {
            let key = (origin_postcode.to_string(), mode.clone());
            let cached = self.cache.lock().unwrap().get(&key).cloned();

            let results = match cached {
                Some(results) => {
                    debug!(origin_postcode, mode, "commute cache hit");
                    results
                }
                None => {
                    let destinations: Vec<(String, String)> = self
                        .destinations
                        .iter()
                        .map(|d| (d.id.clone(), d.postcode.clone()))
                        .collect();
                    let results = self
                        .estimator
                        .commute_times(origin_postcode, &destinations, mode, self.max_minutes)
                        .await?;
                    self.cache.lock().unwrap().insert(key, results.clone());
                    results
                }
            };

            for (destination_id, result) in results {
                best.entry(destination_id)
                    .and_modify(|existing| {
                        if result.minutes < existing.minutes {
                            *existing = result.clone();
                        }
                    })
                    .or_insert(result);
            }
        }

        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentgrid_testing::MockCommuteEstimator;

    #[tokio::test]
    async fn picks_fastest_mode_per_destination() {
        let estimator = MockCommuteEstimator::new().on_destination("work", 40);
        let adapter = CommuteAdapter::new(
            Box::new(estimator),
            vec![Destination { id: "work".to_string(), postcode: "EC1A 1BB".to_string() }],
            vec!["cycling".to_string(), "walking".to_string()],
            45,
        );

        let results = adapter.estimate("E8 3RH").await.unwrap();
        assert_eq!(results.get("work").unwrap().minutes, 40);
    }

    #[tokio::test]
    async fn destination_over_max_minutes_is_excluded() {
        let estimator = MockCommuteEstimator::new().on_destination("work", 90);
        let adapter = CommuteAdapter::new(
            Box::new(estimator),
            vec![Destination { id: "work".to_string(), postcode: "EC1A 1BB".to_string() }],
            vec!["walking".to_string()],
            45,
        );

        let results = adapter.estimate("E8 3RH").await.unwrap();
        assert!(results.get("work").is_none());
    }

    #[tokio::test]
    async fn second_call_with_same_origin_is_served_from_cache() {
        let estimator = MockCommuteEstimator::new().on_destination("work", 20);
        let adapter = CommuteAdapter::new(
            Box::new(estimator),
            vec![Destination { id: "work".to_string(), postcode: "EC1A 1BB".to_string() }],
            vec!["cycling".to_string()],
            45,
        );

        let first = adapter.estimate("E8 3RH").await.unwrap();
        let second = adapter.estimate("E8 3RH").await.unwrap();
        assert_eq!(first.get("work").unwrap().minutes, second.get("work").unwrap().minutes);
    }
}
