//! Shared helper for listing a property's cached image files on disk, used
//! by both the main run's analysis stage and the reanalysis subflow so the
//! analyzer always sees the same cache layout the enricher wrote
//! (`rentgrid-enrich`'s `<data_dir>/image_cache/<safe_id>/` convention).

use std::path::{Path, PathBuf};

use rentgrid_common::CanonicalProperty;

pub fn cached_image_paths(data_dir: &Path, property: &CanonicalProperty) -> Vec<PathBuf> {
    let dir = data_dir.join("image_cache").join(property.safe_id());
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();
    paths
}
