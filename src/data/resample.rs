/// Read-side resampling: raw points into evenly bucketed, last-observation-wins points
use std::collections::BTreeMap;

use tracing::debug;

use crate::time::BucketWidth;
use crate::types::{Point, RawPoint};

/// Bucket raw points, keeping epoch seconds. Ascending by bucket start.
pub fn bucket_last(points: &[RawPoint], width: BucketWidth) -> Vec<RawPoint> {
    if points.is_empty() {
        return Vec::new();
    }

    // Stable: equal timestamps keep input order, so the later input wins below
    let mut ordered: Vec<&RawPoint> = points.iter().collect();
    ordered.sort_by_key(|p| p.epoch_seconds);

    let mut buckets: BTreeMap<i64, f64> = BTreeMap::new();
    for point in ordered {
        buckets.insert(width.floor(point.epoch_seconds), point.price);
    }

    debug!(
        "Resampled {} raw points -> {} buckets ({})",
        points.len(),
        buckets.len(),
        width
    );

    buckets
        .into_iter()
        .map(|(start, price)| RawPoint::new(start, price))
        .collect()
}

/// Resample and render bucket starts in the display zone
pub fn resample(points: &[RawPoint], width: BucketWidth) -> Vec<Point> {
    bucket_last(points, width)
        .into_iter()
        .filter_map(Point::from_raw)
        .collect()
}

/// Re-bucket an already rendered series
pub fn resample_points(points: &[Point], width: BucketWidth) -> Vec<Point> {
    let raw: Vec<RawPoint> = points.iter().map(Point::to_raw).collect();
    resample(&raw, width)
}
