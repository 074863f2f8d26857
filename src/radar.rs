//! Range-risk segmentation along the path.

use crate::geometry;
use crate::models::{AutonomySegment, CandidateStation, RiskLevel};
use geo::LineString;

/// A gap at or past the full range is critical; one at 80% of it deserves attention.
const CRITICAL_RATIO: f64 = 1.0;
const ATTENTION_RATIO: f64 = 0.8;

pub fn classify_gap(gap_km: f64, range_km: f64) -> RiskLevel {
    let ratio = gap_km / range_km;
    if ratio >= CRITICAL_RATIO {
        RiskLevel::Critical
    } else if ratio >= ATTENTION_RATIO {
        RiskLevel::Attention
    } else {
        RiskLevel::Safe
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RadarReport {
    pub segments: Vec<AutonomySegment>,
    /// Geodesic path length, meters.
    pub total_path_m: f64,
}

/// Gap table between consecutive checkpoints: the start, each selected stop in
/// path order, the destination. `range_km` of zero or less counts as unset.
pub fn gap_table(
    stops: &[CandidateStation],
    total_path_km: f64,
    range_km: Option<f64>,
) -> Vec<AutonomySegment> {
    let range_km = range_km.filter(|r| *r > 0.0);

    let mut checkpoints: Vec<(String, f64)> = Vec::with_capacity(stops.len() + 2);
    checkpoints.push(("start".to_string(), 0.0));
    let mut ordered: Vec<&CandidateStation> = stops.iter().collect();
    ordered.sort_by(|a, b| {
        a.along_path_m
            .partial_cmp(&b.along_path_m)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for stop in ordered {
        checkpoints.push((
            stop.station.name.clone(),
            stop.along_path_km().min(total_path_km),
        ));
    }
    checkpoints.push(("destination".to_string(), total_path_km));

    checkpoints
        .windows(2)
        .map(|pair| {
            let length_km = (pair[1].1 - pair[0].1).max(0.0);
            AutonomySegment {
                from_label: pair[0].0.clone(),
                to_label: pair[1].0.clone(),
                start_km: pair[0].1,
                end_km: pair[1].1,
                length_km,
                risk: range_km.map(|r| classify_gap(length_km, r)),
            }
        })
        .collect()
}

pub fn autonomy_radar(
    path: &LineString<f64>,
    stops: &[CandidateStation],
    range_km: Option<f64>,
) -> RadarReport {
    let total_path_m = geometry::geodesic_length_m(path);
    RadarReport {
        segments: gap_table(stops, total_path_m / 1000.0, range_km),
        total_path_m,
    }
}
