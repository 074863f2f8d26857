//! GPS track ingestion and sanity checks.

use crate::is_null_island;
use geo::{Centroid, LineString, Point};
use gpx::Gpx;
use std::path::Path;
use thiserror::Error;

/// Hard ceiling on usable track points; anything above this is a recording
/// artifact, not a drivable route.
pub const MAX_TRACK_POINTS: usize = 50_000;

/// Geographic region a track must stay within, degrees.
#[derive(Debug, Clone, Copy)]
pub struct RegionBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl RegionBounds {
    /// Mainland Spain plus the Canary Islands.
    pub const SPAIN: RegionBounds = RegionBounds {
        min_lat: 27.6,
        max_lat: 44.0,
        min_lon: -18.2,
        max_lon: 4.3,
    };

    pub fn contains(&self, p: Point<f64>) -> bool {
        p.y() >= self.min_lat && p.y() <= self.max_lat && p.x() >= self.min_lon && p.x() <= self.max_lon
    }
}

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("GPX parsing error: {0}")]
    Parse(#[from] gpx::errors::GpxError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("track carries {count} points, above the ceiling of {max}")]
    TooManyPoints { count: usize, max: usize },
    #[error("track centroid ({lon:.4}, {lat:.4}) falls outside the supported region")]
    OutsideRegion { lon: f64, lat: f64 },
    #[error("track has fewer than 2 usable points")]
    TooShort,
}

/// Read a path from GPX. Track points win; route points are the fallback for
/// files produced by planners rather than recorders.
pub fn load_track<R: std::io::Read>(reader: R) -> Result<LineString<f64>, TrackError> {
    let gpx = gpx::read(reader)?;
    path_from_gpx(&gpx)
}

pub fn load_track_file(path: &Path) -> Result<LineString<f64>, TrackError> {
    let file = std::fs::File::open(path)?;
    load_track(std::io::BufReader::new(file))
}

pub fn path_from_gpx(gpx: &Gpx) -> Result<LineString<f64>, TrackError> {
    let mut points: Vec<Point<f64>> = Vec::new();
    for track in &gpx.tracks {
        for segment in &track.segments {
            points.extend(segment.points.iter().map(|w| w.point()));
        }
    }
    if points.is_empty() {
        for route in &gpx.routes {
            points.extend(route.points.iter().map(|w| w.point()));
        }
    }
    points.retain(|p| p.x().is_finite() && p.y().is_finite() && !is_null_island(p.x(), p.y()));
    if points.len() < 2 {
        return Err(TrackError::TooShort);
    }
    Ok(points.into_iter().collect())
}

/// Reject oversized or out-of-region tracks before any heavy geometry runs.
pub fn validate_track(
    path: &LineString<f64>,
    max_points: usize,
    region: RegionBounds,
) -> Result<(), TrackError> {
    let count = path.0.len();
    if count > max_points {
        return Err(TrackError::TooManyPoints {
            count,
            max: max_points,
        });
    }
    match path.centroid() {
        Some(c) if region.contains(c) => Ok(()),
        Some(c) => Err(TrackError::OutsideRegion {
            lon: c.x(),
            lat: c.y(),
        }),
        None => Err(TrackError::TooShort),
    }
}
