//! Planar projection and line measurement helpers.
//!
//! Everything that needs meters goes through a [`TangentFrame`], an equirectangular
//! plane anchored near the geometry it serves: x = R * cos(lat0) * dlon, y = R * dlat.
//! Over a route-sized extent the scale error stays far below the corridor radii used
//! here, and the inverse is exact.

use geo::{
    BoundingRect, EuclideanDistance, EuclideanLength, HaversineDistance, HaversineLength,
    LineInterpolatePoint, LineLocatePoint, LineString, Point, Simplify,
};
use thiserror::Error;

/// Mean Earth radius, meters.
const EARTH_RADIUS: f64 = 6_371_007.2;

/// Latitude beyond which the equirectangular plane degenerates.
const MAX_ANCHOR_LAT: f64 = 84.0;

/// Widest path extent the plane is allowed to serve, degrees.
const MAX_EXTENT_DEG: f64 = 12.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("metric projection is undefined near latitude {lat:.2}")]
    PoleProximity { lat: f64 },
    #[error("path spans {span_deg:.1} degrees, beyond the planar projection domain")]
    ExtentTooWide { span_deg: f64 },
    #[error("path has no extent")]
    EmptyPath,
}

/// Equirectangular metric plane anchored at a reference coordinate.
#[derive(Debug, Clone, Copy)]
pub struct TangentFrame {
    anchor_lon_rad: f64,
    anchor_lat_rad: f64,
    cos_anchor_lat: f64,
}

impl TangentFrame {
    pub fn new(anchor: Point<f64>) -> Result<Self, ProjectionError> {
        if anchor.y().abs() > MAX_ANCHOR_LAT {
            return Err(ProjectionError::PoleProximity { lat: anchor.y() });
        }
        let anchor_lat_rad = anchor.y().to_radians();
        Ok(TangentFrame {
            anchor_lon_rad: anchor.x().to_radians(),
            anchor_lat_rad,
            cos_anchor_lat: anchor_lat_rad.cos(),
        })
    }

    /// Plane anchored at the center of `path`'s bounding rectangle.
    pub fn for_path(path: &LineString<f64>) -> Result<Self, ProjectionError> {
        let rect = path.bounding_rect().ok_or(ProjectionError::EmptyPath)?;
        let span = rect.width().max(rect.height());
        if span > MAX_EXTENT_DEG {
            return Err(ProjectionError::ExtentTooWide { span_deg: span });
        }
        TangentFrame::new(rect.center().into())
    }

    /// Degrees to plane meters.
    pub fn forward(&self, p: Point<f64>) -> Point<f64> {
        let dlon = p.x().to_radians() - self.anchor_lon_rad;
        let dlat = p.y().to_radians() - self.anchor_lat_rad;
        Point::new(
            EARTH_RADIUS * self.cos_anchor_lat * dlon,
            EARTH_RADIUS * dlat,
        )
    }

    /// Plane meters back to degrees.
    pub fn inverse(&self, p: Point<f64>) -> Point<f64> {
        let lon_rad = self.anchor_lon_rad + p.x() / (EARTH_RADIUS * self.cos_anchor_lat);
        let lat_rad = self.anchor_lat_rad + p.y() / EARTH_RADIUS;
        Point::new(lon_rad.to_degrees(), lat_rad.to_degrees())
    }

    pub fn forward_line(&self, line: &LineString<f64>) -> LineString<f64> {
        line.points().map(|p| self.forward(p)).collect()
    }

    pub fn inverse_line(&self, line: &LineString<f64>) -> LineString<f64> {
        line.points().map(|p| self.inverse(p)).collect()
    }
}

/// Where along a path the closest point to some input falls.
#[derive(Debug, Clone, Copy)]
pub struct PathProjection {
    /// Meters from the path start.
    pub along_m: f64,
    /// Straight-line meters from the input point to the path.
    pub offset_m: f64,
    /// Closest point on the path, degrees.
    pub snapped: Point<f64>,
}

/// Project a geographic `point` onto `path_metric` (a path already in `frame`'s
/// plane). Returns None for degenerate paths.
pub fn project_point(
    frame: &TangentFrame,
    path_metric: &LineString<f64>,
    point: Point<f64>,
) -> Option<PathProjection> {
    let p = frame.forward(point);
    let fraction = path_metric.line_locate_point(&p)?;
    let snapped_metric = path_metric.line_interpolate_point(fraction)?;
    Some(PathProjection {
        along_m: fraction * path_metric.euclidean_length(),
        offset_m: p.euclidean_distance(&snapped_metric),
        snapped: frame.inverse(snapped_metric),
    })
}

/// Douglas-Peucker reduction. Tolerance in degrees; endpoints always survive.
pub fn simplify_path(path: &LineString<f64>, tolerance_deg: f64) -> LineString<f64> {
    if path.0.len() <= 2 {
        return path.clone();
    }
    path.simplify(&tolerance_deg)
}

/// Geodesic path length in meters, summed per vertex pair.
pub fn geodesic_length_m(path: &LineString<f64>) -> f64 {
    path.haversine_length()
}

/// Index of the path vertex closest to `point`, by great-circle distance.
pub fn nearest_vertex(path: &LineString<f64>, point: Point<f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, vertex) in path.points().enumerate() {
        let d = point.haversine_distance(&vertex);
        if best.map_or(true, |(_, best_d)| d < best_d) {
            best = Some((idx, d));
        }
    }
    best.map(|(idx, _)| idx)
}
