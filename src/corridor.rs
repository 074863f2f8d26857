//! Corridor construction and station correlation.
//!
//! The corridor is the union of per-segment stadium capsules built around the
//! simplified path in a metric plane. Capsules overlap at the joints, so "inside
//! any part" is exactly "within the radius of the path". Candidate lookups run
//! through an R-tree first and only test exact containment on envelope hits.

use crate::geometry::{self, ProjectionError, TangentFrame};
use crate::models::{CandidateStation, PriceRecord};
use ahash::AHashSet;
use geo::{BoundingRect, Contains, Coord, LineString, MultiPolygon, Point, Polygon};
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};

/// Knobs for corridor construction.
#[derive(Debug, Clone, Copy)]
pub struct CorridorConfig {
    /// Lateral reach around the path, meters.
    pub radius_m: f64,
    /// Douglas-Peucker tolerance applied before buffering, degrees.
    pub simplify_tolerance_deg: f64,
}

impl Default for CorridorConfig {
    fn default() -> Self {
        CorridorConfig {
            radius_m: 5_000.0,
            simplify_tolerance_deg: 0.0005,
        }
    }
}

/// Metric buffer around a path, plus the frame everything was projected with.
pub struct Corridor {
    pub frame: TangentFrame,
    /// Capsule cover in plane meters. Parts overlap; containment is any-part.
    pub parts: MultiPolygon<f64>,
    /// Full-resolution path in the plane. Along-path projections use this.
    pub path_metric: LineString<f64>,
    pub radius_m: f64,
}

/// Vertices per semicircular capsule cap.
const CAP_ARC_STEPS: usize = 8;

pub fn build_corridor(
    path: &LineString<f64>,
    config: &CorridorConfig,
) -> Result<Corridor, ProjectionError> {
    let frame = TangentFrame::for_path(path)?;
    let simplified = geometry::simplify_path(path, config.simplify_tolerance_deg);
    let buffer_line = frame.forward_line(&simplified);

    let mut parts = Vec::with_capacity(buffer_line.0.len().saturating_sub(1));
    for pair in buffer_line.0.windows(2) {
        parts.push(segment_capsule(pair[0], pair[1], config.radius_m));
    }
    log::debug!(
        "corridor: {} capsule parts over {} simplified vertices, radius {} m",
        parts.len(),
        buffer_line.0.len(),
        config.radius_m
    );

    Ok(Corridor {
        frame,
        parts: MultiPolygon(parts),
        path_metric: frame.forward_line(path),
        radius_m: config.radius_m,
    })
}

/// Stadium cover of one segment: a rectangle with semicircular caps. Degenerate
/// segments still get a full disk.
fn segment_capsule(a: Coord<f64>, b: Coord<f64>, radius: f64) -> Polygon<f64> {
    let bearing = (b.y - a.y).atan2(b.x - a.x);
    let mut ring: Vec<Coord<f64>> = Vec::with_capacity(2 * (CAP_ARC_STEPS + 1));
    // Half circle around b, from the left normal through the tip to the right.
    for step in 0..=CAP_ARC_STEPS {
        let angle = bearing + std::f64::consts::FRAC_PI_2
            - std::f64::consts::PI * (step as f64 / CAP_ARC_STEPS as f64);
        ring.push(Coord {
            x: b.x + radius * angle.cos(),
            y: b.y + radius * angle.sin(),
        });
    }
    // Half circle around a, continuing through the back to the left normal.
    for step in 0..=CAP_ARC_STEPS {
        let angle = bearing - std::f64::consts::FRAC_PI_2
            - std::f64::consts::PI * (step as f64 / CAP_ARC_STEPS as f64);
        ring.push(Coord {
            x: a.x + radius * angle.cos(),
            y: a.y + radius * angle.sin(),
        });
    }
    Polygon::new(LineString::new(ring), vec![])
}

/// R-tree over stations projected into a corridor's plane. Entries keep their
/// index into the record slice they were built from.
pub struct StationIndex {
    tree: RTree<GeomWithData<[f64; 2], usize>>,
}

impl StationIndex {
    /// Build with the same frame as the corridor the index will be queried against.
    pub fn build(frame: &TangentFrame, records: &[PriceRecord]) -> Self {
        let entries: Vec<GeomWithData<[f64; 2], usize>> = records
            .iter()
            .enumerate()
            .map(|(idx, record)| {
                let p = frame.forward(Point::new(record.lon, record.lat));
                GeomWithData::new([p.x(), p.y()], idx)
            })
            .collect();
        StationIndex {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

/// Stations inside the corridor, deduplicated across overlapping parts, with
/// along-path positioning, sorted by distance along the path.
pub fn correlate(
    index: &StationIndex,
    corridor: &Corridor,
    records: &[PriceRecord],
) -> Vec<CandidateStation> {
    let mut hits: AHashSet<usize> = AHashSet::new();
    for part in &corridor.parts {
        let Some(rect) = part.bounding_rect() else {
            continue;
        };
        let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
        for entry in index.tree.locate_in_envelope_intersecting(&envelope) {
            if hits.contains(&entry.data) {
                continue;
            }
            let p = Point::new(entry.geom()[0], entry.geom()[1]);
            if part.contains(&p) {
                hits.insert(entry.data);
            }
        }
    }

    let mut candidates: Vec<CandidateStation> = hits
        .into_iter()
        .filter_map(|idx| {
            let record = &records[idx];
            let projection = geometry::project_point(
                &corridor.frame,
                &corridor.path_metric,
                Point::new(record.lon, record.lat),
            )?;
            Some(CandidateStation {
                station: record.clone(),
                along_path_m: projection.along_m,
                on_path_lon: projection.snapped.x(),
                on_path_lat: projection.snapped.y(),
                offset_m: projection.offset_m,
                segment_index: None,
                detour: None,
            })
        })
        .collect();
    candidates.sort_by(|a, b| {
        a.along_path_m
            .partial_cmp(&b.along_path_m)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    log::info!(
        "correlate: {} of {} stations inside the {} m corridor",
        candidates.len(),
        records.len(),
        corridor.radius_m
    );
    candidates
}
