//! Navigation URLs, track splicing, and structured exports.

use crate::corridor::Corridor;
use crate::geometry;
use crate::models::{CandidateStation, FuelKind};
use crate::routing::RoutingClient;
use futures::{stream, StreamExt};
use geo::{HaversineDistance, LineString, Point};
use geojson::{Feature, FeatureCollection};
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};

/// Hard waypoint limit of the maps URL scheme.
pub const MAPS_WAYPOINT_CAP: usize = 9;

/// Multi-waypoint driving URL plus how many stops did not fit.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationUrl {
    pub url: String,
    pub omitted: usize,
}

/// Google Maps driving URL through the stops, in the order given. Stops beyond
/// the waypoint cap are dropped from the end and counted in `omitted`.
pub fn maps_navigation_url(
    origin: Point<f64>,
    destination: Point<f64>,
    stops: &[CandidateStation],
) -> NavigationUrl {
    let kept = stops.len().min(MAPS_WAYPOINT_CAP);
    let omitted = stops.len() - kept;

    let mut url = format!(
        "https://www.google.com/maps/dir/?api=1&origin={}&destination={}&travelmode=driving",
        urlencoding::encode(&format!("{:.6},{:.6}", origin.y(), origin.x())),
        urlencoding::encode(&format!("{:.6},{:.6}", destination.y(), destination.x())),
    );
    if kept > 0 {
        let waypoints = stops[..kept]
            .iter()
            .map(|c| format!("{:.6},{:.6}", c.station.lat, c.station.lon))
            .collect::<Vec<_>>()
            .join("|");
        url.push_str("&waypoints=");
        url.push_str(&urlencoding::encode(&waypoints));
    }
    if omitted > 0 {
        log::warn!(
            "navigation URL truncated: {} stops beyond the {}-waypoint cap",
            omitted,
            MAPS_WAYPOINT_CAP
        );
    }
    NavigationUrl { url, omitted }
}

/// Splice knobs.
#[derive(Debug, Clone, Copy)]
pub struct SpliceConfig {
    /// Forward distance along the track before rejoining it, meters.
    pub reentry_min_m: f64,
    /// Concurrent leg requests.
    pub workers: usize,
}

impl Default for SpliceConfig {
    fn default() -> Self {
        SpliceConfig {
            reentry_min_m: 40.0,
            workers: 3,
        }
    }
}

struct SpliceJob {
    stop_index: usize,
    exit_idx: usize,
    reentry_idx: usize,
}

/// Exit vertex = track vertex nearest the stop's on-path point; re-entry = the
/// first vertex at least `reentry_min_m` further along, clamped to the next
/// vertex. Jobs come back in reverse path order so earlier indices stay valid
/// while splices are applied. A job whose range reaches into an already kept
/// job's exit vertex is dropped, or its splice would overwrite that job's
/// inserted geometry; the dropped stop still gets its waypoint marker.
fn plan_splices(
    track: &LineString<f64>,
    stops: &[CandidateStation],
    reentry_min_m: f64,
) -> Vec<SpliceJob> {
    let mut jobs = Vec::with_capacity(stops.len());
    for (stop_index, stop) in stops.iter().enumerate() {
        let anchor = Point::new(stop.on_path_lon, stop.on_path_lat);
        let Some(exit_idx) = geometry::nearest_vertex(track, anchor) else {
            continue;
        };
        if exit_idx + 1 >= track.0.len() {
            continue;
        }
        let mut reentry_idx = exit_idx + 1;
        let mut walked = 0.0;
        for i in exit_idx..track.0.len() - 1 {
            walked += Point::from(track.0[i]).haversine_distance(&Point::from(track.0[i + 1]));
            reentry_idx = i + 1;
            if walked >= reentry_min_m {
                break;
            }
        }
        jobs.push(SpliceJob {
            stop_index,
            exit_idx,
            reentry_idx,
        });
    }
    jobs.sort_by(|a, b| b.exit_idx.cmp(&a.exit_idx));
    let mut kept: Vec<SpliceJob> = Vec::with_capacity(jobs.len());
    for job in jobs {
        match kept.last() {
            Some(prev) if job.reentry_idx > prev.exit_idx => {
                log::debug!(
                    "splice for stop {} overlaps the one at vertex {}, skipping it",
                    job.stop_index,
                    prev.exit_idx
                );
            }
            _ => kept.push(job),
        }
    }
    kept
}

/// Replace the track interior strictly between exit and re-entry with the
/// detour legs. Shared endpoints between the two legs are dropped; when both
/// legs are missing, the bare station point marks the detour.
fn apply_splice(
    points: &mut Vec<Point<f64>>,
    job: &SpliceJob,
    station: Point<f64>,
    leg_out: Option<LineString<f64>>,
    leg_back: Option<LineString<f64>>,
) {
    let mut inserted: Vec<Point<f64>> = Vec::new();
    match (leg_out, leg_back) {
        (Some(out), Some(back)) => {
            inserted.extend(out.points().skip(1));
            let back_len = back.0.len();
            inserted.extend(back.points().skip(1).take(back_len.saturating_sub(2)));
        }
        (Some(out), None) => inserted.extend(out.points().skip(1)),
        (None, Some(back)) => {
            let back_len = back.0.len();
            inserted.push(station);
            inserted.extend(back.points().skip(1).take(back_len.saturating_sub(2)));
        }
        (None, None) => inserted.push(station),
    }
    points.splice(job.exit_idx + 1..job.reentry_idx, inserted);
}

/// Fetch road legs for every stop and splice them into the track. Returns the
/// edited geometry and how many stops got at least one routed leg.
pub async fn splice_track_with_stops(
    client: &RoutingClient,
    track: &LineString<f64>,
    stops: &[CandidateStation],
    config: &SpliceConfig,
) -> (LineString<f64>, usize) {
    let jobs = plan_splices(track, stops, config.reentry_min_m);

    let requests: Vec<(usize, Point<f64>, Point<f64>, Point<f64>)> = jobs
        .iter()
        .enumerate()
        .map(|(slot, job)| {
            let stop = &stops[job.stop_index];
            (
                slot,
                Point::from(track.0[job.exit_idx]),
                Point::new(stop.station.lon, stop.station.lat),
                Point::from(track.0[job.reentry_idx]),
            )
        })
        .collect();

    let fetched: Vec<(usize, Option<LineString<f64>>, Option<LineString<f64>>)> =
        stream::iter(requests)
            .map(|(slot, exit, station, reentry)| async move {
                let out = client.leg_geometry(exit, station).await;
                let back = client.leg_geometry(station, reentry).await;
                (slot, out, back)
            })
            .buffer_unordered(config.workers.max(1))
            .collect()
            .await;

    let mut by_slot: Vec<(Option<LineString<f64>>, Option<LineString<f64>>)> =
        vec![(None, None); jobs.len()];
    for (slot, out, back) in fetched {
        by_slot[slot] = (out, back);
    }

    let mut points: Vec<Point<f64>> = track.points().collect();
    let mut routed = 0;
    for (slot, job) in jobs.iter().enumerate() {
        let (out, back) = std::mem::take(&mut by_slot[slot]);
        if out.is_some() || back.is_some() {
            routed += 1;
        }
        let stop = &stops[job.stop_index];
        apply_splice(
            &mut points,
            job,
            Point::new(stop.station.lon, stop.station.lat),
            out,
            back,
        );
    }
    (points.into_iter().collect(), routed)
}

/// Marker waypoint for one stop: name plus the raw per-liter price.
pub fn stop_waypoint(stop: &CandidateStation, kind: FuelKind) -> Waypoint {
    let mut wp = Waypoint::new(Point::new(stop.station.lon, stop.station.lat));
    wp.name = Some(stop.station.name.clone());
    wp.description = Some(match stop.price(kind) {
        Some(price) => format!("{} {:.3}/L, km {:.1}", kind.label(), price, stop.along_path_km()),
        None => format!("km {:.1}", stop.along_path_km()),
    });
    wp
}

/// Fresh single-track GPX document with marker waypoints for the stops.
pub fn spliced_gpx(line: &LineString<f64>, stops: &[CandidateStation], kind: FuelKind) -> Gpx {
    let mut segment = TrackSegment::default();
    segment.points = line.points().map(Waypoint::new).collect();
    let mut track = Track::default();
    track.name = Some("fuelroute detour".to_string());
    track.segments.push(segment);

    let mut gpx = Gpx::default();
    gpx.version = GpxVersion::Gpx11;
    gpx.creator = Some("fuelroute".to_string());
    gpx.tracks.push(track);
    gpx.waypoints = stops.iter().map(|s| stop_waypoint(s, kind)).collect();
    gpx
}

pub fn write_gpx<W: std::io::Write>(gpx: &Gpx, writer: W) -> Result<(), gpx::errors::GpxError> {
    gpx::write(gpx, writer)
}

/// Map-ready candidate points, plus the corridor cover when given.
pub fn stations_feature_collection(
    candidates: &[CandidateStation],
    kind: FuelKind,
    corridor: Option<&Corridor>,
) -> FeatureCollection {
    let mut features: Vec<Feature> = candidates
        .iter()
        .map(|c| {
            let mut properties = serde_json::Map::new();
            properties.insert("id".to_string(), c.station.id.clone().into());
            properties.insert("name".to_string(), c.station.name.clone().into());
            properties.insert("municipality".to_string(), c.station.municipality.clone().into());
            properties.insert("address".to_string(), c.station.address.clone().into());
            properties.insert("schedule".to_string(), c.station.schedule.clone().into());
            properties.insert("fuel".to_string(), kind.label().into());
            if let Some(price) = c.price(kind) {
                properties.insert("price".to_string(), price.into());
            }
            properties.insert("along_km".to_string(), c.along_path_km().into());
            properties.insert("offset_m".to_string(), c.offset_m.into());
            if let Some(bin) = c.segment_index {
                properties.insert("segment".to_string(), bin.into());
            }
            if let Some(detour) = c.detour {
                properties.insert("detour_m".to_string(), detour.distance_m.into());
                properties.insert("detour_s".to_string(), detour.duration_s.into());
            }
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![
                    c.station.lon,
                    c.station.lat,
                ]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    if let Some(corridor) = corridor {
        let degree_parts: Vec<geo::Polygon<f64>> = corridor
            .parts
            .iter()
            .map(|part| geo::Polygon::new(corridor.frame.inverse_line(part.exterior()), Vec::new()))
            .collect();
        let multi = geo::MultiPolygon(degree_parts);
        let mut properties = serde_json::Map::new();
        properties.insert("radius_m".to_string(), corridor.radius_m.into());
        features.push(Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&multi))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceRecord;
    use ahash::AHashMap;
    use geo::line_string;

    fn stop_at(id: &str, lon: f64, lat: f64, on_lon: f64, on_lat: f64) -> CandidateStation {
        let mut prices = AHashMap::new();
        prices.insert(FuelKind::DieselA, 1.459);
        CandidateStation {
            station: PriceRecord {
                id: id.to_string(),
                name: format!("station {}", id),
                municipality: "Tarancón".to_string(),
                address: String::new(),
                schedule: String::new(),
                lon,
                lat,
                prices,
            },
            along_path_m: 1000.0,
            on_path_lon: on_lon,
            on_path_lat: on_lat,
            offset_m: 800.0,
            segment_index: None,
            detour: None,
        }
    }

    #[test]
    fn navigation_url_truncates_past_the_cap() {
        let stops: Vec<CandidateStation> = (0..12)
            .map(|i| {
                let lon = -3.0 - i as f64 * 0.01;
                stop_at(&i.to_string(), lon, 40.0, lon, 40.0)
            })
            .collect();
        let nav = maps_navigation_url(Point::new(-3.7, 40.4), Point::new(-0.38, 39.47), &stops);
        assert_eq!(nav.omitted, 3);
        // 9 waypoints means 8 separators, URL-encoded as %7C.
        assert_eq!(nav.url.matches("%7C").count(), 8);
        assert!(nav.url.starts_with("https://www.google.com/maps/dir/?api=1&origin=40.4"));
        assert!(nav.url.contains("travelmode=driving"));
    }

    #[test]
    fn navigation_url_without_stops_has_no_waypoints() {
        let nav = maps_navigation_url(Point::new(-3.7, 40.4), Point::new(-0.38, 39.47), &[]);
        assert_eq!(nav.omitted, 0);
        assert!(!nav.url.contains("waypoints"));
    }

    /// Vertices ~22 m apart heading east at 40N.
    fn dense_track() -> LineString<f64> {
        let mut coords = Vec::new();
        for i in 0..50 {
            coords.push(geo::coord! { x: -3.0 + i as f64 * 0.00026, y: 40.0 });
        }
        LineString::new(coords)
    }

    #[test]
    fn splice_jobs_walk_past_the_reentry_distance() {
        let track = dense_track();
        let stop = stop_at("a", -2.9945, 40.01, track.0[10].x, track.0[10].y);
        let jobs = plan_splices(&track, &[stop], 40.0);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].exit_idx, 10);
        // 22 m per vertex: the first vertex at >= 40 m is two ahead.
        assert_eq!(jobs[0].reentry_idx, 12);
    }

    #[test]
    fn splice_jobs_clamp_at_the_track_end() {
        let track = line_string![(x: -3.0, y: 40.0), (x: -2.999, y: 40.0), (x: -2.998, y: 40.0)];
        let stop = stop_at("a", -2.999, 40.001, -2.999, 40.0);
        let jobs = plan_splices(&track, &[stop], 40_000.0);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].exit_idx, 1);
        assert_eq!(jobs[0].reentry_idx, 2);
    }

    #[test]
    fn fallback_splice_inserts_the_station_point() {
        let track = dense_track();
        let mut points: Vec<Point<f64>> = track.points().collect();
        let job = SpliceJob {
            stop_index: 0,
            exit_idx: 10,
            reentry_idx: 12,
        };
        let station = Point::new(-2.99, 40.02);
        apply_splice(&mut points, &job, station, None, None);
        // One interior vertex swapped for the station marker.
        assert_eq!(points.len(), 50);
        assert_eq!(points[11], station);
        assert_eq!(points[10], Point::from(track.0[10]));
        assert_eq!(points[12], Point::from(track.0[12]));
    }

    #[test]
    fn routed_splice_replaces_the_interior() {
        let track = dense_track();
        let mut points: Vec<Point<f64>> = track.points().collect();
        let job = SpliceJob {
            stop_index: 0,
            exit_idx: 10,
            reentry_idx: 12,
        };
        let station = Point::new(-2.99, 40.02);
        let out = line_string![
            (x: track.0[10].x, y: track.0[10].y),
            (x: -2.995, y: 40.01),
            (x: -2.99, y: 40.02),
        ];
        let back = line_string![
            (x: -2.99, y: 40.02),
            (x: -2.993, y: 40.012),
            (x: track.0[12].x, y: track.0[12].y),
        ];
        apply_splice(&mut points, &job, station, Some(out), Some(back));
        // Interior vertex 11 replaced by out[1..] (2 points) + back[1..-1] (1 point).
        assert_eq!(points.len(), 52);
        assert_eq!(points[11], Point::new(-2.995, 40.01));
        assert_eq!(points[12], station);
        assert_eq!(points[13], Point::new(-2.993, 40.012));
        assert_eq!(points[14], Point::from(track.0[12]));
    }

    #[test]
    fn overlapping_splices_keep_only_the_later_stop() {
        let track = dense_track();
        // Adjacent exit vertices 10 and 11: the earlier stop's range would run
        // through the later one's exit, so only the later job survives.
        let stops = vec![
            stop_at("first", -2.9974, 40.005, track.0[10].x, track.0[10].y),
            stop_at("second", -2.9971, 40.005, track.0[11].x, track.0[11].y),
        ];
        let jobs = plan_splices(&track, &stops, 40.0);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].exit_idx, 11);
        assert_eq!(jobs[0].stop_index, 1);
    }

    #[test]
    fn same_exit_vertex_splices_once() {
        let track = dense_track();
        let stops = vec![
            stop_at("north", -2.9974, 40.005, track.0[10].x, track.0[10].y),
            stop_at("south", -2.9974, 39.995, track.0[10].x, track.0[10].y),
        ];
        let jobs = plan_splices(&track, &stops, 40.0);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].exit_idx, 10);
    }

    #[test]
    fn multiple_splices_apply_in_reverse_order() {
        let track = dense_track();
        let stops = vec![
            stop_at("early", -2.9974, 40.005, track.0[10].x, track.0[10].y),
            stop_at("late", -2.9922, 40.005, track.0[30].x, track.0[30].y),
        ];
        let jobs = plan_splices(&track, &stops, 40.0);
        assert_eq!(jobs.len(), 2);
        assert!(jobs[0].exit_idx > jobs[1].exit_idx);
    }

    #[test]
    fn gpx_document_carries_track_and_markers() {
        let line = line_string![(x: -3.0, y: 40.0), (x: -2.99, y: 40.0)];
        let stops = vec![stop_at("a", -2.995, 40.001, -2.995, 40.0)];
        let gpx = spliced_gpx(&line, &stops, FuelKind::DieselA);
        assert_eq!(gpx.version, GpxVersion::Gpx11);
        assert_eq!(gpx.tracks.len(), 1);
        assert_eq!(gpx.tracks[0].segments[0].points.len(), 2);
        assert_eq!(gpx.waypoints.len(), 1);
        let description = gpx.waypoints[0].description.clone().unwrap();
        assert!(description.contains("1.459"));
        assert!(!description.contains("€"));

        let mut buffer = Vec::new();
        write_gpx(&gpx, &mut buffer).unwrap();
        let xml = String::from_utf8(buffer).unwrap();
        assert!(xml.contains("<trkpt"));
        assert!(xml.contains("<wpt"));
    }

    #[test]
    fn feature_collection_has_stations_and_corridor() {
        use crate::corridor::{build_corridor, CorridorConfig};
        let path = line_string![(x: -3.0, y: 40.0), (x: -2.9, y: 40.0)];
        let corridor = build_corridor(&path, &CorridorConfig::default()).unwrap();
        let stops = vec![stop_at("a", -2.95, 40.01, -2.95, 40.0)];
        let fc = stations_feature_collection(&stops, FuelKind::DieselA, Some(&corridor));
        assert_eq!(fc.features.len(), 2);

        let station = &fc.features[0];
        let properties = station.properties.as_ref().unwrap();
        assert_eq!(properties.get("price").and_then(|v| v.as_f64()), Some(1.459));
        assert!(properties.get("along_km").is_some());

        let json = serde_json::to_string(&fc).unwrap();
        assert!(json.contains("\"MultiPolygon\""));
        assert!(json.contains("\"radius_m\""));
    }
}
