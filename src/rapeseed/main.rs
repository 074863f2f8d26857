use anyhow::Result;
use clap::Parser;
use fuelroute::corridor::{build_corridor, correlate, CorridorConfig, StationIndex};
use fuelroute::enrich::{enrich_detours, EnrichConfig};
use fuelroute::export;
use fuelroute::models::{FuelKind, RefuelPlan, VehicleProfile};
use fuelroute::planner::{cheapest_plan, greedy_plan, PlannerConfig};
use fuelroute::price_feed;
use fuelroute::radar;
use fuelroute::ranker::{self, SelectionConfig};
use fuelroute::routing::RoutingClient;
use fuelroute::track;
use geo::Point;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Route-aware fuel price planner", long_about = None)]
struct Args {
    /// GPX track to plan over. Mutually exclusive with --origin/--destination.
    #[arg(long)]
    gpx: Option<PathBuf>,

    /// Origin place name for routed planning.
    #[arg(long)]
    origin: Option<String>,

    /// Destination place name for routed planning.
    #[arg(long)]
    destination: Option<String>,

    /// Fuel product to optimize for.
    #[arg(long, value_enum, default_value = "diesel-a")]
    fuel: FuelKind,

    /// Corridor radius around the path, meters.
    #[arg(long, default_value_t = 5000.0)]
    radius_m: f64,

    /// How many globally cheapest stations to keep.
    #[arg(long, default_value_t = 5)]
    top_n: usize,

    /// Mandatory-stop bin width in km. Enables the segmented policy.
    #[arg(long)]
    segment_km: Option<f64>,

    /// Tank capacity, liters.
    #[arg(long, default_value_t = 50.0)]
    tank_l: f64,

    /// Consumption, liters per 100 km.
    #[arg(long, default_value_t = 6.5)]
    consumption: f64,

    /// Fuel at departure, as a fraction of the tank.
    #[arg(long, default_value_t = 0.5)]
    initial_fuel: f64,

    /// Vehicle range for the autonomy radar, km.
    #[arg(long)]
    range_km: Option<f64>,

    /// Compute the cost-minimal plan instead of the greedy one.
    #[arg(long)]
    optimal: bool,

    /// Ask the routing service for the road detour to each candidate.
    #[arg(long)]
    enrich: bool,

    /// Normalized price records file; skips the live fetch.
    #[arg(long, env = "FUELROUTE_RECORDS_FILE")]
    records: Option<PathBuf>,

    /// Write the fetched records here for later offline runs.
    #[arg(long)]
    save_records: Option<PathBuf>,

    /// Write candidates plus the corridor as GeoJSON here.
    #[arg(long)]
    out_geojson: Option<PathBuf>,

    /// Write the detour-spliced GPX here.
    #[arg(long)]
    out_gpx: Option<PathBuf>,

    /// Write the plan, radar and navigation URL as JSON here.
    #[arg(long)]
    out_plan: Option<PathBuf>,
}

#[derive(serde::Serialize)]
struct PlanDocument<'a> {
    fuel: &'a str,
    plan: &'a Option<RefuelPlan>,
    radar: &'a radar::RadarReport,
    navigation_url: &'a str,
    waypoints_omitted: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let routing = RoutingClient::new()?;

    let path = match (&args.gpx, &args.origin, &args.destination) {
        (Some(file), _, _) => {
            println!("Loading track {}", file.display());
            let path = track::load_track_file(file)?;
            track::validate_track(&path, track::MAX_TRACK_POINTS, track::RegionBounds::SPAIN)?;
            path
        }
        (None, Some(origin), Some(destination)) => {
            println!("Routing {} -> {}", origin, destination);
            routing.route_from_text(origin, destination).await?.line
        }
        _ => anyhow::bail!("pass --gpx FILE, or both --origin and --destination"),
    };
    let total_m = fuelroute::geometry::geodesic_length_m(&path);
    let route_km = total_m / 1000.0;
    println!("Path: {} points, {:.1} km", path.0.len(), route_km);

    let records = match &args.records {
        Some(file) => {
            println!("Loading price records from {}", file.display());
            price_feed::load_records_file(file)?
        }
        None => {
            println!("Fetching the national price listing");
            let client = price_feed::make_price_client()?;
            price_feed::fetch_price_records(&client, &price_feed::endpoint_cascade()).await?
        }
    };
    println!("{} price records with usable coordinates", records.len());
    if let Some(file) = &args.save_records {
        std::fs::write(file, serde_json::to_vec_pretty(&records)?)?;
        println!("Saved records to {}", file.display());
    }

    let corridor_config = CorridorConfig {
        radius_m: args.radius_m,
        ..CorridorConfig::default()
    };
    let corridor = build_corridor(&path, &corridor_config)?;
    let index = StationIndex::build(&corridor.frame, &records);
    let mut candidates = correlate(&index, &corridor, &records);
    println!("{} stations inside the {:.0} m corridor", candidates.len(), args.radius_m);

    if args.enrich && !candidates.is_empty() {
        println!("Requesting road detours");
        let resolved = enrich_detours(&routing, &mut candidates, &EnrichConfig::default()).await;
        println!("Road detours resolved for {}/{} stations", resolved, candidates.len());
    }

    let selection = SelectionConfig {
        top_n: args.top_n,
        segment_km: args.segment_km,
    };
    let selected = ranker::select(&candidates, args.fuel, &selection);
    println!("{} stations selected for {}", selected.len(), args.fuel.label());
    for stop in &selected {
        if let Some(price) = stop.price(args.fuel) {
            let marker = if stop.segment_index.is_some() { "*" } else { " " };
            println!(
                " {} km {:>6.1}  {:.3}/L  {} ({})",
                marker,
                stop.along_path_km(),
                price,
                stop.station.name,
                stop.station.municipality
            );
        }
    }

    let vehicle = VehicleProfile::new(args.tank_l, args.consumption, args.initial_fuel);
    let planner_config = PlannerConfig::default();
    let plan = if args.optimal {
        cheapest_plan(&selected, args.fuel, &vehicle, &planner_config, route_km)
    } else {
        greedy_plan(&selected, args.fuel, &vehicle, &planner_config, route_km)
    };
    let plan = match plan {
        Ok(plan) => {
            println!(
                "Plan: {} stops, {:.2} L, {:.2} total",
                plan.stops.len(),
                plan.total_liters,
                plan.total_cost
            );
            for stop in &plan.stops {
                println!(
                    "   km {:>6.1}  {:>5.2} L at {:.3}  {}",
                    stop.along_path_km, stop.liters, stop.price_per_liter, stop.station_name
                );
            }
            Some(plan)
        }
        Err(e) => {
            eprintln!("No feasible plan: {}", e);
            None
        }
    };

    let report = radar::autonomy_radar(&path, &selected, args.range_km);
    for segment in &report.segments {
        let tag = match segment.risk {
            Some(risk) => format!(" [{:?}]", risk),
            None => String::new(),
        };
        println!(
            "  {} -> {}: {:.1} km{}",
            segment.from_label, segment.to_label, segment.length_km, tag
        );
    }

    let (first, last) = match (path.0.first(), path.0.last()) {
        (Some(first), Some(last)) => (Point::from(*first), Point::from(*last)),
        _ => anyhow::bail!("path came back empty"),
    };
    let nav = export::maps_navigation_url(first, last, &selected);
    if nav.omitted > 0 {
        println!("{} stops beyond the waypoint cap were left out of the URL", nav.omitted);
    }
    println!("Navigation: {}", nav.url);

    if let Some(file) = &args.out_geojson {
        let fc = export::stations_feature_collection(&candidates, args.fuel, Some(&corridor));
        std::fs::write(file, serde_json::to_vec_pretty(&fc)?)?;
        println!("Wrote {}", file.display());
    }

    if let Some(file) = &args.out_gpx {
        println!("Splicing detours into the track");
        let (line, routed) = export::splice_track_with_stops(
            &routing,
            &path,
            &selected,
            &export::SpliceConfig::default(),
        )
        .await;
        println!("Routed legs for {}/{} stops", routed, selected.len());
        let gpx = export::spliced_gpx(&line, &selected, args.fuel);
        let handle = std::fs::File::create(file)?;
        export::write_gpx(&gpx, std::io::BufWriter::new(handle))?;
        println!("Wrote {}", file.display());
    }

    if let Some(file) = &args.out_plan {
        let document = PlanDocument {
            fuel: args.fuel.label(),
            plan: &plan,
            radar: &report,
            navigation_url: &nav.url,
            waypoints_omitted: nav.omitted,
        };
        std::fs::write(file, serde_json::to_vec_pretty(&document)?)?;
        println!("Wrote {}", file.display());
    }

    Ok(())
}
