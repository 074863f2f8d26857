//! Domain types shared across the crate.

use ahash::AHashMap;
use clap::ValueEnum;
use std::str::FromStr;
use thiserror::Error;

/// Fuel products carried by the national price listing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum FuelKind {
    Gasoline95E5,
    Gasoline98E5,
    DieselA,
    DieselPremium,
    Lpg,
    Cng,
}

impl FuelKind {
    pub const ALL: [FuelKind; 6] = [
        FuelKind::Gasoline95E5,
        FuelKind::Gasoline98E5,
        FuelKind::DieselA,
        FuelKind::DieselPremium,
        FuelKind::Lpg,
        FuelKind::Cng,
    ];

    /// Label as printed on Spanish station displays.
    pub fn label(&self) -> &'static str {
        match self {
            FuelKind::Gasoline95E5 => "Gasolina 95 E5",
            FuelKind::Gasoline98E5 => "Gasolina 98 E5",
            FuelKind::DieselA => "Gasóleo A",
            FuelKind::DieselPremium => "Gasóleo Premium",
            FuelKind::Lpg => "GLP",
            FuelKind::Cng => "GNC",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown fuel kind: {0}")]
pub struct UnknownFuelKind(pub String);

impl FromStr for FuelKind {
    type Err = UnknownFuelKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        for kind in FuelKind::ALL {
            if kind.label().to_lowercase() == needle {
                return Ok(kind);
            }
        }
        match needle.as_str() {
            "gasolina 95" | "95" | "sp95" => Ok(FuelKind::Gasoline95E5),
            "gasolina 98" | "98" | "sp98" => Ok(FuelKind::Gasoline98E5),
            "diesel" | "gasoleo a" => Ok(FuelKind::DieselA),
            "diesel premium" | "gasoleo premium" => Ok(FuelKind::DieselPremium),
            "autogas" => Ok(FuelKind::Lpg),
            _ => Err(UnknownFuelKind(s.to_string())),
        }
    }
}

/// One refueling point from the national listing, normalized to numeric fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriceRecord {
    pub id: String,
    pub name: String,
    pub municipality: String,
    pub address: String,
    pub schedule: String,
    pub lon: f64,
    pub lat: f64,
    /// A kind missing from the map is not sold at this station.
    pub prices: AHashMap<FuelKind, f64>,
}

impl PriceRecord {
    /// Price per liter for `kind`, if the station sells it at a usable price.
    pub fn price(&self, kind: FuelKind) -> Option<f64> {
        self.prices.get(&kind).copied().filter(|p| *p > 0.0)
    }
}

/// Road detour to a station and back, as answered by the routing service.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Detour {
    pub distance_m: f64,
    pub duration_s: f64,
}

/// A price record that fell inside the corridor, with path-relative positioning.
#[derive(Clone, Debug, Serialize)]
pub struct CandidateStation {
    pub station: PriceRecord,
    /// Meters from the path start to this station's closest point on the path.
    pub along_path_m: f64,
    /// Closest point on the path, degrees. Detour origin and splice anchor.
    pub on_path_lon: f64,
    pub on_path_lat: f64,
    /// Straight-line distance from the station to the path, meters.
    pub offset_m: f64,
    /// Mandatory-stop bin, set by the segmented selection policy.
    pub segment_index: Option<u32>,
    /// Set by the enricher when the routing service answered.
    pub detour: Option<Detour>,
}

impl CandidateStation {
    pub fn price(&self, kind: FuelKind) -> Option<f64> {
        self.station.price(kind)
    }

    pub fn along_path_km(&self) -> f64 {
        self.along_path_m / 1000.0
    }
}

/// Tank and consumption parameters supplied by the caller.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct VehicleProfile {
    pub tank_liters: f64,
    pub consumption_l_per_100km: f64,
    /// Fuel in the tank at the route start, liters.
    pub initial_liters: f64,
}

impl VehicleProfile {
    /// `initial_fraction` is clamped to [0, 1] of the tank.
    pub fn new(tank_liters: f64, consumption_l_per_100km: f64, initial_fraction: f64) -> Self {
        VehicleProfile {
            tank_liters,
            consumption_l_per_100km,
            initial_liters: tank_liters * initial_fraction.clamp(0.0, 1.0),
        }
    }

    /// Kilometers covered by `liters` of fuel.
    pub fn range_km(&self, liters: f64) -> f64 {
        liters / self.consumption_l_per_100km * 100.0
    }

    /// Liters burned over `km` kilometers.
    pub fn liters_for_km(&self, km: f64) -> f64 {
        km * self.consumption_l_per_100km / 100.0
    }

    pub fn full_range_km(&self) -> f64 {
        self.range_km(self.tank_liters)
    }
}

/// One purchase in a refueling itinerary.
#[derive(Clone, Debug, Serialize)]
pub struct RefuelStop {
    pub station_id: String,
    pub station_name: String,
    pub along_path_km: f64,
    pub price_per_liter: f64,
    pub liters: f64,
    pub cost: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct RefuelPlan {
    pub stops: Vec<RefuelStop>,
    pub total_liters: f64,
    pub total_cost: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    Safe,
    Attention,
    Critical,
}

/// One gap between consecutive checkpoints of the autonomy radar.
#[derive(Clone, Debug, Serialize)]
pub struct AutonomySegment {
    pub from_label: String,
    pub to_label: String,
    pub start_km: f64,
    pub end_km: f64,
    pub length_km: f64,
    /// None when no vehicle range was configured.
    pub risk: Option<RiskLevel>,
}
