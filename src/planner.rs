//! Refueling itinerary planners.
//!
//! Both planners consume corridor candidates and the same vehicle profile; they
//! differ in what they promise. The greedy walk only promises feasibility. The
//! cost-minimal planner prices every feasible hop at the origin station, net of
//! the initial fuel still on board there. Under minimal purchases the fuel left
//! at a station depends only on its along-path position, so that net weight is
//! independent of how the station was reached and Dijkstra stays exact.

use crate::models::{CandidateStation, FuelKind, RefuelPlan, RefuelStop, VehicleProfile};
use ahash::AHashMap;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use thiserror::Error;

#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    /// Fraction of the tank the greedy planner leaves unfilled when topping up.
    pub safety_margin: f64,
    /// Fraction of the tank the cost planner never plans to burn on one hop.
    pub reserve_fraction: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            safety_margin: 0.15,
            reserve_fraction: 0.10,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("no feasible refueling plan: the vehicle can reach km {furthest_reachable_km:.1} at best")]
    ImpossibleRoute { furthest_reachable_km: f64 },
}

/// Stations with a usable price, in path order.
struct PricedStop {
    candidate: usize,
    along_km: f64,
    price: f64,
}

fn priced_stops(candidates: &[CandidateStation], kind: FuelKind) -> Vec<PricedStop> {
    let mut stops: Vec<PricedStop> = candidates
        .iter()
        .enumerate()
        .filter_map(|(idx, c)| {
            c.price(kind).map(|price| PricedStop {
                candidate: idx,
                along_km: c.along_path_km(),
                price,
            })
        })
        .collect();
    stops.sort_by_key(|s| OrderedFloat(s.along_km));
    stops
}

fn make_stop(candidate: &CandidateStation, price: f64, liters: f64) -> RefuelStop {
    RefuelStop {
        station_id: candidate.station.id.clone(),
        station_name: candidate.station.name.clone(),
        along_path_km: candidate.along_path_km(),
        price_per_liter: price,
        liters,
        cost: liters * price,
    }
}

fn finish_plan(stops: Vec<RefuelStop>) -> RefuelPlan {
    let total_liters = stops.iter().map(|s| s.liters).sum();
    let total_cost = stops.iter().map(|s| s.cost).sum();
    RefuelPlan {
        stops,
        total_liters,
        total_cost,
    }
}

/// Walk the stops in path order and top up to the useful maximum whenever the
/// tank would not otherwise reach the next stop or the destination.
pub fn greedy_plan(
    candidates: &[CandidateStation],
    kind: FuelKind,
    vehicle: &VehicleProfile,
    config: &PlannerConfig,
    route_km: f64,
) -> Result<RefuelPlan, PlanError> {
    let stops = priced_stops(candidates, kind);
    let useful_max = vehicle.tank_liters * (1.0 - config.safety_margin);
    let mut fuel = vehicle.initial_liters.min(vehicle.tank_liters);
    let mut position_km: f64 = 0.0;
    let mut purchases: Vec<RefuelStop> = Vec::new();

    for (i, stop) in stops.iter().enumerate() {
        let to_here = vehicle.liters_for_km(stop.along_km - position_km);
        if to_here > fuel {
            return Err(PlanError::ImpossibleRoute {
                furthest_reachable_km: position_km + vehicle.range_km(fuel),
            });
        }
        fuel -= to_here;
        position_km = stop.along_km;

        let target_km = stops.get(i + 1).map_or(route_km, |next| next.along_km);
        let to_target = vehicle.liters_for_km(target_km - position_km);
        if to_target > fuel {
            let bought = useful_max - fuel;
            if bought > 0.0 {
                purchases.push(make_stop(&candidates[stop.candidate], stop.price, bought));
                fuel = useful_max;
            }
            if to_target > fuel {
                return Err(PlanError::ImpossibleRoute {
                    furthest_reachable_km: position_km + vehicle.range_km(fuel),
                });
            }
        }
    }

    if stops.is_empty() && vehicle.liters_for_km(route_km) > fuel {
        return Err(PlanError::ImpossibleRoute {
            furthest_reachable_km: vehicle.range_km(fuel),
        });
    }
    Ok(finish_plan(purchases))
}

#[derive(Copy, Clone, PartialEq, Eq)]
struct State {
    cost: OrderedFloat<f64>,
    node: usize,
}

// The priority queue depends on `Ord`. Flip the ordering on costs so the heap
// becomes a min-heap; ties fall back to the node index to keep `PartialEq`
// and `Ord` consistent.
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Cheapest-total-cost itinerary over the priced stops.
///
/// Nodes are the route start, every priced stop in path order, and the
/// destination. A hop exists when it fits in a full tank minus the reserve;
/// the start hop runs on the initial fuel and costs nothing. A hop out of a
/// station is priced for the liters actually bought there: the leg's liters
/// minus whatever initial fuel survives to that station. Purchases then derive
/// from the chosen hops by forward simulation, which reproduces exactly the
/// costs the search minimized, and the tank never exceeds capacity.
pub fn cheapest_plan(
    candidates: &[CandidateStation],
    kind: FuelKind,
    vehicle: &VehicleProfile,
    config: &PlannerConfig,
    route_km: f64,
) -> Result<RefuelPlan, PlanError> {
    let stops = priced_stops(candidates, kind);
    let destination = stops.len() + 1;

    let start_reach_km = vehicle.range_km(vehicle.initial_liters.min(vehicle.tank_liters));
    let usable_liters = (vehicle.tank_liters * (1.0 - config.reserve_fraction)).max(0.0);
    let station_reach_km = vehicle.range_km(usable_liters);

    let along = |node: usize| -> f64 {
        if node == 0 {
            0.0
        } else if node == destination {
            route_km
        } else {
            stops[node - 1].along_km
        }
    };
    let reach = |node: usize| -> f64 {
        if node == 0 {
            start_reach_km
        } else {
            station_reach_km
        }
    };

    let mut dist: AHashMap<usize, f64> = AHashMap::new();
    let mut previous: AHashMap<usize, usize> = AHashMap::new();
    let mut heap = BinaryHeap::new();
    dist.insert(0, 0.0);
    heap.push(State {
        cost: OrderedFloat(0.0),
        node: 0,
    });

    while let Some(State { cost, node }) = heap.pop() {
        if node == destination {
            break;
        }
        if cost.0 > dist.get(&node).copied().unwrap_or(f64::INFINITY) {
            continue;
        }
        let from_km = along(node);
        let price = if node == 0 { 0.0 } else { stops[node - 1].price };
        // Initial fuel still on board at this node. Position alone determines
        // it: minimal purchases never add fuel beyond the next leg's need.
        let carried_liters = if node == 0 {
            0.0
        } else {
            (vehicle.initial_liters.min(vehicle.tank_liters) - vehicle.liters_for_km(from_km))
                .max(0.0)
        };

        for next in (node + 1)..=destination {
            let leg_km = along(next) - from_km;
            if leg_km > reach(node) {
                continue;
            }
            let bought = (vehicle.liters_for_km(leg_km) - carried_liters).max(0.0);
            let next_cost = cost.0 + bought * price;
            if next_cost < dist.get(&next).copied().unwrap_or(f64::INFINITY) {
                dist.insert(next, next_cost);
                previous.insert(next, node);
                heap.push(State {
                    cost: OrderedFloat(next_cost),
                    node: next,
                });
            }
        }
    }

    if !dist.contains_key(&destination) {
        let furthest = dist
            .keys()
            .map(|&node| along(node) + reach(node))
            .fold(0.0, f64::max);
        return Err(PlanError::ImpossibleRoute {
            furthest_reachable_km: furthest,
        });
    }

    let mut chain: Vec<usize> = Vec::new();
    let mut cursor = destination;
    while let Some(&parent) = previous.get(&cursor) {
        chain.push(cursor);
        if parent == 0 {
            break;
        }
        cursor = parent;
    }
    chain.reverse();

    let mut purchases: Vec<RefuelStop> = Vec::new();
    let mut fuel = vehicle.initial_liters.min(vehicle.tank_liters);
    let mut position_km: f64 = 0.0;
    for (i, &node) in chain.iter().enumerate() {
        fuel = (fuel - vehicle.liters_for_km(along(node) - position_km)).max(0.0);
        position_km = along(node);
        if node == destination {
            break;
        }
        let stop = &stops[node - 1];
        let needed = vehicle.liters_for_km(along(chain[i + 1]) - position_km);
        let bought = (needed - fuel).max(0.0);
        if bought > 0.0 {
            purchases.push(make_stop(&candidates[stop.candidate], stop.price, bought));
            fuel += bought;
        }
    }
    Ok(finish_plan(purchases))
}
