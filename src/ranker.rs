//! Station selection policies over corridor candidates.

use crate::models::{CandidateStation, FuelKind};
use ahash::AHashMap;
use itertools::Itertools;
use ordered_float::OrderedFloat;

/// Selection knobs shared by both policies.
#[derive(Debug, Clone, Copy)]
pub struct SelectionConfig {
    pub top_n: usize,
    /// Mandatory-stop bin width in km. None keeps the plain top-N policy.
    pub segment_km: Option<f64>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        SelectionConfig {
            top_n: 5,
            segment_km: None,
        }
    }
}

pub fn select(
    candidates: &[CandidateStation],
    kind: FuelKind,
    config: &SelectionConfig,
) -> Vec<CandidateStation> {
    match config.segment_km {
        Some(segment_km) if segment_km > 0.0 => {
            segmented_selection(candidates, kind, config.top_n, segment_km)
        }
        _ => top_n_cheapest(candidates, kind, config.top_n),
    }
}

/// Candidates with a usable price for `kind`, cheapest first.
pub fn top_n_cheapest(
    candidates: &[CandidateStation],
    kind: FuelKind,
    n: usize,
) -> Vec<CandidateStation> {
    let mut priced: Vec<CandidateStation> = candidates
        .iter()
        .filter(|c| c.price(kind).is_some())
        .cloned()
        .collect();
    priced.sort_by_key(|c| OrderedFloat(c.price(kind).unwrap_or(f64::INFINITY)));
    priced.truncate(n);
    priced
}

/// Cheapest station of every `segment_km` bin, unioned with the global top-N,
/// deduplicated by station identity, ordered by distance along the path.
pub fn segmented_selection(
    candidates: &[CandidateStation],
    kind: FuelKind,
    top_n: usize,
    segment_km: f64,
) -> Vec<CandidateStation> {
    let mut by_id: AHashMap<String, CandidateStation> = AHashMap::new();
    for candidate in top_n_cheapest(candidates, kind, top_n) {
        by_id.entry(candidate.station.id.clone()).or_insert(candidate);
    }

    let per_bin = candidates
        .iter()
        .filter(|c| c.price(kind).is_some())
        .map(|c| ((c.along_path_km() / segment_km).floor() as u32, c))
        .into_group_map();
    for (bin, members) in per_bin {
        let cheapest = members
            .into_iter()
            .min_by_key(|c| OrderedFloat(c.price(kind).unwrap_or(f64::INFINITY)));
        if let Some(cheapest) = cheapest {
            let mut chosen = cheapest.clone();
            chosen.segment_index = Some(bin);
            // The bin copy wins so the mandatory-stop marker survives the union.
            by_id.insert(chosen.station.id.clone(), chosen);
        }
    }

    let mut merged: Vec<CandidateStation> = by_id.into_values().collect();
    merged.sort_by_key(|c| OrderedFloat(c.along_path_m));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceRecord;
    use ahash::AHashMap;

    fn candidate(id: &str, km: f64, diesel_price: Option<f64>) -> CandidateStation {
        let mut prices = AHashMap::new();
        if let Some(p) = diesel_price {
            prices.insert(FuelKind::DieselA, p);
        }
        CandidateStation {
            station: PriceRecord {
                id: id.to_string(),
                name: format!("station {}", id),
                municipality: String::new(),
                address: String::new(),
                schedule: String::new(),
                lon: -3.0,
                lat: 40.0,
                prices,
            },
            along_path_m: km * 1000.0,
            on_path_lon: -3.0,
            on_path_lat: 40.0,
            offset_m: 500.0,
            segment_index: None,
            detour: None,
        }
    }

    #[test]
    fn top_n_orders_by_price_and_drops_unpriced() {
        let candidates = vec![
            candidate("a", 10.0, Some(1.50)),
            candidate("b", 55.0, Some(1.40)),
            candidate("c", 70.0, None),
            candidate("d", 115.0, Some(1.45)),
        ];
        let picked = top_n_cheapest(&candidates, FuelKind::DieselA, 2);
        let ids: Vec<&str> = picked.iter().map(|c| c.station.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }

    #[test]
    fn top_n_larger_than_pool_returns_everything_priced() {
        let candidates = vec![candidate("a", 10.0, Some(1.50)), candidate("b", 20.0, None)];
        let picked = top_n_cheapest(&candidates, FuelKind::DieselA, 10);
        assert_eq!(picked.len(), 1);
    }

    #[test]
    fn segmented_selection_unions_bins_with_top_n() {
        // 120 km path, 50 km bins: bin 0 holds a, bin 1 holds b and c, bin 2 holds d.
        let candidates = vec![
            candidate("a", 10.0, Some(1.50)),
            candidate("b", 55.0, Some(1.40)),
            candidate("c", 70.0, Some(1.60)),
            candidate("d", 115.0, Some(1.45)),
        ];
        let picked = segmented_selection(&candidates, FuelKind::DieselA, 1, 50.0);
        let ids: Vec<&str> = picked.iter().map(|c| c.station.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "d"]);
        assert!(picked.windows(2).all(|w| w[0].along_path_m <= w[1].along_path_m));

        // b is both the global pick and the bin-1 winner; it appears once, marked.
        assert_eq!(picked[1].segment_index, Some(1));
        assert_eq!(picked[0].segment_index, Some(0));
        assert_eq!(picked[2].segment_index, Some(2));
    }

    #[test]
    fn segmented_selection_keeps_global_picks_that_lost_their_bin() {
        // One 100 km bin. "c" loses the bin to "b" but stays via the top-2 rank;
        // "a" is neither a bin winner nor a top pick and drops out.
        let candidates = vec![
            candidate("a", 10.0, Some(1.50)),
            candidate("b", 12.0, Some(1.42)),
            candidate("c", 80.0, Some(1.43)),
        ];
        let picked = segmented_selection(&candidates, FuelKind::DieselA, 2, 100.0);
        let ids: Vec<&str> = picked.iter().map(|c| c.station.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(picked[0].segment_index, Some(0));
        assert_eq!(picked[1].segment_index, None);
    }

    #[test]
    fn empty_input_selects_nothing() {
        assert!(top_n_cheapest(&[], FuelKind::DieselA, 5).is_empty());
        assert!(segmented_selection(&[], FuelKind::DieselA, 5, 50.0).is_empty());
    }
}
