//! Road-detour enrichment, best-effort by contract.

use crate::models::{CandidateStation, Detour};
use crate::routing::RoutingClient;
use futures::{stream, StreamExt};
use geo::Point;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy)]
pub struct EnrichConfig {
    /// Concurrent leg requests in flight.
    pub workers: usize,
    /// Consecutive failures before the rest of the batch is skipped.
    pub failure_threshold: u32,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        EnrichConfig {
            workers: 3,
            failure_threshold: 3,
        }
    }
}

/// Attach a road detour to every candidate the routing service answers for.
/// Candidates keep `detour: None` on any failure; once `failure_threshold`
/// consecutive lookups fail, the remaining batch is skipped outright. Returns
/// how many candidates were resolved.
pub async fn enrich_detours(
    client: &RoutingClient,
    candidates: &mut [CandidateStation],
    config: &EnrichConfig,
) -> usize {
    enrich_detours_with(
        |origin, station| client.leg_summary(origin, station),
        candidates,
        config,
    )
    .await
}

/// Enrichment core over any detour lookup. `lookup` answers None on failure;
/// the lookup itself must never panic or block past its own timeout.
pub async fn enrich_detours_with<F, Fut>(
    lookup: F,
    candidates: &mut [CandidateStation],
    config: &EnrichConfig,
) -> usize
where
    F: Fn(Point<f64>, Point<f64>) -> Fut,
    Fut: Future<Output = Option<Detour>>,
{
    let breaker = AtomicU32::new(0);
    let jobs: Vec<(usize, Point<f64>, Point<f64>)> = candidates
        .iter()
        .enumerate()
        .map(|(idx, c)| {
            (
                idx,
                Point::new(c.on_path_lon, c.on_path_lat),
                Point::new(c.station.lon, c.station.lat),
            )
        })
        .collect();

    let results: Vec<(usize, Option<Detour>)> = stream::iter(jobs)
        .map(|(idx, origin, station)| {
            let breaker = &breaker;
            let lookup = &lookup;
            async move {
                if breaker.load(Ordering::Relaxed) >= config.failure_threshold {
                    return (idx, None);
                }
                match lookup(origin, station).await {
                    Some(detour) => {
                        breaker.store(0, Ordering::Relaxed);
                        (idx, Some(detour))
                    }
                    None => {
                        let failures = breaker.fetch_add(1, Ordering::Relaxed) + 1;
                        if failures == config.failure_threshold {
                            log::warn!(
                                "detour lookups skipped after {} consecutive failures",
                                failures
                            );
                        }
                        (idx, None)
                    }
                }
            }
        })
        .buffer_unordered(config.workers.max(1))
        .collect()
        .await;

    let mut resolved = 0;
    for (idx, detour) in results {
        if let Some(detour) = detour {
            candidates[idx].detour = Some(detour);
            resolved += 1;
        }
    }
    log::info!(
        "detour enrichment resolved {}/{} candidates",
        resolved,
        candidates.len()
    );
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceRecord;
    use ahash::AHashMap;

    fn candidates(count: usize) -> Vec<CandidateStation> {
        (0..count)
            .map(|i| CandidateStation {
                station: PriceRecord {
                    id: i.to_string(),
                    name: format!("station {}", i),
                    municipality: String::new(),
                    address: String::new(),
                    schedule: String::new(),
                    lon: -3.0 - i as f64 * 0.01,
                    lat: 40.0,
                    prices: AHashMap::new(),
                },
                along_path_m: i as f64 * 1000.0,
                on_path_lon: -3.0 - i as f64 * 0.01,
                on_path_lat: 40.001,
                offset_m: 110.0,
                segment_index: None,
                detour: None,
            })
            .collect()
    }

    /// One worker keeps the completion order deterministic.
    fn serial(failure_threshold: u32) -> EnrichConfig {
        EnrichConfig {
            workers: 1,
            failure_threshold,
        }
    }

    #[tokio::test]
    async fn successful_lookups_land_on_their_candidates() {
        let mut rows = candidates(4);
        let resolved = enrich_detours_with(
            |_, station| async move {
                Some(Detour {
                    distance_m: station.x().abs() * 100.0,
                    duration_s: 60.0,
                })
            },
            &mut rows,
            &serial(3),
        )
        .await;
        assert_eq!(resolved, 4);
        for row in &rows {
            let detour = row.detour.expect("every candidate resolved");
            assert!((detour.distance_m - row.station.lon.abs() * 100.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn breaker_trips_after_consecutive_failures() {
        let mut rows = candidates(8);
        let attempts = AtomicU32::new(0);
        let resolved = enrich_detours_with(
            |_, _| {
                attempts.fetch_add(1, Ordering::Relaxed);
                async { None }
            },
            &mut rows,
            &serial(3),
        )
        .await;
        assert_eq!(resolved, 0);
        // Three failing calls, then the remaining five are skipped outright.
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
        assert!(rows.iter().all(|r| r.detour.is_none()));
    }

    #[tokio::test]
    async fn a_success_resets_the_failure_count() {
        let mut rows = candidates(9);
        let calls = AtomicU32::new(0);
        let resolved = enrich_detours_with(
            |_, _| {
                // Fail, fail, succeed, repeated. Never three in a row.
                let n = calls.fetch_add(1, Ordering::Relaxed);
                async move {
                    if n % 3 == 2 {
                        Some(Detour {
                            distance_m: 500.0,
                            duration_s: 45.0,
                        })
                    } else {
                        None
                    }
                }
            },
            &mut rows,
            &serial(3),
        )
        .await;
        assert_eq!(resolved, 3);
        assert_eq!(calls.load(Ordering::Relaxed), 9);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let mut rows = candidates(0);
        let resolved =
            enrich_detours_with(|_, _| async { None }, &mut rows, &EnrichConfig::default()).await;
        assert_eq!(resolved, 0);
    }
}
