//! Geocoding and road-routing clients.
//!
//! Both services are public and unauthenticated, so every request carries a
//! rotating browser user agent and a hard timeout. Whole-route fetches walk a
//! fixed endpoint cascade; per-leg lookups hit only the primary endpoint and
//! fail soft.

use crate::models::Detour;
use geo::{LineString, Point};
use rand::prelude::*;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_ROUTE_ENDPOINTS: [&str; 2] = [
    "https://router.project-osrm.org",
    "https://routing.openstreetmap.de/routed-car",
];
pub const DEFAULT_GEOCODE_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

/// Environment variables that prepend/override endpoints.
pub const ROUTE_ENDPOINT_ENV: &str = "FUELROUTE_ROUTING_ENDPOINT";
pub const GEOCODE_ENDPOINT_ENV: &str = "FUELROUTE_GEOCODE_ENDPOINT";

const ROUTE_TIMEOUT: Duration = Duration::from_secs(10);
const LEG_TIMEOUT: Duration = Duration::from_secs(2);

const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("geocoder found no match for \"{0}\"")]
    NoGeocodeMatch(String),
    #[error("routing request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("every routing endpoint in the cascade failed")]
    CascadeExhausted,
    #[error("routing endpoint answered an unusable payload: {0}")]
    Malformed(String),
}

#[derive(Deserialize, Debug)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize, Debug)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    #[serde(default)]
    geometry: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GeocodeHit {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

/// Routed leg: geometry in degrees plus the service's own summary.
#[derive(Debug, Clone)]
pub struct RouteGeometry {
    pub line: LineString<f64>,
    pub distance_m: f64,
    pub duration_s: f64,
}

pub struct RoutingClient {
    client: reqwest::Client,
    route_endpoints: Vec<Url>,
    geocode_endpoint: Url,
}

impl RoutingClient {
    pub fn new() -> Result<Self, RoutingError> {
        let mut route_endpoints = Vec::new();
        if let Ok(value) = std::env::var(ROUTE_ENDPOINT_ENV) {
            match Url::parse(&value) {
                Ok(url) => route_endpoints.push(url),
                Err(e) => log::warn!("ignoring {}: {}", ROUTE_ENDPOINT_ENV, e),
            }
        }
        for raw in DEFAULT_ROUTE_ENDPOINTS {
            if let Ok(url) = Url::parse(raw) {
                route_endpoints.push(url);
            }
        }
        let geocode_endpoint = match std::env::var(GEOCODE_ENDPOINT_ENV) {
            Ok(value) => Url::parse(&value)
                .map_err(|e| RoutingError::Malformed(format!("{}: {}", GEOCODE_ENDPOINT_ENV, e)))?,
            Err(_) => Url::parse(DEFAULT_GEOCODE_ENDPOINT)
                .map_err(|e| RoutingError::Malformed(e.to_string()))?,
        };
        Ok(RoutingClient {
            client: reqwest::ClientBuilder::new()
                .use_rustls_tls()
                .gzip(true)
                .timeout(ROUTE_TIMEOUT)
                .connect_timeout(Duration::from_secs(5))
                .build()?,
            route_endpoints,
            geocode_endpoint,
        })
    }

    fn pick_user_agent(&self) -> &'static str {
        USER_AGENTS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(USER_AGENTS[0])
    }

    /// One best geocoder match for a place name.
    pub async fn geocode(&self, query: &str) -> Result<Point<f64>, RoutingError> {
        let mut url = self.geocode_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("format", "json")
            .append_pair("limit", "1");
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.pick_user_agent())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RoutingError::Malformed(format!(
                "geocoder answered status {}",
                response.status()
            )));
        }
        let hits: Vec<GeocodeHit> = response.json().await?;
        let hit = hits
            .into_iter()
            .next()
            .ok_or_else(|| RoutingError::NoGeocodeMatch(query.to_string()))?;
        let lat: f64 = hit
            .lat
            .parse()
            .map_err(|_| RoutingError::Malformed(format!("geocoder latitude {:?}", hit.lat)))?;
        let lon: f64 = hit
            .lon
            .parse()
            .map_err(|_| RoutingError::Malformed(format!("geocoder longitude {:?}", hit.lon)))?;
        log::debug!("geocoded \"{}\" to ({:.5}, {:.5}) [{}]", query, lon, lat, hit.display_name);
        Ok(Point::new(lon, lat))
    }

    /// Full driving route between two points, walking the endpoint cascade.
    pub async fn route_between(
        &self,
        origin: Point<f64>,
        destination: Point<f64>,
    ) -> Result<RouteGeometry, RoutingError> {
        for base in &self.route_endpoints {
            match self.try_route(base, origin, destination, true, ROUTE_TIMEOUT).await {
                Ok(Some(route)) => return Ok(route),
                Ok(None) => log::warn!("routing endpoint {} returned no usable route", base),
                Err(e) => log::warn!("routing endpoint {} failed: {}", base, e),
            }
        }
        Err(RoutingError::CascadeExhausted)
    }

    /// Geocode two place names and fetch the driving route between them.
    pub async fn route_from_text(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<RouteGeometry, RoutingError> {
        let from = self.geocode(origin).await?;
        let to = self.geocode(destination).await?;
        let route = self.route_between(from, to).await?;
        if route.line.0.len() < 2 {
            return Err(RoutingError::Malformed("route geometry too short".to_string()));
        }
        Ok(route)
    }

    /// Distance/duration of one road leg; None on any failure. Used by the
    /// enricher at volume, so no cascade and a short timeout.
    pub async fn leg_summary(&self, origin: Point<f64>, destination: Point<f64>) -> Option<Detour> {
        let base = self.route_endpoints.first()?;
        match self.try_route(base, origin, destination, false, LEG_TIMEOUT).await {
            Ok(Some(route)) => Some(Detour {
                distance_m: route.distance_m,
                duration_s: route.duration_s,
            }),
            Ok(None) => None,
            Err(e) => {
                log::debug!("leg summary failed: {}", e);
                None
            }
        }
    }

    /// Full-geometry leg for track splicing; None on any failure.
    pub async fn leg_geometry(
        &self,
        origin: Point<f64>,
        destination: Point<f64>,
    ) -> Option<LineString<f64>> {
        let base = self.route_endpoints.first()?;
        match self.try_route(base, origin, destination, true, LEG_TIMEOUT).await {
            Ok(Some(route)) if route.line.0.len() >= 2 => Some(route.line),
            Ok(_) => None,
            Err(e) => {
                log::debug!("leg geometry failed: {}", e);
                None
            }
        }
    }

    async fn try_route(
        &self,
        base: &Url,
        origin: Point<f64>,
        destination: Point<f64>,
        with_geometry: bool,
        timeout: Duration,
    ) -> Result<Option<RouteGeometry>, RoutingError> {
        let raw = format!(
            "{}/route/v1/driving/{:.6},{:.6};{:.6},{:.6}",
            base.as_str().trim_end_matches('/'),
            origin.x(),
            origin.y(),
            destination.x(),
            destination.y()
        );
        let mut url = Url::parse(&raw).map_err(|e| RoutingError::Malformed(e.to_string()))?;
        if with_geometry {
            url.query_pairs_mut()
                .append_pair("overview", "full")
                .append_pair("geometries", "polyline");
        } else {
            url.query_pairs_mut().append_pair("overview", "false");
        }

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.pick_user_agent())
            .timeout(timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let body: OsrmResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                log::debug!("routing payload did not parse: {}", e);
                return Ok(None);
            }
        };
        if body.code != "Ok" {
            return Ok(None);
        }
        let Some(route) = body.routes.first() else {
            return Ok(None);
        };
        let line = match route.geometry.as_deref() {
            Some(encoded) if with_geometry => match polyline::decode_polyline(encoded, 5) {
                Ok(line) => line,
                Err(e) => {
                    log::debug!("polyline decode failed: {:?}", e);
                    return Ok(None);
                }
            },
            _ => LineString::new(Vec::new()),
        };
        Ok(Some(RouteGeometry {
            line,
            distance_m: route.distance,
            duration_s: route.duration,
        }))
    }
}
