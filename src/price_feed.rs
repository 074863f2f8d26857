//! Client and normalization for the national fuel price listing.
//!
//! Wire format quirks: decimal commas, stringly-typed coordinates, one price
//! column per product, empty strings for products a station does not sell.
//! Everything is normalized here so the rest of the crate only ever sees
//! numeric [`PriceRecord`]s.

use crate::is_null_island;
use crate::models::{FuelKind, PriceRecord};
use ahash::AHashMap;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_PRICE_ENDPOINT: &str =
    "https://sedeaplicaciones.minetur.gob.es/ServiciosRESTCarburantes/PreciosCarburantes/EstacionesTerrestres/";

/// Environment variable that prepends an endpoint to the fetch cascade.
pub const PRICE_ENDPOINT_ENV: &str = "FUELROUTE_PRICE_ENDPOINT";

#[derive(Error, Debug)]
pub enum PriceFeedError {
    #[error("price listing request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("price endpoint {url} answered status {status}")]
    BadStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("price records file did not parse: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("every price endpoint in the cascade failed")]
    CascadeExhausted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Deserialize, Debug)]
struct PriceListing {
    #[serde(rename = "ListaEESSPrecio")]
    stations: Vec<RawStation>,
}

/// One station exactly as the listing spells it.
#[derive(Deserialize, Debug, Default)]
struct RawStation {
    #[serde(rename = "IDEESS", default)]
    id: String,
    #[serde(rename = "Rótulo", default)]
    name: String,
    #[serde(rename = "Municipio", default)]
    municipality: String,
    #[serde(rename = "Dirección", default)]
    address: String,
    #[serde(rename = "Horario", default)]
    schedule: String,
    #[serde(rename = "Latitud", default)]
    lat: String,
    #[serde(rename = "Longitud (WGS84)", default)]
    lon: String,
    #[serde(rename = "Precio Gasolina 95 E5", default)]
    gasoline_95_e5: String,
    #[serde(rename = "Precio Gasolina 98 E5", default)]
    gasoline_98_e5: String,
    #[serde(rename = "Precio Gasoleo A", default)]
    diesel_a: String,
    #[serde(rename = "Precio Gasoleo Premium", default)]
    diesel_premium: String,
    #[serde(rename = "Precio Gases licuados del petróleo", default)]
    lpg: String,
    #[serde(rename = "Precio Gas Natural Comprimido", default)]
    cng: String,
}

/// Comma-decimal string to a finite float. Empty and junk values become None.
fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

impl RawStation {
    /// None when the station has no usable coordinates.
    fn into_record(self) -> Option<PriceRecord> {
        let lat = parse_decimal(&self.lat)?;
        let lon = parse_decimal(&self.lon)?;
        if is_null_island(lon, lat) {
            return None;
        }
        let raw_prices = [
            (FuelKind::Gasoline95E5, &self.gasoline_95_e5),
            (FuelKind::Gasoline98E5, &self.gasoline_98_e5),
            (FuelKind::DieselA, &self.diesel_a),
            (FuelKind::DieselPremium, &self.diesel_premium),
            (FuelKind::Lpg, &self.lpg),
            (FuelKind::Cng, &self.cng),
        ];
        let mut prices = AHashMap::new();
        for (kind, raw) in raw_prices {
            if let Some(price) = parse_decimal(raw).filter(|p| *p > 0.0) {
                prices.insert(kind, price);
            }
        }
        Some(PriceRecord {
            id: self.id,
            name: self.name,
            municipality: self.municipality,
            address: self.address,
            schedule: self.schedule,
            lon,
            lat,
            prices,
        })
    }
}

fn normalize(listing: PriceListing) -> Vec<PriceRecord> {
    let total = listing.stations.len();
    let records: Vec<PriceRecord> = listing
        .stations
        .into_iter()
        .filter_map(RawStation::into_record)
        .collect();
    log::debug!(
        "price listing: {} stations, {} with usable coordinates",
        total,
        records.len()
    );
    records
}

pub fn make_price_client() -> Result<reqwest::Client, PriceFeedError> {
    Ok(reqwest::ClientBuilder::new()
        .use_rustls_tls()
        .user_agent("fuelroute")
        .gzip(true)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .build()?)
}

/// Fetch order: environment override first when present, then the official endpoint.
pub fn endpoint_cascade() -> Vec<Url> {
    let mut cascade = Vec::new();
    if let Ok(value) = std::env::var(PRICE_ENDPOINT_ENV) {
        match Url::parse(&value) {
            Ok(url) => cascade.push(url),
            Err(e) => log::warn!("ignoring {}: {}", PRICE_ENDPOINT_ENV, e),
        }
    }
    if let Ok(url) = Url::parse(DEFAULT_PRICE_ENDPOINT) {
        cascade.push(url);
    }
    cascade
}

/// Fetch and normalize the national listing. Each endpoint is tried once, in order.
pub async fn fetch_price_records(
    client: &reqwest::Client,
    endpoints: &[Url],
) -> Result<Vec<PriceRecord>, PriceFeedError> {
    for url in endpoints {
        match fetch_from(client, url).await {
            Ok(records) => return Ok(records),
            Err(e) => log::warn!("price endpoint {} failed: {}", url, e),
        }
    }
    Err(PriceFeedError::CascadeExhausted)
}

async fn fetch_from(
    client: &reqwest::Client,
    url: &Url,
) -> Result<Vec<PriceRecord>, PriceFeedError> {
    let response = client.get(url.clone()).send().await?;
    if !response.status().is_success() {
        return Err(PriceFeedError::BadStatus {
            url: url.to_string(),
            status: response.status(),
        });
    }
    let listing: PriceListing = response.json().await?;
    Ok(normalize(listing))
}

/// Load previously saved normalized records. Offline runs and tests go through here.
pub fn load_records_file(path: &std::path::Path) -> Result<Vec<PriceRecord>, PriceFeedError> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
