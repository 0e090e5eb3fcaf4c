//! Air-quality lookups (OpenWeather air pollution API).

use async_trait::async_trait;
use reqwest::{Method, Request};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, SignalError};
use crate::fetch::auth::UrlParam;
use crate::fetch::{HttpClient, fetch_json, parse_url};
use crate::geo_index::Coordinate;

pub const OPENWEATHER_AIR_POLLUTION_URL: &str = "http://api.openweathermap.org/data/2.5/air_pollution";

/// Returns the air quality index (1 = good .. 5 = very poor) at a location.
#[async_trait]
pub trait AqiSource: Send + Sync {
    async fn fetch_aqi(&self, at: Coordinate) -> Result<u8>;
}

#[derive(Deserialize)]
struct AirPollutionResponse {
    list: Vec<AirPollutionEntry>,
}

#[derive(Deserialize)]
struct AirPollutionEntry {
    main: AirPollutionMain,
}

#[derive(Deserialize)]
struct AirPollutionMain {
    aqi: u8,
}

impl AirPollutionResponse {
    fn aqi(&self) -> Result<u8> {
        let aqi = self
            .list
            .first()
            .map(|entry| entry.main.aqi)
            .ok_or_else(|| SignalError::invalid_data("air pollution response", "empty list"))?;
        if !(1..=5).contains(&aqi) {
            return Err(SignalError::invalid_data(
                "air pollution response",
                format!("aqi {aqi} outside 1..=5"),
            ));
        }
        Ok(aqi)
    }
}

pub struct OpenWeatherAqi<C> {
    client: UrlParam<C>,
    base_url: String,
}

impl<C: HttpClient> OpenWeatherAqi<C> {
    pub fn new(client: C, api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            client: UrlParam {
                inner: client,
                param_name: "appid".to_string(),
                key: api_key,
            },
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> AqiSource for OpenWeatherAqi<C> {
    async fn fetch_aqi(&self, at: Coordinate) -> Result<u8> {
        let mut url = parse_url(&self.base_url)?;
        url.query_pairs_mut()
            .append_pair("lat", &at.latitude.to_string())
            .append_pair("lon", &at.longitude.to_string());

        let resp: AirPollutionResponse = fetch_json(&self.client, Request::new(Method::GET, url)).await?;
        let aqi = resp.aqi()?;
        debug!(lat = at.latitude, lon = at.longitude, aqi, "AQI fetched");
        Ok(aqi)
    }
}

/// Stand-in used when no API key is configured; every lookup fails so the
/// caller's fallback applies.
pub struct UnconfiguredAqi;

#[async_trait]
impl AqiSource for UnconfiguredAqi {
    async fn fetch_aqi(&self, _at: Coordinate) -> Result<u8> {
        Err(SignalError::invalid_data("configuration", "AQI_API_KEY is not set"))
    }
}
