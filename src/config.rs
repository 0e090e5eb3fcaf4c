//! Process configuration read from the environment (after `.env` is loaded).

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::aqi::OPENWEATHER_AIR_POLLUTION_URL;
use crate::error::{Result, SignalError};
use crate::narrative::OPENROUTER_URL;

/// Locations of the static tables, relative to the data directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub traffic_features: PathBuf,
    pub traffic_locations: PathBuf,
    pub weather_features: PathBuf,
    pub weather_locations: PathBuf,
    pub fleet_history: PathBuf,
    pub routes: PathBuf,
    pub places: PathBuf,
}

impl DataLayout {
    pub fn under(data_dir: &Path) -> Self {
        Self {
            traffic_features: data_dir.join("traffic_congestion/Additional Features Final v1.csv"),
            traffic_locations: data_dir.join("traffic_congestion/Final Lat Longl v1.csv"),
            weather_features: data_dir.join("weather_pred/Additional Features.csv"),
            weather_locations: data_dir.join("weather_pred/Final_lat_long.csv"),
            fleet_history: data_dir.join("fleet_recommendation/Monthly_Data.csv"),
            routes: data_dir.join("trash_pickup_recommendation/routes.csv"),
            places: data_dir.join("trash_pickup_recommendation/place_coordinates.csv"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data: DataLayout,
    pub predictor_url: String,
    pub aqi_api_key: Option<String>,
    pub aqi_api_url: String,
    pub openrouter_api_key: Option<String>,
    pub openrouter_url: String,
    pub openrouter_model: String,
    pub openrouter_fallback_models: Vec<String>,
    pub http_timeout: Duration,
    pub bind_addr: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let timeout_secs = match get("HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                SignalError::invalid_data("HTTP_TIMEOUT_SECS", format!("'{raw}': {e}"))
            })?,
            None => 10,
        };

        let fallback_models = get("OPENROUTER_FALLBACK_MODELS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            data: DataLayout::under(Path::new(&or("DATA_DIR", "./data"))),
            predictor_url: or("PREDICTOR_URL", "http://127.0.0.1:9000"),
            aqi_api_key: get("AQI_API_KEY"),
            aqi_api_url: or("AQI_API_URL", OPENWEATHER_AIR_POLLUTION_URL),
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            openrouter_url: or("OPENROUTER_URL", OPENROUTER_URL),
            openrouter_model: or("OPENROUTER_MODEL", "openai/gpt-4o"),
            openrouter_fallback_models: fallback_models,
            http_timeout: Duration::from_secs(timeout_secs),
            bind_addr: or("BIND_ADDR", "0.0.0.0:8000"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.predictor_url, "http://127.0.0.1:9000");
        assert_eq!(s.http_timeout, Duration::from_secs(10));
        assert_eq!(s.bind_addr, "0.0.0.0:8000");
        assert!(s.aqi_api_key.is_none());
        assert!(s.openrouter_fallback_models.is_empty());
        assert_eq!(
            s.data.fleet_history,
            Path::new("./data").join("fleet_recommendation/Monthly_Data.csv")
        );
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let s = settings(&[
            ("DATA_DIR", "/srv/city"),
            ("AQI_API_KEY", "  "),
            ("OPENROUTER_API_KEY", "sk-test"),
            ("OPENROUTER_FALLBACK_MODELS", "anthropic/claude-3.5-sonnet, gryphe/mythomax-l2-13b,"),
            ("HTTP_TIMEOUT_SECS", "3"),
        ])
        .unwrap();
        assert!(s.aqi_api_key.is_none());
        assert_eq!(s.openrouter_api_key.as_deref(), Some("sk-test"));
        assert_eq!(
            s.openrouter_fallback_models,
            vec!["anthropic/claude-3.5-sonnet", "gryphe/mythomax-l2-13b"]
        );
        assert_eq!(s.http_timeout, Duration::from_secs(3));
        assert_eq!(
            s.data.routes,
            Path::new("/srv/city/trash_pickup_recommendation/routes.csv")
        );
    }

    #[test]
    fn test_bad_timeout() {
        assert!(matches!(
            settings(&[("HTTP_TIMEOUT_SECS", "soon")]),
            Err(SignalError::InvalidData { .. })
        ));
    }
}
