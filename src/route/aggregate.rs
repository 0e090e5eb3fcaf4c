use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::book::{RouteBook, ScheduledStop};
use super::places::PlaceDirectory;
use crate::aqi::AqiSource;
use crate::error::Result;
use crate::features::{Query, ReferenceSet};
use crate::geo_index::Coordinate;
use crate::predict::PredictionGateway;

/// Value substituted for a congestion or AQI reading that could not be obtained.
pub const FALLBACK_READING: f64 = 1.0;

/// A per-stop signal: either what the collaborator reported, or the fallback
/// together with the reason it was needed.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Measured(f64),
    Fallback { value: f64, cause: String },
}

impl Reading {
    pub fn from_result(result: Result<f64>, fallback: f64) -> Self {
        match result {
            Ok(value) => Self::Measured(value),
            Err(e) => Self::Fallback {
                value: fallback,
                cause: e.to_string(),
            },
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Self::Measured(value) | Self::Fallback { value, .. } => *value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStop {
    pub place: String,
    pub pickup_time: String,
    pub aqi: Option<f64>,
    #[serde(rename = "tc")]
    pub congestion: Option<f64>,
    pub error: Option<String>,
    /// Signals that fell back, as `"<signal>: <cause>"`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<String>,
}

impl RouteStop {
    pub fn unresolved(place: String, pickup_time: String, error: impl Into<String>) -> Self {
        Self {
            place,
            pickup_time,
            aqi: None,
            congestion: None,
            error: Some(error.into()),
            fallbacks: Vec::new(),
        }
    }

    fn scored(place: String, pickup_time: String, aqi: Reading, congestion: Reading) -> Self {
        let fallbacks = [("aqi", &aqi), ("congestion", &congestion)]
            .into_iter()
            .filter_map(|(signal, reading)| match reading {
                Reading::Fallback { cause, .. } => Some(format!("{signal}: {cause}")),
                Reading::Measured(_) => None,
            })
            .collect();
        Self {
            place,
            pickup_time,
            aqi: Some(aqi.value()),
            congestion: Some(congestion.value()),
            error: None,
            fallbacks,
        }
    }
}

/// Scores every stop of a route. Borrowed from the application context for
/// the duration of one request.
pub struct RouteQualityAggregator<'a> {
    pub routes: &'a RouteBook,
    pub places: &'a PlaceDirectory,
    pub traffic: &'a ReferenceSet,
    pub gateway: &'a PredictionGateway,
    pub aqi: &'a dyn AqiSource,
}

impl RouteQualityAggregator<'_> {
    /// Evaluates the route using the current local time for congestion.
    pub async fn evaluate(&self, route_id: &str) -> Result<Vec<RouteStop>> {
        self.evaluate_at(route_id, Local::now().naive_local()).await
    }

    /// Evaluates each stop in route order. A stop whose place has no
    /// coordinates carries an error; a failed congestion or AQI lookup falls
    /// back to [`FALLBACK_READING`]. Neither aborts the route.
    #[instrument(skip(self))]
    pub async fn evaluate_at(&self, route_id: &str, now: NaiveDateTime) -> Result<Vec<RouteStop>> {
        let scheduled = self.routes.stops(route_id)?;

        let mut stops = Vec::with_capacity(scheduled.len());
        for stop in scheduled {
            stops.push(self.evaluate_stop(stop, now).await);
        }

        let unresolved = stops.iter().filter(|s| s.error.is_some()).count();
        let degraded = stops.iter().filter(|s| !s.fallbacks.is_empty()).count();
        info!(stops = stops.len(), unresolved, degraded, "Route evaluated");
        Ok(stops)
    }

    async fn evaluate_stop(&self, stop: &ScheduledStop, now: NaiveDateTime) -> RouteStop {
        let coordinate = match self.places.resolve(&stop.place) {
            Ok(coordinate) => coordinate,
            Err(e) => {
                warn!(place = %stop.place, "Stop has no coordinates");
                return RouteStop::unresolved(stop.place.clone(), stop.pickup_time.clone(), e.to_string());
            }
        };

        let congestion = Reading::from_result(self.congestion_at(coordinate, now).await, FALLBACK_READING);
        let aqi = Reading::from_result(
            self.aqi.fetch_aqi(coordinate).await.map(f64::from),
            FALLBACK_READING,
        );

        for (signal, reading) in [("congestion", &congestion), ("aqi", &aqi)] {
            if let Reading::Fallback { cause, .. } = reading {
                warn!(place = %stop.place, signal, cause = %cause, "Using fallback reading");
            }
        }

        RouteStop::scored(stop.place.clone(), stop.pickup_time.clone(), aqi, congestion)
    }

    async fn congestion_at(&self, at: Coordinate, now: NaiveDateTime) -> Result<f64> {
        let query = Query {
            latitude: at.latitude,
            longitude: at.longitude,
            hour: now.hour(),
            month: now.month(),
            day: now.day(),
        };
        self.gateway.congestion(self.traffic, &query).await
    }
}
