//! Application-wide state, loaded once at startup and shared read-only by
//! every request.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::aqi::{AqiSource, OpenWeatherAqi, UnconfiguredAqi};
use crate::config::Settings;
use crate::error::Result;
use crate::features::{Query, ReferenceSet};
use crate::fetch::BasicClient;
use crate::fleet::{CityAllocation, FleetAllocationEngine};
use crate::narrative::{
    self, FLEET_SYSTEM_PROMPT, OpenRouterSummarizer, ROUTE_SYSTEM_PROMPT, Summarizer,
};
use crate::predict::{HttpPredictor, PredictionGateway, WeatherForecast};
use crate::route::{PlaceDirectory, RouteBook, RouteQualityAggregator, RouteStop};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityRecommendation {
    pub city: String,
    pub recommended_buses: i64,
}

impl From<&CityAllocation> for CityRecommendation {
    fn from(allocation: &CityAllocation) -> Self {
        Self {
            city: allocation.city.clone(),
            recommended_buses: allocation.scaled_recommended,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetRecommendation {
    pub recommendations: Vec<CityRecommendation>,
    pub dialogue: String,
}

pub struct AppContext {
    pub traffic: ReferenceSet,
    pub weather: ReferenceSet,
    pub fleet: FleetAllocationEngine,
    pub routes: RouteBook,
    pub places: PlaceDirectory,
    pub gateway: PredictionGateway,
    pub aqi: Box<dyn AqiSource>,
    pub summarizer: Option<Box<dyn Summarizer>>,
}

impl AppContext {
    /// Reads every static table and wires the HTTP collaborators.
    pub fn load(settings: &Settings) -> Result<Self> {
        let data = &settings.data;
        let traffic = ReferenceSet::load(&data.traffic_features, Some(data.traffic_locations.as_path()))?;
        let weather = ReferenceSet::load(&data.weather_features, Some(data.weather_locations.as_path()))?;
        let fleet = FleetAllocationEngine::load(&data.fleet_history)?;
        let routes = RouteBook::load_csv(&data.routes)?;
        let places = PlaceDirectory::load_csv(&data.places)?;

        let predictor = HttpPredictor::new(
            BasicClient::with_timeout(settings.http_timeout)?,
            settings.predictor_url.clone(),
        );

        let aqi: Box<dyn AqiSource> = match &settings.aqi_api_key {
            Some(key) => Box::new(OpenWeatherAqi::new(
                BasicClient::with_timeout(settings.http_timeout)?,
                key.clone(),
                settings.aqi_api_url.clone(),
            )),
            None => {
                warn!("AQI_API_KEY not set, air quality will use the fallback value");
                Box::new(UnconfiguredAqi)
            }
        };

        let summarizer: Option<Box<dyn Summarizer>> = match &settings.openrouter_api_key {
            Some(key) => Some(Box::new(
                OpenRouterSummarizer::new(
                    BasicClient::with_timeout(settings.http_timeout)?,
                    key.clone(),
                    settings.openrouter_url.clone(),
                    settings.openrouter_model.clone(),
                )
                .with_fallback_models(settings.openrouter_fallback_models.clone()),
            )),
            None => {
                warn!("OPENROUTER_API_KEY not set, summaries will use the fallback text");
                None
            }
        };

        info!(
            traffic_points = traffic.index.len(),
            weather_points = weather.index.len(),
            "Application context loaded"
        );

        Ok(Self {
            traffic,
            weather,
            fleet,
            routes,
            places,
            gateway: PredictionGateway::new(Arc::new(predictor)),
            aqi,
            summarizer,
        })
    }

    pub async fn congestion(&self, query: &Query) -> Result<f64> {
        self.gateway.congestion(&self.traffic, query).await
    }

    pub async fn weather(&self, query: &Query) -> Result<WeatherForecast> {
        self.gateway.weather(&self.weather, query).await
    }

    #[instrument(skip(self))]
    pub async fn fleet_size(&self, month: u32) -> Result<FleetRecommendation> {
        let allocations = self.fleet.recommend(month)?;
        Ok(self.fleet_recommendation(month, &allocations).await)
    }

    /// Turns an allocation already computed for `month` into the per-city
    /// response plus its summary.
    pub async fn fleet_recommendation(
        &self,
        month: u32,
        allocations: &[CityAllocation],
    ) -> FleetRecommendation {
        let prompt = narrative::fleet_dialogue(month, allocations);
        let dialogue =
            narrative::summarize_or_fallback(self.summarizer.as_deref(), FLEET_SYSTEM_PROMPT, &prompt)
                .await;
        FleetRecommendation {
            recommendations: allocations.iter().map(CityRecommendation::from).collect(),
            dialogue,
        }
    }

    pub fn route_aggregator(&self) -> RouteQualityAggregator<'_> {
        RouteQualityAggregator {
            routes: &self.routes,
            places: &self.places,
            traffic: &self.traffic,
            gateway: &self.gateway,
            aqi: self.aqi.as_ref(),
        }
    }

    pub async fn route_readings(&self, route_id: &str) -> Result<Vec<RouteStop>> {
        self.route_aggregator().evaluate(route_id).await
    }

    /// Evaluates the route and asks the summarizer whether it should be run
    /// as scheduled.
    #[instrument(skip(self))]
    pub async fn pickup_recommendation(&self, route_id: &str) -> Result<String> {
        let stops = self.route_readings(route_id).await?;
        let prompt = narrative::route_dialogue(&stops);
        Ok(
            narrative::summarize_or_fallback(self.summarizer.as_deref(), ROUTE_SYSTEM_PROMPT, &prompt)
                .await,
        )
    }
}
