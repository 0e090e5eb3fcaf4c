//! JSON HTTP surface over the application context.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::context::{AppContext, FleetRecommendation};
use crate::error::{Result, SignalError};
use crate::features::Query;
use crate::predict::WeatherForecast;
use crate::route::RouteStop;

type SharedContext = Arc<AppContext>;

/// Every core failure surfaces as a 500 with a `detail` message.
#[derive(Debug)]
pub struct ApiError(SignalError);

impl From<SignalError> for ApiError {
    fn from(e: SignalError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": self.0.to_string() })),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct CongestionResponse {
    pub congestion_index: Vec<f64>,
}

#[derive(Debug, Deserialize)]
pub struct MonthRequest {
    pub month: u32,
}

#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    pub route_id: String,
}

#[derive(Debug, Serialize)]
pub struct PickupResponse {
    pub recommendations: String,
}

pub fn router(ctx: SharedContext) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/predict/trafficCongestion", post(predict_congestion))
        .route("/predict/weatherPred", post(predict_weather))
        .route("/recommend/fleetsize", post(recommend_fleet_size))
        .route("/recommend/trashpickup", post(recommend_trash_pickup))
        .route("/predict/AQI_TC", post(route_air_quality))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Binds `addr` and serves until the process is stopped.
pub async fn serve(ctx: SharedContext, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn predict_congestion(
    State(ctx): State<SharedContext>,
    Json(query): Json<Query>,
) -> ApiResult<CongestionResponse> {
    let index = ctx.congestion(&query).await?;
    Ok(Json(CongestionResponse {
        congestion_index: vec![index],
    }))
}

pub async fn predict_weather(
    State(ctx): State<SharedContext>,
    Json(query): Json<Query>,
) -> ApiResult<WeatherForecast> {
    Ok(Json(ctx.weather(&query).await?))
}

pub async fn recommend_fleet_size(
    State(ctx): State<SharedContext>,
    Json(req): Json<MonthRequest>,
) -> ApiResult<FleetRecommendation> {
    Ok(Json(ctx.fleet_size(req.month).await?))
}

pub async fn recommend_trash_pickup(
    State(ctx): State<SharedContext>,
    Json(req): Json<RouteRequest>,
) -> ApiResult<PickupResponse> {
    let recommendations = ctx.pickup_recommendation(&req.route_id).await?;
    Ok(Json(PickupResponse { recommendations }))
}

pub async fn route_air_quality(
    State(ctx): State<SharedContext>,
    Json(req): Json<RouteRequest>,
) -> ApiResult<Vec<RouteStop>> {
    Ok(Json(ctx.route_readings(&req.route_id).await?))
}
