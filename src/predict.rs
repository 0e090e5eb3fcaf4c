//! Access to the trained traffic and weather models.
//!
//! Inference itself happens behind the [`Predictor`] trait. The gateway checks
//! the shape of what comes back and turns it into plain scalars.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{Result, SignalError};
use crate::features::{AssembledRow, FeatureValue, Query, ReferenceSet};
use crate::fetch::{HttpClient, fetch_json, json_request};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionKind {
    Traffic,
    Weather,
}

impl PredictionKind {
    /// Length of the vector each model produces for one row.
    pub fn output_len(self) -> usize {
        match self {
            Self::Traffic => 1,
            Self::Weather => 4,
        }
    }

    fn path(self) -> &'static str {
        match self {
            Self::Traffic => "traffic",
            Self::Weather => "weather",
        }
    }
}

#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, kind: PredictionKind, row: &AssembledRow) -> Result<Vec<f64>>;
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    columns: &'a [String],
    rows: [&'a [FeatureValue]; 1],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PredictionBody {
    Flat(Vec<f64>),
    Nested(Vec<Vec<f64>>),
}

#[derive(Deserialize)]
struct PredictResponse {
    prediction: PredictionBody,
}

/// Calls a model-serving process over HTTP: `POST {base_url}/traffic` or
/// `/weather` with `{"columns": [...], "rows": [[...]]}`.
pub struct HttpPredictor<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> HttpPredictor<C> {
    pub fn new(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> Predictor for HttpPredictor<C> {
    async fn predict(&self, kind: PredictionKind, row: &AssembledRow) -> Result<Vec<f64>> {
        let url = format!("{}/{}", self.base_url, kind.path());
        let body = PredictRequest {
            columns: row.columns(),
            rows: [row.values()],
        };
        let req = json_request(Method::POST, &url, &body)?;
        let resp: PredictResponse = fetch_json(&self.client, req)
            .await
            .map_err(|e| SignalError::prediction(format!("{} model: {e}", kind.path())))?;

        match resp.prediction {
            PredictionBody::Flat(values) => Ok(values),
            PredictionBody::Nested(rows) => rows
                .into_iter()
                .next()
                .ok_or_else(|| SignalError::prediction("model returned no rows")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeatherForecast {
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub pressure: f64,
}

/// Resolves queries against a reference set and runs the matching model.
#[derive(Clone)]
pub struct PredictionGateway {
    predictor: Arc<dyn Predictor>,
}

impl PredictionGateway {
    pub fn new(predictor: Arc<dyn Predictor>) -> Self {
        Self { predictor }
    }

    /// Runs one prediction and checks the result has the model's shape and
    /// only finite values.
    pub async fn predict(&self, kind: PredictionKind, row: &AssembledRow) -> Result<Vec<f64>> {
        let values = self.predictor.predict(kind, row).await?;
        if values.len() != kind.output_len() {
            return Err(SignalError::prediction(format!(
                "{} model returned {} values, expected {}",
                kind.path(),
                values.len(),
                kind.output_len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SignalError::prediction(format!(
                "{} model returned a non-finite value",
                kind.path()
            )));
        }
        Ok(values)
    }

    #[instrument(skip(self, references), fields(lat = query.latitude, long = query.longitude))]
    pub async fn congestion(&self, references: &ReferenceSet, query: &Query) -> Result<f64> {
        let row = references.resolve(query)?;
        let values = self.predict(PredictionKind::Traffic, &row).await?;
        debug!(congestion = values[0], "Traffic prediction");
        Ok(values[0])
    }

    #[instrument(skip(self, references), fields(lat = query.latitude, long = query.longitude))]
    pub async fn weather(&self, references: &ReferenceSet, query: &Query) -> Result<WeatherForecast> {
        let row = references.resolve(query)?;
        let values = self.predict(PredictionKind::Weather, &row).await?;
        debug!(?values, "Weather prediction");
        Ok(WeatherForecast {
            temperature: values[0],
            humidity: values[1],
            wind_speed: values[2],
            pressure: values[3],
        })
    }
}
