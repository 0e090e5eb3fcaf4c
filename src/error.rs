//! Failure taxonomy shared by every core component.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SignalError>;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("no reference points loaded")]
    NoReferenceData,

    #[error("no feature data found for location ({latitude}, {longitude})")]
    FeatureNotFound { latitude: f64, longitude: f64 },

    #[error("prediction failed: {message}")]
    Prediction { message: String },

    #[error("no historical data for month {month}")]
    NoHistoricalData { month: u32 },

    #[error("degenerate allocation for month {month}: {reason}")]
    DegenerateAllocation { month: u32, reason: String },

    #[error("coordinates not found for place '{place}'")]
    UnresolvedPlace { place: String },

    #[error("unknown route '{route_id}'")]
    UnknownRoute { route_id: String },

    #[error("invalid data in {source_name}: {message}")]
    InvalidData { source_name: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SignalError {
    pub fn prediction(message: impl Into<String>) -> Self {
        Self::Prediction {
            message: message.into(),
        }
    }

    pub fn invalid_data(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidData {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}
