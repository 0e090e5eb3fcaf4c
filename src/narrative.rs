//! Free-text summaries of recommendations via an LLM chat-completions API.
//!
//! Summaries are best effort: any failure is logged and replaced by
//! [`SUMMARY_FALLBACK`].

use std::fmt::Write;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SignalError};
use crate::fetch::auth::ApiKey;
use crate::fetch::{HttpClient, fetch_json, json_request};
use crate::fleet::CityAllocation;
use crate::route::RouteStop;

pub const SUMMARY_FALLBACK: &str = "Error fetching the response";

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

pub const FLEET_SYSTEM_PROMPT: &str = "You are a mediator. You need to rephrase the context given in a manner that these are recommendations for the new bus allotments which will make it more sustainable.";

pub const ROUTE_SYSTEM_PROMPT: &str = "You are an expert in environmental route optimization.";

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, system: &str, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    models: &'a [String],
    messages: [ChatMessage<'a>; 2],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

pub struct OpenRouterSummarizer<C> {
    client: ApiKey<C>,
    url: String,
    model: String,
    fallback_models: Vec<String>,
}

impl<C: HttpClient> OpenRouterSummarizer<C> {
    pub fn new(client: C, api_key: String, url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: ApiKey::bearer(client, api_key),
            url: url.into(),
            model: model.into(),
            fallback_models: Vec::new(),
        }
    }

    /// Models OpenRouter may route to when the primary one is unavailable.
    pub fn with_fallback_models(mut self, models: Vec<String>) -> Self {
        self.fallback_models = models;
        self
    }
}

#[async_trait]
impl<C: HttpClient> Summarizer for OpenRouterSummarizer<C> {
    async fn summarize(&self, system: &str, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            models: &self.fallback_models,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };
        let req = json_request(Method::POST, &self.url, &body)?;
        let resp: ChatResponse = fetch_json(&self.client, req).await?;
        resp.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| SignalError::invalid_data("chat completion", "no message content"))
    }
}

/// Summarizes `prompt`, falling back to [`SUMMARY_FALLBACK`] when no
/// summarizer is configured or the call fails.
pub async fn summarize_or_fallback(
    summarizer: Option<&dyn Summarizer>,
    system: &str,
    prompt: &str,
) -> String {
    let Some(summarizer) = summarizer else {
        warn!("No summarizer configured, using fallback text");
        return SUMMARY_FALLBACK.to_string();
    };
    match summarizer.summarize(system, prompt).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Summary request failed, using fallback text");
            SUMMARY_FALLBACK.to_string()
        }
    }
}

fn month_name(month: u32) -> String {
    u8::try_from(month)
        .ok()
        .and_then(|m| chrono::Month::try_from(m).ok())
        .map(|m| m.name().to_string())
        .unwrap_or_else(|| month.to_string())
}

/// Plain-text description of a fleet allocation, used as the summary prompt.
pub fn fleet_dialogue(month: u32, allocations: &[CityAllocation]) -> String {
    let mut dialogue = format!(
        "Based on your input for month {}, here are the bus distribution recommendations:\n",
        month_name(month)
    );
    for allocation in allocations {
        let _ = writeln!(
            dialogue,
            "In {}, it is recommended to deploy {} buses.",
            allocation.city, allocation.scaled_recommended
        );
    }
    dialogue
}

/// Route-analysis prompt listing every stop's AQI and congestion, or its error.
pub fn route_dialogue(stops: &[RouteStop]) -> String {
    let mut dialogue = String::from(
        "You are a route optimization assistant for waste management. \
         You are given a list of pickup places along with their AQI (Air Quality Index) and Traffic Congestion level.\n\
         - AQI scale: 1 (Good) to 5 (Very Poor)\n\
         - Traffic Congestion: 1 (Smooth) to 5 (Heavily Congested)\n\n\
         Your task:\n\
         1. Determine if the pickup route is acceptable as-is.\n\
         2. If not, list places that should be avoided and explain why.\n\
         3. Provide a summary at the beginning.\n\n\
         Here is the data:\n",
    );
    for stop in stops {
        match (&stop.error, stop.aqi, stop.congestion) {
            (Some(error), _, _) => {
                let _ = writeln!(dialogue, "- {}: Error - {}", stop.place, error);
            }
            (None, Some(aqi), Some(congestion)) => {
                let _ = writeln!(
                    dialogue,
                    "- {}: AQI = {}, Traffic Congestion = {}",
                    stop.place, aqi, congestion
                );
            }
            _ => {}
        }
    }
    dialogue
}
