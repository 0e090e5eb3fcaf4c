mod client;
mod basic;
pub mod auth;

pub use client::HttpClient;
pub use basic::BasicClient;

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, SignalError};

pub fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| SignalError::invalid_data("url", format!("{url}: {e}")))
}

/// Builds a request carrying `body` as JSON.
pub fn json_request(method: Method, url: &str, body: &impl Serialize) -> Result<Request> {
    let mut req = Request::new(method, parse_url(url)?);
    *req.body_mut() = Some(serde_json::to_vec(body)?.into());
    req.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(req)
}

/// Sends `req` and decodes a successful response body as JSON.
pub async fn fetch_json<C: HttpClient + ?Sized, T: DeserializeOwned>(
    client: &C,
    req: Request,
) -> Result<T> {
    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.json().await?)
}
