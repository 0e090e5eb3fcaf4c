use async_trait::async_trait;
use reqwest::{Request, Response};

use crate::error::Result;

/// Executes a prepared request. Implementations may decorate the request
/// (credentials, query parameters) before delegating.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> Result<Response>;
}
