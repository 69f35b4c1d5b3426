//! HTTP client for the nursery REST API
//!
//! Every call returns an [`ApiResponse`] whatever the status code: 401/403/404
//! are expected answers in permission and cleanup checks, so only transport
//! failures surface as errors.

use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::{Credentials, E2eConfig};
use crate::error::E2eResult;

/// Status and parsed body of one API call
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON body, `Null` when empty or not JSON
    pub body: Value,
    /// Raw body text, kept for diagnostics
    pub text: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_denied(&self) -> bool {
        self.status == 401 || self.status == 403
    }

    /// Integer `id` of a created or fetched entity
    pub fn id(&self) -> Option<i64> {
        self.body.get("id").and_then(Value::as_i64)
    }

    /// Non-empty `token` field of a login response
    pub fn token(&self) -> Option<&str> {
        self.body
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
    }

    /// Shortened body text for log lines and error messages
    pub fn snippet(&self) -> String {
        snippet(&self.text, 300)
    }
}

/// Truncate `text` to at most `max` characters
pub(crate) fn snippet(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max).collect();
        format!("{}…", cut)
    }
}

/// Thin reqwest wrapper bound to one application base URL
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> E2eResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &E2eConfig) -> E2eResult<Self> {
        Self::new(config.base_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a request; `path` is relative to the base URL and may carry a query
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> E2eResult<ApiResponse> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method.clone(), &url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::Null)
        };

        debug!("{} {} -> {}", method, path, status);
        Ok(ApiResponse { status, body, text })
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> E2eResult<ApiResponse> {
        self.send(Method::GET, path, token, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> E2eResult<ApiResponse> {
        self.send(Method::POST, path, token, body).await
    }

    pub async fn put(
        &self,
        path: &str,
        token: Option<&str>,
        body: &Value,
    ) -> E2eResult<ApiResponse> {
        self.send(Method::PUT, path, token, Some(body)).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> E2eResult<ApiResponse> {
        self.send(Method::DELETE, path, token, None).await
    }

    /// POST /api/auth/login
    pub async fn login(&self, credentials: &Credentials) -> E2eResult<ApiResponse> {
        let body = json!({
            "username": credentials.username,
            "password": credentials.password,
        });
        self.post("/api/auth/login", None, Some(&body)).await
    }
}
