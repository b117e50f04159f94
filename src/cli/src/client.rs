//! HTTP client for the Codetrail API server.

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// API response wrapper matching the server's ApiResponse format.
#[derive(Debug, serde::Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

/// HTTP client for the Codetrail API.
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client pointing at the given base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Return the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET and unwrap the response data. `None` when the server answered
    /// 204, meaning a newer request for the same timeline took over.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = self.url(path);
        self.send("GET", &url, self.client.get(&url)).await
    }

    /// POST a JSON body and unwrap the response data.
    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<Option<T>> {
        let url = self.url(path);
        self.send("POST", &url, self.client.post(&url).json(body)).await
    }

    /// Perform a raw GET request and return the full JSON value (for health endpoint).
    pub async fn get_raw(&self, path: &str) -> Result<serde_json::Value> {
        let url = self.url(path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        // A degraded server still describes itself.
        if !resp.status().is_success() && resp.status() != StatusCode::SERVICE_UNAVAILABLE {
            return Err(api_error(resp).await);
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    /// GET a plain-text body.
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let url = self.url(path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        resp.text()
            .await
            .with_context(|| format!("Failed to read response from {}", url))
    }

    async fn send<T: DeserializeOwned>(&self, method: &str, url: &str, request: RequestBuilder) -> Result<Option<T>> {
        let resp = request
            .send()
            .await
            .with_context(|| format!("{} {} failed", method, url))?;

        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let api_resp: ApiResponse<T> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))?;

        if api_resp.success {
            api_resp
                .data
                .map(Some)
                .ok_or_else(|| anyhow::anyhow!("API returned success but no data"))
        } else {
            Err(anyhow::anyhow!(
                "API error: {}",
                api_resp.error.unwrap_or_else(|| "Unknown error".into())
            ))
        }
    }
}

/// Turn a non-success response into an error, preferring the server's
/// structured message.
async fn api_error(resp: Response) -> anyhow::Error {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiResponse<serde_json::Value>>(&body) {
        Ok(ApiResponse {
            error: Some(message),
            error_code,
            ..
        }) => match error_code {
            Some(code) => anyhow::anyhow!("API error ({}, {}): {}", status, code, message),
            None => anyhow::anyhow!("API error ({}): {}", status, message),
        },
        _ => anyhow::anyhow!("API error ({}): {}", status, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ApiClient::new("http://localhost:8080/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/health"), "http://localhost:8080/health");
    }

    #[test]
    fn test_error_envelope_parses() {
        let body = r#"{"success":false,"error":"Timeline not found","error_code":"RECORD_NOT_FOUND"}"#;
        let parsed: ApiResponse<serde_json::Value> = serde_json::from_str(body).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error_code.as_deref(), Some("RECORD_NOT_FOUND"));
        assert!(parsed.data.is_none());
    }
}
