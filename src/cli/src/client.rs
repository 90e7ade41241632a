//! HTTP client for the Taskhive API server.

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Error payload returned by the server on failure.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorInfo,
}

#[derive(Debug, Deserialize)]
struct ErrorInfo {
    code: String,
    numeric_code: u32,
    message: String,
}

/// HTTP client for the Taskhive API.
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

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` with `query` and deserialize the body.
    pub async fn get<Q: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, query: &Q) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        Self::decode(resp, &url).await
    }

    /// POST a form-encoded body to `path` with `query` and deserialize the body.
    pub async fn post_form<Q, F, T>(&self, path: &str, query: &Q, form: &F) -> Result<T>
    where
        Q: Serialize + ?Sized,
        F: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .query(query)
            .form(form)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        Self::decode(resp, &url).await
    }

    /// GET `path` and return the JSON body whatever the status.
    ///
    /// `/health` answers 503 with a report when the dispatcher is down.
    pub async fn get_raw(&self, path: &str) -> Result<(u16, serde_json::Value)> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = resp.status().as_u16();
        let body = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))?;
        Ok((status, body))
    }

    async fn decode<T: DeserializeOwned>(resp: Response, url: &str) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return match serde_json::from_str::<ErrorBody>(&body) {
                Ok(err) => Err(anyhow::anyhow!(
                    "{} ({} {}): {}",
                    status,
                    err.error.code,
                    err.error.numeric_code,
                    err.error.message
                )),
                Err(_) => Err(anyhow::anyhow!("API error ({}): {}", status, body)),
            };
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}
