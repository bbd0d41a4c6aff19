//! Pure Wallhaven REST API client.
//!
//! A minimal client for the Wallhaven v1 API. Supports searching for
//! wallpaper ids and fetching full wallpaper detail.
//!
//! # Example
//!
//! ```rust,ignore
//! use wallhaven_client::{SearchParams, WallhavenClient};
//!
//! let client = WallhavenClient::new("your-api-key", "my-bot/1.0");
//!
//! let params = SearchParams { sorting: "toplist".into(), ..Default::default() };
//! for id in client.search("1d", &params).await? {
//!     let wallpaper = client.wallpaper(&id).await?;
//!     println!("{} {}", wallpaper.id, wallpaper.resolution);
//! }
//! ```

pub mod error;
pub mod types;

pub use error::{Result, WallhavenError};
pub use types::{SearchParams, Tag, Thumbs, Uploader, Wallpaper};

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use types::{ApiResponse, SearchHit};

const BASE_URL: &str = "https://wallhaven.cc/api/v1";

const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);
const DETAIL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct WallhavenClient {
    client: reqwest::Client,
    api_key: String,
    user_agent: String,
    base_url: String,
}

impl WallhavenClient {
    pub fn new(api_key: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            user_agent: user_agent.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Use a shared HTTP client instead of a private one.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Set a custom base URL (for mirrors and tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Search one `topRange` bucket and return the wallpaper ids of the first page.
    pub async fn search(&self, top_range: &str, params: &SearchParams) -> Result<Vec<String>> {
        let url = format!("{}/search", self.base_url);
        let query = [
            ("apikey", self.api_key.as_str()),
            ("categories", params.categories.as_str()),
            ("purity", params.purity.as_str()),
            ("sorting", params.sorting.as_str()),
            ("topRange", top_range),
            ("order", params.order.as_str()),
            ("ai_art_filter", params.ai_art_filter.as_str()),
        ];

        let req = self
            .client
            .get(&url)
            .query(&query)
            .timeout(SEARCH_TIMEOUT);
        let hits: Vec<SearchHit> = self.send(req, top_range).await?;

        debug!(top_range, count = hits.len(), "Wallhaven search complete");
        Ok(hits.into_iter().map(|h| h.id).collect())
    }

    /// Fetch the full record for one wallpaper.
    pub async fn wallpaper(&self, id: &str) -> Result<Wallpaper> {
        let url = format!("{}/w/{}", self.base_url, id);
        let req = self
            .client
            .get(&url)
            .query(&[("apikey", self.api_key.as_str())])
            .timeout(DETAIL_TIMEOUT);

        self.send(req, id).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        subject: &str,
    ) -> Result<T> {
        let resp = req.header("User-Agent", &self.user_agent).send().await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(WallhavenError::NotFound(subject.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(subject, status = %status, "Wallhaven API error");
            return Err(WallhavenError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let api_resp: ApiResponse<T> = serde_json::from_str(&body)?;
        Ok(api_resp.data)
    }
}
