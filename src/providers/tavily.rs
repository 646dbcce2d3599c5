use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{SearchFilters, SearchHit, SearchProvider};
use crate::error::{PipelineError, Result};

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// Tavily-backed search provider.
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
}

impl TavilySearch {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    /// Reads `TAVILY_API_KEY` from the environment.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("TAVILY_API_KEY")?;
        Ok(Self::new(api_key))
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
    include_raw_content: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    exclude_domains: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    country: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    raw_content: Option<String>,
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str, filters: &SearchFilters) -> Result<Vec<SearchHit>> {
        let request = SearchRequest {
            query,
            search_depth: "basic",
            max_results: filters.max_results,
            include_raw_content: true,
            exclude_domains: filters.exclude_domains.clone(),
            country: filters.country.clone(),
        };

        let response = self
            .client
            .post(TAVILY_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Search(format!(
                "Tavily returned {}: {}",
                status, body
            )));
        }

        let parsed: SearchResponse = response.json().await?;
        let hits: Vec<SearchHit> = parsed
            .results
            .into_iter()
            .filter_map(|r| {
                let url = Url::parse(&r.url).ok()?;
                Some(SearchHit {
                    url,
                    title: r.title,
                    snippet: r.content,
                    raw_content: r.raw_content,
                })
            })
            .collect();

        debug!(query, hits = hits.len(), "Tavily search completed");
        Ok(hits)
    }
}
