pub mod openai;
pub mod tavily;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::Result;

pub use openai::OpenAiModel;
pub use tavily::TavilySearch;

/// One result from the search provider.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub url: Url,
    pub title: String,
    pub snippet: String,
    pub raw_content: Option<String>,
}

/// Provider-side knobs for a single search call.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub max_results: usize,
    pub exclude_domains: Vec<String>,
    pub country: Option<String>,
}

/// Web search abstraction used by URL discovery.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, filters: &SearchFilters) -> Result<Vec<SearchHit>>;
}

/// Structured-output model abstraction shared by the extractor and the
/// curator; both make the same call with different schemas.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate_structured(
        &self,
        system: &str,
        user: &str,
        schema: &Value,
        temperature: f32,
    ) -> Result<Value>;
}
