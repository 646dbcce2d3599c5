use std::collections::{HashMap, HashSet};
use std::time::Instant;

use futures::future::join_all;
use tracing::{info, instrument, warn};
use url::Url;

use crate::config::SearchConfig;
use crate::constants::{DOMAIN_BLOCKLIST, QUERY_TEMPLATES};
use crate::observability::metrics::discovery as metrics;
use crate::providers::{SearchFilters, SearchHit, SearchProvider};
use crate::retry::Deadline;

/// One discovered page, carried through filtering into extraction.
#[derive(Debug, Clone)]
pub struct CandidateUrl {
    pub url: Url,
    pub domain: String,
    pub title: String,
    pub snippet: String,
    pub raw_content: Option<String>,
}

impl CandidateUrl {
    fn from_hit(hit: SearchHit) -> Option<Self> {
        let domain = hit.url.host_str()?.trim_start_matches("www.").to_string();
        Some(Self {
            url: hit.url,
            domain,
            title: hit.title,
            snippet: hit.snippet,
            raw_content: hit.raw_content,
        })
    }
}

/// Issues the fixed query-template set for a city concurrently, deduplicates
/// by URL and round-robins across domains so a handful of large sites cannot
/// crowd out smaller ones.
pub struct Discovery<'a> {
    provider: &'a dyn SearchProvider,
    config: &'a SearchConfig,
}

impl<'a> Discovery<'a> {
    pub fn new(provider: &'a dyn SearchProvider, config: &'a SearchConfig) -> Self {
        Self { provider, config }
    }

    #[instrument(skip(self, deadline), fields(city = %city))]
    pub async fn discover(
        &self,
        city: &str,
        country: &str,
        max_urls: usize,
        deadline: &Deadline,
    ) -> Vec<CandidateUrl> {
        let started = Instant::now();

        let filters = SearchFilters {
            max_results: self.config.max_results,
            exclude_domains: DOMAIN_BLOCKLIST.iter().map(|d| d.to_string()).collect(),
            country: Some(country.to_string()),
        };

        let queries: Vec<String> = QUERY_TEMPLATES
            .iter()
            .map(|template| template.replace("{city}", city))
            .collect();

        let searches = queries.iter().map(|query| {
            let filters = filters.clone();
            async move {
                let timeout = deadline.cap(self.config.query_timeout());
                match tokio::time::timeout(timeout, self.provider.search(query, &filters)).await {
                    Ok(Ok(hits)) => {
                        metrics::query_ok();
                        hits
                    }
                    Ok(Err(e)) => {
                        metrics::query_error();
                        warn!(query, error = %e, "Search query failed");
                        Vec::new()
                    }
                    Err(_) => {
                        metrics::query_error();
                        warn!(query, "Search query timed out");
                        Vec::new()
                    }
                }
            }
        });

        let hits: Vec<SearchHit> = join_all(searches).await.into_iter().flatten().collect();
        let candidates = diversify(dedupe_by_url(hits), max_urls);

        metrics::urls_found(candidates.len() as u64);
        metrics::duration(started.elapsed().as_secs_f64());
        info!(
            city,
            urls = candidates.len(),
            "Discovery completed in {:?}",
            started.elapsed()
        );
        candidates
    }
}

fn dedupe_by_url(hits: Vec<SearchHit>) -> Vec<CandidateUrl> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter_map(CandidateUrl::from_hit)
        .filter(|c| seen.insert(c.url.to_string()))
        .collect()
}

/// Round-robin across domains: one URL per domain per round, in first-seen
/// domain order, until the cap is reached.
fn diversify(candidates: Vec<CandidateUrl>, cap: usize) -> Vec<CandidateUrl> {
    let mut domain_order: Vec<String> = Vec::new();
    let mut by_domain: HashMap<String, Vec<CandidateUrl>> = HashMap::new();

    for candidate in candidates {
        if !by_domain.contains_key(&candidate.domain) {
            domain_order.push(candidate.domain.clone());
        }
        by_domain
            .entry(candidate.domain.clone())
            .or_default()
            .push(candidate);
    }

    // Queues are stacks of reversed lists so we pop from the front
    for queue in by_domain.values_mut() {
        queue.reverse();
    }

    let mut selected = Vec::new();
    while selected.len() < cap {
        let mut took_any = false;
        for domain in &domain_order {
            if selected.len() >= cap {
                break;
            }
            if let Some(candidate) = by_domain.get_mut(domain).and_then(|q| q.pop()) {
                selected.push(candidate);
                took_any = true;
            }
        }
        if !took_any {
            break;
        }
    }

    selected
}
