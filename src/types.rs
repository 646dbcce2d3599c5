use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Unverified extraction output for one event, straight from the model.
/// Ephemeral; discarded after validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub title: String,
    pub date: String,
    pub time: Option<String>,
    pub venue: String,
    pub address: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub source_url: String,
}

impl RawEvent {
    /// Domain of the page this event was extracted from, with any `www.`
    /// prefix stripped so one site maps to one yield bucket.
    pub fn domain(&self) -> String {
        Url::parse(&self.source_url)
            .ok()
            .and_then(|u| {
                u.host_str()
                    .map(|h| h.trim_start_matches("www.").to_string())
            })
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// A RawEvent that passed the deterministic date/location checks, with the
/// date parsed. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedEvent {
    pub title: String,
    pub start_date: NaiveDate,
    pub time: Option<String>,
    pub venue: String,
    pub address: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub currency: Option<String>,
    pub artists: Vec<String>,
    pub source_url: String,
}

impl ValidatedEvent {
    pub fn from_raw(raw: RawEvent, start_date: NaiveDate) -> Self {
        Self {
            title: raw.title,
            start_date,
            time: raw.time,
            venue: raw.venue,
            address: raw.address,
            category: raw.category,
            description: raw.description,
            price_min: raw.price_min,
            price_max: raw.price_max,
            currency: raw.currency,
            artists: raw.artists,
            source_url: raw.source_url,
        }
    }

    pub fn domain(&self) -> String {
        Url::parse(&self.source_url)
            .ok()
            .and_then(|u| {
                u.host_str()
                    .map(|h| h.trim_start_matches("www.").to_string())
            })
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// A ValidatedEvent enriched by the curator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEvent {
    pub event: ValidatedEvent,
    pub cultural_score: f64,
    pub originality_score: f64,
    pub category: String,
    pub highlight: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub final_score: f64,
}

/// Lifecycle status of a persisted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Active,
    Archived,
    Cancelled,
}

/// The durable event entity. Created only by the persistence gateway,
/// mutated only by duplicate merges, never hard-deleted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub id: Option<Uuid>,
    pub title: String,
    pub slug: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub venue: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city_id: Option<Uuid>,
    pub province: Option<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub artists: Vec<String>,
    pub description: Option<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub currency: Option<String>,
    pub image_url: Option<String>,
    pub source_id: Option<Uuid>,
    pub source_url: String,
    pub status: EventStatus,
    pub cultural_score: Option<f64>,
    pub originality_score: Option<f64>,
    pub final_score: Option<f64>,
    pub highlight: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A known city. Read-only to the pipeline; loaded once per run into the
/// resolver index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub id: Uuid,
    pub name: String,
    pub province: Option<String>,
    pub aliases: Vec<String>,
}

/// A named external origin of event data, with reliability and health
/// metadata. Health fields are mutated after every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Option<Uuid>,
    pub name: String,
    pub reliability: u8,
    pub active: bool,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
    pub config: serde_json::Value,
}

impl Source {
    pub fn new(name: impl Into<String>, reliability: u8) -> Self {
        Self {
            id: None,
            name: name.into(),
            reliability,
            active: true,
            last_fetch_at: None,
            last_success_at: None,
            consecutive_errors: 0,
            config: serde_json::Value::Null,
        }
    }
}

/// Terminal and in-flight states of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Success,
    Partial,
    Failed,
}

/// One log row per pipeline run, driven RUNNING -> SUCCESS | PARTIAL | FAILED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Option<Uuid>,
    pub source_id: Option<Uuid>,
    pub city: String,
    pub status: RunStatus,
    pub events_found: u32,
    pub events_created: u32,
    pub events_updated: u32,
    pub events_duplicate: u32,
    pub error_message: Option<String>,
    pub duration_ms: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(city: impl Into<String>, source_id: Option<Uuid>) -> Self {
        Self {
            id: None,
            source_id,
            city: city.into(),
            status: RunStatus::Running,
            events_found: 0,
            events_created: 0,
            events_updated: 0,
            events_duplicate: 0,
            error_message: None,
            duration_ms: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Aggregated counts a finished run reports back to its log row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunCounts {
    pub found: u32,
    pub created: u32,
    pub updated: u32,
    pub duplicate: u32,
}

/// What `run_pipeline` returns to its caller: one record per run, never an
/// error, whatever happened inside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub status: RunStatus,
    pub events_found: u32,
    pub events_created: u32,
    pub events_updated: u32,
    pub events_duplicate: u32,
    pub duration_ms: u64,
    pub error_message: Option<String>,
}

/// Per-item result of the persistence gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Created,
    Updated,
    Duplicate,
    Skipped(String),
}

/// Store query filter for dedup candidate lookup.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    pub city_id: Option<Uuid>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub status: EventStatus,
    pub limit: usize,
}
