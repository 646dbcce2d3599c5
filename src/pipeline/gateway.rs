use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::constants::{
    CATEGORIES, DEFAULT_CATEGORY, SLUG_MAX_CHARS, SLUG_PROBE_LIMIT, SLUG_RANDOM_SUFFIX_LEN,
    STALE_RUN_MINUTES,
};
use crate::error::{PipelineError, Result};
use crate::observability::metrics::persist as metrics;
use crate::pipeline::city_resolver::CityResolver;
use crate::pipeline::dedup;
use crate::storage::{EventStore, FetchOutcome};
use crate::text::TextUtils;
use crate::types::{
    CanonicalEvent, EventStatus, PersistOutcome, PipelineRun, RunCounts, RunStatus, ScoredEvent,
    Source,
};

// Keyword table for auto-categorization when neither extraction nor
// curation produced a category.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("musica", &["recital", "concierto", "banda", "festival", "dj", "pena", "milonga"]),
    ("teatro", &["obra", "teatro", "funcion", "drama", "comedia"]),
    ("arte", &["muestra", "exposicion", "galeria", "vernissage"]),
    ("cine", &["cine", "pelicula", "proyeccion", "documental"]),
    ("literatura", &["libro", "lectura", "poesia", "escritor"]),
    ("danza", &["danza", "ballet", "folklore"]),
    ("gastronomia", &["gastronomia", "degustacion", "cocina", "food"]),
    ("feria", &["feria", "mercado", "emprendedores"]),
];

fn auto_categorize(event: &ScoredEvent) -> String {
    let text = TextUtils::normalize(&format!(
        "{} {}",
        event.event.title,
        event.event.description.as_deref().unwrap_or("")
    ));
    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|k| text.contains(k)) {
            return category.to_string();
        }
    }
    DEFAULT_CATEGORY.to_string()
}

/// The only component that writes to the store: per-event persistence,
/// slug uniqueness, source health and the run-log state machine.
pub struct Gateway {
    store: Arc<dyn EventStore>,
    resolver: Arc<CityResolver>,
    stale_after_minutes: i64,
}

impl Gateway {
    pub fn new(store: Arc<dyn EventStore>, resolver: Arc<CityResolver>) -> Self {
        Self {
            store,
            resolver,
            stale_after_minutes: STALE_RUN_MINUTES,
        }
    }

    pub fn with_stale_after_minutes(mut self, minutes: i64) -> Self {
        self.stale_after_minutes = minutes;
        self
    }

    /// Persist one scored event. Returns the per-item outcome; Err only on
    /// unexpected store failures.
    #[instrument(skip(self, event, source), fields(title = %event.event.title))]
    pub async fn process(
        &self,
        event: &ScoredEvent,
        source: &Source,
        city: &str,
        today: NaiveDate,
    ) -> Result<PersistOutcome> {
        if event.event.title.trim().is_empty() {
            metrics::skipped();
            return Ok(PersistOutcome::Skipped("empty title".to_string()));
        }
        if event.event.start_date < today {
            metrics::skipped();
            return Ok(PersistOutcome::Skipped("past start date".to_string()));
        }

        let city_id = self.resolver.resolve(city).await?;

        let check = dedup::find_duplicate(self.store.as_ref(), &event.event, city_id).await?;
        if let Some(existing) = check.existing {
            let existing_reliability = match existing.source_id {
                Some(id) => self
                    .store
                    .find_source(id)
                    .await?
                    .map(|s| s.reliability)
                    .unwrap_or(0),
                None => 0,
            };

            let merged = dedup::merge_events(
                &existing,
                &event.event,
                &event.tags,
                source.id,
                source.reliability,
                existing_reliability,
            );

            if dedup::has_changes(&existing, &merged) {
                self.store.update_event(&merged).await?;
                metrics::updated();
                debug!(slug = %merged.slug, score = check.score, "Merged into existing event");
                return Ok(PersistOutcome::Updated);
            }
            metrics::duplicate();
            return Ok(PersistOutcome::Duplicate);
        }

        let category = if CATEGORIES.contains(&event.category.as_str()) {
            event.category.clone()
        } else {
            auto_categorize(event)
        };

        let province = match city_id {
            Some(id) => self.resolver.city(id).await?.and_then(|c| c.province),
            None => None,
        };

        let slug = self
            .unique_slug(&event.event.title, Some(event.event.start_date))
            .await?;

        let now = Utc::now();
        let mut canonical = CanonicalEvent {
            id: None,
            title: event.event.title.clone(),
            slug,
            start_date: event.event.start_date,
            end_date: None,
            venue: event.event.venue.clone(),
            address: event.event.address.clone(),
            latitude: None,
            longitude: None,
            city_id,
            province,
            category,
            tags: event.tags.clone(),
            artists: event.event.artists.clone(),
            description: event.event.description.clone(),
            price_min: event.event.price_min,
            price_max: event.event.price_max,
            currency: event.event.currency.clone(),
            image_url: None,
            source_id: source.id,
            source_url: event.event.source_url.clone(),
            status: EventStatus::Active,
            cultural_score: Some(event.cultural_score),
            originality_score: Some(event.originality_score),
            final_score: Some(event.final_score),
            highlight: if event.highlight.is_empty() {
                None
            } else {
                Some(event.highlight.clone())
            },
            created_at: now,
            updated_at: now,
        };

        self.store.create_event(&mut canonical).await?;
        metrics::created();
        debug!(slug = %canonical.slug, "Created event");
        Ok(PersistOutcome::Created)
    }

    /// Unique slug for a title and optional date: normalized base, ISO date
    /// suffix, truncation at a hyphen boundary, then collision probes
    /// `-2`, `-3`, ... and a random suffix as last resort.
    pub async fn unique_slug(&self, title: &str, date: Option<NaiveDate>) -> Result<String> {
        let mut base = TextUtils::slug_base(title);
        if base.is_empty() {
            base = "evento".to_string();
        }
        if let Some(date) = date {
            base = format!("{}-{}", base, date.format("%Y-%m-%d"));
        }
        let base = truncate_at_hyphen(&base, SLUG_MAX_CHARS);

        if self.store.find_event_by_slug(&base).await?.is_none() {
            return Ok(base);
        }

        for n in 2..=SLUG_PROBE_LIMIT {
            let candidate = format!("{}-{}", base, n);
            if self.store.find_event_by_slug(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }

        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SLUG_RANDOM_SUFFIX_LEN)
            .map(char::from)
            .collect();
        Ok(format!("{}-{}", base, suffix.to_lowercase()))
    }

    /// Stamp source health after a run.
    pub async fn record_source_outcome(&self, source: &Source, outcome: FetchOutcome) -> Result<()> {
        if let Some(id) = source.id {
            self.store.upsert_source_health(id, outcome).await?;
        }
        Ok(())
    }

    /// Start the run-log state machine for a city: auto-fail stale Running
    /// rows, reject when a fresh one exists, then insert a Running row.
    pub async fn begin_run(&self, city: &str, source_id: Option<Uuid>) -> Result<PipelineRun> {
        if self.is_running(city).await? {
            warn!(city, "Pipeline already running");
            return Err(PipelineError::AlreadyRunning(city.to_string()));
        }

        let mut run = PipelineRun::new(city, source_id);
        self.store.create_run_log(&mut run).await?;
        info!(city, run_id = ?run.id, "Run started");
        Ok(run)
    }

    /// "Is something already running for this city?" — auto-fails stale
    /// Running rows (crashed runs) before answering.
    pub async fn is_running(&self, city: &str) -> Result<bool> {
        let cutoff = Utc::now() - Duration::minutes(self.stale_after_minutes);
        for mut stale in self.store.find_stale_running_logs(city, cutoff).await? {
            warn!(city, run_id = ?stale.id, "Auto-failing stale run");
            stale.status = RunStatus::Failed;
            stale.error_message = Some("stale: presumed crashed".to_string());
            stale.finished_at = Some(Utc::now());
            self.store.update_run_log(&stale).await?;
        }

        Ok(self.store.find_running_log(city).await?.is_some())
    }

    /// Transition a Running row to its terminal state. Called exactly once
    /// per run by the orchestrator.
    pub async fn finish_run(
        &self,
        mut run: PipelineRun,
        status: RunStatus,
        counts: RunCounts,
        error_message: Option<String>,
        duration_ms: u64,
    ) -> Result<()> {
        run.status = status;
        run.events_found = counts.found;
        run.events_created = counts.created;
        run.events_updated = counts.updated;
        run.events_duplicate = counts.duplicate;
        run.error_message = error_message;
        run.duration_ms = Some(duration_ms);
        run.finished_at = Some(Utc::now());
        self.store.update_run_log(&run).await?;
        info!(city = %run.city, ?status, duration_ms, "Run finished");
        Ok(())
    }
}

fn truncate_at_hyphen(slug: &str, max_chars: usize) -> String {
    if slug.chars().count() <= max_chars {
        return slug.to_string();
    }
    let cut: String = slug.chars().take(max_chars).collect();
    match cut.rfind('-') {
        Some(pos) if pos > 0 => cut[..pos].to_string(),
        _ => cut,
    }
}
