use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::types::{CandidateFilter, CanonicalEvent, City, PipelineRun, RunStatus, Source};

/// How a run went from the source's point of view, for health bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Success,
    Failure,
}

/// Store operations the pipeline needs. Relational implementations live
/// outside the core; the in-memory one below backs the CLI and all tests.
#[async_trait]
pub trait EventStore: Send + Sync {
    // City operations
    async fn find_cities_with_aliases(&self) -> Result<Vec<City>>;

    // Event operations
    async fn find_candidate_events(&self, filter: &CandidateFilter)
        -> Result<Vec<CanonicalEvent>>;
    async fn create_event(&self, event: &mut CanonicalEvent) -> Result<()>;
    async fn update_event(&self, event: &CanonicalEvent) -> Result<()>;
    async fn find_event_by_slug(&self, slug: &str) -> Result<Option<CanonicalEvent>>;

    // Source operations
    async fn find_source(&self, id: Uuid) -> Result<Option<Source>>;
    async fn upsert_source_health(&self, id: Uuid, outcome: FetchOutcome) -> Result<()>;

    // Run log operations
    async fn create_run_log(&self, run: &mut PipelineRun) -> Result<()>;
    async fn update_run_log(&self, run: &PipelineRun) -> Result<()>;
    async fn find_running_log(&self, city: &str) -> Result<Option<PipelineRun>>;
    async fn find_stale_running_logs(
        &self,
        city: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PipelineRun>>;
}

/// In-memory store implementation for development and testing.
pub struct InMemoryStore {
    cities: Arc<Mutex<HashMap<Uuid, City>>>,
    events: Arc<Mutex<HashMap<Uuid, CanonicalEvent>>>,
    sources: Arc<Mutex<HashMap<Uuid, Source>>>,
    runs: Arc<Mutex<HashMap<Uuid, PipelineRun>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            cities: Arc::new(Mutex::new(HashMap::new())),
            events: Arc::new(Mutex::new(HashMap::new())),
            sources: Arc::new(Mutex::new(HashMap::new())),
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a city; returns its id.
    pub fn seed_city(
        &self,
        name: &str,
        province: Option<&str>,
        aliases: &[&str],
    ) -> Uuid {
        let id = Uuid::new_v4();
        let city = City {
            id,
            name: name.to_string(),
            province: province.map(|p| p.to_string()),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        };
        self.cities.lock().unwrap().insert(id, city);
        id
    }

    /// Register a source; returns its id.
    pub fn seed_source(&self, mut source: Source) -> Uuid {
        let id = Uuid::new_v4();
        source.id = Some(id);
        self.sources.lock().unwrap().insert(id, source);
        id
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn find_cities_with_aliases(&self) -> Result<Vec<City>> {
        let cities = self.cities.lock().unwrap();
        let mut list: Vec<City> = cities.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn find_candidate_events(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<CanonicalEvent>> {
        let events = self.events.lock().unwrap();
        let mut matches: Vec<CanonicalEvent> = events
            .values()
            .filter(|e| {
                e.status == filter.status
                    && filter.city_id.map_or(true, |cid| e.city_id == Some(cid))
                    && filter.date_from.map_or(true, |from| e.start_date >= from)
                    && filter.date_to.map_or(true, |to| e.start_date <= to)
            })
            .cloned()
            .collect();

        // Ordered by date so the cap keeps the nearest candidates
        matches.sort_by(|a, b| a.start_date.cmp(&b.start_date));
        matches.truncate(filter.limit);
        Ok(matches)
    }

    async fn create_event(&self, event: &mut CanonicalEvent) -> Result<()> {
        let mut events = self.events.lock().unwrap();
        if events.values().any(|e| e.slug == event.slug) {
            return Err(PipelineError::Store(format!(
                "Slug already exists: {}",
                event.slug
            )));
        }

        let id = Uuid::new_v4();
        event.id = Some(id);
        events.insert(id, event.clone());

        debug!("Created event: {} with id {}", event.title, id);
        Ok(())
    }

    async fn update_event(&self, event: &CanonicalEvent) -> Result<()> {
        let event_id = event
            .id
            .ok_or_else(|| PipelineError::Store("Cannot update event without ID".to_string()))?;

        let mut events = self.events.lock().unwrap();
        events.insert(event_id, event.clone());

        debug!("Updated event: {} with id {}", event.title, event_id);
        Ok(())
    }

    async fn find_event_by_slug(&self, slug: &str) -> Result<Option<CanonicalEvent>> {
        let events = self.events.lock().unwrap();
        Ok(events.values().find(|e| e.slug == slug).cloned())
    }

    async fn find_source(&self, id: Uuid) -> Result<Option<Source>> {
        let sources = self.sources.lock().unwrap();
        Ok(sources.get(&id).cloned())
    }

    async fn upsert_source_health(&self, id: Uuid, outcome: FetchOutcome) -> Result<()> {
        let mut sources = self.sources.lock().unwrap();
        let source = sources
            .get_mut(&id)
            .ok_or_else(|| PipelineError::Store(format!("Unknown source: {}", id)))?;

        let now = Utc::now();
        source.last_fetch_at = Some(now);
        match outcome {
            FetchOutcome::Success => {
                source.consecutive_errors = 0;
                source.last_success_at = Some(now);
            }
            FetchOutcome::Failure => {
                source.consecutive_errors += 1;
            }
        }

        debug!("Updated source health for {}: {:?}", source.name, outcome);
        Ok(())
    }

    async fn create_run_log(&self, run: &mut PipelineRun) -> Result<()> {
        let id = Uuid::new_v4();
        run.id = Some(id);

        let mut runs = self.runs.lock().unwrap();
        runs.insert(id, run.clone());

        debug!("Created run log for {} with id {}", run.city, id);
        Ok(())
    }

    async fn update_run_log(&self, run: &PipelineRun) -> Result<()> {
        let run_id = run
            .id
            .ok_or_else(|| PipelineError::Store("Cannot update run log without ID".to_string()))?;

        let mut runs = self.runs.lock().unwrap();
        runs.insert(run_id, run.clone());

        debug!("Updated run log {} to {:?}", run_id, run.status);
        Ok(())
    }

    async fn find_running_log(&self, city: &str) -> Result<Option<PipelineRun>> {
        let runs = self.runs.lock().unwrap();
        let freshest = runs
            .values()
            .filter(|r| r.city == city && r.status == RunStatus::Running)
            .max_by_key(|r| r.started_at)
            .cloned();
        Ok(freshest)
    }

    async fn find_stale_running_logs(
        &self,
        city: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PipelineRun>> {
        let runs = self.runs.lock().unwrap();
        Ok(runs
            .values()
            .filter(|r| {
                r.city == city && r.status == RunStatus::Running && r.started_at < cutoff
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventStatus;
    use chrono::{Duration, NaiveDate};

    fn test_event(title: &str, slug: &str, date: NaiveDate) -> CanonicalEvent {
        CanonicalEvent {
            id: None,
            title: title.to_string(),
            slug: slug.to_string(),
            start_date: date,
            end_date: None,
            venue: "Teatro Real".to_string(),
            address: None,
            latitude: None,
            longitude: None,
            city_id: None,
            province: None,
            category: "teatro".to_string(),
            tags: vec![],
            artists: vec![],
            description: None,
            price_min: None,
            price_max: None,
            currency: None,
            image_url: None,
            source_id: None,
            source_url: "https://example.com/evento".to_string(),
            status: EventStatus::Active,
            cultural_score: None,
            originality_score: None,
            final_score: None,
            highlight: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_event_sets_id_and_guards_slug() {
        let store = InMemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2026, 9, 12).unwrap();

        let mut event = test_event("Obra", "obra-2026-09-12", date);
        store.create_event(&mut event).await.unwrap();
        assert!(event.id.is_some());

        let mut clash = test_event("Otra obra", "obra-2026-09-12", date);
        assert!(store.create_event(&mut clash).await.is_err());
    }

    #[tokio::test]
    async fn test_candidate_filter_window_and_cap() {
        let store = InMemoryStore::new();
        let base = NaiveDate::from_ymd_opt(2026, 9, 12).unwrap();

        for offset in -3i64..=3 {
            let date = base + Duration::days(offset);
            let mut event = test_event(
                &format!("Evento {}", offset),
                &format!("evento-{}", offset + 10),
                date,
            );
            store.create_event(&mut event).await.unwrap();
        }

        let filter = CandidateFilter {
            city_id: None,
            date_from: Some(base - Duration::days(1)),
            date_to: Some(base + Duration::days(1)),
            status: EventStatus::Active,
            limit: 2,
        };
        let candidates = store.find_candidate_events(&filter).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].start_date <= candidates[1].start_date);
        assert!(candidates.iter().all(|e| {
            e.start_date >= base - Duration::days(1) && e.start_date <= base + Duration::days(1)
        }));
    }

    #[tokio::test]
    async fn test_source_health_transitions() {
        let store = InMemoryStore::new();
        let id = store.seed_source(Source::new("web-discovery", 70));

        store
            .upsert_source_health(id, FetchOutcome::Failure)
            .await
            .unwrap();
        store
            .upsert_source_health(id, FetchOutcome::Failure)
            .await
            .unwrap();
        let source = store.find_source(id).await.unwrap().unwrap();
        assert_eq!(source.consecutive_errors, 2);
        assert!(source.last_fetch_at.is_some());
        assert!(source.last_success_at.is_none());

        store
            .upsert_source_health(id, FetchOutcome::Success)
            .await
            .unwrap();
        let source = store.find_source(id).await.unwrap().unwrap();
        assert_eq!(source.consecutive_errors, 0);
        assert!(source.last_success_at.is_some());
    }

    #[tokio::test]
    async fn test_stale_running_logs() {
        let store = InMemoryStore::new();

        let mut old_run = PipelineRun::new("Córdoba", None);
        old_run.started_at = Utc::now() - Duration::minutes(90);
        store.create_run_log(&mut old_run).await.unwrap();

        let mut fresh_run = PipelineRun::new("Córdoba", None);
        store.create_run_log(&mut fresh_run).await.unwrap();

        let cutoff = Utc::now() - Duration::minutes(30);
        let stale = store
            .find_stale_running_logs("Córdoba", cutoff)
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old_run.id);

        let running = store.find_running_log("Córdoba").await.unwrap();
        assert_eq!(running.unwrap().id, fresh_run.id);
    }
}
