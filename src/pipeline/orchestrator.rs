use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::observability::metrics::run as metrics;
use crate::pipeline::city_resolver::CityResolver;
use crate::pipeline::curator::Curator;
use crate::pipeline::discovery::Discovery;
use crate::pipeline::domain_filter;
use crate::pipeline::extractor::Extractor;
use crate::pipeline::gateway::Gateway;
use crate::pipeline::ranker;
use crate::pipeline::validator::{self, Verdict};
use crate::pipeline::yield_control;
use crate::providers::{LanguageModel, SearchProvider};
use crate::retry::Deadline;
use crate::storage::{EventStore, FetchOutcome};
use crate::types::{Outcome, PersistOutcome, PipelineRun, RunCounts, RunStatus, Source};

/// Handle returned by the fire-and-forget trigger: the pre-registered run
/// id plus the background task. The caller may drop the handle.
pub struct TriggeredRun {
    pub run_id: Option<Uuid>,
    pub handle: JoinHandle<Outcome>,
}

/// Owns the collaborators and sequences the stages. `run_pipeline` never
/// returns an error: whatever happens inside surfaces in the Outcome.
pub struct Orchestrator {
    search: Arc<dyn SearchProvider>,
    model: Arc<dyn LanguageModel>,
    resolver: Arc<CityResolver>,
    gateway: Gateway,
    config: Config,
    source: Source,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn EventStore>,
        search: Arc<dyn SearchProvider>,
        model: Arc<dyn LanguageModel>,
        config: Config,
        source: Source,
    ) -> Self {
        let resolver = Arc::new(CityResolver::new(store.clone()));
        let gateway = Gateway::new(store.clone(), resolver.clone())
            .with_stale_after_minutes(config.run.stale_after_minutes);
        Self {
            search,
            model,
            resolver,
            gateway,
            config,
            source,
        }
    }

    pub fn resolver(&self) -> Arc<CityResolver> {
        self.resolver.clone()
    }

    /// Run the whole pipeline for one city and wait for the outcome.
    #[instrument(skip(self), fields(city = %city, country = %country))]
    pub async fn run_pipeline(self: &Arc<Self>, city: &str, country: &str) -> Outcome {
        let started = Instant::now();

        let run = match self.gateway.begin_run(city, self.source.id).await {
            Ok(run) => run,
            Err(e) => return self.refused_outcome(e, started),
        };

        self.execute(run, city, country, started).await
    }

    /// Fire-and-forget trigger: pre-registers the Running row so a caller
    /// can return immediately, then finishes the run on a background task.
    pub async fn spawn_pipeline(self: &Arc<Self>, city: &str, country: &str) -> Result<TriggeredRun> {
        let started = Instant::now();
        let run = self.gateway.begin_run(city, self.source.id).await?;
        let run_id = run.id;

        let orchestrator = self.clone();
        let city = city.to_string();
        let country = country.to_string();
        let handle = tokio::spawn(async move {
            orchestrator.execute(run, &city, &country, started).await
        });

        Ok(TriggeredRun { run_id, handle })
    }

    async fn execute(
        self: &Arc<Self>,
        run: PipelineRun,
        city: &str,
        country: &str,
        started: Instant,
    ) -> Outcome {
        match self.run_stages(city, country).await {
            Ok((counts, note)) => {
                let status = if counts.created + counts.updated >= 1 {
                    RunStatus::Success
                } else {
                    RunStatus::Partial
                };
                self.settle(run, status, counts, note, started).await
            }
            Err(e) => {
                error!(city, error = %e, "Pipeline backbone failed");
                self.settle(
                    run,
                    RunStatus::Failed,
                    RunCounts::default(),
                    Some(e.to_string()),
                    started,
                )
                .await
            }
        }
    }

    /// The sequential backbone. An Err here means the run could not form
    /// any outcome and becomes Failed; everything recoverable is handled
    /// inside the stages.
    async fn run_stages(&self, city: &str, country: &str) -> Result<(RunCounts, Option<String>)> {
        let deadline = Deadline::after(self.config.run.deadline());
        let today = Utc::now().date_naive();

        let discovery = Discovery::new(self.search.as_ref(), &self.config.search);
        let urls = discovery
            .discover(city, country, self.config.run.max_urls, &deadline)
            .await;
        let urls = domain_filter::filter_urls(urls);
        if urls.is_empty() {
            // SourceUnavailable: a run with nothing to read ends Partial
            warn!(city, "No URLs survived discovery and filtering");
            return Ok((RunCounts::default(), Some("no URLs discovered".to_string())));
        }

        let extractor = Extractor::new(
            self.model.as_ref(),
            &self.config.extraction,
            self.config.model.temperature,
        );
        let raw_events = extractor.extract_all(urls, city, &deadline).await;

        let outcomes = validator::validate(raw_events, city, today);
        let rejected = outcomes
            .iter()
            .filter(|o| !matches!(o.verdict, Verdict::Valid(_)))
            .count();

        let yielded = yield_control::enforce(outcomes);
        let note = if rejected > 0 || yielded.reports.iter().any(|r| !r.accepted) {
            let rejected_domains = yielded.reports.iter().filter(|r| !r.accepted).count();
            Some(format!(
                "{} events rejected, {} domains below yield bar",
                rejected, rejected_domains
            ))
        } else {
            None
        };

        let curator = Curator::new(
            self.model.as_ref(),
            &self.config.curation,
            self.config.model.temperature,
        );
        let scored = curator
            .score(yielded.accepted, city, self.source.reliability, &deadline)
            .await;
        let ranked = ranker::rank(scored);

        let mut counts = RunCounts {
            found: ranked.len() as u32,
            ..RunCounts::default()
        };

        // Strictly sequential: slug probes and dedup lookups must not race
        for event in &ranked {
            match self.gateway.process(event, &self.source, city, today).await {
                Ok(PersistOutcome::Created) => counts.created += 1,
                Ok(PersistOutcome::Updated) => counts.updated += 1,
                Ok(PersistOutcome::Duplicate) => counts.duplicate += 1,
                Ok(PersistOutcome::Skipped(reason)) => {
                    info!(title = %event.event.title, reason, "Event skipped");
                }
                Err(e) => {
                    crate::observability::metrics::persist::error();
                    error!(title = %event.event.title, error = %e, "Persistence failed for event");
                }
            }
        }

        Ok((counts, note))
    }

    /// Close out the run exactly once: run log, source health, metrics.
    async fn settle(
        &self,
        run: PipelineRun,
        status: RunStatus,
        counts: RunCounts,
        error_message: Option<String>,
        started: Instant,
    ) -> Outcome {
        let duration_ms = started.elapsed().as_millis() as u64;

        let fetch_outcome = if status == RunStatus::Failed {
            FetchOutcome::Failure
        } else {
            FetchOutcome::Success
        };
        if let Err(e) = self.gateway.record_source_outcome(&self.source, fetch_outcome).await {
            error!(error = %e, "Failed to record source health");
        }

        if let Err(e) = self
            .gateway
            .finish_run(run, status, counts, error_message.clone(), duration_ms)
            .await
        {
            error!(error = %e, "Failed to update run log");
        }

        let status_label = match status {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        };
        metrics::completed(status_label);
        metrics::duration(started.elapsed().as_secs_f64());
        info!(
            ?status,
            found = counts.found,
            created = counts.created,
            updated = counts.updated,
            duplicate = counts.duplicate,
            duration_ms,
            "Pipeline run settled"
        );

        Outcome {
            status,
            events_found: counts.found,
            events_created: counts.created,
            events_updated: counts.updated,
            events_duplicate: counts.duplicate,
            duration_ms,
            error_message,
        }
    }

    /// A trigger refused before a run row existed (already running, or the
    /// store failed during begin). Still exception-free for the caller.
    fn refused_outcome(&self, error: PipelineError, started: Instant) -> Outcome {
        warn!(error = %error, "Run refused");
        Outcome {
            status: RunStatus::Failed,
            events_found: 0,
            events_created: 0,
            events_updated: 0,
            events_duplicate: 0,
            duration_ms: started.elapsed().as_millis() as u64,
            error_message: Some(error.to_string()),
        }
    }
}
