use std::time::{Duration, Instant};

use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::config::CurationConfig;
use crate::constants::{
    CATEGORIES, CURATOR_ATTEMPTS, DEFAULT_CATEGORY, FALLBACK_SCORE, HIGHLIGHT_MAX_CHARS,
};
use crate::error::{PipelineError, Result};
use crate::observability::metrics::curate as metrics;
use crate::providers::LanguageModel;
use crate::retry::{with_retries, Deadline};
use crate::types::{ScoredEvent, ValidatedEvent};

static SCORING_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "scores": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "index": {"type": "integer"},
                        "cultural_score": {"type": "number", "minimum": 0, "maximum": 10},
                        "originality_score": {"type": "number", "minimum": 0, "maximum": 10},
                        "category": {"type": "string", "enum": CATEGORIES},
                        "highlight": {"type": "string"},
                        "tags": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["index", "cultural_score", "originality_score", "category", "highlight"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["scores"],
        "additionalProperties": false
    })
});

static COMPILED_SCHEMA: Lazy<JSONSchema> = Lazy::new(|| {
    JSONSchema::options()
        .compile(&SCORING_SCHEMA)
        .expect("scoring schema is valid")
});

const SYSTEM_PROMPT: &str = "Sos un curador cultural. Para cada evento asigná \
    un puntaje de interés cultural y uno de originalidad, ambos de 0 a 10 \
    (0-2 puramente comercial, 9-10 hito o excepcional), una categoría del \
    conjunto permitido y un destacado editorial breve y factual en español. \
    Etiquetá con \"independiente\" los eventos autogestivos o de producción \
    independiente.";

#[derive(serde::Deserialize)]
struct BatchScore {
    index: usize,
    cultural_score: f64,
    originality_score: f64,
    category: String,
    highlight: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(serde::Deserialize)]
struct ScoringResponse {
    scores: Vec<BatchScore>,
}

/// Blend of curation signals and source reliability on the 0-10 scale,
/// rounded to 2 decimals.
pub fn final_score(cultural: f64, originality: f64, reliability: u8) -> f64 {
    let blended = 0.5 * cultural + 0.3 * originality + 0.2 * (reliability as f64 / 10.0);
    (blended * 100.0).round() / 100.0
}

fn fallback(event: ValidatedEvent, reliability: u8) -> ScoredEvent {
    let category = event
        .category
        .clone()
        .filter(|c| CATEGORIES.contains(&c.as_str()))
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    ScoredEvent {
        event,
        cultural_score: FALLBACK_SCORE,
        originality_score: FALLBACK_SCORE,
        category,
        highlight: String::new(),
        tags: Vec::new(),
        final_score: final_score(FALLBACK_SCORE, FALLBACK_SCORE, reliability),
    }
}

fn truncate_highlight(highlight: &str) -> String {
    if highlight.chars().count() <= HIGHLIGHT_MAX_CHARS {
        return highlight.to_string();
    }
    highlight.chars().take(HIGHLIGHT_MAX_CHARS).collect()
}

/// Batched cultural scoring through the language model. An enrichment
/// step, not a gate: a failed batch degrades to neutral fallback scores
/// and the run continues.
pub struct Curator<'a> {
    model: &'a dyn LanguageModel,
    config: &'a CurationConfig,
    temperature: f32,
}

impl<'a> Curator<'a> {
    pub fn new(model: &'a dyn LanguageModel, config: &'a CurationConfig, temperature: f32) -> Self {
        Self {
            model,
            config,
            temperature,
        }
    }

    #[instrument(skip(self, events, deadline), fields(city = %city, events = events.len()))]
    pub async fn score(
        &self,
        events: Vec<ValidatedEvent>,
        city: &str,
        reliability: u8,
        deadline: &Deadline,
    ) -> Vec<ScoredEvent> {
        let started = Instant::now();
        let batch_size = self.config.batch_size.max(1);
        let mut scored = Vec::with_capacity(events.len());

        let batches: Vec<Vec<ValidatedEvent>> = events
            .chunks(batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        for batch in batches {
            match self.score_batch(&batch, city, deadline).await {
                Ok(scores) => {
                    metrics::batch_ok();
                    scored.extend(self.apply_scores(batch, scores, reliability));
                }
                Err(e) => {
                    metrics::batch_fallback();
                    warn!(error = %e, batch = batch.len(), "Scoring batch failed, using fallback");
                    scored.extend(batch.into_iter().map(|event| fallback(event, reliability)));
                }
            }
        }

        metrics::duration(started.elapsed().as_secs_f64());
        info!(
            scored = scored.len(),
            "Curation completed in {:?}",
            started.elapsed()
        );
        scored
    }

    async fn score_batch(
        &self,
        batch: &[ValidatedEvent],
        city: &str,
        deadline: &Deadline,
    ) -> Result<Vec<BatchScore>> {
        let listing: Vec<Value> = batch
            .iter()
            .enumerate()
            .map(|(index, event)| {
                json!({
                    "index": index,
                    "title": event.title,
                    "venue": event.venue,
                    "date": event.start_date.to_string(),
                    "category_guess": event.category,
                    "description": event.description,
                    "artists": event.artists,
                })
            })
            .collect();

        let user = format!(
            "Eventos en {}:\n{}",
            city,
            serde_json::to_string_pretty(&listing)?
        );

        // Retries (backoff included) are bounded by the remaining run
        // budget; each attempt is also capped by the per-request timeout.
        let scoring = with_retries(CURATOR_ATTEMPTS, Duration::from_secs(2), |_| {
            let user = user.clone();
            async move {
                let request =
                    self.model
                        .generate_structured(SYSTEM_PROMPT, &user, &SCORING_SCHEMA, self.temperature);
                let timeout = deadline.cap(self.config.request_timeout());
                let response = tokio::time::timeout(timeout, request)
                    .await
                    .map_err(|_| PipelineError::Scoring("scoring request timed out".to_string()))??;

                if let Err(errors) = COMPILED_SCHEMA.validate(&response) {
                    let detail: Vec<String> = errors.map(|e| e.to_string()).collect();
                    return Err(PipelineError::Scoring(format!(
                        "Response violates scoring schema: {}",
                        detail.join("; ")
                    )));
                }

                let parsed: ScoringResponse = serde_json::from_value(response)?;
                Ok(parsed)
            }
        });
        let parsed = tokio::time::timeout(deadline.remaining(), scoring)
            .await
            .map_err(|_| PipelineError::Scoring("run deadline expired".to_string()))??;

        Ok(parsed.scores)
    }

    fn apply_scores(
        &self,
        batch: Vec<ValidatedEvent>,
        scores: Vec<BatchScore>,
        reliability: u8,
    ) -> Vec<ScoredEvent> {
        batch
            .into_iter()
            .enumerate()
            .map(|(index, event)| {
                match scores.iter().find(|s| s.index == index) {
                    Some(score) => ScoredEvent {
                        final_score: final_score(
                            score.cultural_score,
                            score.originality_score,
                            reliability,
                        ),
                        cultural_score: score.cultural_score,
                        originality_score: score.originality_score,
                        category: score.category.clone(),
                        highlight: truncate_highlight(&score.highlight),
                        tags: score.tags.clone(),
                        event,
                    },
                    // A batch answer missing one event degrades that event only
                    None => fallback(event, reliability),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(60))
    }

    fn validated(title: &str) -> ValidatedEvent {
        ValidatedEvent {
            title: title.to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 9, 12).unwrap(),
            time: None,
            venue: "Teatro Real".to_string(),
            address: None,
            category: Some("musica".to_string()),
            description: None,
            price_min: None,
            price_max: None,
            currency: None,
            artists: vec![],
            source_url: "https://agenda.ar/evento".to_string(),
        }
    }

    struct ScriptedModel {
        response: Result<Value>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate_structured(
            &self,
            _system: &str,
            _user: &str,
            _schema: &Value,
            _temperature: f32,
        ) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(v) => Ok(v.clone()),
                Err(_) => Err(PipelineError::Scoring("model unavailable".to_string())),
            }
        }
    }

    #[test]
    fn test_final_score_blend() {
        // 0.5*8 + 0.3*6 + 0.2*7 = 7.2
        assert_eq!(final_score(8.0, 6.0, 70), 7.2);
        assert_eq!(final_score(5.0, 5.0, 70), 5.4);
        // Rounded to 2 decimals
        assert_eq!(final_score(7.77, 3.33, 55), 5.98);
    }

    #[test]
    fn test_highlight_truncated_to_cap() {
        let long = "x".repeat(HIGHLIGHT_MAX_CHARS + 40);
        assert_eq!(truncate_highlight(&long).chars().count(), HIGHLIGHT_MAX_CHARS);
        assert_eq!(truncate_highlight("corto"), "corto");
    }

    #[tokio::test]
    async fn test_successful_batch_applies_scores() {
        let model = ScriptedModel {
            response: Ok(json!({
                "scores": [{
                    "index": 0,
                    "cultural_score": 8.0,
                    "originality_score": 9.0,
                    "category": "teatro",
                    "highlight": "Estreno local de una obra premiada",
                    "tags": ["independiente"]
                }]
            })),
            calls: AtomicUsize::new(0),
        };
        let config = CurationConfig::default();
        let curator = Curator::new(&model, &config, 0.0);

        let scored = curator
            .score(vec![validated("Obra")], "Córdoba", 70, &deadline())
            .await;
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].category, "teatro");
        assert_eq!(scored[0].tags, vec!["independiente".to_string()]);
        assert_eq!(scored[0].final_score, final_score(8.0, 9.0, 70));
    }

    #[tokio::test]
    async fn test_failed_batch_degrades_to_fallback() {
        let model = ScriptedModel {
            response: Err(PipelineError::Scoring("down".to_string())),
            calls: AtomicUsize::new(0),
        };
        let config = CurationConfig::default();
        let curator = Curator::new(&model, &config, 0.0);

        let scored = curator
            .score(
                vec![validated("Obra"), validated("Recital")],
                "Córdoba",
                70,
                &deadline(),
            )
            .await;
        assert_eq!(scored.len(), 2);
        for event in &scored {
            assert_eq!(event.cultural_score, FALLBACK_SCORE);
            assert!(event.highlight.is_empty());
        }
        // One batch, retried once
        assert_eq!(model.calls.load(Ordering::SeqCst), CURATOR_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn test_schema_rejection_falls_back() {
        let model = ScriptedModel {
            response: Ok(json!({"scores": [{"index": 0, "cultural_score": 14.0,
                "originality_score": 2.0, "category": "rock", "highlight": ""}]})),
            calls: AtomicUsize::new(0),
        };
        let config = CurationConfig::default();
        let curator = Curator::new(&model, &config, 0.0);

        let scored = curator
            .score(vec![validated("Obra")], "Córdoba", 70, &deadline())
            .await;
        // Out-of-range score and unknown category violate the schema
        assert_eq!(scored[0].cultural_score, FALLBACK_SCORE);
        assert_eq!(scored[0].category, "musica");
    }

    struct SleepingModel {
        delay: Duration,
    }

    #[async_trait]
    impl LanguageModel for SleepingModel {
        async fn generate_structured(
            &self,
            _system: &str,
            _user: &str,
            _schema: &Value,
            _temperature: f32,
        ) -> Result<Value> {
            tokio::time::sleep(self.delay).await;
            Ok(json!({"scores": []}))
        }
    }

    #[tokio::test]
    async fn test_expired_deadline_falls_back_without_waiting() {
        let model = SleepingModel {
            delay: Duration::from_secs(30),
        };
        let config = CurationConfig::default();
        let curator = Curator::new(&model, &config, 0.0);

        let started = Instant::now();
        let scored = curator
            .score(
                vec![validated("Obra")],
                "Córdoba",
                70,
                &Deadline::after(Duration::from_millis(100)),
            )
            .await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].cultural_score, FALLBACK_SCORE);
    }
}
