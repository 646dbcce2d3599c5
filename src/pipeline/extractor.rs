use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::config::ExtractionConfig;
use crate::constants::EXTRACTION_ATTEMPTS;
use crate::error::{PipelineError, Result};
use crate::observability::metrics::extract as metrics;
use crate::pipeline::discovery::CandidateUrl;
use crate::providers::LanguageModel;
use crate::retry::{with_retries, Deadline};
use crate::types::RawEvent;

// Patterns typical of event listings; a page matching none of them is not
// worth a model call.
static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b").unwrap(),
        Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap(),
        Regex::new(r"(?i)\b\d{1,2}\s+de\s+(enero|febrero|marzo|abril|mayo|junio|julio|agosto|septiembre|octubre|noviembre|diciembre)\b").unwrap(),
        Regex::new(r"(?i)\b\d{1,2}[:.]\d{2}\s*(hs|h|hrs)?\b").unwrap(),
        Regex::new(r"(?i)\b(entradas?|funciones?|cartelera|agenda|recital|estreno)\b").unwrap(),
    ]
});

static EXTRACTION_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "events": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "date": {"type": "string"},
                        "time": {"type": ["string", "null"]},
                        "venue": {"type": "string"},
                        "address": {"type": ["string", "null"]},
                        "category": {"type": ["string", "null"]},
                        "description": {"type": ["string", "null"]},
                        "price_min": {"type": ["number", "null"]},
                        "price_max": {"type": ["number", "null"]},
                        "currency": {"type": ["string", "null"]},
                        "artists": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["title", "date", "venue"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["events"],
        "additionalProperties": false
    })
});

static COMPILED_SCHEMA: Lazy<JSONSchema> = Lazy::new(|| {
    JSONSchema::options()
        .compile(&EXTRACTION_SCHEMA)
        .expect("extraction schema is valid")
});

fn system_prompt(city: &str) -> String {
    format!(
        "Sos un extractor de eventos culturales. Extraé únicamente eventos \
         que ocurren en {city}, Argentina, a partir del texto provisto. \
         Reglas estrictas: usá solo fechas explícitas del texto, nunca \
         inventes lugares ni artistas; si un dato no aparece, dejalo en null. \
         Todo el texto de salida va en español. Precios: interpretá puntos \
         como separador de miles ($1.500 = 1500); \"gratis\", \"entrada \
         libre\" o \"free\" significan precio 0.",
        city = city
    )
}

/// Per-page structured extraction through the language model, with
/// pre-filtering, cleaning, bounded concurrency and one retry per page.
pub struct Extractor<'a> {
    model: &'a dyn LanguageModel,
    config: &'a ExtractionConfig,
    temperature: f32,
    client: reqwest::Client,
}

impl<'a> Extractor<'a> {
    pub fn new(model: &'a dyn LanguageModel, config: &'a ExtractionConfig, temperature: f32) -> Self {
        Self {
            model,
            config,
            temperature,
            client: reqwest::Client::new(),
        }
    }

    /// Extract raw events from every page, dropping pages that fail the
    /// pre-filter or exhaust their retry budget. Never fatal to the run.
    #[instrument(skip(self, pages, deadline), fields(city = %city, pages = pages.len()))]
    pub async fn extract_all(
        &self,
        pages: Vec<CandidateUrl>,
        city: &str,
        deadline: &Deadline,
    ) -> Vec<RawEvent> {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.permits()));

        let tasks = pages.into_iter().map(|page| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return Vec::new(),
                };
                if deadline.expired() {
                    debug!(url = %page.url, "Run deadline expired, skipping page");
                    return Vec::new();
                }
                self.extract_page(page, city, deadline).await
            }
        });

        let events: Vec<RawEvent> = join_all(tasks).await.into_iter().flatten().collect();

        metrics::events_found(events.len() as u64);
        metrics::duration(started.elapsed().as_secs_f64());
        info!(
            events = events.len(),
            "Extraction completed in {:?}",
            started.elapsed()
        );
        events
    }

    async fn extract_page(
        &self,
        page: CandidateUrl,
        city: &str,
        deadline: &Deadline,
    ) -> Vec<RawEvent> {
        metrics::page_processed();

        let content = match self.page_content(&page, deadline).await {
            Some(content) => content,
            None => {
                metrics::page_dropped("no_content");
                return Vec::new();
            }
        };

        if !passes_prefilter(&content, self.config.min_content_chars) {
            metrics::page_dropped("prefilter");
            debug!(url = %page.url, "Page failed pre-filter");
            return Vec::new();
        }

        let cleaned = clean_content(&content, self.config.content_budget_chars);
        let source_url = page.url.to_string();

        // The outer timeout bounds the whole retry sequence (backoff
        // included) by the remaining run budget.
        let extraction = with_retries(EXTRACTION_ATTEMPTS, Duration::from_secs(2), |attempt| {
            let cleaned = cleaned.clone();
            let source_url = source_url.clone();
            async move {
                debug!(url = %source_url, attempt, "Requesting extraction");
                self.request_events(&cleaned, city, deadline).await
            }
        });
        let result = match tokio::time::timeout(deadline.remaining(), extraction).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Extraction(
                "run deadline expired".to_string(),
            )),
        };

        match result {
            Ok(mut events) => {
                for event in &mut events {
                    event.source_url = page.url.to_string();
                }
                debug!(url = %page.url, events = events.len(), "Page extracted");
                events
            }
            Err(e) => {
                metrics::page_dropped("extraction_failed");
                warn!(url = %page.url, error = %e, "Page dropped after retries");
                Vec::new()
            }
        }
    }

    /// Page text: the provider's raw content when present, otherwise a
    /// capped fetch with HTML stripped to text.
    async fn page_content(&self, page: &CandidateUrl, deadline: &Deadline) -> Option<String> {
        if let Some(raw) = &page.raw_content {
            return Some(raw.clone());
        }

        let timeout = deadline.cap(self.config.page_timeout());
        let fetch = async {
            let response = self.client.get(page.url.clone()).send().await.ok()?;
            if !response.status().is_success() {
                return None;
            }
            let html = response.text().await.ok()?;
            Some(html_to_text(&html))
        };

        match tokio::time::timeout(timeout, fetch).await {
            Ok(content) => content,
            Err(_) => {
                warn!(url = %page.url, "Page fetch timed out");
                None
            }
        }
    }

    async fn request_events(
        &self,
        content: &str,
        city: &str,
        deadline: &Deadline,
    ) -> Result<Vec<RawEvent>> {
        let user = format!(
            "Extraé todos los eventos culturales del siguiente contenido de \
             página:\n\n{}",
            content
        );

        let system = system_prompt(city);
        let request = self.model.generate_structured(
            &system,
            &user,
            &EXTRACTION_SCHEMA,
            self.temperature,
        );
        let response = tokio::time::timeout(deadline.cap(self.config.page_timeout()), request)
            .await
            .map_err(|_| PipelineError::Extraction("model call timed out".to_string()))??;

        if let Err(errors) = COMPILED_SCHEMA.validate(&response) {
            let detail: Vec<String> = errors.map(|e| e.to_string()).collect();
            return Err(PipelineError::Extraction(format!(
                "Response violates extraction schema: {}",
                detail.join("; ")
            )));
        }

        #[derive(serde::Deserialize)]
        struct ExtractionResponse {
            events: Vec<RawEvent>,
        }

        let parsed: ExtractionResponse = serde_json::from_value(response)?;
        Ok(parsed.events)
    }
}

/// Reject pages that are too short or carry none of the date/time/keyword
/// patterns of an event listing.
fn passes_prefilter(content: &str, min_chars: usize) -> bool {
    if content.chars().count() < min_chars {
        return false;
    }
    DATE_PATTERNS.iter().any(|p| p.is_match(content))
}

/// Strip boilerplate lines, collapse whitespace and truncate to the budget
/// at a char boundary.
fn clean_content(content: &str, budget_chars: usize) -> String {
    let cleaned: String = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !is_boilerplate_line(line))
        .collect::<Vec<_>>()
        .join("\n");

    if cleaned.chars().count() <= budget_chars {
        return cleaned;
    }
    cleaned.chars().take(budget_chars).collect()
}

fn is_boilerplate_line(line: &str) -> bool {
    let lowered = line.to_lowercase();
    const NOISE: &[&str] = &[
        "cookie",
        "suscribite",
        "newsletter",
        "todos los derechos reservados",
        "política de privacidad",
        "iniciar sesión",
        "menú",
    ];
    // Short nav-ish lines with noise markers, not editorial text
    lowered.chars().count() < 120 && NOISE.iter().any(|n| lowered.contains(n))
}

/// Visible text of an HTML document, with script/style/nav/footer/header
/// subtrees removed.
fn html_to_text(html: &str) -> String {
    const SKIP_TAGS: &[&str] = &["script", "style", "nav", "footer", "header", "noscript"];

    fn collect(element: ElementRef<'_>, out: &mut String) {
        if SKIP_TAGS.contains(&element.value().name()) {
            return;
        }
        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    out.push_str(trimmed);
                    out.push('\n');
                }
            } else if let Some(el) = ElementRef::wrap(child) {
                collect(el, out);
            }
        }
    }

    let document = Html::parse_document(html);
    let mut text = String::new();
    collect(document.root_element(), &mut text);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefilter_rejects_short_content() {
        assert!(!passes_prefilter("Recital el 12/09/2026", 300));
    }

    #[test]
    fn test_prefilter_requires_event_patterns() {
        let filler = "Texto genérico sobre la ciudad. ".repeat(20);
        assert!(!passes_prefilter(&filler, 300));

        let listing = format!("{} Función el 12 de septiembre, entradas $1.500.", filler);
        assert!(passes_prefilter(&listing, 300));
    }

    #[test]
    fn test_clean_content_strips_boilerplate_and_truncates() {
        let content = "Aceptar cookies\n\nRecital de jazz en el teatro\n   \nSuscribite al newsletter\nEntradas desde $2.000";
        let cleaned = clean_content(content, 10_000);
        assert!(!cleaned.contains("cookies"));
        assert!(!cleaned.contains("newsletter"));
        assert!(cleaned.contains("Recital de jazz"));

        let truncated = clean_content(content, 10);
        assert_eq!(truncated.chars().count(), 10);
    }

    #[test]
    fn test_html_to_text_drops_chrome() {
        let html = r#"<html><head><script>var x = 1;</script></head>
            <body><nav>Inicio | Agenda</nav>
            <p>Obra de teatro el 05/10/2026</p>
            <footer>Todos los derechos reservados</footer></body></html>"#;
        let text = html_to_text(html);
        assert!(text.contains("Obra de teatro"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("Inicio | Agenda"));
        assert!(!text.contains("derechos reservados"));
    }

    #[test]
    fn test_extraction_schema_accepts_valid_response() {
        let response = json!({
            "events": [{
                "title": "Noche de Peña",
                "date": "2026-09-12",
                "time": "21:00",
                "venue": "Casa de la Cultura",
                "address": null,
                "category": "musica",
                "description": null,
                "price_min": 0.0,
                "price_max": null,
                "currency": "ARS",
                "artists": ["Dúo Coplanacu"]
            }]
        });
        assert!(COMPILED_SCHEMA.validate(&response).is_ok());

        let missing_venue = json!({"events": [{"title": "X", "date": "2026-09-12"}]});
        assert!(COMPILED_SCHEMA.validate(&missing_venue).is_err());
    }
}
