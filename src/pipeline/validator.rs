use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument};

use crate::constants::{CROSS_CITY_MARKERS, FOREIGN_LANDMARKS};
use crate::observability::metrics::validate as metrics;
use crate::text::TextUtils;
use crate::types::{RawEvent, ValidatedEvent};

/// Per-event decision of the deterministic validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid(NaiveDate),
    /// Parseable date in the past. Excluded from yield accounting.
    Expired,
    InvalidDate,
    WrongLocation,
}

/// A raw event together with its verdict, grouped later by domain for
/// yield control.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub event: RawEvent,
    pub verdict: Verdict,
}

// Foreign postal-code shapes that never occur in Argentina: Spanish 5-digit
// codes prefixed "CP 28xxx" style is ambiguous, so only unambiguous shapes
// are listed (UK-style, Chilean 7-digit, Mexican "C.P." with 5 digits).
static FOREIGN_POSTAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\b[A-Z]{1,2}\d{1,2}[A-Z]?\s*\d[A-Z]{2}\b").unwrap(),
        Regex::new(r"\b\d{7}\b").unwrap(),
        Regex::new(r"(?i)\bC\.P\.\s*\d{5}\b").unwrap(),
    ]
});

static SPANISH_MONTHS: &[(&str, u32)] = &[
    ("enero", 1),
    ("febrero", 2),
    ("marzo", 3),
    ("abril", 4),
    ("mayo", 5),
    ("junio", 6),
    ("julio", 7),
    ("agosto", 8),
    ("septiembre", 9),
    ("setiembre", 9),
    ("octubre", 10),
    ("noviembre", 11),
    ("diciembre", 12),
];

static SPANISH_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s+de\s+([a-záéíóú]+)(?:\s+(?:de\s+)?(\d{4}))?").unwrap()
});

/// Parse a date string to a calendar date. Accepts ISO, slashed
/// day-first numerics and Spanish "12 de septiembre de 2026" forms; a
/// month-name date without a year takes the next occurrence from `today`.
pub fn parse_event_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d/%m/%y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }

    let normalized = TextUtils::normalize(trimmed);
    if let Some(caps) = SPANISH_DATE.captures(&normalized) {
        let day: u32 = caps.get(1)?.as_str().parse().ok()?;
        let month_name = caps.get(2)?.as_str();
        let month = SPANISH_MONTHS
            .iter()
            .find(|(name, _)| *name == month_name)
            .map(|(_, m)| *m)?;

        if let Some(year_match) = caps.get(3) {
            let year: i32 = year_match.as_str().parse().ok()?;
            return NaiveDate::from_ymd_opt(year, month, day);
        }

        // No year given: this year's occurrence, or next year's if past
        let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
        if this_year >= today {
            return Some(this_year);
        }
        return NaiveDate::from_ymd_opt(today.year() + 1, month, day);
    }

    None
}

fn location_is_wrong(event: &RawEvent, target_city: &str) -> bool {
    let location_text = TextUtils::normalize(&format!(
        "{} {}",
        event.venue,
        event.address.as_deref().unwrap_or("")
    ));
    if location_text.trim().is_empty() {
        return false;
    }

    if FOREIGN_POSTAL_PATTERNS
        .iter()
        .any(|p| p.is_match(&location_text))
    {
        return true;
    }

    if FOREIGN_LANDMARKS.iter().any(|l| location_text.contains(l)) {
        return true;
    }

    // A different known city named in the venue/address is a cross-city
    // signal; the target city's own name is fine.
    let target = TextUtils::normalize(target_city);
    CROSS_CITY_MARKERS
        .iter()
        .any(|marker| *marker != target && location_text.contains(marker))
}

/// Classify one raw event. Date first, then location, so an expired event
/// is always Expired (excluded from yield accounting) even when its
/// location would also fail.
pub fn check_event(event: &RawEvent, target_city: &str, today: NaiveDate) -> Verdict {
    let date = match parse_event_date(&event.date, today) {
        Some(date) => date,
        None => return Verdict::InvalidDate,
    };
    if date < today {
        return Verdict::Expired;
    }

    if location_is_wrong(event, target_city) {
        return Verdict::WrongLocation;
    }
    Verdict::Valid(date)
}

/// Run the deterministic checks over every extracted event. Pure apart
/// from logging; no network, no model.
#[instrument(skip(events), fields(city = %target_city, events = events.len()))]
pub fn validate(events: Vec<RawEvent>, target_city: &str, today: NaiveDate) -> Vec<ValidationOutcome> {
    let outcomes: Vec<ValidationOutcome> = events
        .into_iter()
        .map(|event| {
            let verdict = check_event(&event, target_city, today);
            if !matches!(verdict, Verdict::Valid(_)) {
                debug!(title = %event.title, ?verdict, "Event rejected");
            }
            ValidationOutcome { event, verdict }
        })
        .collect();

    let accepted = outcomes
        .iter()
        .filter(|o| matches!(o.verdict, Verdict::Valid(_)))
        .count();
    let expired = outcomes
        .iter()
        .filter(|o| o.verdict == Verdict::Expired)
        .count();
    let rejected = outcomes.len() - accepted - expired;

    metrics::accepted(accepted as u64);
    metrics::expired(expired as u64);
    metrics::rejected(rejected as u64);
    info!(accepted, expired, rejected, "Validation completed");
    outcomes
}

/// Helper for downstream stages: build the immutable validated record.
pub fn to_validated(outcome: &ValidationOutcome) -> Option<ValidatedEvent> {
    match outcome.verdict {
        Verdict::Valid(date) => Some(ValidatedEvent::from_raw(outcome.event.clone(), date)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 9, 1).unwrap()
    }

    fn event(date: &str, venue: &str, address: Option<&str>) -> RawEvent {
        RawEvent {
            title: "Recital".to_string(),
            date: date.to_string(),
            time: None,
            venue: venue.to_string(),
            address: address.map(|a| a.to_string()),
            category: None,
            description: None,
            price_min: None,
            price_max: None,
            currency: None,
            artists: vec![],
            source_url: "https://agenda.ar/recital".to_string(),
        }
    }

    #[test]
    fn test_parses_common_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 9, 12).unwrap();
        assert_eq!(parse_event_date("2026-09-12", today()), Some(expected));
        assert_eq!(parse_event_date("12/09/2026", today()), Some(expected));
        assert_eq!(parse_event_date("12-09-2026", today()), Some(expected));
        assert_eq!(
            parse_event_date("12 de septiembre de 2026", today()),
            Some(expected)
        );
    }

    #[test]
    fn test_yearless_spanish_date_rolls_forward() {
        // March has passed by September 1st, so it lands next year
        assert_eq!(
            parse_event_date("15 de marzo", today()),
            NaiveDate::from_ymd_opt(2027, 3, 15)
        );
        assert_eq!(
            parse_event_date("15 de octubre", today()),
            NaiveDate::from_ymd_opt(2026, 10, 15)
        );
    }

    #[test]
    fn test_rejects_nonsense_dates() {
        assert_eq!(parse_event_date("pronto", today()), None);
        assert_eq!(parse_event_date("31/02/2026", today()), None);
        assert_eq!(parse_event_date("", today()), None);
    }

    #[test]
    fn test_past_date_is_expired_not_invalid() {
        let verdict = check_event(&event("2026-08-15", "Teatro Real", None), "Córdoba", today());
        assert_eq!(verdict, Verdict::Expired);

        let verdict = check_event(&event("fecha a confirmar", "Teatro Real", None), "Córdoba", today());
        assert_eq!(verdict, Verdict::InvalidDate);
    }

    #[test]
    fn test_past_date_wins_over_wrong_location() {
        // Expired takes precedence so the event stays out of the domain's
        // yield accounting entirely
        let verdict = check_event(
            &event("2026-08-15", "Teatro", Some("Gran Vía 31")),
            "Córdoba",
            today(),
        );
        assert_eq!(verdict, Verdict::Expired);
    }

    #[test]
    fn test_cross_city_marker_rejected() {
        let verdict = check_event(
            &event("2026-09-12", "Luna Park", Some("Av. Madero 420, Buenos Aires")),
            "Córdoba",
            today(),
        );
        assert_eq!(verdict, Verdict::WrongLocation);

        // The target city's own name is not a wrong-location signal
        let verdict = check_event(
            &event("2026-09-12", "Teatro Real", Some("San Jerónimo 66, Córdoba")),
            "Córdoba",
            today(),
        );
        assert_eq!(verdict, Verdict::Valid(NaiveDate::from_ymd_opt(2026, 9, 12).unwrap()));
    }

    #[test]
    fn test_foreign_landmark_rejected() {
        let verdict = check_event(
            &event("2026-09-12", "Teatro", Some("Gran Vía 31")),
            "Córdoba",
            today(),
        );
        assert_eq!(verdict, Verdict::WrongLocation);
    }

    #[test]
    fn test_validate_counts() {
        let events = vec![
            event("2026-09-12", "Teatro Real", None),
            event("2026-08-01", "Teatro Real", None),
            event("no date", "Teatro Real", None),
        ];
        let outcomes = validate(events, "Córdoba", today());
        let valid = outcomes
            .iter()
            .filter(|o| matches!(o.verdict, Verdict::Valid(_)))
            .count();
        assert_eq!(valid, 1);
        assert_eq!(
            outcomes.iter().filter(|o| o.verdict == Verdict::Expired).count(),
            1
        );
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| o.verdict == Verdict::InvalidDate)
                .count(),
            1
        );
    }
}
