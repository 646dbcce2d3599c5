use std::collections::HashMap;

use tracing::{debug, instrument};

use crate::constants::{CATEGORY_RUN_CAP, INDEPENDENT_WINDOW, TAG_INDEPENDENT, VENUE_CAP};
use crate::text::TextUtils;
use crate::types::ScoredEvent;

fn venue_key(event: &ScoredEvent) -> String {
    TextUtils::normalize(&event.event.venue)
}

fn is_independent(event: &ScoredEvent) -> bool {
    event
        .tags
        .iter()
        .any(|tag| TextUtils::normalize(tag) == TAG_INDEPENDENT)
}

/// Would appending `candidate` close a run of CATEGORY_RUN_CAP equal
/// categories at the tail of `selected`?
fn breaks_category_run(selected: &[ScoredEvent], candidate: &ScoredEvent) -> bool {
    if selected.len() < CATEGORY_RUN_CAP - 1 {
        return false;
    }
    selected
        .iter()
        .rev()
        .take(CATEGORY_RUN_CAP - 1)
        .all(|e| e.category == candidate.category)
}

/// Order events by final score under soft diversity constraints: a venue
/// contributes at most two events, no three consecutive events share a
/// category, and the top five include an independent event when one
/// exists. A permutation of the input; ranking never drops events.
#[instrument(skip(events), fields(events = events.len()))]
pub fn rank(mut events: Vec<ScoredEvent>) -> Vec<ScoredEvent> {
    events.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut remaining = events;
    let mut selected: Vec<ScoredEvent> = Vec::with_capacity(remaining.len());
    let mut venue_counts: HashMap<String, usize> = HashMap::new();

    while !remaining.is_empty() {
        let pick = remaining.iter().position(|candidate| {
            let venue_ok = venue_counts
                .get(&venue_key(candidate))
                .map_or(true, |&n| n < VENUE_CAP);
            venue_ok && !breaks_category_run(&selected, candidate)
        });

        // Constraints are soft: when nothing satisfies them, take the best
        // remaining anyway rather than dropping events.
        let index = match pick {
            Some(index) => index,
            None => {
                debug!("Diversity constraints infeasible, relaxing");
                0
            }
        };

        let chosen = remaining.remove(index);
        *venue_counts.entry(venue_key(&chosen)).or_insert(0) += 1;
        selected.push(chosen);
    }

    ensure_independent_representation(&mut selected);
    selected
}

/// If none of the top five is independent, swap the first independent
/// event beyond position five into the last slot of the window.
fn ensure_independent_representation(selected: &mut [ScoredEvent]) {
    if selected.len() <= INDEPENDENT_WINDOW {
        return;
    }
    if selected[..INDEPENDENT_WINDOW].iter().any(is_independent) {
        return;
    }

    if let Some(position) = selected[INDEPENDENT_WINDOW..]
        .iter()
        .position(is_independent)
    {
        let from = INDEPENDENT_WINDOW + position;
        debug!(from, "Swapping independent event into the top window");
        selected.swap(INDEPENDENT_WINDOW - 1, from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValidatedEvent;
    use chrono::NaiveDate;

    fn scored(title: &str, venue: &str, category: &str, score: f64, tags: &[&str]) -> ScoredEvent {
        ScoredEvent {
            event: ValidatedEvent {
                title: title.to_string(),
                start_date: NaiveDate::from_ymd_opt(2026, 9, 12).unwrap(),
                time: None,
                venue: venue.to_string(),
                address: None,
                category: Some(category.to_string()),
                description: None,
                price_min: None,
                price_max: None,
                currency: None,
                artists: vec![],
                source_url: "https://agenda.ar/evento".to_string(),
            },
            cultural_score: score,
            originality_score: score,
            category: category.to_string(),
            highlight: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            final_score: score,
        }
    }

    #[test]
    fn test_orders_by_score_descending() {
        let ranked = rank(vec![
            scored("Bajo", "A", "musica", 3.0, &[]),
            scored("Alto", "B", "teatro", 9.0, &[]),
            scored("Medio", "C", "arte", 6.0, &[]),
        ]);
        let titles: Vec<&str> = ranked.iter().map(|e| e.event.title.as_str()).collect();
        assert_eq!(titles, vec!["Alto", "Medio", "Bajo"]);
    }

    #[test]
    fn test_venue_cap_holds() {
        let ranked = rank(vec![
            scored("A1", "Teatro Real", "musica", 9.0, &[]),
            scored("A2", "Teatro Real", "teatro", 8.0, &[]),
            scored("A3", "Teatro Real", "arte", 7.0, &[]),
            scored("B1", "Otro Espacio", "musica", 1.0, &[]),
            scored("B2", "Otro Espacio", "danza", 1.0, &[]),
        ]);

        // A3 is pushed behind the other venue's events
        let first_three: Vec<&str> = ranked[..3].iter().map(|e| e.event.venue.as_str()).collect();
        assert_eq!(
            first_three
                .iter()
                .filter(|v| **v == "Teatro Real")
                .count(),
            2
        );
        // Nothing dropped
        assert_eq!(ranked.len(), 5);
    }

    #[test]
    fn test_category_run_capped() {
        let ranked = rank(vec![
            scored("M1", "A", "musica", 9.0, &[]),
            scored("M2", "B", "musica", 8.0, &[]),
            scored("M3", "C", "musica", 7.0, &[]),
            scored("T1", "D", "teatro", 6.0, &[]),
        ]);

        for window in ranked.windows(3) {
            let all_same = window
                .iter()
                .all(|e| e.category == window[0].category);
            assert!(!all_same, "three consecutive events share a category");
        }
    }

    #[test]
    fn test_relaxes_when_infeasible() {
        // Only one category: the run constraint cannot hold and must relax
        let ranked = rank(vec![
            scored("M1", "A", "musica", 9.0, &[]),
            scored("M2", "B", "musica", 8.0, &[]),
            scored("M3", "C", "musica", 7.0, &[]),
            scored("M4", "D", "musica", 6.0, &[]),
        ]);
        assert_eq!(ranked.len(), 4);
        let titles: Vec<&str> = ranked.iter().map(|e| e.event.title.as_str()).collect();
        assert_eq!(titles, vec!["M1", "M2", "M3", "M4"]);
    }

    #[test]
    fn test_independent_swapped_into_top_window() {
        let mut events = Vec::new();
        for i in 0..6 {
            events.push(scored(
                &format!("Comercial {}", i),
                &format!("Venue {}", i),
                if i % 2 == 0 { "musica" } else { "teatro" },
                9.0 - i as f64,
                &[],
            ));
        }
        events.push(scored("Autogestivo", "Casa Taller", "arte", 1.0, &["independiente"]));

        let ranked = rank(events);
        assert!(ranked[..INDEPENDENT_WINDOW].iter().any(is_independent));
        assert_eq!(ranked.len(), 7);
        assert_eq!(ranked[INDEPENDENT_WINDOW - 1].event.title, "Autogestivo");
    }

    #[test]
    fn test_independent_already_present_untouched() {
        let mut events = Vec::new();
        for i in 0..6 {
            let tags: &[&str] = if i == 1 { &["independiente"] } else { &[] };
            events.push(scored(
                &format!("Evento {}", i),
                &format!("Venue {}", i),
                if i % 2 == 0 { "musica" } else { "teatro" },
                9.0 - i as f64,
                tags,
            ));
        }
        let ranked = rank(events);
        assert_eq!(ranked[1].event.title, "Evento 1");
    }
}
