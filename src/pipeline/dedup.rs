use chrono::{Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::constants::{
    DEDUP_CANDIDATE_CAP, DEDUP_WINDOW_DAYS, DUPLICATE_THRESHOLD, VENUE_SIMILARITY_THRESHOLD,
};
use crate::error::Result;
use crate::storage::EventStore;
use crate::text::TextUtils;
use crate::types::{CandidateFilter, CanonicalEvent, EventStatus, ValidatedEvent};

/// Result of checking one incoming event against the store.
#[derive(Debug, Clone)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    pub existing: Option<CanonicalEvent>,
    /// Similarity score in [0, 100].
    pub score: u8,
}

/// Weighted similarity between an incoming event and a stored one:
/// 40 points title, 20 venue, 20 date window, 20 artist overlap.
pub fn similarity_score(incoming: &ValidatedEvent, existing: &CanonicalEvent) -> u8 {
    let mut score = (40.0 * TextUtils::similarity(&incoming.title, &existing.title)).round() as i64;

    if TextUtils::similarity(&incoming.venue, &existing.venue) > VENUE_SIMILARITY_THRESHOLD {
        score += 20;
    }

    let day_gap = (incoming.start_date - existing.start_date).num_days().abs();
    if day_gap <= DEDUP_WINDOW_DAYS {
        score += 20;
    }

    if TextUtils::artists_overlap(&incoming.artists, &existing.artists) {
        score += 20;
    }

    score.clamp(0, 100) as u8
}

/// Find the best duplicate among stored ACTIVE events within a ±1-day
/// window of the incoming date, for the same city when known.
pub async fn find_duplicate(
    store: &dyn EventStore,
    event: &ValidatedEvent,
    city_id: Option<Uuid>,
) -> Result<DuplicateCheck> {
    let filter = CandidateFilter {
        city_id,
        date_from: Some(event.start_date - Duration::days(DEDUP_WINDOW_DAYS)),
        date_to: Some(event.start_date + Duration::days(DEDUP_WINDOW_DAYS)),
        status: EventStatus::Active,
        limit: DEDUP_CANDIDATE_CAP,
    };

    let candidates = store.find_candidate_events(&filter).await?;

    let mut best: Option<(u8, CanonicalEvent)> = None;
    for candidate in candidates {
        let score = similarity_score(event, &candidate);
        if best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((score, candidate));
        }
    }

    let check = match best {
        Some((score, existing)) if score >= DUPLICATE_THRESHOLD => {
            debug!(title = %event.title, existing = %existing.title, score, "Duplicate found");
            DuplicateCheck {
                is_duplicate: true,
                existing: Some(existing),
                score,
            }
        }
        Some((score, _)) => DuplicateCheck {
            is_duplicate: false,
            existing: None,
            score,
        },
        None => DuplicateCheck {
            is_duplicate: false,
            existing: None,
            score: 0,
        },
    };

    Ok(check)
}

fn union_case_insensitive(a: &[String], b: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    for item in a.iter().chain(b.iter()) {
        let key = TextUtils::normalize(item);
        if key.is_empty() || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        merged.push(item.clone());
    }
    merged
}

/// Fold an incoming event into a stored duplicate. Pure: both inputs stay
/// untouched and a new record is returned.
///
/// Precedence: the side whose source is more reliable wins scalar fields
/// (description, venue, address, image, source attribution); tags and
/// artists are unioned; coordinates and prices take the more specific
/// non-null value either way.
pub fn merge_events(
    existing: &CanonicalEvent,
    incoming: &ValidatedEvent,
    incoming_tags: &[String],
    incoming_source_id: Option<Uuid>,
    incoming_reliability: u8,
    existing_reliability: u8,
) -> CanonicalEvent {
    let incoming_wins = incoming_reliability > existing_reliability;
    let mut merged = existing.clone();

    if incoming_wins {
        if incoming.description.is_some() {
            merged.description = incoming.description.clone();
        }
        merged.venue = incoming.venue.clone();
        if incoming.address.is_some() {
            merged.address = incoming.address.clone();
        }
        merged.source_id = incoming_source_id.or(existing.source_id);
        merged.source_url = incoming.source_url.clone();
    } else {
        if merged.description.is_none() {
            merged.description = incoming.description.clone();
        }
        if merged.address.is_none() {
            merged.address = incoming.address.clone();
        }
    }

    merged.tags = union_case_insensitive(&existing.tags, incoming_tags);
    merged.artists = union_case_insensitive(&existing.artists, &incoming.artists);

    // More specific wins regardless of reliability
    if merged.price_min.is_none() {
        merged.price_min = incoming.price_min;
    }
    if merged.price_max.is_none() {
        merged.price_max = incoming.price_max;
    }
    if merged.currency.is_none() {
        merged.currency = incoming.currency.clone();
    }

    merged.updated_at = Utc::now();
    merged
}

/// Field-by-field comparison so a merge that changed nothing can be
/// reported as a pure duplicate instead of an update.
pub fn has_changes(existing: &CanonicalEvent, merged: &CanonicalEvent) -> bool {
    existing.venue != merged.venue
        || existing.address != merged.address
        || existing.description != merged.description
        || existing.source_id != merged.source_id
        || existing.source_url != merged.source_url
        || existing.tags != merged.tags
        || existing.artists != merged.artists
        || existing.price_min != merged.price_min
        || existing.price_max != merged.price_max
        || existing.currency != merged.currency
        || existing.image_url != merged.image_url
}
