use std::collections::BTreeMap;

use tracing::{info, instrument, warn};

use crate::constants::MAX_INVALID_RATE;
use crate::observability::metrics::yield_control as metrics;
use crate::pipeline::validator::{self, ValidationOutcome, Verdict};
use crate::types::ValidatedEvent;

/// Per-domain quality accounting. Expired events sit outside the
/// valid/invalid ratio because listings legitimately include past entries.
#[derive(Debug, Clone)]
pub struct DomainReport {
    pub domain: String,
    pub valid: usize,
    pub invalid: usize,
    pub expired: usize,
    pub invalid_rate: f64,
    pub accepted: bool,
}

pub struct YieldResult {
    pub accepted: Vec<ValidatedEvent>,
    pub reports: Vec<DomainReport>,
}

/// Accept a domain iff it produced at least one valid event and its invalid
/// rate stays at or below the bar. Rejected domains contribute nothing, even
/// individually valid events, so noisy extraction cannot leak through.
#[instrument(skip(outcomes), fields(events = outcomes.len()))]
pub fn enforce(outcomes: Vec<ValidationOutcome>) -> YieldResult {
    // BTreeMap keeps report order stable across runs
    let mut by_domain: BTreeMap<String, Vec<ValidationOutcome>> = BTreeMap::new();
    for outcome in outcomes {
        by_domain
            .entry(outcome.event.domain())
            .or_default()
            .push(outcome);
    }

    let mut accepted = Vec::new();
    let mut reports = Vec::new();

    for (domain, outcomes) in by_domain {
        let valid = outcomes
            .iter()
            .filter(|o| matches!(o.verdict, Verdict::Valid(_)))
            .count();
        let expired = outcomes
            .iter()
            .filter(|o| o.verdict == Verdict::Expired)
            .count();
        let invalid = outcomes.len() - valid - expired;

        let counted = valid + invalid;
        let invalid_rate = if counted == 0 {
            0.0
        } else {
            invalid as f64 / counted as f64
        };

        let domain_accepted = valid >= 1 && invalid_rate <= MAX_INVALID_RATE;
        if domain_accepted {
            metrics::domain_accepted();
            accepted.extend(outcomes.iter().filter_map(validator::to_validated));
        } else {
            metrics::domain_rejected();
            warn!(
                domain,
                valid, invalid, expired, invalid_rate, "Domain rejected by yield control"
            );
        }

        reports.push(DomainReport {
            domain,
            valid,
            invalid,
            expired,
            invalid_rate,
            accepted: domain_accepted,
        });
    }

    metrics::events_accepted(accepted.len() as u64);
    info!(
        domains = reports.len(),
        accepted_events = accepted.len(),
        "Yield control completed"
    );
    YieldResult { accepted, reports }
}
