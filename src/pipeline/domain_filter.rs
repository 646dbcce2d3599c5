use tracing::debug;

use crate::constants::{
    DOMAIN_BLOCKLIST, FOREIGN_LANDMARKS, WRONG_COUNTRY_PATHS, WRONG_COUNTRY_TLDS,
};
use crate::observability::metrics::filter as metrics;
use crate::pipeline::discovery::CandidateUrl;

/// Why a URL was dropped. Only URL-structural signals; content is never
/// inspected so the stage stays deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    BlockedDomain,
    BareHomepage,
    WrongCountry,
}

fn inspect(candidate: &CandidateUrl) -> Option<DropReason> {
    let domain = candidate.domain.to_lowercase();

    if DOMAIN_BLOCKLIST
        .iter()
        .any(|blocked| domain == *blocked || domain.ends_with(&format!(".{}", blocked)))
    {
        return Some(DropReason::BlockedDomain);
    }

    let path = candidate.url.path();
    if path.is_empty() || path == "/" {
        return Some(DropReason::BareHomepage);
    }

    if WRONG_COUNTRY_TLDS.iter().any(|tld| domain.ends_with(tld)) {
        return Some(DropReason::WrongCountry);
    }

    let lowered = candidate.url.as_str().to_lowercase();
    if WRONG_COUNTRY_PATHS.iter().any(|p| lowered.contains(p)) {
        return Some(DropReason::WrongCountry);
    }

    let slug = lowered.replace('-', " ");
    if FOREIGN_LANDMARKS.iter().any(|l| slug.contains(l)) {
        return Some(DropReason::WrongCountry);
    }

    None
}

/// Pure structural filter: blocklisted domains, bare homepages and hard
/// wrong-country signals. No I/O.
pub fn filter_urls(candidates: Vec<CandidateUrl>) -> Vec<CandidateUrl> {
    let total = candidates.len();
    let kept: Vec<CandidateUrl> = candidates
        .into_iter()
        .filter(|candidate| match inspect(candidate) {
            Some(reason) => {
                debug!(url = %candidate.url, ?reason, "Dropped URL");
                false
            }
            None => true,
        })
        .collect();

    metrics::kept(kept.len() as u64);
    metrics::dropped((total - kept.len()) as u64);
    kept
}
