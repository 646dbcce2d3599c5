use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::EventStore;
use crate::text::TextUtils;
use crate::types::City;

/// Maximum edit distance for fuzzy matching, adaptive to query length.
fn fuzzy_threshold(normalized: &str) -> usize {
    if normalized.chars().count() <= 6 {
        2
    } else {
        3
    }
}

struct CityIndex {
    /// Normalized name/alias -> city id, for exact hits.
    exact: HashMap<String, Uuid>,
    /// Flat (id, normalized name) list for the fuzzy pass, in load order so
    /// ties resolve first-seen.
    fuzzy: Vec<(Uuid, String)>,
    cities: HashMap<Uuid, City>,
}

impl CityIndex {
    fn build(cities: Vec<City>) -> Self {
        let mut exact = HashMap::new();
        let mut fuzzy = Vec::new();
        let mut by_id = HashMap::new();

        for city in cities {
            let canonical = TextUtils::normalize(&city.name);
            exact.entry(canonical.clone()).or_insert(city.id);
            fuzzy.push((city.id, canonical));

            for alias in &city.aliases {
                let normalized = TextUtils::normalize(alias);
                exact.entry(normalized.clone()).or_insert(city.id);
                fuzzy.push((city.id, normalized));
            }

            by_id.insert(city.id, city);
        }

        Self {
            exact,
            fuzzy,
            cities: by_id,
        }
    }

    fn resolve(&self, raw_name: &str) -> Option<Uuid> {
        let query = TextUtils::normalize(raw_name);
        if query.is_empty() {
            return None;
        }

        if let Some(&id) = self.exact.get(&query) {
            return Some(id);
        }

        let threshold = fuzzy_threshold(&query);
        let mut best: Option<(usize, Uuid)> = None;
        for (id, name) in &self.fuzzy {
            let distance = TextUtils::levenshtein_distance(&query, name);
            if distance <= threshold && best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, *id));
            }
        }

        best.map(|(_, id)| id)
    }
}

/// Injectable city index: exact alias lookup then fuzzy edit-distance
/// matching. Built lazily from the store on first use and held for the
/// process lifetime until explicitly invalidated.
pub struct CityResolver {
    store: Arc<dyn EventStore>,
    index: RwLock<Option<Arc<CityIndex>>>,
}

impl CityResolver {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            index: RwLock::new(None),
        }
    }

    async fn index(&self) -> Result<Arc<CityIndex>> {
        {
            let guard = self.index.read().await;
            if let Some(index) = guard.as_ref() {
                return Ok(index.clone());
            }
        }

        let mut guard = self.index.write().await;
        // Another task may have built it while we waited for the write lock
        if let Some(index) = guard.as_ref() {
            return Ok(index.clone());
        }

        let cities = self.store.find_cities_with_aliases().await?;
        debug!(cities = cities.len(), "Built city index");
        let index = Arc::new(CityIndex::build(cities));
        *guard = Some(index.clone());
        Ok(index)
    }

    /// Resolve a raw city string to a canonical city id, or None when
    /// nothing is within the fuzzy threshold.
    pub async fn resolve(&self, raw_name: &str) -> Result<Option<Uuid>> {
        Ok(self.index().await?.resolve(raw_name))
    }

    /// Look up a resolved city's record (for province backfill).
    pub async fn city(&self, id: Uuid) -> Result<Option<City>> {
        Ok(self.index().await?.cities.get(&id).cloned())
    }

    /// Drop the cached index; the next resolve rebuilds from the store.
    pub async fn invalidate(&self) {
        *self.index.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    fn resolver_with_cities() -> (CityResolver, Uuid, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let ba = store.seed_city(
            "Buenos Aires",
            Some("Buenos Aires"),
            &["Bs As", "CABA", "Capital Federal"],
        );
        let cordoba = store.seed_city("Córdoba", Some("Córdoba"), &["cba"]);
        (CityResolver::new(store), ba, cordoba)
    }

    #[tokio::test]
    async fn test_alias_resolves_to_same_id_as_exact_name() {
        let (resolver, ba, _) = resolver_with_cities();
        assert_eq!(resolver.resolve("Buenos Aires").await.unwrap(), Some(ba));
        assert_eq!(resolver.resolve("Bs As").await.unwrap(), Some(ba));
        assert_eq!(resolver.resolve("  bs  as ").await.unwrap(), Some(ba));
    }

    #[tokio::test]
    async fn test_accents_are_transparent() {
        let (resolver, _, cordoba) = resolver_with_cities();
        assert_eq!(resolver.resolve("cordoba").await.unwrap(), Some(cordoba));
        assert_eq!(resolver.resolve("CÓRDOBA").await.unwrap(), Some(cordoba));
    }

    #[tokio::test]
    async fn test_fuzzy_match_within_threshold() {
        let (resolver, _, cordoba) = resolver_with_cities();
        // One typo, 7 chars -> threshold 3
        assert_eq!(resolver.resolve("Cordova").await.unwrap(), Some(cordoba));
    }

    #[tokio::test]
    async fn test_unknown_city_resolves_to_none() {
        let (resolver, _, _) = resolver_with_cities();
        assert_eq!(resolver.resolve("Ushuaia").await.unwrap(), None);
        assert_eq!(resolver.resolve("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let (resolver, _, _) = resolver_with_cities();
        let first = resolver.resolve("Bs As").await.unwrap();
        let second = resolver.resolve("Bs As").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_invalidate_picks_up_new_cities() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_city("Rosario", Some("Santa Fe"), &[]);
        let resolver = CityResolver::new(store.clone());

        assert_eq!(resolver.resolve("Mendoza").await.unwrap(), None);

        let mendoza = store.seed_city("Mendoza", Some("Mendoza"), &[]);
        // Still served from the stale index until invalidated
        assert_eq!(resolver.resolve("Mendoza").await.unwrap(), None);

        resolver.invalidate().await;
        assert_eq!(resolver.resolve("Mendoza").await.unwrap(), Some(mendoza));
    }
}
