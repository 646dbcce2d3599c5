/// Static domain knowledge for the discovery pipeline: query templates,
/// structural URL filters, wrong-country signals, the closed category set,
/// and the fixed scoring/dedup/slug knobs.
// Search query templates; `{city}` is replaced with the target city name.
pub const QUERY_TEMPLATES: &[&str] = &[
    "agenda cultural {city} esta semana",
    "eventos culturales {city} entradas",
    "recitales y conciertos en {city} fechas",
    "obras de teatro en {city} cartelera",
    "ferias y exposiciones {city} este mes",
    "ciclo de cine y funciones en {city}",
];

// Domains never worth extracting from: social networks, tourism
// aggregators and generic portals.
pub const DOMAIN_BLOCKLIST: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "youtube.com",
    "pinterest.com",
    "linkedin.com",
    "tripadvisor.com",
    "tripadvisor.com.ar",
    "booking.com",
    "airbnb.com",
    "expedia.com",
    "despegar.com",
    "mercadolibre.com.ar",
    "wikipedia.org",
    "spotify.com",
];

// Hard wrong-country signals. The pipeline targets Argentina; these are
// URL-structural only (TLDs, path fragments, landmark slugs), never content.
pub const WRONG_COUNTRY_TLDS: &[&str] = &[".es", ".mx", ".cl", ".pe", ".ec", ".uy", ".co.uk"];

pub const WRONG_COUNTRY_PATHS: &[&str] = &[
    "/espana/",
    "/spain/",
    "/madrid/",
    "/barcelona/",
    "/mexico/",
    "/cdmx/",
    "/santiago-de-chile/",
    "/montevideo/",
];

pub const FOREIGN_LANDMARKS: &[&str] = &[
    "gran via",
    "puerta del sol",
    "bernabeu",
    "sagrada familia",
    "zocalo",
    "chapultepec",
    "costanera center",
    "ciudad vieja",
];

// Major Argentine cities used as cross-city markers by the validator: an
// address naming one of these while the run targets a different city is a
// wrong-location rejection.
pub const CROSS_CITY_MARKERS: &[&str] = &[
    "buenos aires",
    "cordoba",
    "rosario",
    "mendoza",
    "la plata",
    "mar del plata",
    "salta",
    "tucuman",
    "neuquen",
    "bariloche",
];

// Closed category set; the curator schema enumerates exactly these and the
// gateway falls back to DEFAULT_CATEGORY.
pub const CATEGORIES: &[&str] = &[
    "musica",
    "teatro",
    "arte",
    "cine",
    "literatura",
    "danza",
    "gastronomia",
    "feria",
    "otros",
];

pub const DEFAULT_CATEGORY: &str = "otros";

/// Tag that marks independent/self-produced events for the ranker's top-5
/// representation guarantee.
pub const TAG_INDEPENDENT: &str = "independiente";

// Discovery
pub const MAX_DISCOVERED_URLS: usize = 24;
pub const SEARCH_RESULTS_PER_QUERY: usize = 8;

// Extraction
pub const MIN_CONTENT_CHARS: usize = 300;
pub const CONTENT_BUDGET_CHARS: usize = 12_000;
pub const EXTRACTION_ATTEMPTS: u32 = 2;

// Yield control
pub const MAX_INVALID_RATE: f64 = 0.8;

// Deduplication
pub const DEDUP_CANDIDATE_CAP: usize = 50;
pub const DEDUP_WINDOW_DAYS: i64 = 1;
pub const DUPLICATE_THRESHOLD: u8 = 60;
pub const VENUE_SIMILARITY_THRESHOLD: f64 = 0.7;

// Curation
pub const CURATOR_BATCH_SIZE: usize = 10;
pub const CURATOR_ATTEMPTS: u32 = 2;
pub const HIGHLIGHT_MAX_CHARS: usize = 160;
pub const FALLBACK_SCORE: f64 = 5.0;

// Ranking
pub const VENUE_CAP: usize = 2;
pub const CATEGORY_RUN_CAP: usize = 3;
pub const INDEPENDENT_WINDOW: usize = 5;

// Slugs
pub const SLUG_MAX_CHARS: usize = 80;
pub const SLUG_PROBE_LIMIT: u32 = 50;
pub const SLUG_RANDOM_SUFFIX_LEN: usize = 6;

// Run log
pub const STALE_RUN_MINUTES: i64 = 30;
