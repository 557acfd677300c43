use std::env;

/// Criteria and tuning knobs that drive a single pipeline run.
///
/// Loaded from environment variables. Construct via
/// [`Config::orchestrator_from_env`] for the main pipeline binary. The
/// notifier process itself is an external collaborator out of scope for
/// this workspace (SPEC_FULL.md's Non-goals); `notify_pending` only needs
/// this `Config` for the fields it already shares with the orchestrator.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Storage
    pub data_dir: String,

    // Search criteria
    pub min_price: i32,
    pub max_price: i32,
    pub min_bedrooms: i32,
    pub max_bedrooms: i32,
    pub min_bathrooms: i32,
    pub search_areas: Vec<String>,
    pub furnish_types: Vec<String>,
    pub include_let_agreed: bool,
    pub max_per_scraper: usize,

    // Enrichment
    pub max_enrichment_attempts: i32,

    // Dedup tuning
    pub match_threshold: f64,
    pub min_signals: u32,

    // Commute
    pub commute_max_minutes: u32,
    pub transport_modes: Vec<String>,
    pub destination_postcode: String,

    // Analyzer
    pub analyzer_api_key: String,
    pub analyzer_max_images: usize,

    // Feature flags
    pub enable_quality_filter: bool,
    pub require_floorplan: bool,

    // Concurrency
    pub scrape_concurrency: usize,
    pub enrich_concurrency: usize,
    pub enrich_image_concurrency: usize,
    pub analyzer_concurrency: usize,
}

impl Config {
    /// Load configuration for the pipeline orchestrator binary.
    /// Panics with a clear message if required vars are missing.
    pub fn orchestrator_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            min_price: env_parse("MIN_PRICE", 0),
            max_price: env_parse("MAX_PRICE", 100_000),
            min_bedrooms: env_parse("MIN_BEDROOMS", 0),
            max_bedrooms: env_parse("MAX_BEDROOMS", 10),
            min_bathrooms: env_parse("MIN_BATHROOMS", 0),
            search_areas: env_csv("SEARCH_AREAS"),
            furnish_types: env_csv("FURNISH_TYPES"),
            include_let_agreed: env_bool("INCLUDE_LET_AGREED", false),
            max_per_scraper: env_parse("MAX_PER_SCRAPER", 100),
            max_enrichment_attempts: env_parse("MAX_ENRICHMENT_ATTEMPTS", 3),
            match_threshold: env_parse("MATCH_THRESHOLD", 60.0),
            min_signals: env_parse("MIN_SIGNALS", 2),
            commute_max_minutes: env_parse("COMMUTE_MAX_MINUTES", 45),
            transport_modes: env_csv("TRANSPORT_MODES"),
            destination_postcode: env::var("DESTINATION_POSTCODE").unwrap_or_default(),
            analyzer_api_key: env::var("ANALYZER_API_KEY").unwrap_or_default(),
            analyzer_max_images: env_parse("ANALYZER_MAX_IMAGES", 10),
            enable_quality_filter: env_bool("ENABLE_QUALITY_FILTER", true),
            require_floorplan: env_bool("REQUIRE_FLOORPLAN", false),
            scrape_concurrency: env_parse("SCRAPE_CONCURRENCY", 1),
            enrich_concurrency: env_parse("ENRICH_CONCURRENCY", 5),
            enrich_image_concurrency: env_parse("ENRICH_IMAGE_CONCURRENCY", 5),
            analyzer_concurrency: env_parse("ANALYZER_CONCURRENCY", 3),
        }
    }

    /// Log redacted configuration: presence/length of secrets, never values.
    pub fn log_redacted(&self) {
        tracing::info!(
            database_url_set = !self.database_url.is_empty(),
            analyzer_api_key = %format!("({} chars)", self.analyzer_api_key.len()),
            search_areas = ?self.search_areas,
            match_threshold = self.match_threshold,
            "loaded configuration"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_csv(key: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
