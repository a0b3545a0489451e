//! Pipeline configuration.
//!
//! Everything is read from the environment with workable defaults.
//! Missing service credentials switch the matching client into its
//! offline mode instead of failing construction, so the pipeline stays
//! runnable on a development machine with no secrets at all.

use std::env;
use std::time::Duration;

/// What to do when OCR mean confidence falls below the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejectionPolicy {
    /// Treat the result as unavailable; extraction continues with
    /// whatever direct text existed.
    #[default]
    Degrade,
    /// Fail the whole job with a low-confidence error.
    Strict,
}

impl RejectionPolicy {
    /// Parse a config value; anything that is not `strict` degrades.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("strict") {
            RejectionPolicy::Strict
        } else {
            RejectionPolicy::Degrade
        }
    }
}

/// Remote OCR service settings.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Service base URL, e.g. `https://cloud-eu.ocrsdk.com`.
    pub endpoint: String,
    /// Application id for HTTP Basic auth; `None` disables OCR.
    pub application_id: Option<String>,
    /// Application password for HTTP Basic auth.
    pub password: Option<String>,
    /// Recognition language requested from the service.
    pub language: String,
    /// Mean token confidence below this value rejects the result.
    pub confidence_threshold: f64,
    pub rejection_policy: RejectionPolicy,
    /// Wall-clock budget for one submit-poll-fetch cycle.
    pub poll_budget: Duration,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://cloud-eu.ocrsdk.com".to_string(),
            application_id: None,
            password: None,
            language: "French".to_string(),
            confidence_threshold: 0.85,
            rejection_policy: RejectionPolicy::default(),
            poll_budget: Duration::from_secs(180),
        }
    }
}

/// Generation service settings.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// API key; `None` switches the generator to the built-in demo lesson.
    pub api_key: Option<String>,
    /// Optional API base override for OpenAI-compatible services.
    pub api_base: Option<String>,
    pub model: String,
    pub request_timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: None,
            model: "gpt-4o-mini".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Object storage settings for document downloads.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Storage base URL, e.g. `https://xyz.supabase.co`.
    pub base_url: String,
    /// Service key for the authenticated fallback fetch.
    pub service_key: Option<String>,
    pub download_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            service_key: None,
            download_timeout: Duration::from_secs(30),
        }
    }
}

/// Content extraction knobs.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Fewer non-whitespace characters than this marks a page
    /// image-dominated.
    pub image_char_floor: usize,
    /// Pages with less trimmed text than this are retried through OCR.
    pub min_viable_text: usize,
    /// Raster resolution for pages sent to OCR.
    pub raster_dpi: f32,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            image_char_floor: 80,
            min_viable_text: 60,
            raster_dpi: 220.0,
        }
    }
}

/// Sentence chunker bounds, in characters.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            min_len: 500,
            max_len: 900,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub ocr: OcrConfig,
    pub generation: GenerationConfig,
    pub storage: StorageConfig,
    pub extract: ExtractConfig,
    pub chunk: ChunkConfig,
    /// Number of lesson workers pulling from the job queue.
    pub workers: usize,
    /// Recovered text is trimmed to this many characters before
    /// generation.
    pub excerpt_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ocr: OcrConfig::default(),
            generation: GenerationConfig::default(),
            storage: StorageConfig::default(),
            extract: ExtractConfig::default(),
            chunk: ChunkConfig::default(),
            workers: DEFAULT_WORKERS,
            excerpt_limit: DEFAULT_EXCERPT_LIMIT,
        }
    }
}

impl Config {
    /// Build a config from the environment, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(endpoint) = env::var("ABBYY_ENDPOINT") {
            config.ocr.endpoint = endpoint;
        }
        config.ocr.application_id = env::var("ABBYY_APP_ID").ok();
        config.ocr.password = env::var("ABBYY_PASSWORD").ok();
        if let Ok(language) = env::var("OCR_LANGUAGE") {
            config.ocr.language = language;
        }
        config.ocr.confidence_threshold =
            env_f64("OCR_CONFIDENCE_THRESHOLD", config.ocr.confidence_threshold);
        if let Ok(policy) = env::var("OCR_REJECTION_POLICY") {
            config.ocr.rejection_policy = RejectionPolicy::parse(&policy);
        }

        config.generation.api_key = env::var("OPENAI_API_KEY").ok();
        config.generation.api_base = env::var("OPENAI_API_BASE").ok();
        if let Ok(model) = env::var("LESSON_MODEL") {
            config.generation.model = model;
        }

        if let Ok(base_url) = env::var("SUPABASE_URL") {
            config.storage.base_url = base_url;
        }
        config.storage.service_key = env::var("SUPABASE_SERVICE_KEY")
            .ok()
            .or_else(|| env::var("SUPABASE_ANON_KEY").ok());

        config.workers = env_usize("LESSON_WORKERS", config.workers);
        config.excerpt_limit = env_usize("LESSON_EXCERPT_LIMIT", config.excerpt_limit);

        config
    }
}

/// Default worker pool size.
const DEFAULT_WORKERS: usize = 2;

/// Default generation excerpt bound, in characters.
const DEFAULT_EXCERPT_LIMIT: usize = 12_000;

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
