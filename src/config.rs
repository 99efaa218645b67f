use crate::analysis::scoring::ScoreWeights;
use crate::error::{Error, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub serpapi_key: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub database_path: String,
    pub search_language: String,
    pub search_country: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub searches_per_minute: u32,
    pub weights: ScoreWeights,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let serpapi_key = env::var("SERPAPI_KEY")
            .map_err(|_| Error::Config("SERPAPI_KEY environment variable not set".to_string()))?;

        let gemini_api_key = env::var("GEMINI_API_KEY")
            .map_err(|_| Error::Config("GEMINI_API_KEY environment variable not set".to_string()))?;

        let gemini_model = env::var("GEMINI_MODEL")
            .unwrap_or_else(|_| "gemini-1.5-pro".to_string());

        let database_path = database_path();

        let search_language = env::var("SEARCH_LANGUAGE").unwrap_or_else(|_| "en".to_string());
        let search_country = env::var("SEARCH_COUNTRY").unwrap_or_else(|_| "us".to_string());

        let request_timeout_secs = parse_var("REQUEST_TIMEOUT_SECS").unwrap_or(60);
        let max_retries = parse_var("MAX_RETRIES").unwrap_or(3);
        let searches_per_minute = parse_var("SEARCHES_PER_MINUTE").unwrap_or(30);

        let defaults = ScoreWeights::default();
        let weights = ScoreWeights {
            novelty: parse_var("NOVELTY_WEIGHT").unwrap_or(defaults.novelty),
            inventiveness: parse_var("INVENTIVENESS_WEIGHT").unwrap_or(defaults.inventiveness),
            utility: parse_var("UTILITY_WEIGHT").unwrap_or(defaults.utility),
            market: parse_var("MARKET_WEIGHT").unwrap_or(defaults.market),
            risk: parse_var("RISK_WEIGHT").unwrap_or(defaults.risk),
        };
        weights.validate()?;

        Ok(Self {
            serpapi_key,
            gemini_api_key,
            gemini_model,
            database_path,
            search_language,
            search_country,
            request_timeout_secs,
            max_retries,
            searches_per_minute,
            weights,
        })
    }
}

/// `DATABASE_PATH`, or `patentscope.db` in the working directory. Read-only
/// commands use this without loading the API keys.
pub fn database_path() -> String {
    env::var("DATABASE_PATH").unwrap_or_else(|_| "patentscope.db".to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Bounded timeout and backoff applied to every external call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(60),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub patent_results_per_query: usize,
    pub max_patent_results: usize,
    pub max_academic_results: usize,
    pub max_market_results: usize,
    pub retry: RetryPolicy,
    pub weights: ScoreWeights,
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            patent_results_per_query: 5,
            max_patent_results: 10,
            max_academic_results: 10,
            max_market_results: 5,
            retry: RetryPolicy::default(),
            weights: ScoreWeights::default(),
            show_progress: false,
        }
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: config.max_retries.max(1),
                timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
                ..RetryPolicy::default()
            },
            weights: config.weights.clone(),
            ..Self::default()
        }
    }
}
