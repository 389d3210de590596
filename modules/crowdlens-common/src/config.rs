use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Web server
    pub host: String,
    pub port: u16,

    // AI providers. Empty key selects the offline heuristic evaluator.
    pub anthropic_api_key: String,

    // Engine
    pub retention_secs: u64,
    pub max_concurrency: usize,
}

impl Config {
    /// Load configuration from environment variables.
    /// Every variable has a sensible default; the Anthropic key is optional.
    pub fn from_env() -> Self {
        Self {
            host: env::var("CROWDLENS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("CROWDLENS_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .expect("CROWDLENS_PORT must be a number"),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            retention_secs: env::var("CROWDLENS_RETENTION_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .expect("CROWDLENS_RETENTION_SECS must be a number"),
            max_concurrency: env::var("CROWDLENS_MAX_CONCURRENCY")
                .unwrap_or_else(|_| "16".to_string())
                .parse()
                .expect("CROWDLENS_MAX_CONCURRENCY must be a number"),
        }
    }
}
