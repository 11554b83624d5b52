//! API configuration.

use std::time::Duration;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Shared secret; `None` disables auth
    pub api_token: Option<String>,
    /// CORS origins; empty installs no CORS layer
    pub cors_origins: Vec<String>,
    /// Requests per client per minute; 0 disables admission control
    pub rate_limit_per_min: u32,
    /// Lifetime of signed MP3 URLs
    pub mp3_url_ttl: Duration,
    /// Default retention horizon for cleanup; 0 means unset
    pub job_retention_days: i64,
    /// Period of the background sweep; zero disables it
    pub cleanup_interval: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Serve `/metrics`
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            api_token: None,
            cors_origins: Vec::new(),
            rate_limit_per_min: 0,
            mp3_url_ttl: Duration::from_secs(900),
            job_retention_days: 0,
            cleanup_interval: Duration::ZERO,
            max_body_size: 64 * 1024,
            environment: "development".to_string(),
            metrics_enabled: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            api_token: std::env::var("API_TOKEN")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            cors_origins: std::env::var("CORS_ALLOW_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            rate_limit_per_min: env_parse("RATE_LIMIT_PER_MIN").unwrap_or(0),
            mp3_url_ttl: env_parse::<u64>("MP3_URL_TTL")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.mp3_url_ttl),
            job_retention_days: env_parse::<i64>("JOB_RETENTION_DAYS")
                .filter(|d| *d > 0)
                .unwrap_or(0),
            cleanup_interval: env_parse::<u64>("CLEANUP_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(Duration::ZERO),
            max_body_size: env_parse::<usize>("MAX_BODY_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }

    /// Check if running in production.
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Whether the periodic retention sweep should run.
    pub fn periodic_cleanup_enabled(&self) -> bool {
        !self.cleanup_interval.is_zero() && self.job_retention_days > 0
    }
}
