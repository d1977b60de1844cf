//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use std::time::Duration;

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (optional): PostgreSQL connection string. Without it the
///   server keeps all state in memory, which is only suitable for development.
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `API_KEY_PEPPER` (optional): secret mixed into API key digests
/// - `CORS_ALLOWED_ORIGINS` (optional): comma-separated origin allow-list
/// - `PROVIDER_TIMEOUT_SECS` (optional): deadline for one lookup, defaults to 30
/// - `ADVANCED_ALLOW_QUERY_KEY` (optional): accept `?api_key=` on the advanced API, defaults to true
/// - `BULK_JOB_MAX_DOMAINS` (optional): size cap for advanced bulk jobs, defaults to 500
/// - `DNSBL_ZONES` (optional): comma-separated DNS blacklist zones
/// - `SCREENSHOT_SERVICE_URL` (optional): base URL of the page renderer
/// - `WEBHOOK_TIMEOUT_SECS` (optional): webhook delivery timeout, defaults to 5
/// - `SCHEDULER_INTERVAL_SECS` (optional): schedule poll interval, defaults to 60
/// - `MAINTENANCE_INTERVAL_SECS` (optional): prune interval, defaults to 900
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default)]
    pub api_key_pepper: String,

    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,

    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub advanced_allow_query_key: bool,

    #[serde(default = "default_bulk_job_max_domains")]
    pub bulk_job_max_domains: usize,

    #[serde(default = "default_dnsbl_zones")]
    pub dnsbl_zones: Vec<String>,

    #[serde(default)]
    pub screenshot_service_url: Option<String>,

    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,

    #[serde(default = "default_scheduler_interval")]
    pub scheduler_interval_secs: u64,

    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_bulk_job_max_domains() -> usize {
    500
}

fn default_dnsbl_zones() -> Vec<String> {
    [
        "zen.spamhaus.org",
        "bl.spamcop.net",
        "b.barracudacentral.org",
        "dnsbl.sorbs.net",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_webhook_timeout() -> u64 {
    5
}

fn default_scheduler_interval() -> u64 {
    60
}

fn default_maintenance_interval() -> u64 {
    900
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: default_max_connections(),
            server_port: default_port(),
            api_key_pepper: String::new(),
            cors_allowed_origins: Vec::new(),
            provider_timeout_secs: default_provider_timeout(),
            advanced_allow_query_key: true,
            bulk_job_max_domains: default_bulk_job_max_domains(),
            dnsbl_zones: default_dnsbl_zones(),
            screenshot_service_url: None,
            webhook_timeout_secs: default_webhook_timeout(),
            scheduler_interval_secs: default_scheduler_interval(),
            maintenance_interval_secs: default_maintenance_interval(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if environment variable values cannot be parsed into expected types.
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs.max(1))
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();

        assert_eq!(config.server_port, 3000);
        assert_eq!(config.provider_timeout(), Duration::from_secs(30));
        assert!(config.advanced_allow_query_key);
        assert_eq!(config.dnsbl_zones.len(), 4);
        assert!(config.database_url.is_none());
    }
}
