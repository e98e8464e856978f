use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::modules::ModuleSettings;
use crate::search::OrchestratorConfig;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";
const DEFAULT_WMN_DATA_URL: &str =
    "https://raw.githubusercontent.com/WebBreacher/WhatsMyName/main/wmn-data.json";
const DEFAULT_FEDIVERSE_INSTANCES_URL: &str =
    "https://raw.githubusercontent.com/C3n7ral051nt4g3ncy/Masto/master/fediverse_instances.json";

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address (0.0.0.0 for LAN, 127.0.0.1 for localhost)
    pub bind_addr: String,
    /// Maximum simultaneous WebSocket connections
    pub max_connections: usize,
    /// How long a new search waits for the one it supersedes to stop
    pub cancel_ack_timeout_ms: u64,
    /// Concurrent site probes during cross-site username enumeration
    pub lookup_concurrency: usize,
    /// Concurrent instance probes during federated-social search
    pub instance_concurrency: usize,
    /// Timeout for single upstream API calls
    pub http_timeout_seconds: u64,
    /// Timeout for each probe in a fan-out lookup
    pub site_timeout_seconds: u64,
    /// User-Agent sent upstream
    pub user_agent: String,
    /// WhatsMyName site list
    pub wmn_data_url: String,
    /// Fediverse instance list for federated-social search
    pub fediverse_instances_url: String,
    /// whois executable
    pub whois_binary: String,
    /// GHunt executable for Google account lookups
    pub ghunt_binary: String,
    /// CORS allowed origins (comma-separated in env var, `*` for any)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_addr: "0.0.0.0".to_string(),
            max_connections: 10_000,
            cancel_ack_timeout_ms: 100,
            lookup_concurrency: 20,
            instance_concurrency: 15,
            http_timeout_seconds: 10,
            site_timeout_seconds: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            wmn_data_url: DEFAULT_WMN_DATA_URL.to_string(),
            fediverse_instances_url: DEFAULT_FEDIVERSE_INSTANCES_URL.to_string(),
            whois_binary: "whois".to_string(),
            ghunt_binary: "ghunt".to_string(),
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let port = env::var("OSINT_PORT")
            .ok()
            .map(|v| v.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(defaults.port);

        let config = Self {
            port,
            bind_addr: env::var("OSINT_BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_connections: parse_var("MAX_CONNECTIONS", defaults.max_connections)?,
            cancel_ack_timeout_ms: parse_var("CANCEL_ACK_TIMEOUT_MS", defaults.cancel_ack_timeout_ms)?,
            lookup_concurrency: parse_var("LOOKUP_CONCURRENCY", defaults.lookup_concurrency)?,
            instance_concurrency: parse_var("INSTANCE_CONCURRENCY", defaults.instance_concurrency)?,
            http_timeout_seconds: parse_var("HTTP_TIMEOUT_SECONDS", defaults.http_timeout_seconds)?,
            site_timeout_seconds: parse_var("SITE_TIMEOUT_SECONDS", defaults.site_timeout_seconds)?,
            user_agent: env::var("USER_AGENT").unwrap_or(defaults.user_agent),
            wmn_data_url: env::var("WMN_DATA_URL").unwrap_or(defaults.wmn_data_url),
            fediverse_instances_url: env::var("FEDIVERSE_INSTANCES_URL")
                .unwrap_or(defaults.fediverse_instances_url),
            whois_binary: env::var("WHOIS_BINARY").unwrap_or(defaults.whois_binary),
            ghunt_binary: env::var("GHUNT_BINARY").unwrap_or(defaults.ghunt_binary),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|s| parse_origins(&s))
                .unwrap_or(defaults.cors_origins),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.lookup_concurrency == 0 || self.instance_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "lookup concurrency limits must be at least 1".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the full bind address (addr:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            ack_timeout: Duration::from_millis(self.cancel_ack_timeout_ms),
        }
    }

    pub fn module_settings(&self) -> ModuleSettings {
        ModuleSettings {
            user_agent: self.user_agent.clone(),
            http_timeout: Duration::from_secs(self.http_timeout_seconds),
            site_timeout: Duration::from_secs(self.site_timeout_seconds),
            lookup_concurrency: self.lookup_concurrency,
            instance_concurrency: self.instance_concurrency,
            wmn_data_url: self.wmn_data_url.clone(),
            fediverse_instances_url: self.fediverse_instances_url.clone(),
            whois_binary: self.whois_binary.clone(),
            ghunt_binary: self.ghunt_binary.clone(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{} has invalid value '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
