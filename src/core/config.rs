use super::provider::RateProviderOptions;
use super::rate::DEFAULT_RATE;
use anyhow::{Context, Result, ensure};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, net::SocketAddr, path::PathBuf};
use tracing::debug;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Label reported as the rate `source`
    pub name: String,
    pub url: String,
    /// CSS selector of the element holding the rate text
    pub selector: String,
    pub user_agent: String,
    pub accept_language: String,
    pub timeout_secs: u64,
    /// The upstream serves an incomplete certificate chain
    pub accept_invalid_certs: bool,
    pub retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            name: "BCV".to_string(),
            url: "https://www.bcv.org.ve/".to_string(),
            selector: "#dolar strong".to_string(),
            user_agent: BROWSER_USER_AGENT.to_string(),
            accept_language: "es-ES,es;q=0.9,en;q=0.8".to_string(),
            timeout_secs: 10,
            accept_invalid_certs: true,
            retries: 0,
            retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { ttl_secs: 3600 }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub currency: String,
    pub default_rate: f64,
    pub cache: CacheConfig,
    pub upstream: UpstreamConfig,
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            currency: "USD".to_string(),
            default_rate: DEFAULT_RATE,
            cache: CacheConfig::default(),
            upstream: UpstreamConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads the default config file, or built-in defaults when it does not exist
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "ratekeeper", "ratekeeper")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.default_rate.is_finite() && self.default_rate > 0.0,
            "default_rate must be a positive number, got {}",
            self.default_rate
        );
        ensure!(
            self.upstream.timeout_secs > 0,
            "upstream.timeout_secs must be greater than zero"
        );
        Ok(())
    }

    pub fn provider_options(&self) -> RateProviderOptions {
        let ttl = i64::try_from(self.cache.ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);
        RateProviderOptions {
            ttl,
            default_rate: self.default_rate,
        }
    }
}
