// src/config/models.rs
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    pub url: Url,
}

impl BackendConfig {
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

/// Liveness probing. A probe is a bare TCP connect, no HTTP exchange.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Same-backend retries before the backend is marked dead.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Distinct backends a single request may be routed to.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl RetryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default = "default_upstream_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_upstream_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

impl Config {
    /// Build a config from a comma separated backend list, e.g.
    /// `http://localhost:8001,http://localhost:8002`.
    pub fn from_backend_list(list: &str) -> Result<Self> {
        let mut config = Config::default();
        config.set_backends(list.split(','))?;
        Ok(config)
    }

    /// Replace the backend list. Every entry must parse as a URL.
    pub fn set_backends<'a, I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut backends = Vec::new();
        for entry in entries {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let url = Url::parse(entry)
                .with_context(|| format!("invalid backend url: {entry}"))?;
            backends.push(BackendConfig::new(url));
        }
        self.backends = backends;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            bail!("please provide one or more backends to load balance");
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            let url = &backend.url;
            if !matches!(url.scheme(), "http" | "https") {
                bail!("backend {url} must use http or https");
            }
            if url.host_str().is_none() {
                bail!("backend {url} has no host");
            }
            let address = normalize_address(url);
            if !seen.insert(address.clone()) {
                bail!("backend {address} is configured more than once");
            }
        }

        if self.health_check.interval_secs == 0 {
            bail!("health_check.interval_secs must be greater than zero");
        }
        if self.health_check.timeout_ms == 0 {
            bail!("health_check.timeout_ms must be greater than zero");
        }
        if self.proxy.timeout_secs == 0 {
            bail!("proxy.timeout_secs must be greater than zero");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }

        Ok(())
    }
}

/// `scheme://host:port`, with the scheme's default port filled in.
pub fn normalize_address(url: &Url) -> String {
    format!(
        "{}://{}",
        url.scheme(),
        authority(url)
    )
}

/// `host:port` of a backend URL, suitable for a TCP connect.
pub fn authority(url: &Url) -> String {
    format!(
        "{}:{}",
        url.host_str().unwrap_or("unknown"),
        url.port_or_known_default().unwrap_or(80)
    )
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3030
}

fn default_interval_secs() -> u64 {
    120
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_upstream_timeout_secs() -> u64 {
    30
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
