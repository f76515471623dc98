// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a file (YAML or JSON). Validation is left to the
/// caller so that command-line overrides can be applied first.
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let is_yaml = matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    );

    let config: Config = if is_yaml {
        serde_yaml::from_str(&contents).context("Failed to parse YAML config")?
    } else {
        serde_json::from_str(&contents).context("Failed to parse JSON config")?
    };

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "failover-lb-{}-{}",
            std::process::id(),
            name
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn yaml_sections_fall_back_to_defaults() {
        let config: Config = serde_yaml::from_str(
            "backends:\n  - url: http://localhost:8001\n  - url: http://localhost:8002\n",
        )
        .unwrap();

        assert_eq!(config.server.port, 3030);
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.health_check.interval_secs, 120);
        assert_eq!(config.health_check.timeout_ms, 2000);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.retry_delay_ms, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(!config.metrics.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn malformed_backend_url_is_rejected() {
        let err = Config::from_backend_list("http://localhost:8001,http://[::1").unwrap_err();
        assert!(err.to_string().contains("http://[::1"));
    }

    #[test]
    fn empty_backend_list_fails_validation() {
        let config = Config::from_backend_list(" , ").unwrap();
        assert!(config.backends.is_empty());
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_addresses_fail_validation() {
        // Port 80 is the default for http, so both normalise to the same address.
        let config = Config::from_backend_list("http://localhost,http://localhost:80/").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http://localhost:80"));
    }

    #[test]
    fn non_http_scheme_fails_validation() {
        let config = Config::from_backend_list("localhost:8001").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_interval_fails_validation() {
        let mut config = Config::from_backend_list("http://localhost:8001").unwrap();
        config.health_check.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn normalized_address_includes_default_port() {
        let url = url::Url::parse("https://example.com/api").unwrap();
        assert_eq!(normalize_address(&url), "https://example.com:443");
        assert_eq!(authority(&url), "example.com:443");
    }

    #[tokio::test]
    async fn loads_json_and_yaml_files() {
        let yaml = write_temp(
            "config.yaml",
            "server:\n  port: 8080\nbackends:\n  - url: http://127.0.0.1:9001\n",
        );
        let config = load_config(&yaml).await.unwrap();
        assert_eq!(config.server.port, 8080);

        let json = write_temp(
            "config.json",
            r#"{"backends":[{"url":"http://127.0.0.1:9001"}],"retry":{"max_attempts":5}}"#,
        );
        let config = load_config(&json).await.unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.max_retries, 3);

        let _ = std::fs::remove_file(yaml);
        let _ = std::fs::remove_file(json);
    }

    #[tokio::test]
    async fn loaded_config_is_validated_separately() {
        let path = write_temp("empty.yaml", "server:\n  port: 8080\n");
        let config = load_config(&path).await.unwrap();
        assert!(config.backends.is_empty());
        assert!(config.validate().is_err());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn unreadable_file_names_the_path() {
        let err = load_config("/nonexistent/failover-lb.yaml").await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/failover-lb.yaml"));
    }
}
