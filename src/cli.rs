// src/cli.rs
use crate::config::{self, Config};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "failover-lb")]
#[command(about = "Round-robin HTTP load balancer with retry and failover", long_about = None)]
pub struct Cli {
    /// Load balanced backends, separated by commas
    #[arg(short, long, value_delimiter = ',')]
    pub backend: Vec<String>,

    /// Port to serve [default: 3030]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// YAML or JSON config file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Resolve the final, validated configuration.
    pub async fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                config::load_config(path).await?
            }
            None => Config::default(),
        };

        if !self.backend.is_empty() {
            config.set_backends(self.backend.iter().map(String::as_str))?;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn backends_and_port_from_flags() {
        let cli = Cli::try_parse_from([
            "failover-lb",
            "--backend",
            "http://localhost:8001,http://localhost:8002",
            "--port",
            "8080",
        ])
        .unwrap();

        let config = cli.resolve_config().await.unwrap();
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[1].url.as_str(), "http://localhost:8002/");
        assert_eq!(config.server.port, 8080);
    }

    #[tokio::test]
    async fn port_defaults_to_3030() {
        let cli = Cli::try_parse_from(["failover-lb", "-b", "http://localhost:8001"]).unwrap();
        assert_eq!(cli.resolve_config().await.unwrap().server.port, 3030);
    }

    #[tokio::test]
    async fn missing_backends_is_fatal() {
        let cli = Cli::try_parse_from(["failover-lb"]).unwrap();
        assert!(cli.resolve_config().await.is_err());
    }

    #[tokio::test]
    async fn flags_override_config_file() {
        let path = std::env::temp_dir().join(format!("failover-lb-cli-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "server:\n  port: 8080\nbackends:\n  - url: http://localhost:8001\nretry:\n  max_attempts: 5\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "failover-lb",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "9000",
        ])
        .unwrap();
        let config = cli.resolve_config().await.unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[tokio::test]
    async fn invalid_backend_is_fatal() {
        let cli = Cli::try_parse_from(["failover-lb", "--backend", "http://ok:1,::bad::"]).unwrap();
        let err = cli.resolve_config().await.unwrap_err();
        assert!(err.to_string().contains("::bad::"));
    }
}
