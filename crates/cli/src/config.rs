//! Command-line and environment configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

/// Serve workflows and remote node calls over HTTP.
#[derive(Debug, Clone, Parser)]
#[command(name = "nanoserve", version, about)]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 4000)]
    pub port: u16,

    /// Directory of `*.json` workflow documents, registered by file stem.
    #[arg(long, env = "WORKFLOWS_DIR")]
    pub workflows_dir: Option<PathBuf>,

    #[arg(long, env = "PROJECT_NAME", default_value = "trigger-http-workflow")]
    pub project_name: String,

    #[arg(long, env = "PROJECT_VERSION", default_value = "0.0.1")]
    pub project_version: String,

    /// Deployment environment, attached to every failure metric.
    #[arg(long, env = "APP_ENV", default_value = "development")]
    pub environment: String,

    /// Endpoint of the python3 runtime. Without it `runtime.python3` steps fail.
    #[arg(long, env = "PYTHON3_RUNTIME_URL")]
    pub python3_runtime_url: Option<String>,

    /// OTLP collector endpoint. Without it spans and metrics stay local.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Directory of static files (such as the JavaScript client) served
    /// ahead of workflow dispatch.
    #[arg(long, env = "PUBLIC_DIR")]
    pub public_dir: Option<PathBuf>,

    /// Maximum request body size in megabytes.
    #[arg(long, env = "BODY_LIMIT_MB", default_value_t = 150)]
    pub body_limit_mb: usize,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_mb.saturating_mul(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "nanoserve",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--log-format",
            "text",
            "--body-limit-mb",
            "2",
            "--python3-runtime-url",
            "http://localhost:50051",
            "--public-dir",
            "public",
        ])
        .unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.body_limit_bytes(), 2 * 1024 * 1024);
        assert_eq!(
            config.python3_runtime_url.as_deref(),
            Some("http://localhost:50051")
        );
        assert_eq!(config.public_dir, Some(PathBuf::from("public")));
    }

    #[test]
    fn public_dir_is_off_by_default() {
        let config = Config::try_parse_from(["nanoserve"]).unwrap();
        assert_eq!(config.public_dir, None);
    }

    #[test]
    fn invalid_host_is_rejected() {
        assert!(Config::try_parse_from(["nanoserve", "--host", "not-an-ip"]).is_err());
    }
}
