//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use serde::Deserialize;
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(127, 0, 0, 1),
            port: 3000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Default sandbox settings used when a request does not override them
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    pub mysql_image: String,
    pub timeout_secs: u64,
    pub cleanup: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            mysql_image: "mysql:8.0".to_string(),
            timeout_secs: 120,
            cleanup: true,
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub sandbox: SandboxConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: std::env::var("HOST")
                .ok()
                .and_then(|h| h.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().port),
        };

        let cors = CorsConfig {
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        let sandbox = SandboxConfig {
            mysql_image: std::env::var("SANDBOX_MYSQL_IMAGE")
                .unwrap_or_else(|_| SandboxConfig::default().mysql_image),
            timeout_secs: std::env::var("SANDBOX_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(|| SandboxConfig::default().timeout_secs),
            cleanup: std::env::var("SANDBOX_CLEANUP")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
        };

        if sandbox.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "SANDBOX_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(Self { server, cors, sandbox })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_default_sandbox_config() {
        let config = SandboxConfig::default();
        assert_eq!(config.mysql_image, "mysql:8.0");
        assert_eq!(config.timeout_secs, 120);
        assert!(config.cleanup);
    }
}
