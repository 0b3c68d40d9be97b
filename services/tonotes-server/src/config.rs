//! Server Configuration
//!
//! Layered, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. `config/default`, `config/local`, then the file given with `--config`
//! 3. `TONOTES__SECTION__KEY` environment variables
//! 4. the flat variables deployments already set (`JWT_SECRET_KEY`,
//!    `MONGO_URI`, `REDIS_URL`, `SESSION_DURATION`, ...)
//! 5. CLI flags, applied in `main`

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use tonotes_api::ApiConfig;
use tonotes_auth::AuthConfig;
use tonotes_db::DatabaseConfig;

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server binding configuration
    pub server: ServerSettings,
    /// MongoDB and Redis connections
    pub database: DatabaseConfig,
    /// Tokens, passwords, sessions, 2FA
    pub auth: AuthConfig,
    /// HTTP layers
    pub api: ApiSettings,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server binding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Grace period for in-flight requests after a shutdown signal, in seconds
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            shutdown_timeout_secs: 30,
        }
    }
}

impl ServerSettings {
    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address {}:{}: {}", self.host, self.port, e))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub enable_cors: bool,
    /// CORS allowed origins; `*` allows any
    pub cors_origins: Vec<String>,
    pub enable_compression: bool,
    pub enable_tracing: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        let defaults = ApiConfig::default();
        Self {
            enable_cors: defaults.enable_cors,
            cors_origins: defaults.cors_origins,
            enable_compression: defaults.enable_compression,
            enable_tracing: defaults.enable_tracing,
        }
    }
}

impl From<&ApiSettings> for ApiConfig {
    fn from(settings: &ApiSettings) -> Self {
        Self {
            enable_cors: settings.enable_cors,
            cors_origins: settings.cors_origins.clone(),
            enable_compression: settings.enable_compression,
            enable_tracing: settings.enable_tracing,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl ServerConfig {
    /// Load configuration from files and the environment
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TONOTES")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut server_config: ServerConfig = builder.build()?.try_deserialize()?;
        server_config.apply_env(|name| std::env::var(name).ok())?;

        Ok(server_config)
    }

    /// Overlay the flat environment variables
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.auth.apply_env(&lookup)?;
        self.database.apply_env(&lookup);
        if let Some(port) = lookup("PORT").and_then(|p| p.trim().parse().ok()) {
            self.server.port = port;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.logging.format, "pretty");
        assert!(config.api.enable_cors);
        assert_eq!(config.database.mongo_db, "tonotes");
    }

    #[test]
    fn test_partial_toml() {
        let source = r#"
            [server]
            port = 8080

            [auth.session]
            max_active = 3
            duration = "12h"
        "#;
        let config: ServerConfig = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.session.max_active, 3);
        assert_eq!(config.auth.session.duration, Duration::from_secs(12 * 60 * 60));
        assert_eq!(config.auth.jwt.issuer, "toNotes");
    }

    #[test]
    fn test_flat_env_wins() {
        let vars: HashMap<&str, &str> = [
            ("JWT_SECRET_KEY", "s3cret-from-the-environment-0123456789"),
            ("MONGO_URI", "mongodb://mongo:27017"),
            ("PORT", "9000"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerConfig::default();
        config
            .apply_env(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.auth.jwt.secret, "s3cret-from-the-environment-0123456789");
        assert_eq!(config.database.mongo_uri, "mongodb://mongo:27017");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_bad_env_duration_is_an_error() {
        let mut config = ServerConfig::default();
        let result = config.apply_env(|name| {
            (name == "SESSION_DURATION").then(|| "forever".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_socket_addr() {
        let settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 4000,
            ..Default::default()
        };
        assert_eq!(settings.socket_addr().unwrap().port(), 4000);

        let bad = ServerSettings {
            host: "not a host".to_string(),
            ..Default::default()
        };
        assert!(bad.socket_addr().is_err());
    }
}
