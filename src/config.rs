use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::net::SocketAddr;

use crate::error::{Error, Result};
use crate::options::DriverOptions;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub user: String,
    #[serde(skip_serializing, default = "default_password")]
    pub password: SecretString,
    pub host: String,
    pub port: u16,
    pub database: String,
    /// Driver options passed through to the pool, e.g. `max_connections`.
    #[serde(default)]
    pub options: DriverOptions,
    /// SQL run once against a fresh pool before it is published.
    #[serde(default)]
    pub init_sql: Option<String>,
}

fn default_password() -> SecretString {
    SecretString::from("password".to_string())
}

impl Config {
    /// Load configuration from environment variables, with defaults.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            // Override with environment variables using `POOL_LIFESPAN` prefix and `__` separator
            // e.g., POOL_LIFESPAN__DATABASE__USER="my_user"
            .add_source(
                config::Environment::with_prefix("POOL_LIFESPAN")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

impl ServerConfig {
    /// Socket address to bind the HTTP listener to.
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Configuration(format!("invalid server address: {e}")))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl DatabaseConfig {
    /// Constructs the database connection string.
    pub fn connection_string(&self) -> SecretString {
        SecretString::from(format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user,
            self.password.expose_secret(),
            self.host,
            self.port,
            self.database
        ))
    }

    pub fn driver_options(&self) -> DriverOptions {
        self.options.clone()
    }
}

// Default values for the database configuration
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            user: "postgres".to_string(),
            password: default_password(),
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            options: DriverOptions::default(),
            init_sql: None,
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Password is skipped by serde, so it never reaches the output
        match serde_json::to_string_pretty(&self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "Error serializing config"),
        }
    }
}
