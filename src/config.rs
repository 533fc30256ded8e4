//! Connection configuration
//!
//! Settings come from an optional `basex.toml` file and are then overridden
//! by environment variables:
//!
//! - `BASEX_HOST` - Server host
//! - `BASEX_PORT` - Server port
//! - `BASEX_USER` - User name
//! - `BASEX_PASSWORD` - Password
//! - `BASEX_DATABASE` - Database to open after connecting
//!
//! These can be set in a `.env` file in the working directory.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ClientError, Result};

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "basex.toml";

/// Environment variable names
pub const ENV_HOST: &str = "BASEX_HOST";
pub const ENV_PORT: &str = "BASEX_PORT";
pub const ENV_USER: &str = "BASEX_USER";
pub const ENV_PASSWORD: &str = "BASEX_PASSWORD";
pub const ENV_DATABASE: &str = "BASEX_DATABASE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    /// Database opened right after the handshake
    #[serde(default)]
    pub database: Option<String>,
}

fn default_host() -> String {
    Config::DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    Config::DEFAULT_PORT
}

fn default_user() -> String {
    Config::DEFAULT_USER.to_string()
}

fn default_password() -> String {
    Config::DEFAULT_PASSWORD.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: default_password(),
            database: None,
        }
    }
}

impl Config {
    pub const DEFAULT_HOST: &'static str = "localhost";
    pub const DEFAULT_PORT: u16 = 1984;
    pub const DEFAULT_USER: &'static str = "admin";
    pub const DEFAULT_PASSWORD: &'static str = "admin";

    /// Loads `path`, or `basex.toml` in the working directory when present,
    /// then applies `.env` and process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE_NAME).exists() => {
                Self::from_file(Path::new(CONFIG_FILE_NAME))?
            }
            None => Self::default(),
        };

        if let Ok(env_path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", env_path.display());
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("Invalid config in {}: {}", path.display(), e))
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ClientError::Config(format!("Invalid config: {}", e)))
    }

    /// Overrides fields with the values returned by `lookup` for each
    /// `BASEX_*` variable. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(host) = get(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = get(ENV_PORT) {
            self.port = port
                .parse()
                .map_err(|_| ClientError::Config(format!("Invalid {}: '{}'", ENV_PORT, port)))?;
        }
        if let Some(user) = get(ENV_USER) {
            self.user = user;
        }
        if let Some(password) = get(ENV_PASSWORD) {
            self.password = password;
        }
        if let Some(database) = get(ENV_DATABASE) {
            self.database = Some(database);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1984);
        assert_eq!(config.user, "admin");
        assert_eq!(config.password, "admin");
        assert!(config.database.is_none());
    }

    #[test]
    fn test_parse_partial_file() {
        let config = Config::parse("host = \"basex.local\"\ndatabase = \"RePEc\"\n").unwrap();
        assert_eq!(config.host, "basex.local");
        assert_eq!(config.port, 1984);
        assert_eq!(config.database.as_deref(), Some("RePEc"));
    }

    #[test]
    fn test_parse_invalid() {
        let err = Config::parse("port = \"not a number\"").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 2984\nuser = \"reader\"\npassword = \"pw\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.port, 2984);
        assert_eq!(config.user, "reader");
        assert_eq!(config.password, "pw");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_HOST, "10.1.2.3"),
            (ENV_PORT, "1985"),
            (ENV_DATABASE, "factbook"),
            (ENV_USER, ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.host, "10.1.2.3");
        assert_eq!(config.port, 1985);
        assert_eq!(config.user, "admin");
        assert_eq!(config.database.as_deref(), Some("factbook"));
    }

    #[test]
    fn test_env_invalid_port() {
        let mut config = Config::default();
        let err = config
            .apply_env(|key| (key == ENV_PORT).then(|| "99999".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_PORT));
    }
}
