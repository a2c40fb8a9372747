//! Application configuration for the Repodex server.
//!
//! User config lives at `~/.repodex/repodex.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are referenced by environment-variable name and never stored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RepodexError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "repodex.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".repodex";

// ---------------------------------------------------------------------------
// Config structs (matching repodex.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database location.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Session token settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// First-run admin bootstrap.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public base URL used for sitemap links (the service never trusts
    /// forwarded headers).
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Base URL of a GitHub info-card renderer. When unset, repository
    /// listings carry no card links.
    #[serde(default)]
    pub card_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            public_url: default_public_url(),
            card_base_url: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}
fn default_public_url() -> String {
    "http://localhost:8000".into()
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "repodex.db".into()
}

/// `[auth]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Name of the env var holding the JWT signing secret
    /// (never store the secret itself).
    #[serde(default = "default_jwt_secret_env")]
    pub jwt_secret_env: String,

    /// Session token lifetime in minutes.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret_env: default_jwt_secret_env(),
            token_ttl_minutes: default_token_ttl(),
        }
    }
}

fn default_jwt_secret_env() -> String {
    "REPODEX_JWT_SECRET".into()
}
fn default_token_ttl() -> i64 {
    // 24-hour sessions
    1440
}

/// `[bootstrap]` section — default admin created when the table is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Env var holding the initial admin username.
    #[serde(default = "default_username_env")]
    pub username_env: String,

    /// Env var holding the initial admin password.
    #[serde(default = "default_password_env")]
    pub password_env: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            username_env: default_username_env(),
            password_env: default_password_env(),
        }
    }
}

fn default_username_env() -> String {
    "REPODEX_ADMIN_USERNAME".into()
}
fn default_password_env() -> String {
    "REPODEX_ADMIN_PASSWORD".into()
}

impl AppConfig {
    /// Resolve the JWT signing secret from the configured env var.
    pub fn jwt_secret(&self) -> Result<String> {
        match std::env::var(&self.auth.jwt_secret_env) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Err(RepodexError::config(format!(
                "JWT secret not found. Set the {} environment variable.",
                self.auth.jwt_secret_env
            ))),
        }
    }

    /// Resolve bootstrap admin credentials, falling back to well-known
    /// defaults for local development.
    pub fn bootstrap_credentials(&self) -> (String, String) {
        let username =
            std::env::var(&self.bootstrap.username_env).unwrap_or_else(|_| "admin".into());
        let password =
            std::env::var(&self.bootstrap.password_env).unwrap_or_else(|_| "admin123".into());
        (username, password)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.repodex/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RepodexError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.repodex/repodex.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RepodexError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RepodexError::config(format!("failed to parse {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("public_url"));
        assert!(toml_str.contains("REPODEX_JWT_SECRET"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.server.port, 8000);
        assert_eq!(parsed.auth.token_ttl_minutes, 1440);
        assert_eq!(parsed.database.path, "repodex.db");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[server]
port = 9000

[database]
path = "/var/lib/repodex/catalog.db"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.card_base_url, None);
        assert_eq!(config.database.path, "/var/lib/repodex/catalog.db");
        assert_eq!(config.auth.jwt_secret_env, "REPODEX_JWT_SECRET");
    }

    #[test]
    fn jwt_secret_requires_env() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.auth.jwt_secret_env = "REPODEX_TEST_NONEXISTENT_SECRET_98765".into();
        let result = config.jwt_secret();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("JWT secret"));
    }

    #[test]
    fn bootstrap_falls_back_to_defaults() {
        let mut config = AppConfig::default();
        config.bootstrap.username_env = "REPODEX_TEST_NONEXISTENT_USER_98765".into();
        config.bootstrap.password_env = "REPODEX_TEST_NONEXISTENT_PASS_98765".into();
        let (user, pass) = config.bootstrap_credentials();
        assert_eq!(user, "admin");
        assert_eq!(pass, "admin123");
    }
}
