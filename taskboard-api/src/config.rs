//! Configuration for the `taskboard-api` server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskboard-api/config.toml`)
//! 4. Compiled defaults
//!
//! The service role key is only taken from the CLI or the environment.

use std::path::PathBuf;

/// Errors that can occur when loading API configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ApiConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    backend_url: Option<String>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the API server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Taskboard privileged API")]
pub struct ApiCliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "TASKBOARD_API_ADDR")]
    pub bind: Option<String>,

    /// Backend project base URL.
    #[arg(long, env = "TASKBOARD_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Elevated backend credential.
    #[arg(long, env = "TASKBOARD_SERVICE_ROLE_KEY", hide_env_values = true)]
    pub service_role_key: Option<String>,

    /// Path to config file (default: `~/.config/taskboard-api/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKBOARD_API_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved API server configuration.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:8787`).
    pub bind_addr: String,
    /// Backend project base URL.
    pub backend_url: Option<String>,
    /// Elevated backend credential.
    pub service_role_key: Option<String>,
    /// Log level filter string.
    pub log_level: String,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("backend_url", &self.backend_url)
            .field(
                "service_role_key",
                &self.service_role_key.as_ref().map(|_| "<redacted>"),
            )
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8787".to_string(),
            backend_url: None,
            service_role_key: None,
            log_level: "info".to_string(),
        }
    }
}

impl ApiConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &ApiCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &ApiCliArgs, file: &ApiConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            backend_url: cli
                .backend_url
                .clone()
                .or_else(|| file.server.backend_url.clone()),
            service_role_key: cli.service_role_key.clone().filter(|k| !k.is_empty()),
            log_level: cli.log_level.clone(),
        }
    }

    /// Backend URL and service key, if both are configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((
            self.backend_url.as_deref()?,
            self.service_role_key.as_deref()?,
        ))
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ApiConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ApiConfigFile::default());
    };
    let path = config_dir.join("taskboard-api").join("config.toml");
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ApiConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
