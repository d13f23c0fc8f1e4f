//! Configuration for the `taskboard` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskboard/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error. The privileged service
//! credential never appears here; it belongs to `taskboard-api` only.

use std::path::PathBuf;
use std::time::Duration;

use taskboard_proto::UserId;

use crate::gateway::rest::RestSettings;
use crate::session::Session;

/// Errors that can occur when loading configuration.
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

    /// A setting parsed but is out of range.
    #[error("invalid setting {key}: {reason}")]
    InvalidValue {
        /// Dotted key of the setting.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    backend: BackendFileConfig,
    session: SessionFileConfig,
    sync: SyncFileConfig,
}

/// `[backend]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BackendFileConfig {
    url: Option<String>,
    api_key: Option<String>,
    api_url: Option<String>,
}

/// `[session]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    user_id: Option<String>,
    access_token: Option<String>,
    email: Option<String>,
}

/// `[sync]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    heartbeat_secs: Option<u64>,
    event_queue_capacity: Option<usize>,
    trend_days: Option<u32>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Backend --
    /// Backend project base URL.
    pub backend_url: Option<String>,
    /// Public project key.
    pub api_key: Option<String>,
    /// Privileged API base URL.
    pub api_url: Option<String>,

    // -- Session --
    /// Signed-in user id.
    pub user_id: Option<String>,
    /// Access token issued by the backend's auth service.
    pub access_token: Option<String>,
    /// Email on record.
    pub email: Option<String>,

    // -- Sync --
    /// Realtime heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Capacity of the realtime event queue.
    pub event_queue_capacity: usize,
    /// Days covered by the dashboard trend.
    pub trend_days: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            api_key: None,
            api_url: None,
            user_id: None,
            access_token: None,
            email: None,
            heartbeat_interval: Duration::from_secs(30),
            event_queue_capacity: 256,
            trend_days: 14,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or a setting is out of range.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        if file.sync.heartbeat_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "sync.heartbeat_secs",
                reason: "must be at least 1",
            });
        }

        Ok(Self {
            backend_url: cli
                .backend_url
                .clone()
                .or_else(|| file.backend.url.clone()),
            api_key: cli
                .api_key
                .clone()
                .or_else(|| file.backend.api_key.clone()),
            api_url: cli
                .api_url
                .clone()
                .or_else(|| file.backend.api_url.clone()),
            user_id: cli
                .user_id
                .clone()
                .or_else(|| file.session.user_id.clone()),
            access_token: cli
                .access_token
                .clone()
                .or_else(|| file.session.access_token.clone()),
            email: cli.email.clone().or_else(|| file.session.email.clone()),
            heartbeat_interval: file
                .sync
                .heartbeat_secs
                .map_or(defaults.heartbeat_interval, Duration::from_secs),
            event_queue_capacity: file
                .sync
                .event_queue_capacity
                .unwrap_or(defaults.event_queue_capacity),
            trend_days: file.sync.trend_days.unwrap_or(defaults.trend_days),
        })
    }

    /// The session, if a user id and an access token are configured.
    #[must_use]
    pub fn to_session(&self) -> Option<Session> {
        let user_id = self.user_id.clone().filter(|s| !s.is_empty())?;
        let access_token = self.access_token.clone()?;
        Some(Session::new(
            UserId::new(user_id),
            access_token,
            self.email.clone(),
        ))
    }

    /// REST gateway settings, if the backend and session are configured.
    ///
    /// Returns `None` when anything is missing (offline demo mode). The
    /// privileged API defaults to the backend URL.
    #[must_use]
    pub fn to_rest_settings(&self) -> Option<RestSettings> {
        let backend_url = self.backend_url.clone()?;
        let api_key = self.api_key.clone()?;
        let access_token = self.access_token.clone()?;
        Some(RestSettings {
            api_url: self.api_url.clone().unwrap_or_else(|| backend_url.clone()),
            backend_url,
            api_key,
            access_token,
            heartbeat: self.heartbeat_interval,
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Task lists with realtime sync")]
pub struct CliArgs {
    /// Backend project base URL.
    #[arg(long, env = "TASKBOARD_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Public project key.
    #[arg(long, env = "TASKBOARD_API_KEY")]
    pub api_key: Option<String>,

    /// Privileged API base URL (default: the backend URL).
    #[arg(long, env = "TASKBOARD_API_URL")]
    pub api_url: Option<String>,

    /// Signed-in user id.
    #[arg(long, env = "TASKBOARD_USER_ID")]
    pub user_id: Option<String>,

    /// Access token of the signed-in user.
    #[arg(long, env = "TASKBOARD_ACCESS_TOKEN")]
    pub access_token: Option<String>,

    /// Email of the signed-in user.
    #[arg(long, env = "TASKBOARD_EMAIL")]
    pub email: Option<String>,

    /// Run against seeded in-memory data instead of a backend.
    #[arg(long)]
    pub demo: bool,

    /// Path to config file (default: `~/.config/taskboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKBOARD_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskboard.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Client subcommands. Without one, `tasks` is run.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show lists.
    Lists,
    /// Show tasks grouped by list.
    Tasks {
        /// Show completed tasks instead of open ones.
        #[arg(long)]
        completed: bool,
    },
    /// Complete the given tasks in one bulk request.
    Complete {
        /// Task ids.
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Show one task, open or completed.
    Show {
        /// Task id.
        id: String,
    },
    /// Complete one task.
    Done {
        /// Task id.
        id: String,
    },
    /// Delete the given tasks.
    Delete {
        /// Task ids.
        #[arg(required = true)]
        ids: Vec<String>,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Add a task.
    AddTask {
        /// Task name.
        name: String,
        /// Description.
        #[arg(long, default_value = "")]
        description: String,
        /// Due date (`YYYY-MM-DD`, `YYYY-MM-DDTHH:MM` or RFC 3339).
        #[arg(long, default_value = "")]
        due: String,
        /// Target list id.
        #[arg(long)]
        list: Option<String>,
    },
    /// Edit a task; every field is written back.
    Edit {
        /// Task id.
        id: String,
        /// New name.
        #[arg(long)]
        name: String,
        /// New description; empty clears it.
        #[arg(long, default_value = "")]
        description: String,
        /// New due date; empty clears it.
        #[arg(long, default_value = "")]
        due: String,
    },
    /// Create a list.
    AddList {
        /// List name.
        name: String,
    },
    /// Follow realtime changes and reprint the board on each one.
    Watch,
    /// Show completion statistics.
    Dashboard {
        /// Days covered by the trend (default from config).
        #[arg(long)]
        days: Option<u32>,
    },
    /// Create or refresh the profile after registration.
    RegisterProfile,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("taskboard").join("config.toml");
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
