//! Layered configuration for the Veil client.
//!
//! Settings are resolved in this order, later layers winning:
//! 1. built-in defaults
//! 2. `{state_dir}/veil.toml`
//! 3. environment (`VEIL_SERVER_URL`; `.env` is loaded at startup)
//! 4. CLI flags
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! url = "http://127.0.0.1:8000"
//! request_timeout_secs = 30
//!
//! [polling]
//! interval_ms = 2000
//! input_interval_ms = 2000
//! auto_reset_delay_ms = 3000
//!
//! [session]
//! ttl_secs = 3600
//! minimum_amount = 100000
//!
//! [upload]
//! max_file_bytes = 10485760
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::coordinator::{CoordinatorSettings, DEFAULT_MINIMUM_AMOUNT};
use crate::store::{FileSnapshotStore, SNAPSHOT_FILE_NAME};

pub const CONFIG_FILE_NAME: &str = "veil.toml";
pub const SERVER_URL_ENV: &str = "VEIL_SERVER_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_server_url")]
    pub url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingSection {
    /// Milliseconds between status queries
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Milliseconds between status queries once both companies are present
    #[serde(default = "default_interval_ms")]
    pub input_interval_ms: u64,
    /// Milliseconds between invalidation and the automatic reset
    #[serde(default = "default_auto_reset_delay_ms")]
    pub auto_reset_delay_ms: u64,
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_auto_reset_delay_ms() -> u64 {
    3000
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            input_interval_ms: default_interval_ms(),
            auto_reset_delay_ms: default_auto_reset_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    /// Seconds a saved session stays resumable
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Smallest amount accepted for a commitment. Never below 100000.
    #[serde(default = "default_minimum_amount")]
    pub minimum_amount: f64,
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_minimum_amount() -> f64 {
    DEFAULT_MINIMUM_AMOUNT
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            minimum_amount: default_minimum_amount(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSection {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

/// The complete veil.toml structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VeilToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub polling: PollingSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub upload: UploadSection,
}

impl VeilToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse veil.toml")
    }

    /// Load `{state_dir}/veil.toml`, or defaults when absent.
    pub fn load_or_default(state_dir: &Path) -> Result<Self> {
        let config_path = state_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize veil.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any problems found.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if !is_http_url(&self.server.url) {
            problems.push(format!(
                "server.url '{}' must start with http:// or https://",
                self.server.url
            ));
        }
        if self.server.request_timeout_secs == 0 {
            problems.push("server.request_timeout_secs must be greater than 0".to_string());
        }
        if self.polling.interval_ms == 0 {
            problems.push("polling.interval_ms must be greater than 0".to_string());
        }
        if self.polling.input_interval_ms == 0 {
            problems.push("polling.input_interval_ms must be greater than 0".to_string());
        }
        if self.session.ttl_secs == 0 {
            problems.push("session.ttl_secs must be greater than 0".to_string());
        }
        if !self.session.minimum_amount.is_finite()
            || self.session.minimum_amount < DEFAULT_MINIMUM_AMOUNT
        {
            problems.push(format!(
                "session.minimum_amount must be at least {}, got {}",
                DEFAULT_MINIMUM_AMOUNT, self.session.minimum_amount
            ));
        }
        if self.upload.max_file_bytes == 0 {
            problems.push("upload.max_file_bytes must be greater than 0".to_string());
        }

        problems
    }
}

fn is_http_url(url: &str) -> bool {
    let url = url.trim();
    (url.starts_with("http://") && url.len() > "http://".len())
        || (url.starts_with("https://") && url.len() > "https://".len())
}

/// `dirs::data_local_dir()/veil`, or `./.veil` where that is unavailable.
pub fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("veil"))
        .unwrap_or_else(|| PathBuf::from(".veil"))
}

/// First non-empty value wins.
fn first_set(candidates: [Option<String>; 3]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct VeilConfig {
    pub state_dir: PathBuf,
    pub toml: VeilToml,
    /// Server URL after applying env and CLI overrides
    pub server_url: String,
    pub verbose: bool,
    /// Skip interactive prompts
    pub yes: bool,
}

impl VeilConfig {
    /// Resolve configuration for `state_dir` (or the default directory).
    pub fn load(state_dir: Option<PathBuf>, cli_server_url: Option<String>) -> Result<Self> {
        let state_dir = state_dir.unwrap_or_else(default_state_dir);
        let toml = VeilToml::load_or_default(&state_dir)?;
        let server_url = first_set([
            cli_server_url,
            std::env::var(SERVER_URL_ENV).ok(),
            Some(toml.server.url.clone()),
        ])
        .unwrap_or_else(default_server_url);

        Ok(Self {
            state_dir,
            toml,
            server_url,
            verbose: false,
            yes: false,
        })
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_yes(mut self, yes: bool) -> Self {
        self.yes = yes;
        self
    }

    pub fn config_file(&self) -> PathBuf {
        self.state_dir.join(CONFIG_FILE_NAME)
    }

    pub fn snapshot_file(&self) -> PathBuf {
        self.state_dir.join(SNAPSHOT_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.toml.server.request_timeout_secs)
    }

    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.toml.session.ttl_secs)
    }

    pub fn snapshot_store(&self) -> FileSnapshotStore {
        FileSnapshotStore::new(self.snapshot_file()).with_ttl(self.snapshot_ttl())
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings::default()
            .with_poll_interval(Duration::from_millis(self.toml.polling.interval_ms))
            .with_input_poll_interval(Duration::from_millis(self.toml.polling.input_interval_ms))
            .with_auto_reset_delay(Duration::from_millis(self.toml.polling.auto_reset_delay_ms))
            .with_minimum_amount(self.toml.session.minimum_amount)
            .with_max_file_bytes(self.toml.upload.max_file_bytes)
    }

    /// Validate the file settings plus the resolved server URL.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = self.toml.validate();
        if self.server_url != self.toml.server.url && !is_http_url(&self.server_url) {
            problems.push(format!(
                "server URL '{}' must start with http:// or https://",
                self.server_url
            ));
        }
        problems
    }

    /// Fail with every problem listed when the configuration is unusable.
    pub fn ensure_valid(&self) -> Result<()> {
        let problems = self.validate();
        if problems.is_empty() {
            return Ok(());
        }
        anyhow::bail!(
            "Invalid configuration in {}:\n  - {}\nRun 'veil config validate' for details",
            self.config_file().display(),
            problems.join("\n  - ")
        )
    }
}
