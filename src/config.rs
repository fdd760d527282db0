//! Configuration loading and validation.
//!
//! Loads `config.toml` from `$TORRENT_QUOTA_CONFIG` or
//! `~/.torrent-quota/config.toml`. Every section uses `#[serde(default)]`,
//! so a missing or empty file is valid.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use chrono::FixedOffset;
use serde::Deserialize;

/// Env var naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TORRENT_QUOTA_CONFIG";

const CONFIG_DIR_NAME: &str = ".torrent-quota";
const CONFIG_FILE_NAME: &str = "config.toml";
const LEDGER_FILE_NAME: &str = "usage.json";

/// Largest accepted timezone offset, in minutes.
const MAX_OFFSET_MINUTES: u32 = 24 * 60;

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transfer cap.
    pub cap: CapConfig,
    /// Transmission RPC endpoint and credentials.
    pub transmission: TransmissionConfig,
    /// Accounting timezone and resume window.
    pub schedule: ScheduleConfig,
    /// Ledger storage.
    pub ledger: LedgerConfig,
    /// Log filtering and optional file output.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration with precedence env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the merged configuration fails validation.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok())?;
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file only, no env overrides or validation.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::debug!(path = %path.display(), "loading config from file");
                toml::from_str(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => {
                Err(e).with_context(|| format!("failed to read config at {}", path.display()))
            }
        }
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid config TOML.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    /// Resolve the config file path using a custom env resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if no override is set and the home directory cannot
    /// be determined.
    pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<PathBuf> {
        if let Some(p) = env(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(p));
        }
        Ok(config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function so tests never touch the process environment.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("TORRENT_QUOTA_HOST") {
            self.transmission.host = v;
        }
        if let Some(v) = env("TORRENT_QUOTA_PORT") {
            parse_override("TORRENT_QUOTA_PORT", &v, &mut self.transmission.port);
        }
        if let Some(v) = env("TORRENT_QUOTA_USERNAME") {
            self.transmission.username = Some(v);
        }
        if let Some(v) = env("TORRENT_QUOTA_PASSWORD") {
            self.transmission.password = Some(v);
        }
        if let Some(v) = env("TORRENT_QUOTA_MONTHLY_GIB") {
            parse_override("TORRENT_QUOTA_MONTHLY_GIB", &v, &mut self.cap.monthly_gib);
        }
        if let Some(v) = env("TORRENT_QUOTA_LEDGER") {
            self.ledger.path = Some(PathBuf::from(v));
        }
    }

    /// Validate that configuration values are within sane bounds.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid value.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.cap.monthly_gib > 0, "cap.monthly_gib must be > 0");
        anyhow::ensure!(
            !self.transmission.host.trim().is_empty(),
            "transmission.host must not be empty"
        );
        anyhow::ensure!(
            self.transmission.rpc_path.starts_with('/'),
            "transmission.rpc_path must start with '/'"
        );
        anyhow::ensure!(
            self.transmission.timeout_secs > 0,
            "transmission.timeout_secs must be > 0"
        );
        anyhow::ensure!(
            self.schedule.utc_offset_minutes.unsigned_abs() < MAX_OFFSET_MINUTES,
            "schedule.utc_offset_minutes must be within +/-24 hours"
        );
        anyhow::ensure!(
            self.schedule.resume_hour <= 23,
            "schedule.resume_hour must be <= 23"
        );
        anyhow::ensure!(
            self.schedule.resume_minute_threshold <= 60,
            "schedule.resume_minute_threshold must be <= 60"
        );
        Ok(())
    }

    /// Resolved ledger path (configured or `~/.torrent-quota/usage.json`).
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured and the home directory
    /// cannot be determined.
    pub fn ledger_path(&self) -> anyhow::Result<PathBuf> {
        match &self.ledger.path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join(LEDGER_FILE_NAME)),
        }
    }
}

fn parse_override<T: FromStr>(var: &str, value: &str, slot: &mut T) {
    match value.parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!(var, value, "ignoring invalid env override"),
    }
}

/// Resolve the default config directory (`~/.torrent-quota/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(CONFIG_DIR_NAME))
}

// ── Cap config ──────────────────────────────────────────────────

/// Monthly transfer cap.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CapConfig {
    /// Cap in GiB for the whole accounting month.
    pub monthly_gib: u32,
}

impl Default for CapConfig {
    fn default() -> Self {
        Self { monthly_gib: 200 }
    }
}

// ── Transmission config ─────────────────────────────────────────

/// Transmission RPC endpoint and credentials.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TransmissionConfig {
    /// Daemon host name or address.
    pub host: String,
    /// RPC port.
    pub port: u16,
    /// RPC path on the daemon.
    pub rpc_path: String,
    /// Basic-auth user, if RPC authentication is enabled.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl TransmissionConfig {
    /// Full RPC URL.
    pub fn rpc_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.rpc_path)
    }
}

impl std::fmt::Debug for TransmissionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransmissionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("rpc_path", &self.rpc_path)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "__REDACTED__"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 9091,
            rpc_path: "/transmission/rpc".to_owned(),
            username: None,
            password: None,
            timeout_secs: 30,
        }
    }
}

// ── Schedule config ─────────────────────────────────────────────

/// Accounting timezone and the daily resume window.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Offset of the accounting timezone from UTC, in minutes.
    pub utc_offset_minutes: i32,
    /// Hour at which the resume window opens.
    pub resume_hour: u32,
    /// The window covers minutes `0..resume_minute_threshold` of that hour.
    pub resume_minute_threshold: u32,
}

impl ScheduleConfig {
    /// The accounting timezone as a fixed offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset is out of range.
    pub fn offset(&self) -> anyhow::Result<FixedOffset> {
        let seconds = self.utc_offset_minutes.checked_mul(60).ok_or_else(|| {
            anyhow::anyhow!("utc_offset_minutes out of range: {}", self.utc_offset_minutes)
        })?;
        FixedOffset::east_opt(seconds).ok_or_else(|| {
            anyhow::anyhow!("utc_offset_minutes out of range: {}", self.utc_offset_minutes)
        })
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: -300,
            resume_hour: 0,
            resume_minute_threshold: 8,
        }
    }
}

// ── Ledger config ───────────────────────────────────────────────

/// Ledger storage location.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON ledger path; defaults to `~/.torrent-quota/usage.json`.
    pub path: Option<PathBuf>,
}

// ── Logging config ──────────────────────────────────────────────

/// Log filtering and output.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for daily-rotated JSON logs; stderr only when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            dir: None,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
