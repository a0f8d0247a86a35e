//! Service configuration: defaults, optional JSON file, `PROBLEM_HUB_*`
//! environment overrides.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{HubError, Result};

pub const DEV_TOKEN_SECRET: &str = "problem-hub-dev-secret";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Directory holding the JSON collections
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory receiving `backup_*` snapshots of the data directory
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Number of backups kept after each run (default 10)
    #[serde(default = "default_retention")]
    pub backup_retention: usize,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// HS256 secret for bearer tokens
    #[serde(default = "default_token_secret")]
    pub token_secret: String,

    /// Local time of the daily due-date reminder scan (default 09:00)
    #[serde(default = "default_reminder_time", with = "clock")]
    pub reminder_time: NaiveTime,

    /// Local time of the daily backup (default 00:00)
    #[serde(default = "default_backup_time", with = "clock")]
    pub backup_time: NaiveTime,

    /// How often the scheduler checks for due jobs (default 60s)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_backup_dir() -> PathBuf { PathBuf::from("backups") }
fn default_retention() -> usize { 10 }
fn default_listen_addr() -> String { "127.0.0.1:5000".to_string() }
fn default_token_secret() -> String { DEV_TOKEN_SECRET.to_string() }
fn default_reminder_time() -> NaiveTime { NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN) }
fn default_backup_time() -> NaiveTime { NaiveTime::MIN }
fn default_poll_interval() -> u64 { 60 }

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backup_dir: default_backup_dir(),
            backup_retention: default_retention(),
            listen_addr: default_listen_addr(),
            token_secret: default_token_secret(),
            reminder_time: default_reminder_time(),
            backup_time: default_backup_time(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// `HH:MM` wall-clock times; `HH:MM:SS` is accepted on input.
pub mod clock {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .ok()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&time.format("%H:%M"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time `{raw}`")))
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| HubError::Validation(format!("{key}: cannot parse `{raw}`")))
}

fn parse_time(key: &str, raw: &str) -> Result<NaiveTime> {
    clock::parse(raw.trim())
        .ok_or_else(|| HubError::Validation(format!("{key}: expected HH:MM, got `{raw}`")))
}

impl HubConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|e| HubError::io(path, e))?;
        serde_json::from_slice(&raw).map_err(|source| HubError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults overlaid with `PROBLEM_HUB_*` variables from the process
    /// environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_vars(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values from a variable lookup. Unset variables leave the
    /// current value in place.
    pub fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = var("PROBLEM_HUB_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = var("PROBLEM_HUB_BACKUP_DIR") {
            self.backup_dir = PathBuf::from(v);
        }
        if let Some(v) = var("PROBLEM_HUB_BACKUP_RETENTION") {
            self.backup_retention = parse_var("PROBLEM_HUB_BACKUP_RETENTION", &v)?;
        }
        if let Some(v) = var("PROBLEM_HUB_LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Some(v) = var("PROBLEM_HUB_TOKEN_SECRET") {
            self.token_secret = v;
        }
        if let Some(v) = var("PROBLEM_HUB_REMINDER_TIME") {
            self.reminder_time = parse_time("PROBLEM_HUB_REMINDER_TIME", &v)?;
        }
        if let Some(v) = var("PROBLEM_HUB_BACKUP_TIME") {
            self.backup_time = parse_time("PROBLEM_HUB_BACKUP_TIME", &v)?;
        }
        if let Some(v) = var("PROBLEM_HUB_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_var("PROBLEM_HUB_POLL_INTERVAL_SECS", &v)?;
        }
        Ok(())
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.token_secret == DEV_TOKEN_SECRET
    }
}
