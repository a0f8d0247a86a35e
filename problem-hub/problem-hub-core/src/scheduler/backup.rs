use chrono::{Local, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{HubError, Result};

const PREFIX: &str = "backup_";

/// Timestamped copies of the data directory's JSON files.
///
/// Directory names sort lexicographically in creation order, which is what
/// retention relies on.
pub struct BackupManager {
    data_dir: PathBuf,
    backup_dir: PathBuf,
    retention: usize,
}

impl BackupManager {
    pub fn new(data_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            data_dir: data_dir.into(),
            backup_dir: backup_dir.into(),
            retention,
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn create_backup(&self) -> Result<PathBuf> {
        self.create_backup_at(Local::now().naive_local())
    }

    /// Copy every `*.json` file of the data directory into a new
    /// `backup_<stamp>` directory, then prune.
    pub fn create_backup_at(&self, at: NaiveDateTime) -> Result<PathBuf> {
        let target = self
            .backup_dir
            .join(format!("{PREFIX}{}", at.format("%Y%m%d_%H%M%S_%6f")));
        fs::create_dir_all(&self.backup_dir).map_err(|e| HubError::io(&self.backup_dir, e))?;
        fs::create_dir(&target).map_err(|e| HubError::io(&target, e))?;

        let mut copied = 0usize;
        for entry in WalkDir::new(&self.data_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&self.data_dir).to_path_buf();
                HubError::io(path, e.into())
            })?;
            let is_json = entry.path().extension().is_some_and(|ext| ext == "json");
            if entry.file_type().is_file() && is_json {
                let dest = target.join(entry.file_name());
                fs::copy(entry.path(), &dest).map_err(|e| HubError::io(entry.path(), e))?;
                copied += 1;
            }
        }
        info!(path = %target.display(), files = copied, "created backup");

        self.prune()?;
        Ok(target)
    }

    /// Backup directories, oldest first.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }
        let mut backups = Vec::new();
        for entry in WalkDir::new(&self.backup_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| HubError::io(&self.backup_dir, e.into()))?;
            let is_backup = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(PREFIX));
            if entry.file_type().is_dir() && is_backup {
                backups.push(entry.into_path());
            }
        }
        Ok(backups)
    }

    /// Remove all but the newest `retention` backups. Returns how many were
    /// removed.
    pub fn prune(&self) -> Result<usize> {
        let backups = self.list()?;
        let excess = backups.len().saturating_sub(self.retention);
        for old in &backups[..excess] {
            fs::remove_dir_all(old).map_err(|e| HubError::io(old, e))?;
            debug!(path = %old.display(), "removed old backup");
        }
        Ok(excess)
    }
}
