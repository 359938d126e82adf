//! Installed plugin metadata
//!
//! The list of installed plugins is the durable source of truth across
//! restarts. It lives in `installed.json` and is rewritten wholesale on every
//! change.

use crate::resolver::DependencyInfo;
use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledPluginRecord {
    pub plugin_id: String,
    pub plugin_name: String,
    /// Installed package version
    #[serde(with = "crate::package::version::lenient")]
    pub version: Version,
    pub package_id: String,
    pub install_path: PathBuf,
    #[serde(default)]
    pub dependencies: Vec<DependencyInfo>,
    pub install_date_utc: DateTime<Utc>,
}

/// JSON file holding every [`InstalledPluginRecord`]
#[derive(Debug, Clone)]
pub struct PluginStore {
    path: PathBuf,
}

impl PluginStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records; a missing file is an empty list
    pub async fn load(&self) -> Result<Vec<InstalledPluginRecord>, EngineError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&contents).map_err(|e| {
            EngineError::Serialization(format!("{}: {}", self.path.display(), e))
        })
    }

    /// Replace the file with `records`
    pub async fn save(&self, records: &[InstalledPluginRecord]) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(records)
            .map_err(|e| EngineError::Serialization(e.to_string()))?;

        // Write-then-rename so a crash never leaves a torn file
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, json).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        debug!("Saved {} plugin record(s)", records.len());
        Ok(())
    }

    pub async fn find(&self, plugin_id: &str) -> Result<Option<InstalledPluginRecord>, EngineError> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|r| r.plugin_id.eq_ignore_ascii_case(plugin_id)))
    }

    /// Insert `record`, replacing any record with the same plugin id
    pub async fn upsert(&self, record: InstalledPluginRecord) -> Result<(), EngineError> {
        let mut records = self.load().await?;
        records.retain(|r| !r.plugin_id.eq_ignore_ascii_case(&record.plugin_id));
        records.push(record);
        self.save(&records).await
    }

    /// Remove the record for `plugin_id`, returning it
    pub async fn remove(&self, plugin_id: &str) -> Result<Option<InstalledPluginRecord>, EngineError> {
        let mut records = self.load().await?;
        let Some(position) = records
            .iter()
            .position(|r| r.plugin_id.eq_ignore_ascii_case(plugin_id))
        else {
            return Ok(None);
        };

        let removed = records.remove(position);
        self.save(&records).await?;
        Ok(Some(removed))
    }
}
