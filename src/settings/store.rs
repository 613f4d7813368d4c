//! Settings persistence and the in-process snapshot slot.
//!
//! Readers never see a half-applied update: every evaluation pass grabs one
//! `Arc` snapshot and works against it; `update` swaps the slot only after
//! the merged document validated and persisted.

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::{merge_with_defaults, MessagingSettings, SettingsError};

/// Where the `messaging_settings` document lives. The host usually points
/// this at its own system-settings table; the file impl covers standalone
/// deployments and tests.
pub trait SettingsRepository: Send + Sync {
    fn load(&self) -> anyhow::Result<Option<Value>>;
    fn save(&self, document: &Value) -> anyhow::Result<()>;
}

pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/messaging_settings.json`, matching the document key.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let mut path = dir.into();
        path.push(format!("{}.json", super::SETTINGS_KEY));
        Self { path }
    }
}

impl SettingsRepository for JsonFileRepository {
    fn load(&self) -> anyhow::Result<Option<Value>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, document: &Value) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(document)?)?;
        Ok(())
    }
}

/// Volatile repository for tests.
#[derive(Default)]
pub struct InMemoryRepository {
    document: parking_lot::Mutex<Option<Value>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: Value) -> Self {
        Self {
            document: parking_lot::Mutex::new(Some(document)),
        }
    }

    pub fn saved_document(&self) -> Option<Value> {
        self.document.lock().clone()
    }
}

impl SettingsRepository for InMemoryRepository {
    fn load(&self) -> anyhow::Result<Option<Value>> {
        Ok(self.document.lock().clone())
    }

    fn save(&self, document: &Value) -> anyhow::Result<()> {
        *self.document.lock() = Some(document.clone());
        Ok(())
    }
}

pub struct SettingsStore {
    repository: Arc<dyn SettingsRepository>,
    current: RwLock<Arc<MessagingSettings>>,
}

impl SettingsStore {
    /// Load the saved document (or start from defaults) and build the
    /// initial snapshot.
    pub fn load(repository: Arc<dyn SettingsRepository>) -> Result<Self, SettingsError> {
        let saved = repository
            .load()
            .map_err(|e| SettingsError::Persist(e.to_string()))?
            .unwrap_or(Value::Object(Map::new()));
        let settings = MessagingSettings::from_document(&saved)?;
        Ok(Self {
            repository,
            current: RwLock::new(Arc::new(settings)),
        })
    }

    /// The current settings. Cheap; hold the `Arc` for the whole pass.
    pub fn snapshot(&self) -> Arc<MessagingSettings> {
        self.current.read().clone()
    }

    /// Merge a partial document over defaults, validate, persist, then swap
    /// the snapshot. On any error the previous snapshot stays active.
    pub fn update(&self, document: &Value) -> Result<Arc<MessagingSettings>, SettingsError> {
        let merged = merge_with_defaults(document);
        let settings: MessagingSettings = serde_json::from_value(merged.clone())?;
        settings.validate()?;
        self.repository
            .save(&merged)
            .map_err(|e| SettingsError::Persist(e.to_string()))?;

        let snapshot = Arc::new(settings);
        *self.current.write() = snapshot.clone();
        info!("messaging settings updated");
        Ok(snapshot)
    }
}
