// Per-guild configuration persistence.
//
// The whole record set is written through on every mutation; there is no
// per-guild locking, so concurrent administrator edits are last-write-wins.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use thiserror::Error;
use tracing::info;

use crate::models::guild::GuildConfig;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access config store: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode config store: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Backing persistence for the config store. Injectable so tests can run
/// against an in-memory backend instead of a file.
pub trait ConfigBackend: Send + Sync {
    fn load(&self) -> Result<HashMap<String, GuildConfig>, StoreError>;
    fn persist(&self, configs: &HashMap<String, GuildConfig>) -> Result<(), StoreError>;
}

/// Stores the full record set as one pretty-printed JSON document.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigBackend for JsonFileBackend {
    fn load(&self) -> Result<HashMap<String, GuildConfig>, StoreError> {
        if !self.path.exists() {
            // First run: empty store, not an error
            return Ok(HashMap::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn persist(&self, configs: &HashMap<String, GuildConfig>) -> Result<(), StoreError> {
        let raw = serde_json::to_string_pretty(configs)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

/// Keeps everything in memory; used by tests.
#[derive(Default, Clone)]
pub struct MemoryBackend {
    inner: Arc<Mutex<HashMap<String, GuildConfig>>>,
}

impl ConfigBackend for MemoryBackend {
    fn load(&self) -> Result<HashMap<String, GuildConfig>, StoreError> {
        Ok(self.inner.lock().expect("memory backend poisoned").clone())
    }

    fn persist(&self, configs: &HashMap<String, GuildConfig>) -> Result<(), StoreError> {
        *self.inner.lock().expect("memory backend poisoned") = configs.clone();
        Ok(())
    }
}

/// In-memory cache of all guild configs plus the write-through backend.
pub struct ConfigStore {
    backend: Box<dyn ConfigBackend>,
    cache: DashMap<String, GuildConfig>,
}

impl ConfigStore {
    pub fn new(backend: impl ConfigBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            cache: DashMap::new(),
        }
    }

    /// Read all persisted records into the cache. Called once at startup.
    pub fn load(&self) -> Result<(), StoreError> {
        let configs = self.backend.load()?;
        info!("Loaded {} guild config(s)", configs.len());
        self.cache.clear();
        for (guild_id, config) in configs {
            self.cache.insert(guild_id, config);
        }
        Ok(())
    }

    /// Return the config for a guild, creating and persisting the default
    /// record first if none exists. "Get" may be creation.
    pub fn get_or_create(&self, guild_id: &str) -> Result<GuildConfig, StoreError> {
        if let Some(existing) = self.cache.get(guild_id) {
            return Ok(existing.clone());
        }
        let config = GuildConfig::default();
        self.cache.insert(guild_id.to_string(), config.clone());
        self.save()?;
        info!("Created default config for guild {}", guild_id);
        Ok(config)
    }

    /// Replace a guild's record and persist the full set (write-through).
    pub fn put(&self, guild_id: &str, config: GuildConfig) -> Result<(), StoreError> {
        self.cache.insert(guild_id.to_string(), config);
        self.save()
    }

    /// Durably persist the full record set.
    pub fn save(&self) -> Result<(), StoreError> {
        let snapshot: HashMap<String, GuildConfig> = self
            .cache
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        self.backend.persist(&snapshot)
    }
}
