// src/storage/registry.rs
use dashmap::DashMap;
use log::{info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::server::{
    GlobalSettings, TrackedServer, DEFAULT_CHANNEL_FORMAT, DEFAULT_UPDATE_INTERVAL_SECS,
    MIN_UPDATE_INTERVAL_SECS,
};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("interval must be at least {min} seconds")]
    IntervalTooShort { min: u64 },
    #[error("failed to access state file: {0}")]
    Io(#[from] io::Error),
    #[error("state file is malformed: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GuildState {
    #[serde(default)]
    servers: BTreeMap<String, TrackedServer>,
    #[serde(default)]
    category_id: Option<String>,
    #[serde(default = "default_format")]
    channel_format: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateFile {
    #[serde(default)]
    api_token: Option<String>,
    #[serde(default = "default_interval")]
    update_interval_seconds: u64,
    #[serde(default)]
    guilds: BTreeMap<String, GuildState>,
}

fn default_format() -> String {
    DEFAULT_CHANNEL_FORMAT.to_string()
}

fn default_interval() -> u64 {
    DEFAULT_UPDATE_INTERVAL_SECS
}

/// One guild's settings. Entries live in their own map so that concurrent
/// add/remove of different servers never overwrite each other.
struct Tenant {
    servers: DashMap<String, TrackedServer>,
    category_id: RwLock<Option<String>>,
    channel_format: RwLock<String>,
}

impl Default for Tenant {
    fn default() -> Self {
        Self {
            servers: DashMap::new(),
            category_id: RwLock::new(None),
            channel_format: RwLock::new(default_format()),
        }
    }
}

impl From<GuildState> for Tenant {
    fn from(state: GuildState) -> Self {
        Self {
            servers: state.servers.into_iter().collect(),
            category_id: RwLock::new(state.category_id),
            channel_format: RwLock::new(state.channel_format),
        }
    }
}

/// Guild settings plus global settings. Setters persist the whole registry and
/// undo their in-memory change when the state file cannot be written.
pub struct TenantRegistry {
    tenants: DashMap<String, Arc<Tenant>>,
    global: RwLock<GlobalSettings>,
    state_path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl TenantRegistry {
    /// Registry that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            tenants: DashMap::new(),
            global: RwLock::new(GlobalSettings::default()),
            state_path: None,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let mut registry = Self::in_memory();
        registry.state_path = Some(path.to_path_buf());

        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No state file at {}, starting empty", path.display());
                return Ok(registry);
            }
            Err(e) => return Err(e.into()),
        };

        let state: StateFile = serde_json::from_slice(&raw)?;
        let mut interval = state.update_interval_seconds;
        if interval < MIN_UPDATE_INTERVAL_SECS {
            warn!("Stored interval {}s is below the minimum, using {}s", interval, MIN_UPDATE_INTERVAL_SECS);
            interval = MIN_UPDATE_INTERVAL_SECS;
        }
        *registry.global.get_mut() = GlobalSettings {
            api_token: state.api_token,
            update_interval_secs: interval,
        };
        for (guild_id, guild) in state.guilds {
            registry.tenants.insert(guild_id, Arc::new(guild.into()));
        }

        info!("Loaded {} guilds from {}", registry.tenants.len(), path.display());
        Ok(registry)
    }

    pub fn global(&self) -> GlobalSettings {
        self.global.read().clone()
    }

    pub async fn set_api_token(&self, token: Option<String>) -> Result<(), RegistryError> {
        let previous = std::mem::replace(&mut self.global.write().api_token, token);
        if let Err(e) = self.persist().await {
            self.global.write().api_token = previous;
            return Err(e);
        }
        Ok(())
    }

    pub async fn set_update_interval(&self, seconds: u64) -> Result<(), RegistryError> {
        if seconds < MIN_UPDATE_INTERVAL_SECS {
            return Err(RegistryError::IntervalTooShort { min: MIN_UPDATE_INTERVAL_SECS });
        }
        let previous = std::mem::replace(&mut self.global.write().update_interval_secs, seconds);
        if let Err(e) = self.persist().await {
            self.global.write().update_interval_secs = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn tenant_ids(&self) -> Vec<String> {
        self.tenants.iter().map(|t| t.key().clone()).collect()
    }

    fn tenant(&self, guild_id: &str) -> Option<Arc<Tenant>> {
        self.tenants.get(guild_id).map(|t| t.value().clone())
    }

    fn tenant_or_default(&self, guild_id: &str) -> Arc<Tenant> {
        self.tenants
            .entry(guild_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    pub fn tracked_servers(&self, guild_id: &str) -> Vec<(String, TrackedServer)> {
        self.tenant(guild_id)
            .map(|t| {
                t.servers
                    .iter()
                    .map(|e| (e.key().clone(), e.value().clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn tracked_server(&self, guild_id: &str, server_id: &str) -> Option<TrackedServer> {
        self.tenant(guild_id)?
            .servers
            .get(server_id)
            .map(|e| e.value().clone())
    }

    pub fn channel_format(&self, guild_id: &str) -> String {
        self.tenant(guild_id)
            .map(|t| t.channel_format.read().clone())
            .unwrap_or_else(default_format)
    }

    pub fn category_id(&self, guild_id: &str) -> Option<String> {
        self.tenant(guild_id)?.category_id.read().clone()
    }

    pub async fn set_category(&self, guild_id: &str, category_id: String) -> Result<(), RegistryError> {
        let tenant = self.tenant_or_default(guild_id);
        let previous = tenant.category_id.write().replace(category_id);
        if let Err(e) = self.persist().await {
            *tenant.category_id.write() = previous;
            return Err(e);
        }
        Ok(())
    }

    pub async fn set_channel_format(&self, guild_id: &str, format: String) -> Result<(), RegistryError> {
        let tenant = self.tenant_or_default(guild_id);
        let previous = std::mem::replace(&mut *tenant.channel_format.write(), format);
        if let Err(e) = self.persist().await {
            *tenant.channel_format.write() = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Inserts or replaces one entry, returning the replaced entry.
    pub async fn insert_server(
        &self,
        guild_id: &str,
        server_id: &str,
        entry: TrackedServer,
    ) -> Result<Option<TrackedServer>, RegistryError> {
        let tenant = self.tenant_or_default(guild_id);
        let previous = tenant.servers.insert(server_id.to_string(), entry);
        if let Err(e) = self.persist().await {
            match &previous {
                Some(old) => {
                    tenant.servers.insert(server_id.to_string(), old.clone());
                }
                None => {
                    tenant.servers.remove(server_id);
                }
            }
            return Err(e);
        }
        Ok(previous)
    }

    pub async fn remove_server(
        &self,
        guild_id: &str,
        server_id: &str,
    ) -> Result<Option<TrackedServer>, RegistryError> {
        let Some(tenant) = self.tenant(guild_id) else {
            return Ok(None);
        };
        let Some((_, removed)) = tenant.servers.remove(server_id) else {
            return Ok(None);
        };
        if let Err(e) = self.persist().await {
            tenant.servers.insert(server_id.to_string(), removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    fn snapshot(&self) -> StateFile {
        let global = self.global();
        let guilds = self
            .tenants
            .iter()
            .map(|t| {
                let tenant = t.value();
                let state = GuildState {
                    servers: tenant
                        .servers
                        .iter()
                        .map(|e| (e.key().clone(), e.value().clone()))
                        .collect(),
                    category_id: tenant.category_id.read().clone(),
                    channel_format: tenant.channel_format.read().clone(),
                };
                (t.key().clone(), state)
            })
            .collect();

        StateFile {
            api_token: global.api_token,
            update_interval_seconds: global.update_interval_secs,
            guilds,
        }
    }

    async fn persist(&self) -> Result<(), RegistryError> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };

        // Snapshot under the lock so an older snapshot never lands last.
        let _guard = self.write_lock.lock().await;
        let body = serde_json::to_vec_pretty(&self.snapshot())?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
