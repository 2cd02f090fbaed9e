// In-process stand-ins for the two upstream APIs.
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::models::server::{SearchHit, ServerSnapshot, ServerStatus};
use crate::sink::{ChannelApi, ChannelError, ChannelInfo, GUILD_CATEGORY, GUILD_VOICE};
use crate::source::{ServerSource, SourceError};

pub fn snapshot(players: u32, max: u32, name: &str, status: ServerStatus) -> ServerSnapshot {
    ServerSnapshot {
        players,
        max_players: max,
        name: name.to_string(),
        status,
        ip: None,
        port: None,
        country: None,
        rank: None,
        game: None,
    }
}

#[derive(Default)]
pub struct FakeChannels {
    channels: Mutex<HashMap<String, ChannelInfo>>,
    failing: Mutex<HashSet<String>>,
    renames: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeChannels {
    fn put(&self, id: &str, name: &str, kind: u8, guild_id: Option<&str>) {
        let info = ChannelInfo {
            name: name.to_string(),
            kind,
            guild_id: guild_id.map(str::to_string),
        };
        self.channels.lock().insert(id.to_string(), info);
    }

    /// A voice channel outside any particular guild.
    pub fn insert(&self, id: &str, name: &str) {
        self.put(id, name, GUILD_VOICE, None);
    }

    pub fn insert_category(&self, guild_id: &str, id: &str, name: &str) {
        self.put(id, name, GUILD_CATEGORY, Some(guild_id));
    }

    pub fn name_of(&self, id: &str) -> Option<String> {
        self.channels.lock().get(id).map(|c| c.name.clone())
    }

    pub fn remove(&self, id: &str) {
        self.channels.lock().remove(id);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn fail_renames_for(&self, id: &str) {
        self.failing.lock().insert(id.to_string());
    }

    pub fn rename_count(&self) -> usize {
        self.renames.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelApi for FakeChannels {
    async fn channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>, ChannelError> {
        Ok(self.channels.lock().get(channel_id).cloned())
    }

    async fn rename_channel(&self, channel_id: &str, name: &str) -> Result<(), ChannelError> {
        if self.failing.lock().contains(channel_id) {
            return Err(ChannelError::Forbidden("Missing Permissions".to_string()));
        }
        self.renames.fetch_add(1, Ordering::SeqCst);
        if let Some(channel) = self.channels.lock().get_mut(channel_id) {
            channel.name = name.to_string();
        }
        Ok(())
    }

    async fn create_channel(
        &self,
        guild_id: &str,
        _category_id: &str,
        name: &str,
        _reason: &str,
    ) -> Result<String, ChannelError> {
        let id = format!("created-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.put(&id, name, GUILD_VOICE, Some(guild_id));
        Ok(id)
    }

    async fn delete_channel(&self, channel_id: &str, _reason: &str) -> Result<(), ChannelError> {
        match self.channels.lock().remove(channel_id) {
            Some(_) => Ok(()),
            None => Err(ChannelError::Status { status: 404, body: "Unknown Channel".to_string() }),
        }
    }
}

#[derive(Default)]
pub struct FakeSource {
    servers: Mutex<HashMap<String, ServerSnapshot>>,
    fetched: Mutex<Vec<String>>,
    panicking: Mutex<HashSet<String>>,
}

impl FakeSource {
    pub fn insert(&self, id: &str, snapshot: ServerSnapshot) {
        self.servers.lock().insert(id.to_string(), snapshot);
    }

    /// Fetching `id` panics instead of returning.
    pub fn panic_on(&self, id: &str) {
        self.panicking.lock().insert(id.to_string());
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl ServerSource for FakeSource {
    async fn fetch(&self, server_id: &str, _token: Option<&str>) -> Option<ServerSnapshot> {
        self.fetched.lock().push(server_id.to_string());
        let explode = self.panicking.lock().contains(server_id);
        if explode {
            panic!("fetch of server {} blew up", server_id);
        }
        self.servers.lock().get(server_id).cloned()
    }

    async fn search(
        &self,
        query: &str,
        _game: &str,
        page_size: u32,
        _token: Option<&str>,
    ) -> Result<Vec<SearchHit>, SourceError> {
        let servers = self.servers.lock();
        let mut hits: Vec<SearchHit> = servers
            .iter()
            .filter(|(_, s)| s.name.contains(query))
            .map(|(id, s)| SearchHit { id: id.clone(), snapshot: s.clone() })
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        hits.truncate(page_size as usize);
        Ok(hits)
    }
}
