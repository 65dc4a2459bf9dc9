//! Guilds and channels known to a build. First write wins for names; ids seen only
//! in data get their stringified id as a name.

use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Guild {
    pub id: u64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Channel {
    pub id: u64,
    pub guild_id: u64,
    pub name: String,
}

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    guilds: BTreeMap<u64, Guild>,
    channels: BTreeMap<u64, Channel>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_guild(&mut self, id: u64, name: &str) {
        self.guilds.entry(id).or_insert_with(|| Guild { id, name: name.to_string() });
    }

    /// Record a guild seen only in data.
    pub fn ensure_guild(&mut self, id: u64) {
        self.guilds.entry(id).or_insert_with(|| Guild { id, name: id.to_string() });
    }

    pub fn add_channel(&mut self, id: u64, guild_id: u64, name: &str) {
        self.ensure_guild(guild_id);
        match self.channels.get(&id) {
            Some(existing) if existing.guild_id != guild_id => {
                tracing::warn!(
                    channel_id = id,
                    kept_guild = existing.guild_id,
                    dropped_guild = guild_id,
                    "channel claimed by two guilds; keeping the first"
                );
            }
            Some(_) => {}
            None => {
                self.channels.insert(id, Channel { id, guild_id, name: name.to_string() });
            }
        }
    }

    /// Record that `channel_id` lives in `guild_id`, as learned from data.
    pub fn observe_channel(&mut self, channel_id: u64, guild_id: u64) {
        if !self.channels.contains_key(&channel_id) {
            self.add_channel(channel_id, guild_id, &channel_id.to_string());
        }
    }

    pub fn guilds(&self) -> impl Iterator<Item = &Guild> {
        self.guilds.values()
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn guild_of(&self, channel_id: u64) -> Option<u64> {
        self.channels.get(&channel_id).map(|c| c.guild_id)
    }
}
