use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use super::session::{Directory, GuildSession, SessionDeps, SessionHandle};

/// One session per guild, created on first use.
///
/// A session removes itself on teardown, and only if the entry still holds
/// that same session.
pub struct SessionRegistry {
    sessions: Directory,
    deps: Arc<SessionDeps>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            deps: Arc::new(deps),
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns the guild's session, creating it if needed. The session's
    /// announcement channel is refreshed to `text_channel` either way.
    pub fn get_or_create(&self, guild_id: GuildId, text_channel: ChannelId) -> SessionHandle {
        match self.sessions.entry(guild_id) {
            Entry::Occupied(entry) => {
                let handle = entry.get().clone();
                handle.set_text_channel(text_channel);
                handle
            }
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let handle = GuildSession::spawn(
                    id,
                    guild_id,
                    self.deps.clone(),
                    self.sessions.clone(),
                    Some(text_channel),
                );
                info!("🆕 Sesión {} creada para guild {}", id, guild_id);
                entry.insert(handle.clone());
                handle
            }
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.get(&guild_id).map(|entry| entry.value().clone())
    }

    pub fn has_player(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
