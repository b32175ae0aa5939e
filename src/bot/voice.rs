//! Songbird-backed voice layer.
//!
//! Driver events and per-track events are forwarded into the owning session's
//! mailbox as [`LinkEvent`]s and token-tagged [`SinkEvent`]s.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::cache::Cache;
use serenity::model::id::GuildId;
use songbird::{
    events::{CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent},
    input::YoutubeDl,
    tracks::{Track, TrackHandle},
    Call, Songbird,
};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::audio::{
    AudioResource, AudioSink, JoinTarget, LinkEvent, SignalSender, SinkEvent, VoiceLink, VoiceTransport,
};
use crate::error::{PlayerError, PlayerResult};

pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    cache: OnceLock<Arc<Cache>>,
    http: reqwest::Client,
    /// Signal senders of the links opened through this transport.
    links: Arc<DashMap<GuildId, SignalSender>>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            cache: OnceLock::new(),
            http: reqwest::Client::new(),
            links: Arc::new(DashMap::new()),
        }
    }

    /// The gateway cache only exists once the client is built.
    pub fn attach_cache(&self, cache: Arc<Cache>) {
        if self.cache.set(cache).is_err() {
            debug!("Caché de serenity ya adjuntada");
        }
    }

    /// The guild is gone for the bot (kicked or deleted): its link can never
    /// recover.
    pub fn guild_removed(&self, guild_id: GuildId) {
        if let Some((_, signals)) = self.links.remove(&guild_id) {
            info!("🚫 Guild {} no disponible, destruyendo enlace", guild_id);
            signals.link(LinkEvent::Destroyed);
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    fn has_connection(&self, guild_id: GuildId) -> bool {
        self.manager.get(guild_id).is_some()
    }

    async fn join(&self, target: JoinTarget, signals: SignalSender) -> PlayerResult<Box<dyn VoiceLink>> {
        let call = self.manager.get_or_insert(target.guild_id);

        let joining = {
            let mut handler = call.lock().await;
            for event in [CoreEvent::DriverConnect, CoreEvent::DriverReconnect, CoreEvent::DriverDisconnect] {
                handler.add_global_event(
                    Event::Core(event),
                    LinkEventForwarder {
                        signals: signals.clone(),
                    },
                );
            }
            handler.join(target.channel_id).await
        };

        let joining = match joining {
            Ok(joining) => joining,
            Err(e) => {
                if let Err(e) = self.manager.remove(target.guild_id).await {
                    debug!("No se pudo limpiar la llamada fallida: {:?}", e);
                }
                return Err(PlayerError::Transport(e.to_string()));
            }
        };

        signals.link(LinkEvent::Connecting);
        self.links.insert(target.guild_id, signals.clone());

        let watcher = signals.clone();
        tokio::spawn(async move {
            if let Err(e) = joining.await {
                warn!("❌ Error al unirse al canal de voz en guild {}: {:?}", target.guild_id, e);
                watcher.link(LinkEvent::Disconnected);
            }
        });

        Ok(Box::new(SongbirdLink {
            guild_id: target.guild_id,
            manager: self.manager.clone(),
            call,
            http: self.http.clone(),
            signals,
            links: self.links.clone(),
        }))
    }

    fn member_count(&self, target: &JoinTarget) -> Option<usize> {
        let cache = self.cache.get()?;
        let bot_id = cache.current_user().id;
        let guild = cache.guild(target.guild_id)?;

        // El bot pudo haber sido movido a otro canal
        let channel_id = guild
            .voice_states
            .get(&bot_id)
            .and_then(|state| state.channel_id)
            .unwrap_or(target.channel_id);

        Some(
            guild
                .voice_states
                .values()
                .filter(|state| state.channel_id == Some(channel_id))
                .count(),
        )
    }
}

struct LinkEventForwarder {
    signals: SignalSender,
}

#[async_trait]
impl VoiceEventHandler for LinkEventForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let event = match ctx {
            EventContext::DriverConnect(_) | EventContext::DriverReconnect(_) => LinkEvent::Connected,
            EventContext::DriverDisconnect(_) => LinkEvent::Disconnected,
            _ => return None,
        };

        if self.signals.link(event) {
            None
        } else {
            Some(Event::Cancel)
        }
    }
}

struct SongbirdLink {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
    signals: SignalSender,
    links: Arc<DashMap<GuildId, SignalSender>>,
}

#[async_trait]
impl VoiceLink for SongbirdLink {
    async fn disconnect(&self) -> bool {
        let mut call = self.call.lock().await;
        if call.current_channel().is_none() {
            return false;
        }

        match call.leave().await {
            Ok(()) => {
                info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
                self.signals.link(LinkEvent::Disconnected);
                true
            }
            Err(e) => {
                warn!("Error al desconectar en guild {}: {:?}", self.guild_id, e);
                false
            }
        }
    }

    async fn destroy(&self) {
        self.links.remove(&self.guild_id);
        if let Err(e) = self.manager.remove(self.guild_id).await {
            debug!("Llamada de guild {} ya removida: {:?}", self.guild_id, e);
        }
    }

    fn subscribe(&self, signals: SignalSender) -> Box<dyn AudioSink> {
        Box::new(SongbirdSink {
            call: self.call.clone(),
            http: self.http.clone(),
            signals,
            current: Mutex::new(None),
        })
    }
}

/// Forwards one track event as a sink signal for that track's token.
struct TrackSignal {
    signals: SignalSender,
    event: SinkEvent,
}

#[async_trait]
impl VoiceEventHandler for TrackSignal {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        if self.signals.sink(self.event) {
            None
        } else {
            Some(Event::Cancel)
        }
    }
}

struct SongbirdSink {
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
    signals: SignalSender,
    current: Mutex<Option<TrackHandle>>,
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn play(&self, resource: AudioResource) -> PlayerResult<()> {
        let input = YoutubeDl::new(self.http.clone(), resource.locator.clone());
        let track = Track::new(input.into()).volume(resource.volume);

        let handle = self.call.lock().await.play_only(track);

        let token = resource.token;
        let events = [
            (TrackEvent::Playable, SinkEvent::Playing(token)),
            (TrackEvent::Play, SinkEvent::Playing(token)),
            (TrackEvent::End, SinkEvent::Idle(token)),
            (TrackEvent::Error, SinkEvent::Idle(token)),
        ];
        for (track_event, event) in events {
            handle
                .add_event(
                    Event::Track(track_event),
                    TrackSignal {
                        signals: self.signals.clone(),
                        event,
                    },
                )
                .map_err(|e| PlayerError::Transport(e.to_string()))?;
        }

        // El seek solo se resuelve cuando el input ya es reproducible
        if let Some(offset) = resource.start_at {
            if let Err(e) = handle.seek_async(offset).await {
                warn!("❌ Seek a {:?} falló: {:?}", offset, e);
                let _ = handle.stop();
                return Err(PlayerError::Seek(e.to_string()));
            }
        }

        *self.current.lock() = Some(handle);
        Ok(())
    }

    fn pause(&self) -> bool {
        self.current.lock().as_ref().is_some_and(|h| h.pause().is_ok())
    }

    fn resume(&self) -> bool {
        self.current.lock().as_ref().is_some_and(|h| h.play().is_ok())
    }

    fn stop(&self) -> bool {
        self.current.lock().take().is_some_and(|h| h.stop().is_ok())
    }

    fn set_volume(&self, volume: f32) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|h| h.set_volume(volume).is_ok())
    }
}
