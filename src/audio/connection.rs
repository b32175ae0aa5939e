use tracing::{debug, info, warn};

use super::timers::{TimerFired, TimerHandle, TimerKind, TimerSet};
use super::{AudioSink, JoinTarget, LinkEvent, SignalSender, VoiceLink, VoiceTransport};
use crate::config::SessionSettings;
use crate::error::{PlayerError, PlayerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Signalling,
    Connecting,
    Connected,
    Disconnected,
    Destroyed,
}

/// What the owning session has to do after a link signal or timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkReaction {
    Nothing,
    Teardown,
}

/// The live voice link of one guild.
///
/// Never reused: once destroyed, a later join builds a new one.
pub struct MediaConnection {
    target: JoinTarget,
    link: Box<dyn VoiceLink>,
    state: ConnectionState,
    no_playback_timer: Option<TimerHandle>,
    recovery_timer: Option<TimerHandle>,
}

impl MediaConnection {
    /// Opens a link unless one already exists for the guild anywhere in the
    /// process.
    pub async fn join(
        transport: &dyn VoiceTransport,
        target: JoinTarget,
        signals: SignalSender,
    ) -> PlayerResult<Self> {
        if transport.has_connection(target.guild_id) {
            return Err(PlayerError::DuplicateConnection);
        }

        info!("🔗 Conectando al canal {} en guild {}", target.channel_id, target.guild_id);
        let link = transport.join(target, signals).await?;

        Ok(Self {
            target,
            link,
            state: ConnectionState::Idle,
            no_playback_timer: None,
            recovery_timer: None,
        })
    }

    pub fn target(&self) -> &JoinTarget {
        &self.target
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Hooks an audio output to the link.
    pub fn subscribe(&self, signals: SignalSender) -> Box<dyn AudioSink> {
        self.link.subscribe(signals)
    }

    pub fn on_link_event(&mut self, event: LinkEvent, timers: &TimerSet, settings: &SessionSettings) -> LinkReaction {
        debug!("📡 Guild {}: {:?} -> {:?}", self.target.guild_id, self.state, event);

        match event {
            LinkEvent::Connecting => {
                self.state = ConnectionState::Connecting;
                self.recovery_timer = None;
                self.no_playback_timer = Some(timers.once(TimerKind::NoPlayback, settings.no_playback_timeout));
            }
            LinkEvent::Signalling => {
                self.state = ConnectionState::Signalling;
                self.recovery_timer = None;
            }
            LinkEvent::Connected => {
                self.state = ConnectionState::Connected;
                self.recovery_timer = None;
                info!("🔊 Conectado al canal de voz en guild {}", self.target.guild_id);
            }
            LinkEvent::Disconnected => {
                self.state = ConnectionState::Disconnected;
                if self.recovery_timer.is_none() {
                    warn!(
                        "🔌 Guild {} desconectada, esperando reconexión {}",
                        self.target.guild_id,
                        humantime::format_duration(settings.reconnect_grace)
                    );
                    self.recovery_timer = Some(timers.once(TimerKind::Recovery, settings.reconnect_grace));
                }
            }
            LinkEvent::Destroyed => {
                self.state = ConnectionState::Destroyed;
                return LinkReaction::Teardown;
            }
        }

        LinkReaction::Nothing
    }

    /// Consumes the no-playback timer if `fired` belongs to it.
    pub fn take_no_playback(&mut self, fired: TimerFired) -> bool {
        take_if_current(&mut self.no_playback_timer, fired)
    }

    /// A recovery expiry is terminal.
    pub fn on_recovery_expired(&mut self, fired: TimerFired) -> LinkReaction {
        if take_if_current(&mut self.recovery_timer, fired) {
            info!("⌛ Guild {} no se recuperó a tiempo", self.target.guild_id);
            LinkReaction::Teardown
        } else {
            LinkReaction::Nothing
        }
    }

    pub fn disarm_no_playback(&mut self) {
        self.no_playback_timer = None;
    }

    pub async fn disconnect(&self) -> bool {
        self.link.disconnect().await
    }

    pub async fn destroy(mut self) {
        self.no_playback_timer = None;
        self.recovery_timer = None;
        self.state = ConnectionState::Destroyed;
        self.link.destroy().await;
        info!("👋 Conexión destruida en guild {}", self.target.guild_id);
    }
}

pub(crate) fn take_if_current(slot: &mut Option<TimerHandle>, fired: TimerFired) -> bool {
    if slot.as_ref().is_some_and(|timer| timer.matches(fired)) {
        *slot = None;
        true
    } else {
        false
    }
}
