//! # Audio Module
//!
//! Per-guild playback sessions for the bot.
//!
//! ## Architecture
//!
//! One [`session::GuildSession`] exists per guild, owned by the
//! [`registry::SessionRegistry`]. Each session runs as a task with a single
//! mailbox: user commands, voice/sink signals and timer expirations all go
//! through it, so a guild's queue and playback state only ever have one
//! writer. Sessions never wait on each other.
//!
//! ### [`queue`] - Track Queue
//! - Ordered tracks with a signed cursor
//! - Repeat-mode advance policy
//!
//! ### [`connection`] - Media Connection
//! - Voice link lifecycle for one guild
//! - No-playback and reconnect-grace timers
//!
//! ### [`engine`] - Playback Engine
//! - Lazy stream resolution, volume, now-playing announcement
//! - Idle-disconnect timer
//!
//! ## External seams
//!
//! The voice layer, the audio output and chat notifications are reached
//! through [`VoiceTransport`], [`VoiceLink`], [`AudioSink`] and [`Notifier`].
//! `bot::voice` and `bot::notifier` implement them on top of Songbird and
//! Serenity.

pub mod connection;
pub mod engine;
pub mod queue;
pub mod registry;
pub mod session;
pub mod timers;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::PlayerResult;
use session::Message;

/// Where to open a voice connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinTarget {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// Lifecycle signals emitted by a voice link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Signalling,
    Connecting,
    Connected,
    Disconnected,
    Destroyed,
}

/// Output signals, tagged with the token of the resource they belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    Playing(u64),
    Idle(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Link(LinkEvent),
    Sink(SinkEvent),
    /// Someone joined or left a voice channel of the guild.
    MembersChanged,
}

/// Delivers signals into a session's mailbox.
#[derive(Debug, Clone)]
pub struct SignalSender(mpsc::UnboundedSender<Message>);

impl SignalSender {
    pub(crate) fn new(mailbox: mpsc::UnboundedSender<Message>) -> Self {
        Self(mailbox)
    }

    /// Returns `false` once the session is gone.
    pub fn send(&self, signal: Signal) -> bool {
        self.0.send(Message::Signal(signal)).is_ok()
    }

    pub fn link(&self, event: LinkEvent) -> bool {
        self.send(Signal::Link(event))
    }

    pub fn sink(&self, event: SinkEvent) -> bool {
        self.send(Signal::Sink(event))
    }
}

/// A stream ready to be handed to the audio sink.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioResource {
    pub token: u64,
    pub locator: String,
    /// Gain as a fraction, 0.0 to 1.0.
    pub volume: f32,
    pub start_at: Option<Duration>,
}

/// Voice layer: opens links and answers global questions about them.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Whether any link exists for the guild, whichever session opened it.
    fn has_connection(&self, guild_id: GuildId) -> bool;

    /// Issues the join request. Returns once the request is out; progress is
    /// reported through `signals`.
    async fn join(&self, target: JoinTarget, signals: SignalSender) -> PlayerResult<Box<dyn VoiceLink>>;

    /// Members currently in the target channel, the bot included.
    fn member_count(&self, target: &JoinTarget) -> Option<usize>;
}

#[async_trait]
pub trait VoiceLink: Send + Sync {
    /// Returns `false` if the link was already disconnected.
    async fn disconnect(&self) -> bool;

    /// Releases the link for good.
    async fn destroy(&self);

    /// Attaches an audio output to this link.
    fn subscribe(&self, signals: SignalSender) -> Box<dyn AudioSink>;
}

#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Replaces whatever is playing with `resource`. Signals for the previous
    /// resource keep their old token.
    async fn play(&self, resource: AudioResource) -> PlayerResult<()>;

    fn pause(&self) -> bool;

    fn resume(&self) -> bool;

    /// Stops the current resource. Returns `true` if one was active, in which
    /// case an `Idle` signal follows.
    fn stop(&self) -> bool;

    /// Applies gain to the live resource, if there is one.
    fn set_volume(&self, volume: f32) -> bool;
}

/// A posted chat message that may be deleted later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// Mensajes que la sesión envía al canal de texto
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NowPlaying { title: String, url: String },
    LeftAlone,
    LeftIdle,
    LeftWithoutPlayback,
}

/// Best-effort chat notifications. Errors are logged by the caller and never
/// reach the command layer.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel_id: ChannelId, notice: Notice) -> anyhow::Result<MessageRef>;

    async fn delete(&self, message: MessageRef) -> anyhow::Result<()>;
}
