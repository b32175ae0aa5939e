//! In-memory stand-ins for the voice layer and the chat notifier.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::registry::SessionRegistry;
use super::session::SessionDeps;
use super::{
    AudioResource, AudioSink, JoinTarget, LinkEvent, MessageRef, Notice, Notifier, SignalSender, SinkEvent,
    VoiceLink, VoiceTransport,
};
use crate::config::SessionSettings;
use crate::error::{PlayerError, PlayerResult};
use crate::sources::{MockMediaResolver, Track};

pub(crate) const GUILD: GuildId = GuildId::new(1);
pub(crate) const VOICE: ChannelId = ChannelId::new(10);
pub(crate) const TEXT: ChannelId = ChannelId::new(20);

/// Lets spawned tasks drain their mailboxes.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub(crate) fn primary_tracks(n: usize) -> Vec<Track> {
    (0..n)
        .map(|i| Track::primary(format!("Track {}", i), format!("https://youtu.be/{:011}", i)))
        .collect()
}

pub(crate) struct Harness {
    pub registry: SessionRegistry,
    pub transport: Arc<FakeTransport>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(resolver: MockMediaResolver) -> Self {
        let transport = Arc::new(FakeTransport::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let registry = SessionRegistry::new(SessionDeps {
            transport: transport.clone(),
            resolver: Arc::new(resolver),
            notifier: notifier.clone(),
            settings: SessionSettings::default(),
        });
        Self {
            registry,
            transport,
            notifier,
        }
    }
}

#[derive(Default)]
struct TransportState {
    connected: HashSet<GuildId>,
    member_count: Option<usize>,
    links: Vec<FakeLink>,
}

pub(crate) struct FakeTransport {
    state: Arc<Mutex<TransportState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TransportState::default())),
        }
    }

    pub fn set_member_count(&self, count: Option<usize>) {
        self.state.lock().member_count = count;
    }

    /// The most recently opened link.
    pub fn link(&self) -> FakeLink {
        self.state.lock().links.last().cloned().expect("no link was opened")
    }

    /// The sink subscribed to the most recent link.
    pub fn sink(&self) -> FakeSink {
        self.link().inner.sink.lock().clone().expect("no sink was subscribed")
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    fn has_connection(&self, guild_id: GuildId) -> bool {
        self.state.lock().connected.contains(&guild_id)
    }

    async fn join(&self, target: JoinTarget, signals: SignalSender) -> PlayerResult<Box<dyn VoiceLink>> {
        let link = FakeLink {
            inner: Arc::new(LinkInner {
                guild_id: target.guild_id,
                signals: signals.clone(),
                disconnected: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                sink: Mutex::new(None),
                transport: self.state.clone(),
            }),
        };

        {
            let mut state = self.state.lock();
            state.connected.insert(target.guild_id);
            state.links.push(link.clone());
        }
        signals.link(LinkEvent::Connecting);

        Ok(Box::new(link))
    }

    fn member_count(&self, _target: &JoinTarget) -> Option<usize> {
        self.state.lock().member_count
    }
}

struct LinkInner {
    guild_id: GuildId,
    signals: SignalSender,
    disconnected: AtomicBool,
    destroyed: AtomicBool,
    sink: Mutex<Option<FakeSink>>,
    transport: Arc<Mutex<TransportState>>,
}

#[derive(Clone)]
pub(crate) struct FakeLink {
    inner: Arc<LinkInner>,
}

impl FakeLink {
    pub fn emit(&self, event: LinkEvent) {
        self.inner.signals.link(event);
    }

    /// Simulates the network dropping the link.
    pub fn emit_disconnected(&self) {
        self.emit(LinkEvent::Disconnected);
    }

    /// Whether the session asked to disconnect.
    pub fn disconnected(&self) -> bool {
        self.inner.disconnected.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceLink for FakeLink {
    async fn disconnect(&self) -> bool {
        if self.inner.disconnected.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.emit(LinkEvent::Disconnected);
        true
    }

    async fn destroy(&self) {
        self.inner.destroyed.store(true, Ordering::SeqCst);
        self.inner.transport.lock().connected.remove(&self.inner.guild_id);
    }

    fn subscribe(&self, signals: SignalSender) -> Box<dyn AudioSink> {
        let sink = FakeSink {
            state: Arc::new(Mutex::new(SinkState::default())),
            signals: Some(signals),
        };
        *self.inner.sink.lock() = Some(sink.clone());
        Box::new(sink)
    }
}

#[derive(Default)]
struct SinkState {
    played: Vec<AudioResource>,
    active: Option<u64>,
    paused: bool,
    live_volume: Option<f32>,
    fail_seeks: bool,
}

/// Records resources and answers with the signals a real output would send.
#[derive(Clone)]
pub(crate) struct FakeSink {
    state: Arc<Mutex<SinkState>>,
    signals: Option<SignalSender>,
}

impl FakeSink {
    /// A sink whose signals go nowhere.
    pub fn detached() -> Self {
        Self {
            state: Arc::new(Mutex::new(SinkState::default())),
            signals: None,
        }
    }

    fn emit(&self, event: SinkEvent) {
        if let Some(signals) = &self.signals {
            signals.sink(event);
        }
    }

    pub fn played(&self) -> Vec<AudioResource> {
        self.state.lock().played.clone()
    }

    /// Resources with a start offset are refused, like an unseekable stream.
    pub fn fail_seeks(&self, fail: bool) {
        self.state.lock().fail_seeks = fail;
    }

    pub fn live_volume(&self) -> Option<f32> {
        self.state.lock().live_volume
    }

    /// The current resource runs out on its own.
    pub fn finish(&self) {
        let token = self.state.lock().active.take();
        if let Some(token) = token {
            self.emit(SinkEvent::Idle(token));
        }
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn play(&self, resource: AudioResource) -> PlayerResult<()> {
        let token = resource.token;
        let replaced = {
            let mut state = self.state.lock();
            if state.fail_seeks && resource.start_at.is_some() {
                return Err(PlayerError::Seek("stream is not seekable".to_string()));
            }
            state.paused = false;
            state.played.push(resource);
            state.active.replace(token)
        };
        if let Some(old) = replaced {
            self.emit(SinkEvent::Idle(old));
        }
        self.emit(SinkEvent::Playing(token));
        Ok(())
    }

    fn pause(&self) -> bool {
        let mut state = self.state.lock();
        if state.active.is_some() && !state.paused {
            state.paused = true;
            true
        } else {
            false
        }
    }

    fn resume(&self) -> bool {
        let mut state = self.state.lock();
        if state.paused {
            state.paused = false;
            true
        } else {
            false
        }
    }

    fn stop(&self) -> bool {
        let token = self.state.lock().active.take();
        match token {
            Some(token) => {
                self.emit(SinkEvent::Idle(token));
                true
            }
            None => false,
        }
    }

    fn set_volume(&self, volume: f32) -> bool {
        let mut state = self.state.lock();
        if state.active.is_some() {
            state.live_volume = Some(volume);
            true
        } else {
            false
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    sent: Mutex<Vec<(ChannelId, Notice)>>,
    deleted: Mutex<Vec<MessageRef>>,
    fail: AtomicBool,
    next_id: AtomicU64,
}

impl RecordingNotifier {
    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(ChannelId, Notice)> {
        self.sent.lock().clone()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, channel_id: ChannelId, notice: Notice) -> anyhow::Result<MessageRef> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("Missing Access");
        }
        self.sent.lock().push((channel_id, notice));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MessageRef {
            channel_id,
            message_id: MessageId::new(id),
        })
    }

    async fn delete(&self, message: MessageRef) -> anyhow::Result<()> {
        self.deleted.lock().push(message);
        Ok(())
    }
}
