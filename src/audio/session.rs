//! Per-guild session actor.
//!
//! [`GuildSession`] owns the queue, the connection and the engine of a guild
//! and runs on its own task. Everything that touches that state arrives as a
//! [`Message`] in one mailbox and is handled in arrival order. Outside code
//! talks to it through a cloneable [`SessionHandle`].

use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::connection::{take_if_current, LinkReaction, MediaConnection};
use super::engine::{EngineStatus, PlaybackEngine, Transition, Volume};
use super::queue::{Advance, RepeatMode, TrackQueue};
use super::timers::{TimerFired, TimerHandle, TimerKind, TimerSet};
use super::{JoinTarget, Notice, Notifier, Signal, SignalSender, VoiceTransport};
use crate::config::SessionSettings;
use crate::error::{PlayerError, PlayerResult};
use crate::sources::{MediaResolver, Track};

/// Shared collaborators of every session.
pub struct SessionDeps {
    pub transport: Arc<dyn VoiceTransport>,
    pub resolver: Arc<dyn MediaResolver>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: SessionSettings,
}

pub(crate) type Directory = Arc<DashMap<GuildId, SessionHandle>>;

#[derive(Debug)]
pub(crate) enum Message {
    Command(Command),
    Signal(Signal),
    Timer(TimerFired),
}

type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
pub(crate) enum Command {
    Join(JoinTarget, Reply<PlayerResult<()>>),
    Leave(Reply<PlayerResult<()>>),
    AddTracks(Vec<Track>, Reply<usize>),
    PlayFromQueue(Option<i64>, Reply<PlayerResult<Track>>),
    Skip(Reply<PlayerResult<()>>),
    Back(Reply<PlayerResult<()>>),
    Jump(i64, Reply<PlayerResult<()>>),
    Stop(Reply<PlayerResult<()>>),
    Pause(Reply<bool>),
    Resume(Reply<bool>),
    Seek(u64, Reply<PlayerResult<()>>),
    Remove(i64, Reply<Option<Track>>),
    Clear(Reply<()>),
    SetRepeatMode(RepeatMode, Reply<()>),
    SetVolume(i64, Reply<PlayerResult<()>>),
    SetTextChannel(ChannelId),
    Snapshot(Reply<SessionSnapshot>),
}

/// Read-only view of a session at one point of its mailbox.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub tracks: Vec<Track>,
    pub cursor: i64,
    pub repeat_mode: RepeatMode,
    pub stopped: bool,
    /// Output is audible right now.
    pub playing: bool,
    /// A resource is loaded, whether buffering, playing or paused.
    pub active: bool,
    pub paused: bool,
    pub volume: u8,
    pub connected: bool,
    pub text_channel: Option<ChannelId>,
}

impl SessionSnapshot {
    pub fn current(&self) -> Option<&Track> {
        usize::try_from(self.cursor).ok().and_then(|i| self.tracks.get(i))
    }
}

/// Cloneable front door of a [`GuildSession`].
#[derive(Clone)]
pub struct SessionHandle {
    id: u64,
    guild_id: GuildId,
    mailbox: mpsc::UnboundedSender<Message>,
    resolver: Arc<dyn MediaResolver>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("guild_id", &self.guild_id)
            .finish()
    }
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> PlayerResult<T> {
        let (tx, rx) = oneshot::channel();
        self.mailbox
            .send(Message::Command(command(tx)))
            .map_err(|_| PlayerError::SessionClosed)?;
        rx.await.map_err(|_| PlayerError::SessionClosed)
    }

    pub async fn join(&self, target: JoinTarget) -> PlayerResult<()> {
        self.request(|r| Command::Join(target, r)).await?
    }

    pub async fn leave(&self) -> PlayerResult<()> {
        self.request(Command::Leave).await?
    }

    /// Looks up `query` without touching the session state.
    pub async fn search(&self, query: &str) -> PlayerResult<Vec<Track>> {
        self.resolver.resolve(query).await
    }

    pub async fn add_track(&self, track: Track) -> PlayerResult<Track> {
        self.request(|r| Command::AddTracks(vec![track.clone()], r)).await?;
        Ok(track)
    }

    /// Appends in order and returns how many tracks were queued.
    pub async fn add_tracks(&self, tracks: Vec<Track>) -> PlayerResult<usize> {
        self.request(|r| Command::AddTracks(tracks, r)).await
    }

    /// Plays the track at `index`, or the current one when `None`. An index
    /// outside the queue falls back to the last track.
    pub async fn play_from_queue(&self, index: Option<i64>) -> PlayerResult<Track> {
        self.request(|r| Command::PlayFromQueue(index, r)).await?
    }

    pub async fn skip(&self) -> PlayerResult<()> {
        self.request(Command::Skip).await?
    }

    pub async fn back(&self) -> PlayerResult<()> {
        self.request(Command::Back).await?
    }

    /// Jumps to a 1-based queue position.
    pub async fn jump(&self, position: i64) -> PlayerResult<()> {
        self.request(|r| Command::Jump(position, r)).await?
    }

    pub async fn stop(&self) -> PlayerResult<()> {
        self.request(Command::Stop).await?
    }

    pub async fn pause(&self) -> PlayerResult<bool> {
        self.request(Command::Pause).await
    }

    pub async fn resume(&self) -> PlayerResult<bool> {
        self.request(Command::Resume).await
    }

    pub async fn seek(&self, seconds: u64) -> PlayerResult<()> {
        self.request(|r| Command::Seek(seconds, r)).await?
    }

    /// Removes the track at a 1-based position.
    pub async fn remove_track(&self, position: i64) -> PlayerResult<Option<Track>> {
        self.request(|r| Command::Remove(position, r)).await
    }

    pub async fn clear(&self) -> PlayerResult<()> {
        self.request(Command::Clear).await
    }

    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> PlayerResult<()> {
        self.request(|r| Command::SetRepeatMode(mode, r)).await
    }

    pub async fn set_volume(&self, level: i64) -> PlayerResult<()> {
        self.request(|r| Command::SetVolume(level, r)).await?
    }

    /// Fire and forget; the next announcement goes to `channel_id`.
    pub fn set_text_channel(&self, channel_id: ChannelId) {
        let _ = self
            .mailbox
            .send(Message::Command(Command::SetTextChannel(channel_id)));
    }

    /// Voice-state change in the guild; the session recounts its listeners.
    pub fn members_changed(&self) {
        let _ = self.mailbox.send(Message::Signal(Signal::MembersChanged));
    }

    pub async fn is_playing(&self) -> PlayerResult<bool> {
        Ok(self.snapshot().await?.playing)
    }

    pub async fn snapshot(&self) -> PlayerResult<SessionSnapshot> {
        self.request(Command::Snapshot).await
    }
}

/// State of one guild, driven by its mailbox.
pub struct GuildSession {
    id: u64,
    guild_id: GuildId,
    deps: Arc<SessionDeps>,
    directory: Directory,
    mailbox: mpsc::UnboundedSender<Message>,
    timers: TimerSet,
    queue: TrackQueue,
    repeat_mode: RepeatMode,
    stopped: bool,
    text_channel: Option<ChannelId>,
    /// Volume for the next engine, used until a connection exists.
    volume: Volume,
    connection: Option<MediaConnection>,
    engine: Option<PlaybackEngine>,
    alone_timer: Option<TimerHandle>,
    alone_leave_timer: Option<TimerHandle>,
    dead: bool,
}

impl GuildSession {
    /// Starts the session task and returns its handle.
    pub(crate) fn spawn(
        id: u64,
        guild_id: GuildId,
        deps: Arc<SessionDeps>,
        directory: Directory,
        text_channel: Option<ChannelId>,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let volume = Volume::new(deps.settings.default_volume as i64).unwrap_or(Volume::DEFAULT);

        let handle = SessionHandle {
            id,
            guild_id,
            mailbox: tx.clone(),
            resolver: deps.resolver.clone(),
        };

        let session = Self {
            id,
            guild_id,
            timers: TimerSet::new(tx.clone()),
            mailbox: tx,
            deps,
            directory,
            queue: TrackQueue::new(),
            repeat_mode: RepeatMode::Off,
            stopped: false,
            text_channel,
            volume,
            connection: None,
            engine: None,
            alone_timer: None,
            alone_leave_timer: None,
            dead: false,
        };

        tokio::spawn(session.run(rx));
        handle
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Message>) {
        debug!("🎛️ Sesión {} iniciada para guild {}", self.id, self.guild_id);

        while let Some(message) = inbox.recv().await {
            match message {
                Message::Command(command) => self.handle_command(command).await,
                Message::Signal(signal) => self.handle_signal(signal).await,
                Message::Timer(fired) => self.handle_timer(fired).await,
            }
            if self.dead {
                break;
            }
        }

        debug!("🛑 Sesión {} de guild {} finalizada", self.id, self.guild_id);
    }

    fn signals(&self) -> SignalSender {
        SignalSender::new(self.mailbox.clone())
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Join(target, reply) => {
                let _ = reply.send(self.join(target).await);
            }
            Command::Leave(reply) => {
                let _ = reply.send(self.leave().await);
            }
            Command::AddTracks(tracks, reply) => {
                let count = tracks.len();
                for track in tracks {
                    self.queue.append(track);
                }
                let _ = reply.send(count);
            }
            Command::PlayFromQueue(index, reply) => {
                let _ = reply.send(self.play_from_queue(index).await);
            }
            Command::Skip(reply) => {
                let target = self.queue.cursor() + 1;
                let _ = reply.send(self.navigate(target).await);
            }
            Command::Back(reply) => {
                let target = self.queue.cursor() - 1;
                let _ = reply.send(self.navigate(target).await);
            }
            Command::Jump(position, reply) => {
                let _ = reply.send(self.navigate(position - 1).await);
            }
            Command::Stop(reply) => {
                let _ = reply.send(self.stop().await);
            }
            Command::Pause(reply) => {
                let paused = self.engine.as_mut().is_some_and(|e| e.pause());
                let _ = reply.send(paused);
            }
            Command::Resume(reply) => {
                let resumed = self.engine.as_mut().is_some_and(|e| e.resume());
                let _ = reply.send(resumed);
            }
            Command::Seek(seconds, reply) => {
                let _ = reply.send(self.seek(seconds).await);
            }
            Command::Remove(position, reply) => {
                let _ = reply.send(self.queue.remove_at(position));
            }
            Command::Clear(reply) => {
                self.queue.clear();
                let _ = reply.send(());
            }
            Command::SetRepeatMode(mode, reply) => {
                info!("🔁 Guild {}: modo de repetición {}", self.guild_id, mode.as_str());
                self.repeat_mode = mode;
                let _ = reply.send(());
            }
            Command::SetVolume(level, reply) => {
                let _ = reply.send(self.set_volume(level));
            }
            Command::SetTextChannel(channel_id) => {
                self.text_channel = Some(channel_id);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn join(&mut self, target: JoinTarget) -> PlayerResult<()> {
        if self.connection.is_some() {
            return Err(PlayerError::DuplicateConnection);
        }

        let connection = MediaConnection::join(self.deps.transport.as_ref(), target, self.signals()).await?;
        let sink = connection.subscribe(self.signals());

        self.engine = Some(PlaybackEngine::new(sink, self.deps.resolver.clone(), self.volume));
        self.connection = Some(connection);
        self.alone_timer = Some(
            self.timers
                .every(TimerKind::AloneCheck, self.deps.settings.alone_check_interval),
        );

        info!("✅ Sesión {} unida al canal {}", self.id, target.channel_id);
        Ok(())
    }

    async fn leave(&mut self) -> PlayerResult<()> {
        let connection = self.connection.as_ref().ok_or(PlayerError::NoConnection)?;
        if !connection.disconnect().await {
            debug!("Guild {} ya estaba desconectada", self.guild_id);
        }
        Ok(())
    }

    async fn play_from_queue(&mut self, index: Option<i64>) -> PlayerResult<Track> {
        let index = index.unwrap_or(self.queue.cursor());
        if self.queue.has(index) {
            self.queue.set_cursor(index);
        } else if self.queue.is_empty() {
            return Err(PlayerError::NoActiveTrack);
        } else {
            self.queue.set_cursor(self.queue.len() as i64 - 1);
        }

        self.stopped = false;
        self.play_current().await
    }

    async fn play_current(&mut self) -> PlayerResult<Track> {
        let cursor = self.queue.cursor();
        let engine = self.engine.as_mut().ok_or(PlayerError::NoConnection)?;
        let track = self.queue.get_mut(cursor).ok_or(PlayerError::NoActiveTrack)?;
        engine.play(track).await?;
        Ok(track.clone())
    }

    /// Lands the cursor so the forced advance of the idle reaction reaches
    /// `target`, then stops whatever plays and runs that reaction in place.
    async fn navigate(&mut self, target: i64) -> PlayerResult<()> {
        let engine = self.engine.as_mut().ok_or(PlayerError::NoConnection)?;
        self.stopped = false;
        self.queue.land_cursor_after_forced_advance(target);

        if engine.interrupt() {
            debug!("⏭️ Salida detenida, avanzando a {}", target);
        } else {
            debug!("⏭️ Sin salida activa, avance sintetizado a {}", target);
        }
        self.on_idle(Advance::Forced).await;
        Ok(())
    }

    async fn stop(&mut self) -> PlayerResult<()> {
        let engine = self.engine.as_mut().ok_or(PlayerError::NoConnection)?;
        self.stopped = true;
        engine.interrupt();
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        self.on_idle(Advance::Policy(self.repeat_mode)).await;
        Ok(())
    }

    async fn seek(&mut self, seconds: u64) -> PlayerResult<()> {
        let cursor = self.queue.cursor();
        if !self.queue.has(cursor) {
            return Err(PlayerError::NoActiveTrack);
        }
        let engine = self.engine.as_mut().ok_or(PlayerError::NoConnection)?;
        let track = self.queue.get_mut(cursor).ok_or(PlayerError::NoActiveTrack)?;
        let result = engine.seek(track, std::time::Duration::from_secs(seconds)).await;

        // Un seek fallido deja la salida vacía: el timer de inactividad debe correr
        if result.is_err() && !engine.is_active() && !engine.idle_timer_armed() {
            engine.arm_idle_timer(self.timers.once(TimerKind::Idle, self.deps.settings.idle_timeout));
        }
        result
    }

    fn set_volume(&mut self, level: i64) -> PlayerResult<()> {
        let volume = Volume::new(level)?;
        if let Some(engine) = self.engine.as_mut() {
            engine.set_volume(level)?;
        }
        self.volume = volume;
        debug!("🔊 Guild {}: volumen {}", self.guild_id, level);
        Ok(())
    }

    fn snapshot(&self) -> SessionSnapshot {
        let engine = self.engine.as_ref();
        SessionSnapshot {
            tracks: self.queue.tracks().to_vec(),
            cursor: self.queue.cursor(),
            repeat_mode: self.repeat_mode,
            stopped: self.stopped,
            playing: engine.is_some_and(|e| e.is_playing()),
            active: engine.is_some_and(|e| e.is_active()),
            paused: engine.is_some_and(|e| e.status() == EngineStatus::Paused),
            volume: self.volume.level(),
            connected: self.connection.is_some(),
            text_channel: self.text_channel,
        }
    }

    async fn handle_signal(&mut self, signal: Signal) {
        if self.dead {
            return;
        }

        match signal {
            Signal::Link(event) => {
                let Some(connection) = self.connection.as_mut() else {
                    return;
                };
                if connection.on_link_event(event, &self.timers, &self.deps.settings) == LinkReaction::Teardown {
                    self.teardown().await;
                }
            }
            Signal::Sink(event) => {
                let Some(engine) = self.engine.as_mut() else {
                    return;
                };
                match engine.accept(event) {
                    Some(Transition::Started) => self.on_playing(),
                    Some(Transition::Finished) => self.on_idle(Advance::Policy(self.repeat_mode)).await,
                    None => {}
                }
            }
            Signal::MembersChanged => self.on_members_changed(),
        }
    }

    /// Arms the alone-leave timer when only the bot remains in its channel and
    /// drops it as soon as someone is back.
    fn on_members_changed(&mut self) {
        let Some(target) = self.connection.as_ref().map(|c| *c.target()) else {
            return;
        };

        if self.deps.transport.member_count(&target) == Some(1) {
            if self.alone_leave_timer.is_none() {
                debug!("👤 Guild {}: el bot quedó solo, esperando antes de salir", self.guild_id);
                self.alone_leave_timer =
                    Some(self.timers.once(TimerKind::AloneLeave, self.deps.settings.alone_leave_delay));
            }
        } else if self.alone_leave_timer.take().is_some() {
            debug!("👥 Guild {}: alguien volvió, salida cancelada", self.guild_id);
        }
    }

    fn on_playing(&mut self) {
        self.stopped = false;
        if let Some(connection) = self.connection.as_mut() {
            connection.disarm_no_playback();
        }
        if let Some(engine) = self.engine.as_mut() {
            engine.disarm_idle_timer();
        }
    }

    /// Reaction to an exhausted output: retire the announcement, move the
    /// cursor and play what is there, then make sure the idle timer runs.
    async fn on_idle(&mut self, step: Advance) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        if let Some(message) = engine.take_announcement() {
            if let Err(e) = self.deps.notifier.delete(message).await {
                debug!("No se pudo borrar el anuncio anterior: {:?}", e);
            }
        }

        if !self.stopped {
            let cursor = self.queue.advance(step);
            if self.queue.has(cursor) {
                match self.play_current().await {
                    Ok(track) => self.announce_now_playing(&track).await,
                    Err(e) => error!("❌ Error reproduciendo posición {}: {}", cursor, e),
                }
            } else {
                debug!("📭 Fin de la cola en guild {}", self.guild_id);
            }
        }

        if let Some(engine) = self.engine.as_mut() {
            if !engine.idle_timer_armed() {
                engine.arm_idle_timer(self.timers.once(TimerKind::Idle, self.deps.settings.idle_timeout));
            }
        }
    }

    async fn announce_now_playing(&mut self, track: &Track) {
        let Some(channel_id) = self.text_channel else {
            return;
        };

        let notice = Notice::NowPlaying {
            title: track.title.clone(),
            url: track.url.clone(),
        };
        match self.deps.notifier.notify(channel_id, notice).await {
            Ok(message) => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.set_announcement(message);
                }
            }
            Err(e) => {
                warn!("⚠️ No se pudo anunciar en {}: {:?}", channel_id, e);
                self.text_channel = None;
            }
        }
    }

    async fn notify(&mut self, notice: Notice) {
        let Some(channel_id) = self.text_channel else {
            return;
        };
        if let Err(e) = self.deps.notifier.notify(channel_id, notice).await {
            warn!("⚠️ No se pudo notificar en {}: {:?}", channel_id, e);
            self.text_channel = None;
        }
    }

    async fn handle_timer(&mut self, fired: TimerFired) {
        if self.dead {
            return;
        }

        match fired.kind {
            TimerKind::NoPlayback => {
                let Some(connection) = self.connection.as_mut() else {
                    return;
                };
                if !connection.take_no_playback(fired) {
                    return;
                }
                let playing = self.engine.as_ref().is_some_and(|e| e.is_playing());
                if !playing {
                    info!("⏱️ Guild {}: nada se reprodujo a tiempo", self.guild_id);
                    self.notify(Notice::LeftWithoutPlayback).await;
                    self.disconnect().await;
                }
            }
            TimerKind::Idle => {
                let Some(engine) = self.engine.as_mut() else {
                    return;
                };
                if !engine.take_idle_timer(fired) {
                    return;
                }
                if self.disconnect().await {
                    info!("💤 Guild {}: desconectado por inactividad", self.guild_id);
                    self.notify(Notice::LeftIdle).await;
                }
            }
            TimerKind::AloneCheck => {
                if !self.alone_timer.as_ref().is_some_and(|t| t.matches(fired)) {
                    return;
                }
                let Some(target) = self.connection.as_ref().map(|c| *c.target()) else {
                    return;
                };
                if self.deps.transport.member_count(&target) == Some(1) {
                    info!("👤 Guild {}: solo en el canal, saliendo", self.guild_id);
                    self.notify(Notice::LeftAlone).await;
                    self.disconnect().await;
                }
            }
            TimerKind::AloneLeave => {
                if !take_if_current(&mut self.alone_leave_timer, fired) {
                    return;
                }
                if self.disconnect().await {
                    info!("👤 Guild {}: nadie volvió al canal, desconectado", self.guild_id);
                    self.notify(Notice::LeftAlone).await;
                }
            }
            TimerKind::Recovery => {
                let Some(connection) = self.connection.as_mut() else {
                    return;
                };
                if connection.on_recovery_expired(fired) == LinkReaction::Teardown {
                    self.teardown().await;
                }
            }
        }
    }

    async fn disconnect(&mut self) -> bool {
        match self.connection.as_ref() {
            Some(connection) => connection.disconnect().await,
            None => false,
        }
    }

    /// Ends the session: leaves the registry, stops every timer and releases
    /// the link. Messages still queued are dropped.
    async fn teardown(&mut self) {
        if self.dead {
            return;
        }
        self.dead = true;

        let id = self.id;
        self.directory.remove_if(&self.guild_id, |_, handle| handle.id() == id);
        self.timers.cancel_all();
        self.alone_timer = None;
        self.alone_leave_timer = None;

        if let Some(mut engine) = self.engine.take() {
            engine.interrupt();
        }
        if let Some(connection) = self.connection.take() {
            connection.destroy().await;
        }

        info!("🧹 Sesión {} de guild {} eliminada", self.id, self.guild_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{primary_tracks, settle, Harness, GUILD, TEXT, VOICE};
    use crate::sources::MockMediaResolver;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn target() -> JoinTarget {
        JoinTarget {
            guild_id: GUILD,
            channel_id: VOICE,
        }
    }

    async fn joined(harness: &Harness, tracks: usize) -> SessionHandle {
        let session = harness.registry.get_or_create(GUILD, TEXT);
        session.join(target()).await.unwrap();
        session.add_tracks(primary_tracks(tracks)).await.unwrap();
        session
    }

    fn current_title(snapshot: &SessionSnapshot) -> Option<String> {
        snapshot.current().map(|t| t.title.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn empty_queue_cannot_play() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 0).await;

        assert_eq!(session.play_from_queue(None).await, Err(PlayerError::NoActiveTrack));

        session.add_tracks(primary_tracks(1)).await.unwrap();
        let track = session.play_from_queue(None).await.unwrap();
        assert_eq!(track.title, "Track 0");
        assert_eq!(session.snapshot().await.unwrap().cursor, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_index_plays_the_last_track() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 3).await;

        let track = session.play_from_queue(Some(9)).await.unwrap();
        assert_eq!(track.title, "Track 2");
    }

    #[tokio::test(start_paused = true)]
    async fn skip_while_playing_moves_to_the_next_track() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 3).await;
        session.play_from_queue(Some(0)).await.unwrap();
        settle().await;
        assert!(session.is_playing().await.unwrap());

        session.skip().await.unwrap();
        settle().await;

        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.cursor, 1);
        assert_eq!(current_title(&snapshot), Some("Track 1".to_string()));
        assert!(snapshot.playing);
        assert_eq!(harness.transport.sink().played().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_without_output_synthesizes_the_advance() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 3).await;

        session.skip().await.unwrap();
        settle().await;

        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.cursor, 1);
        assert!(snapshot.playing);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_ignores_the_repeat_mode() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 3).await;
        session.set_repeat_mode(RepeatMode::Track).await.unwrap();
        session.play_from_queue(Some(0)).await.unwrap();
        settle().await;

        session.skip().await.unwrap();
        assert_eq!(session.snapshot().await.unwrap().cursor, 1);

        session.back().await.unwrap();
        assert_eq!(session.snapshot().await.unwrap().cursor, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn jump_lands_on_the_requested_position() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 5).await;
        session.play_from_queue(Some(0)).await.unwrap();
        settle().await;

        session.jump(4).await.unwrap();
        settle().await;

        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.cursor, 3);
        assert_eq!(current_title(&snapshot), Some("Track 3".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_never_advances() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 3).await;
        session.play_from_queue(Some(1)).await.unwrap();
        settle().await;

        session.stop().await.unwrap();
        settle().await;

        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.cursor, 1);
        assert!(snapshot.stopped);
        assert!(!snapshot.active);
        assert_eq!(harness.transport.sink().played().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn track_mode_repeats_after_natural_end() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 2).await;
        session.set_repeat_mode(RepeatMode::Track).await.unwrap();
        session.play_from_queue(Some(1)).await.unwrap();
        settle().await;

        harness.transport.sink().finish();
        settle().await;

        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.cursor, 1);
        assert!(snapshot.playing);
        assert_eq!(harness.transport.sink().played().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_mode_wraps_after_the_last_track() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 2).await;
        session.set_repeat_mode(RepeatMode::Queue).await.unwrap();
        session.play_from_queue(Some(1)).await.unwrap();
        settle().await;

        harness.transport.sink().finish();
        settle().await;

        assert_eq!(session.snapshot().await.unwrap().cursor, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn direct_playback_is_not_announced() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 2).await;

        session.play_from_queue(Some(0)).await.unwrap();
        settle().await;
        session.snapshot().await.unwrap();

        assert!(harness.notifier.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn now_playing_announcements_are_replaced() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 3).await;
        session.play_from_queue(Some(0)).await.unwrap();
        settle().await;
        harness.transport.sink().finish();
        settle().await;
        harness.transport.sink().finish();
        settle().await;
        session.snapshot().await.unwrap();

        let titles: Vec<_> = harness
            .notifier
            .sent()
            .into_iter()
            .filter_map(|(_, notice)| match notice {
                Notice::NowPlaying { title, .. } => Some(title),
                _ => None,
            })
            .collect();
        assert_eq!(titles, vec!["Track 1".to_string(), "Track 2".to_string()]);
        assert_eq!(harness.notifier.deleted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_notifications_forget_the_channel() {
        let harness = Harness::new(MockMediaResolver::new());
        harness.notifier.fail_sends(true);
        let session = joined(&harness, 2).await;

        session.play_from_queue(Some(0)).await.unwrap();
        settle().await;
        harness.transport.sink().finish();
        settle().await;
        assert_eq!(session.snapshot().await.unwrap().text_channel, None);

        session.set_text_channel(TEXT);
        assert_eq!(session.snapshot().await.unwrap().text_channel, Some(TEXT));
    }

    #[tokio::test(start_paused = true)]
    async fn volume_outside_bounds_is_rejected() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 1).await;

        assert_eq!(session.set_volume(101).await, Err(PlayerError::InvalidVolume(101)));
        assert_eq!(session.snapshot().await.unwrap().volume, 10);

        session.set_volume(100).await.unwrap();
        session.play_from_queue(Some(0)).await.unwrap();
        assert_eq!(harness.transport.sink().played()[0].volume, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_join_is_rejected() {
        let harness = Harness::new(MockMediaResolver::new());
        let first = harness.registry.get_or_create(GUILD, TEXT);
        let second = harness.registry.get_or_create(GUILD, TEXT);

        let (a, b) = tokio::join!(first.join(target()), second.join(target()));
        let mut results = vec![a, b];
        results.sort_by_key(|r| r.is_err());
        assert_eq!(results, vec![Ok(()), Err(PlayerError::DuplicateConnection)]);
    }

    #[tokio::test(start_paused = true)]
    async fn operations_without_connection_fail() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = harness.registry.get_or_create(GUILD, TEXT);

        assert_eq!(session.leave().await, Err(PlayerError::NoConnection));
        assert_eq!(session.skip().await, Err(PlayerError::NoConnection));
        assert_eq!(session.seek(10).await, Err(PlayerError::NoActiveTrack));
        assert_eq!(session.pause().await, Ok(false));
    }

    #[tokio::test(start_paused = true)]
    async fn seek_requires_a_current_track() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 1).await;
        session.set_repeat_mode(RepeatMode::Off).await.unwrap();
        session.play_from_queue(Some(0)).await.unwrap();
        settle().await;

        session.seek(30).await.unwrap();
        assert_eq!(harness.transport.sink().played()[1].start_at, Some(Duration::from_secs(30)));

        harness.transport.sink().finish();
        settle().await;
        assert_eq!(session.seek(30).await, Err(PlayerError::NoActiveTrack));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_seek_failures_are_reported() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 1).await;
        session.play_from_queue(Some(0)).await.unwrap();
        settle().await;

        harness.transport.sink().fail_seeks(true);
        let result = session.seek(30).await;

        assert!(matches!(result, Err(PlayerError::Seek(_))), "got {:?}", result);
        assert!(!session.snapshot().await.unwrap().active);
    }

    #[tokio::test(start_paused = true)]
    async fn leave_ends_the_session_after_the_grace_window() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 1).await;
        session.play_from_queue(Some(0)).await.unwrap();
        settle().await;
        harness.transport.set_member_count(Some(1));

        session.leave().await.unwrap();
        settle().await;
        assert!(harness.transport.link().disconnected());
        assert!(harness.registry.has_player(GUILD));

        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;

        assert!(!harness.registry.has_player(GUILD));
        assert!(harness.transport.link().destroyed());

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert!(!harness.notifier.sent().iter().any(|(_, n)| *n == Notice::LeftAlone));
    }

    #[tokio::test(start_paused = true)]
    async fn left_alone_by_a_voice_change_leaves_after_the_delay() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 1).await;
        session.play_from_queue(Some(0)).await.unwrap();
        settle().await;

        harness.transport.set_member_count(Some(1));
        session.members_changed();
        settle().await;

        tokio::time::sleep(Duration::from_secs(9)).await;
        settle().await;
        assert!(!harness.transport.link().disconnected());

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert!(harness.transport.link().disconnected());
        assert!(harness.notifier.sent().iter().any(|(_, n)| *n == Notice::LeftAlone));
    }

    #[tokio::test(start_paused = true)]
    async fn someone_returning_cancels_the_alone_leave() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 1).await;
        session.play_from_queue(Some(0)).await.unwrap();
        settle().await;

        harness.transport.set_member_count(Some(1));
        session.members_changed();
        settle().await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        harness.transport.set_member_count(Some(2));
        session.members_changed();
        settle().await;

        tokio::time::sleep(Duration::from_secs(20)).await;
        settle().await;
        assert!(!harness.transport.link().disconnected());
        assert!(!harness.notifier.sent().iter().any(|(_, n)| *n == Notice::LeftAlone));
    }

    #[tokio::test(start_paused = true)]
    async fn lost_link_past_the_grace_window_removes_the_session() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 1).await;
        settle().await;

        harness.transport.link().emit_disconnected();
        settle().await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;

        assert!(!harness.registry.has_player(GUILD));
        assert!(harness.transport.link().destroyed());
        assert_eq!(session.snapshot().await, Err(PlayerError::SessionClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnecting_within_the_grace_window_keeps_the_session() {
        let harness = Harness::new(MockMediaResolver::new());
        let _session = joined(&harness, 1).await;
        settle().await;

        harness.transport.link().emit_disconnected();
        settle().await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        harness.transport.link().emit(crate::audio::LinkEvent::Signalling);
        settle().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;

        assert!(harness.registry.has_player(GUILD));
        assert!(!harness.transport.link().destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn destroyed_link_removes_the_session_at_once() {
        let harness = Harness::new(MockMediaResolver::new());
        let _session = joined(&harness, 1).await;
        settle().await;

        harness.transport.link().emit(crate::audio::LinkEvent::Destroyed);
        settle().await;

        assert!(!harness.registry.has_player(GUILD));
    }

    #[tokio::test(start_paused = true)]
    async fn leaves_when_alone_in_the_channel() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 1).await;
        session.play_from_queue(Some(0)).await.unwrap();
        harness.transport.set_member_count(Some(1));

        tokio::time::sleep(Duration::from_secs(51)).await;
        settle().await;

        assert!(harness.transport.link().disconnected());
        assert!(harness.notifier.sent().iter().any(|(_, n)| *n == Notice::LeftAlone));
    }

    #[tokio::test(start_paused = true)]
    async fn stays_while_listeners_remain() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 1).await;
        session.play_from_queue(Some(0)).await.unwrap();
        harness.transport.set_member_count(Some(3));

        tokio::time::sleep(Duration::from_secs(120)).await;
        settle().await;

        assert!(!harness.transport.link().disconnected());
    }

    #[tokio::test(start_paused = true)]
    async fn leaves_when_nothing_plays_after_joining() {
        let harness = Harness::new(MockMediaResolver::new());
        let _session = joined(&harness, 0).await;
        settle().await;

        tokio::time::sleep(Duration::from_secs(36)).await;
        settle().await;

        assert!(harness.transport.link().disconnected());
        assert!(harness
            .notifier
            .sent()
            .iter()
            .any(|(_, n)| *n == Notice::LeftWithoutPlayback));
    }

    #[tokio::test(start_paused = true)]
    async fn playing_disarms_the_no_playback_timer() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 1).await;
        settle().await;
        session.play_from_queue(Some(0)).await.unwrap();
        settle().await;

        tokio::time::sleep(Duration::from_secs(40)).await;
        settle().await;

        assert!(!harness.transport.link().disconnected());
    }

    #[tokio::test(start_paused = true)]
    async fn leaves_after_idling_at_the_end_of_the_queue() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 1).await;
        session.play_from_queue(Some(0)).await.unwrap();
        settle().await;
        harness.transport.sink().finish();
        settle().await;

        tokio::time::sleep(Duration::from_secs(51)).await;
        settle().await;

        assert!(harness.transport.link().disconnected());
        assert!(harness.notifier.sent().iter().any(|(_, n)| *n == Notice::LeftIdle));
    }

    #[tokio::test(start_paused = true)]
    async fn new_playback_disarms_the_idle_timer() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 1).await;
        session.play_from_queue(Some(0)).await.unwrap();
        settle().await;
        harness.transport.sink().finish();
        settle().await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        session.add_tracks(primary_tracks(1)).await.unwrap();
        session.play_from_queue(Some(1)).await.unwrap();
        settle().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;

        assert!(!harness.transport.link().disconnected());
    }

    #[tokio::test(start_paused = true)]
    async fn remove_and_clear_edit_the_queue() {
        let harness = Harness::new(MockMediaResolver::new());
        let session = joined(&harness, 3).await;

        assert_eq!(session.remove_track(2).await.unwrap().map(|t| t.title), Some("Track 1".to_string()));
        assert_eq!(session.remove_track(7).await.unwrap(), None);
        assert_eq!(session.snapshot().await.unwrap().tracks.len(), 2);

        session.clear().await.unwrap();
        assert!(session.snapshot().await.unwrap().tracks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lazy_tracks_resolve_through_the_resolver() {
        let mut resolver = MockMediaResolver::new();
        resolver
            .expect_resolve_stream()
            .times(1)
            .returning(|_| Ok("https://youtu.be/resolved000".to_string()));
        let harness = Harness::new(resolver);
        let session = joined(&harness, 0).await;
        session
            .add_track(Track::secondary("Song", "https://open.spotify.com/track/x", "Song Artist"))
            .await
            .unwrap();

        session.play_from_queue(Some(0)).await.unwrap();

        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.tracks[0].stream_locator.as_deref(), Some("https://youtu.be/resolved000"));
        assert_eq!(harness.transport.sink().played()[0].locator, "https://youtu.be/resolved000");
    }
}
