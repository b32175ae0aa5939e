use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::connection::take_if_current;
use super::timers::{TimerFired, TimerHandle};
use super::{AudioResource, AudioSink, MessageRef, SinkEvent};
use crate::error::{PlayerError, PlayerResult};
use crate::sources::{MediaResolver, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Idle,
    /// A resource was handed to the sink but has not started yet.
    Buffering,
    Playing,
    Paused,
}

/// Transitions the session must react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    Finished,
}

/// Volume level between 0 and 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Volume(u8);

impl Volume {
    pub const DEFAULT: Volume = Volume(10);

    pub fn new(level: i64) -> PlayerResult<Self> {
        if (0..=100).contains(&level) {
            Ok(Self(level as u8))
        } else {
            Err(PlayerError::InvalidVolume(level))
        }
    }

    pub fn level(&self) -> u8 {
        self.0
    }

    pub fn gain(&self) -> f32 {
        self.0 as f32 / 100.0
    }
}

/// Drives the audio sink of one connection.
///
/// Every resource gets a fresh token; sink signals carrying any other token
/// are stale and dropped in [`PlaybackEngine::accept`].
pub struct PlaybackEngine {
    sink: Box<dyn AudioSink>,
    resolver: Arc<dyn MediaResolver>,
    volume: Volume,
    status: EngineStatus,
    active: Option<u64>,
    next_token: u64,
    announcement: Option<MessageRef>,
    idle_timer: Option<TimerHandle>,
}

impl PlaybackEngine {
    pub fn new(sink: Box<dyn AudioSink>, resolver: Arc<dyn MediaResolver>, volume: Volume) -> Self {
        Self {
            sink,
            resolver,
            volume,
            status: EngineStatus::Idle,
            active: None,
            next_token: 1,
            announcement: None,
            idle_timer: None,
        }
    }

    /// Starts `track` from the beginning, resolving its stream on first use.
    pub async fn play(&mut self, track: &mut Track) -> PlayerResult<()> {
        self.start(track, None).await
    }

    /// Restarts `track` at `offset`.
    pub async fn seek(&mut self, track: &mut Track, offset: Duration) -> PlayerResult<()> {
        self.start(track, Some(offset)).await.map_err(|e| match e {
            PlayerError::Resolution(reason) | PlayerError::Transport(reason) => PlayerError::Seek(reason),
            other => other,
        })
    }

    async fn start(&mut self, track: &mut Track, start_at: Option<Duration>) -> PlayerResult<()> {
        let locator = match &track.stream_locator {
            Some(locator) => locator.clone(),
            None => {
                debug!("🔍 Resolviendo stream para: {}", track.title);
                let locator = self.resolver.resolve_stream(track).await?;
                track.stream_locator = Some(locator.clone());
                locator
            }
        };

        let token = self.next_token;
        self.next_token += 1;
        self.active = Some(token);
        self.status = EngineStatus::Buffering;

        let resource = AudioResource {
            token,
            locator,
            volume: self.volume.gain(),
            start_at,
        };

        if let Err(e) = self.sink.play(resource).await {
            self.active = None;
            self.status = EngineStatus::Idle;
            return Err(e);
        }

        info!("🎵 Reproduciendo: {}", track.title);
        Ok(())
    }

    /// Filters a sink signal through the active token.
    pub fn accept(&mut self, event: SinkEvent) -> Option<Transition> {
        match event {
            SinkEvent::Playing(token) if self.active == Some(token) => {
                if self.status == EngineStatus::Paused {
                    return None;
                }
                self.status = EngineStatus::Playing;
                Some(Transition::Started)
            }
            SinkEvent::Idle(token) if self.active == Some(token) => {
                self.active = None;
                self.status = EngineStatus::Idle;
                Some(Transition::Finished)
            }
            stale => {
                debug!("🗑️ Señal obsoleta ignorada: {:?}", stale);
                None
            }
        }
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn is_playing(&self) -> bool {
        self.status == EngineStatus::Playing
    }

    /// Something is loaded, playing or not.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn pause(&mut self) -> bool {
        if self.status == EngineStatus::Playing && self.sink.pause() {
            self.status = EngineStatus::Paused;
            true
        } else {
            false
        }
    }

    pub fn resume(&mut self) -> bool {
        if self.status == EngineStatus::Paused && self.sink.resume() {
            self.status = EngineStatus::Playing;
            true
        } else {
            false
        }
    }

    /// Stops the current resource and retires its token, so the sink's own
    /// idle signal for it is ignored. Returns whether output was live.
    pub fn interrupt(&mut self) -> bool {
        let was_live = self.status == EngineStatus::Playing;
        if self.active.take().is_some() {
            self.sink.stop();
        }
        self.status = EngineStatus::Idle;
        was_live
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    /// Stores the level for future resources and applies it to the live one.
    pub fn set_volume(&mut self, level: i64) -> PlayerResult<()> {
        self.volume = Volume::new(level)?;
        if self.active.is_some() {
            self.sink.set_volume(self.volume.gain());
        }
        Ok(())
    }

    pub fn take_announcement(&mut self) -> Option<MessageRef> {
        self.announcement.take()
    }

    pub fn set_announcement(&mut self, message: MessageRef) {
        self.announcement = Some(message);
    }

    pub fn idle_timer_armed(&self) -> bool {
        self.idle_timer.is_some()
    }

    pub fn arm_idle_timer(&mut self, timer: TimerHandle) {
        self.idle_timer = Some(timer);
    }

    pub fn disarm_idle_timer(&mut self) {
        self.idle_timer = None;
    }

    /// Consumes the idle timer if `fired` belongs to it.
    pub fn take_idle_timer(&mut self, fired: TimerFired) -> bool {
        take_if_current(&mut self.idle_timer, fired)
    }
}
