use tracing::{debug, info};

use crate::sources::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::Track => "track",
            RepeatMode::Queue => "queue",
        }
    }
}

/// How the cursor moves when the current output runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Apply the repeat mode.
    Policy(RepeatMode),
    /// Manual navigation: always one step forward, whatever the repeat mode.
    Forced,
}

/// Ordered tracks plus a cursor on the current one.
///
/// The cursor is signed and may point outside the list (before the first
/// append, after removals, or after navigating past either end). Use
/// [`TrackQueue::has`] before dereferencing it.
#[derive(Debug, Default, Clone)]
pub struct TrackQueue {
    tracks: Vec<Track>,
    cursor: i64,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un track al final de la cola
    pub fn append(&mut self, track: Track) -> &Track {
        debug!("➕ Agregado a la cola: {}", track.title);
        self.tracks.push(track);
        &self.tracks[self.tracks.len() - 1]
    }

    pub fn has(&self, index: i64) -> bool {
        index >= 0 && (index as u64) < self.tracks.len() as u64
    }

    /// Removes the track at a 1-based position. `None` when out of range.
    pub fn remove_at(&mut self, one_based: i64) -> Option<Track> {
        let index = one_based - 1;
        if !self.has(index) {
            return None;
        }
        let removed = self.tracks.remove(index as usize);
        debug!("❌ Track eliminado en posición {}", one_based);
        Some(removed)
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        self.tracks.clear();
        info!("🗑️ Cola limpiada");
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: i64) {
        self.cursor = cursor;
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get(&self, index: i64) -> Option<&Track> {
        if self.has(index) {
            self.tracks.get(index as usize)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, index: i64) -> Option<&mut Track> {
        if self.has(index) {
            self.tracks.get_mut(index as usize)
        } else {
            None
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.get(self.cursor)
    }

    /// Moves the cursor for an exhausted output and returns the new position.
    pub fn advance(&mut self, step: Advance) -> i64 {
        self.cursor = match step {
            Advance::Forced | Advance::Policy(RepeatMode::Off) => self.cursor + 1,
            Advance::Policy(RepeatMode::Track) => self.cursor,
            Advance::Policy(RepeatMode::Queue) => {
                if self.has(self.cursor + 1) {
                    self.cursor + 1
                } else {
                    0
                }
            }
        };
        self.cursor
    }

    /// Parks the cursor so that the next [`Advance::Forced`] step lands on
    /// `target` (0-based).
    pub fn land_cursor_after_forced_advance(&mut self, target: i64) {
        self.cursor = target - 1;
    }
}
