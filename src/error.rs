//! Typed failures returned to the command layer.
//!
//! None of these tear a session down: the dispatcher turns them into a user
//! facing reply and the session keeps running. Connection loss past the
//! recovery window is a lifecycle transition, not an error, so it has no
//! variant here.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlayerError {
    /// Ya existe una conexión de voz para esta guild
    #[error("There is already a connection in the guild")]
    DuplicateConnection,

    #[error("There is no voice connection for this guild")]
    NoConnection,

    #[error("No track is currently selected")]
    NoActiveTrack,

    #[error("Volume must be between 0 and 100, got {0}")]
    InvalidVolume(i64),

    #[error("Could not resolve media: {0}")]
    Resolution(String),

    #[error("Seek failed: {0}")]
    Seek(String),

    /// The voice layer refused to open the connection.
    #[error("Voice transport error: {0}")]
    Transport(String),

    /// The session was torn down while the command was in flight.
    #[error("The player for this guild is no longer running")]
    SessionClosed,
}

impl PlayerError {
    pub fn resolution(err: impl std::fmt::Display) -> Self {
        Self::Resolution(err.to_string())
    }
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;
