//! # Open Player
//!
//! Per-guild music sessions for a Discord bot: a track queue, a voice
//! connection and automatic disconnect rules for every guild, driven by slash
//! commands.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
