use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: u8,
    pub max_playlist_size: usize,

    // Timers de sesión
    pub no_playback_timeout: Duration,
    pub idle_timeout: Duration,
    pub alone_check_interval: Duration,
    pub alone_leave_delay: Duration,
    pub reconnect_grace: Duration,

    // Catálogo secundario (opcional)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    // Enlaces de /invite y /support-server
    pub invite_url: Option<String>,
    pub support_server: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is required")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID is required")?
                .parse()
                .context("APPLICATION_ID must be a number")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|id| id.parse().ok()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| defaults.default_volume.to_string())
                .parse()
                .context("DEFAULT_VOLUME must be an integer between 0 and 100")?,
            max_playlist_size: std::env::var("MAX_PLAYLIST_SIZE")
                .unwrap_or_else(|_| defaults.max_playlist_size.to_string())
                .parse()?,

            // Timers
            no_playback_timeout: env_duration("NO_PLAYBACK_TIMEOUT", defaults.no_playback_timeout)?,
            idle_timeout: env_duration("IDLE_TIMEOUT", defaults.idle_timeout)?,
            alone_check_interval: env_duration("ALONE_CHECK_INTERVAL", defaults.alone_check_interval)?,
            alone_leave_delay: env_duration("ALONE_LEAVE_DELAY", defaults.alone_leave_delay)?,
            reconnect_grace: env_duration("RECONNECT_GRACE", defaults.reconnect_grace)?,

            // APIs
            spotify_client_id: std::env::var("SPOTIFY_CLIENT_ID").ok(),
            spotify_client_secret: std::env::var("SPOTIFY_CLIENT_SECRET").ok(),

            // Enlaces
            invite_url: std::env::var("INVITE_URL").ok(),
            support_server: std::env::var("SUPPORT_SERVER").ok(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Default volume must be between 0 and 100
    /// - Every session timer must be non-zero
    /// - Playlist cap must be greater than 0
    /// - Invite and support links, when set, must be URLs
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > 100 {
            anyhow::bail!("Default volume must be between 0 and 100, got: {}", self.default_volume);
        }

        for (name, value) in [
            ("NO_PLAYBACK_TIMEOUT", self.no_playback_timeout),
            ("IDLE_TIMEOUT", self.idle_timeout),
            ("ALONE_CHECK_INTERVAL", self.alone_check_interval),
            ("ALONE_LEAVE_DELAY", self.alone_leave_delay),
            ("RECONNECT_GRACE", self.reconnect_grace),
        ] {
            if value.is_zero() {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        for (name, value) in [("INVITE_URL", &self.invite_url), ("SUPPORT_SERVER", &self.support_server)] {
            if let Some(raw) = value {
                url::Url::parse(raw).with_context(|| format!("{} must be a valid URL, got: {}", name, raw))?;
            }
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and secrets are left out.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {} max playlist\n  \
            Timers: no-playback {}, idle {}, alone-check {}, alone-leave {}, grace {}\n  \
            Spotify: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            self.max_playlist_size,
            humantime::format_duration(self.no_playback_timeout),
            humantime::format_duration(self.idle_timeout),
            humantime::format_duration(self.alone_check_interval),
            humantime::format_duration(self.alone_leave_delay),
            humantime::format_duration(self.reconnect_grace),
            if self.spotify_enabled() { "enabled" } else { "disabled" },
        )
    }

    pub fn spotify_enabled(&self) -> bool {
        self.spotify_client_id.is_some() && self.spotify_client_secret.is_some()
    }

    /// The part of the configuration every guild session needs.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            default_volume: self.default_volume,
            no_playback_timeout: self.no_playback_timeout,
            idle_timeout: self.idle_timeout,
            alone_check_interval: self.alone_check_interval,
            alone_leave_delay: self.alone_leave_delay,
            reconnect_grace: self.reconnect_grace,
        }
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        let session = SessionSettings::default();
        Self {
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: session.default_volume,
            max_playlist_size: 100,

            no_playback_timeout: session.no_playback_timeout,
            idle_timeout: session.idle_timeout,
            alone_check_interval: session.alone_check_interval,
            alone_leave_delay: session.alone_leave_delay,
            reconnect_grace: session.reconnect_grace,

            spotify_client_id: None,
            spotify_client_secret: None,

            invite_url: None,
            support_server: None,
        }
    }
}

/// Timer lengths and initial volume for a guild session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub default_volume: u8,
    pub no_playback_timeout: Duration,
    pub idle_timeout: Duration,
    pub alone_check_interval: Duration,
    /// Wait after a voice-state change left the bot alone.
    pub alone_leave_delay: Duration,
    pub reconnect_grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_volume: 10,
            no_playback_timeout: Duration::from_secs(35),
            idle_timeout: Duration::from_secs(50),
            alone_check_interval: Duration::from_secs(50),
            alone_leave_delay: Duration::from_secs(10),
            reconnect_grace: Duration::from_secs(5),
        }
    }
}

fn env_duration(name: &str, default: Duration) -> Result<Duration> {
    match std::env::var(name) {
        Ok(raw) => humantime::parse_duration(raw.trim())
            .with_context(|| format!("{} must be a duration like \"35s\", got: {}", name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_session_timers() {
        let config = Config::default();
        assert_eq!(config.no_playback_timeout, Duration::from_secs(35));
        assert_eq!(config.idle_timeout, Duration::from_secs(50));
        assert_eq!(config.alone_check_interval, Duration::from_secs(50));
        assert_eq!(config.alone_leave_delay, Duration::from_secs(10));
        assert_eq!(config.reconnect_grace, Duration::from_secs(5));
        assert_eq!(config.session_settings(), SessionSettings::default());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.default_volume = 101;
        assert!(config.validate().is_err());

        config.default_volume = 50;
        config.idle_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn summary_hides_the_token() {
        let config = Config {
            discord_token: "super-secret".to_string(),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("35s"));
    }

    #[test]
    fn config_round_trips_through_serde() {
        let json = serde_json::to_value(Config::default()).unwrap();
        let back: Config = serde_json::from_value(json).unwrap();
        assert_eq!(back.idle_timeout, Duration::from_secs(50));
        assert_eq!(back.alone_leave_delay, Duration::from_secs(10));
    }

    #[test]
    fn link_settings_must_be_urls() {
        let mut config = Config {
            invite_url: Some("https://discord.com/oauth2/authorize?client_id=1".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_ok());

        config.support_server = Some("not a link".to_string());
        assert!(config.validate().is_err());
    }
}
