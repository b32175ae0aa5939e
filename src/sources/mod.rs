//! # Sources Module
//!
//! Media lookup for the player. A query typed by a user is classified into one
//! of the supported catalog shapes and turned into zero or more [`Track`]s.
//!
//! - **Primary catalog** ([`youtube`]): videos, playlists and free-text search.
//!   Primary tracks are directly streamable.
//! - **Secondary catalog** ([`spotify`]): tracks, albums and playlists. These
//!   carry metadata only; the streamable locator is found lazily on first
//!   playback by searching the primary catalog with the track's hint.

pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use crate::error::{PlayerError, PlayerResult};

pub use spotify::SpotifyClient;
pub use youtube::YouTubeClient;

/// Catálogo de origen de un track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOrigin {
    PrimarySource,
    SecondarySource,
}

impl TrackOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackOrigin::PrimarySource => "youtube",
            TrackOrigin::SecondarySource => "spotify",
        }
    }
}

/// A playable unit in a guild queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub title: String,
    /// Canonical page of the track in its own catalog.
    pub url: String,
    pub origin: TrackOrigin,
    /// Locator handed to the audio sink. Filled lazily for secondary tracks.
    pub stream_locator: Option<String>,
    /// Origin specific data needed to find a stream locator.
    pub resolver_hint: Option<String>,
}

impl Track {
    pub fn primary(title: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            title: title.into(),
            stream_locator: Some(url.clone()),
            url,
            origin: TrackOrigin::PrimarySource,
            resolver_hint: None,
        }
    }

    pub fn secondary(title: impl Into<String>, url: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            origin: TrackOrigin::SecondarySource,
            stream_locator: None,
            resolver_hint: Some(hint.into()),
        }
    }

    pub fn with_stream_locator(mut self, locator: impl Into<String>) -> Self {
        self.stream_locator = Some(locator.into());
        self
    }
}

/// Looks up tracks and their streamable locators.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Classifies `query` and returns the matching tracks, in order. An empty
    /// list means nothing was found.
    async fn resolve(&self, query: &str) -> PlayerResult<Vec<Track>>;

    /// Produces the locator the audio sink streams from.
    async fn resolve_stream(&self, track: &Track) -> PlayerResult<String>;
}

/// Forma de la consulta del usuario
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    PrimaryVideo(String),
    PrimaryPlaylist(String),
    PrimarySearch(String),
    SecondaryTrack(String),
    SecondaryAlbum(String),
    SecondaryPlaylist(String),
    Unsupported,
}

/// Classifies a raw user query without touching the network.
pub fn classify(query: &str) -> QueryKind {
    let query = query.trim();
    if query.is_empty() {
        return QueryKind::Unsupported;
    }

    if let Some(rest) = query.strip_prefix("spotify:") {
        let mut parts = rest.splitn(2, ':');
        return match (parts.next(), parts.next()) {
            (Some(kind), Some(id)) if !id.is_empty() => secondary_kind(kind, id),
            _ => QueryKind::Unsupported,
        };
    }

    let Ok(url) = Url::parse(query) else {
        return QueryKind::PrimarySearch(query.to_string());
    };
    if !matches!(url.scheme(), "http" | "https") {
        return QueryKind::PrimarySearch(query.to_string());
    }

    let host = url.host_str().unwrap_or_default();
    if YouTubeClient::is_youtube_host(host) {
        let has_list = url.query_pairs().any(|(key, _)| key == "list");
        if url.path() == "/playlist" && has_list {
            return QueryKind::PrimaryPlaylist(query.to_string());
        }
        return match YouTubeClient::extract_video_id(query) {
            Some(_) => QueryKind::PrimaryVideo(query.to_string()),
            None => QueryKind::Unsupported,
        };
    }

    if host == "open.spotify.com" {
        // /intl-es/track/<id> también es válido
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty() && !seg.starts_with("intl-")).collect())
            .unwrap_or_default();
        if let [kind, id, ..] = segments.as_slice() {
            return secondary_kind(kind, id);
        }
    }

    QueryKind::Unsupported
}

/// Catalog ids end up in API paths, so only plain base-62 ids are accepted.
fn secondary_kind(kind: &str, id: &str) -> QueryKind {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return QueryKind::Unsupported;
    }

    match kind {
        "track" => QueryKind::SecondaryTrack(id.to_string()),
        "album" => QueryKind::SecondaryAlbum(id.to_string()),
        "playlist" => QueryKind::SecondaryPlaylist(id.to_string()),
        _ => QueryKind::Unsupported,
    }
}

/// Resolver que combina el catálogo primario y el secundario
pub struct CatalogResolver {
    youtube: YouTubeClient,
    spotify: Option<SpotifyClient>,
    max_playlist_size: usize,
}

impl CatalogResolver {
    pub fn new(youtube: YouTubeClient, spotify: Option<SpotifyClient>, max_playlist_size: usize) -> Self {
        Self {
            youtube,
            spotify,
            max_playlist_size,
        }
    }

    fn spotify(&self) -> PlayerResult<&SpotifyClient> {
        self.spotify
            .as_ref()
            .ok_or_else(|| PlayerError::Resolution("Spotify credentials are not configured".to_string()))
    }
}

#[async_trait]
impl MediaResolver for CatalogResolver {
    async fn resolve(&self, query: &str) -> PlayerResult<Vec<Track>> {
        let kind = classify(query);
        debug!("🔎 Consulta '{}' clasificada como {:?}", query, kind);

        let tracks = match kind {
            QueryKind::PrimarySearch(text) => self.youtube.search_first(&text).await.map(|t| t.into_iter().collect::<Vec<_>>()),
            QueryKind::PrimaryVideo(url) => self.youtube.video(&url).await.map(|t| vec![t]),
            QueryKind::PrimaryPlaylist(url) => self.youtube.playlist(&url, self.max_playlist_size).await,
            QueryKind::SecondaryTrack(id) => self.spotify()?.track(&id).await.map(|t| vec![t]),
            QueryKind::SecondaryAlbum(id) => self.spotify()?.album(&id, self.max_playlist_size).await,
            QueryKind::SecondaryPlaylist(id) => self.spotify()?.playlist(&id, self.max_playlist_size).await,
            QueryKind::Unsupported => Ok(Vec::new()),
        }
        .map_err(PlayerError::resolution)?;

        info!("✅ {} tracks encontrados para '{}'", tracks.len(), query);
        Ok(tracks)
    }

    async fn resolve_stream(&self, track: &Track) -> PlayerResult<String> {
        if let Some(locator) = &track.stream_locator {
            return Ok(locator.clone());
        }

        match track.origin {
            TrackOrigin::PrimarySource => Ok(track.url.clone()),
            TrackOrigin::SecondarySource => {
                let hint = track
                    .resolver_hint
                    .as_deref()
                    .ok_or_else(|| PlayerError::Resolution(format!("{} has no lookup data", track.title)))?;

                let found = self.youtube.search_first(hint).await.map_err(PlayerError::resolution)?;
                let found = found.ok_or_else(|| {
                    PlayerError::Resolution(format!("No streamable match was found for {}", track.title))
                })?;

                info!("🔗 '{}' resuelto a {}", track.title, found.url);
                Ok(found.url)
            }
        }
    }
}
