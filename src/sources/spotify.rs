use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::Track;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_URL: &str = "https://api.spotify.com/v1";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    external_urls: Option<ExternalUrls>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

impl SpotifyTrack {
    fn into_track(self) -> Track {
        let url = self
            .external_urls
            .and_then(|urls| urls.spotify)
            .or_else(|| self.id.map(|id| format!("https://open.spotify.com/track/{}", id)))
            .unwrap_or_default();
        let artists = self
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let hint = if artists.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, artists)
        };
        Track::secondary(self.name, url, hint)
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Cliente de la Web API de Spotify (solo metadata)
pub struct SpotifyClient {
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client_id,
            client_secret,
            http,
            token: Mutex::new(None),
        })
    }

    pub async fn track(&self, id: &str) -> Result<Track> {
        let track: SpotifyTrack = self.get(&format!("{}/tracks/{}", API_URL, id)).await?;
        Ok(track.into_track())
    }

    pub async fn album(&self, id: &str, max_items: usize) -> Result<Vec<Track>> {
        info!("💿 Obteniendo álbum de Spotify: {}", id);
        let first = format!("{}/albums/{}/tracks?limit=50", API_URL, id);
        let tracks = self.collect_pages::<SpotifyTrack>(first, max_items).await?;
        Ok(tracks.into_iter().map(SpotifyTrack::into_track).collect())
    }

    pub async fn playlist(&self, id: &str, max_items: usize) -> Result<Vec<Track>> {
        info!("📋 Obteniendo playlist de Spotify: {}", id);
        let first = format!("{}/playlists/{}/tracks?limit=100", API_URL, id);
        let items = self.collect_pages::<PlaylistItem>(first, max_items).await?;
        // Episodios y tracks eliminados llegan como null
        Ok(items
            .into_iter()
            .filter_map(|item| item.track)
            .map(SpotifyTrack::into_track)
            .collect())
    }

    async fn collect_pages<T>(&self, first: String, max_items: usize) -> Result<Vec<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut items = Vec::new();
        let mut next = Some(first);

        while let Some(url) = next.take() {
            let page: Page<T> = self.get(&url).await?;
            items.extend(page.items);
            if items.len() >= max_items {
                items.truncate(max_items);
                break;
            }
            next = page.next;
        }

        Ok(items)
    }

    async fn get<T>(&self, url: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Spotify request failed: {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Spotify API error: {} - {}", status, error_text);
        }

        Ok(response.json().await?)
    }

    /// Token de client credentials, renovado un minuto antes de expirar
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        debug!("🔑 Solicitando token de Spotify");
        let response = self
            .http
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {}", self.basic_credentials()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("Spotify token request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Spotify rejected the credentials: {}", response.status());
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(60));
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }

    fn basic_credentials(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret))
    }
}
