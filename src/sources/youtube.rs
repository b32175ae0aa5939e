use anyhow::{Context, Result};
use async_process::Command;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::Track;

/// Cliente para interactuar con YouTube/yt-dlp
pub struct YouTubeClient {
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
}

impl YtDlpEntry {
    fn into_track(self) -> Option<Track> {
        let url = self
            .webpage_url
            .or_else(|| self.url.filter(|u| YouTubeClient::extract_video_id(u).is_some()))
            .or_else(|| self.id.as_ref().map(|id| format!("https://www.youtube.com/watch?v={}", id)))?;
        let title = self.title.unwrap_or_else(|| url.clone());
        Some(Track::primary(title, url))
    }
}

impl YouTubeClient {
    pub fn new() -> Self {
        Self {
            // Limitar requests concurrentes para evitar rate limiting
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Busca en YouTube y devuelve el primer resultado
    pub async fn search_first(&self, query: &str) -> Result<Option<Track>> {
        info!("🔍 Buscando en YouTube: {}", query);
        let search_query = format!("ytsearch1:{}", query);
        let tracks = self
            .run(&["--no-playlist", "--dump-json", "--flat-playlist", "--skip-download", &search_query])
            .await?;
        Ok(tracks.into_iter().next())
    }

    /// Obtiene información de un video específico
    pub async fn video(&self, url: &str) -> Result<Track> {
        debug!("📊 Obteniendo info de: {}", url);
        self.run(&["--no-playlist", "--dump-json", "--skip-download", url])
            .await?
            .into_iter()
            .next()
            .with_context(|| format!("yt-dlp returned no metadata for {}", url))
    }

    /// Obtiene los videos de una playlist
    pub async fn playlist(&self, url: &str, max_items: usize) -> Result<Vec<Track>> {
        info!("📋 Obteniendo playlist: {}", url);
        let limit = max_items.to_string();
        let mut tracks = self
            .run(&["--flat-playlist", "--dump-json", "--playlist-end", &limit, url])
            .await?;
        tracks.truncate(max_items);
        Ok(tracks)
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<Track>> {
        let _permit = self.rate_limiter.acquire().await?;

        let output = Command::new("yt-dlp")
            .args(args)
            .arg("--no-warnings")
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(Self::parse_entries(&String::from_utf8_lossy(&output.stdout)))
    }

    /// One JSON document per line, as printed by `--dump-json`.
    fn parse_entries(stdout: &str) -> Vec<Track> {
        stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<YtDlpEntry>(line).ok())
            .filter_map(YtDlpEntry::into_track)
            .collect()
    }

    pub fn is_youtube_host(host: &str) -> bool {
        matches!(
            host,
            "www.youtube.com" | "youtube.com" | "youtu.be" | "m.youtube.com" | "music.youtube.com"
        )
    }

    /// Extrae el ID de video de una URL de YouTube
    pub fn extract_video_id(url: &str) -> Option<String> {
        static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
        let pattern = PATTERN
            .get_or_init(|| {
                Regex::new(r"(?:youtube\.com/(?:watch\?(?:.*&)?v=|shorts/|embed/|live/)|youtu\.be/)([A-Za-z0-9_-]{11})").ok()
            })
            .as_ref()?;
        pattern
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

impl Default for YouTubeClient {
    fn default() -> Self {
        Self::new()
    }
}
