use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::{queue::RepeatMode, session::SessionSnapshot, Notice},
    error::PlayerError,
    sources::Track,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

const STANDARD_FOOTER: &str = "🎵 Open Player";

pub const QUEUE_PAGE_SIZE: usize = 10;

pub fn default_embed(message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(format!("**◻️ {}**", message))
        .color(colors::NEUTRAL_GRAY)
}

pub fn warn_embed(message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(format!("**⚠️ {}**", message))
        .color(colors::WARNING_ORANGE)
}

pub fn error_embed(message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(format!("**❌ {}**", message))
        .color(colors::ERROR_RED)
}

pub fn player_error_embed(error: &PlayerError) -> CreateEmbed {
    match error {
        PlayerError::DuplicateConnection | PlayerError::InvalidVolume(_) => warn_embed(&error.to_string()),
        _ => error_embed(&error.to_string()),
    }
}

pub fn now_playing_embed(title: &str, url: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**[{}]({})**", title, url))
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed with a single clickable link, used by /invite and /support-server.
pub fn link_embed(title: &str, url: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(link_line(title, url))
        .color(colors::MUSIC_PURPLE)
}

fn link_line(title: &str, url: &str) -> String {
    format!("**🏳️ [{}]({})**", title, url)
}

/// Mensajes automáticos de la sesión
pub fn notice_embed(notice: &Notice) -> CreateEmbed {
    match notice {
        Notice::NowPlaying { title, url } => now_playing_embed(title, url),
        Notice::LeftAlone => default_embed("Me quedé solo en el canal, desconectando."),
        Notice::LeftIdle => default_embed("Sin música por un rato, desconectando."),
        Notice::LeftWithoutPlayback => warn_embed("No se reprodujo nada a tiempo, desconectando."),
    }
}

pub fn tracks_added_embed(tracks: &[Track]) -> CreateEmbed {
    match tracks {
        [track] => default_embed(&format!("Agregado a la cola ` {} `", track.title)),
        _ => CreateEmbed::default()
            .title("📋 Canciones Agregadas")
            .description(format!("Se agregaron **{} canciones** a la cola", tracks.len()))
            .color(colors::MUSIC_PURPLE)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER)),
    }
}

/// Lines of one queue page, 1-based. The current track is marked.
pub fn queue_lines(snapshot: &SessionSnapshot, page: usize) -> (Vec<String>, usize) {
    let total_pages = snapshot.tracks.len().div_ceil(QUEUE_PAGE_SIZE).max(1);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * QUEUE_PAGE_SIZE;

    let lines = snapshot
        .tracks
        .iter()
        .enumerate()
        .skip(start)
        .take(QUEUE_PAGE_SIZE)
        .map(|(i, track)| {
            let marker = if i as i64 == snapshot.cursor { "▶️ " } else { "" };
            format!("{}**{}**. {}", marker, i + 1, track.title)
        })
        .collect();

    (lines, total_pages)
}

pub fn queue_embed(snapshot: &SessionSnapshot, page: usize) -> CreateEmbed {
    if snapshot.tracks.is_empty() {
        return CreateEmbed::default()
            .title("📋 Cola de Reproducción")
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    let (lines, total_pages) = queue_lines(snapshot, page);
    let repeat = match snapshot.repeat_mode {
        RepeatMode::Track => "🔂 Canción",
        RepeatMode::Queue => "🔁 Cola",
        RepeatMode::Off => "➡️ Desactivada",
    };
    let status = if snapshot.paused {
        "⏸️ Pausado"
    } else if snapshot.playing {
        "▶️ Reproduciendo"
    } else {
        "⏹️ Detenido"
    };

    CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .description(lines.join("\n"))
        .color(colors::INFO_BLUE)
        .field("Estado", status, true)
        .field("Repetición", repeat, true)
        .field("Volumen", format!("{}%", snapshot.volume), true)
        .footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • {} canciones",
            page.clamp(1, total_pages),
            total_pages,
            snapshot.tracks.len()
        )))
        .timestamp(Timestamp::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snapshot(tracks: usize, cursor: i64) -> SessionSnapshot {
        SessionSnapshot {
            tracks: (0..tracks)
                .map(|i| Track::primary(format!("Track {}", i), format!("https://youtu.be/{:011}", i)))
                .collect(),
            cursor,
            repeat_mode: RepeatMode::Off,
            stopped: false,
            playing: true,
            active: true,
            paused: false,
            volume: 10,
            connected: true,
            text_channel: None,
        }
    }

    #[test]
    fn queue_pages_are_one_based_and_mark_the_cursor() {
        let (lines, pages) = queue_lines(&snapshot(23, 11), 2);

        assert_eq!(pages, 3);
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "**11**. Track 10");
        assert_eq!(lines[1], "▶️ **12**. Track 11");
    }

    #[test]
    fn out_of_range_pages_are_clamped() {
        let (lines, pages) = queue_lines(&snapshot(3, 0), 9);
        assert_eq!(pages, 1);
        assert_eq!(lines.len(), 3);

        let (lines, _) = queue_lines(&snapshot(3, 0), 0);
        assert_eq!(lines[0], "▶️ **1**. Track 0");
    }

    #[test]
    fn link_embeds_render_a_markdown_link() {
        assert_eq!(
            link_line("Únete al servidor", "https://discord.gg/abc"),
            "**🏳️ [Únete al servidor](https://discord.gg/abc)**"
        );

        let json = serde_json::to_value(link_embed("Únete al servidor", "https://discord.gg/abc")).unwrap();
        assert_eq!(json["description"], "**🏳️ [Únete al servidor](https://discord.gg/abc)**");
    }
}
