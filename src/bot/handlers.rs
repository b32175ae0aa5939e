use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{queue::RepeatMode, session::SessionHandle, JoinTarget, VoiceTransport},
    bot::{commands, OpenPlayerBot},
    error::PlayerError,
    ui::embeds,
};

/// Motivo por el que se rechaza un comando de voz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceRefusal {
    NotInVoice,
    OtherChannel,
}

impl VoiceRefusal {
    pub fn message(&self) -> &'static str {
        match self {
            VoiceRefusal::NotInVoice => "Únete a un canal de voz e inténtalo de nuevo.",
            VoiceRefusal::OtherChannel => "Debes estar en el mismo canal que el bot.",
        }
    }
}

/// The invoker must be in a voice channel, and in the bot's one when the bot
/// is already connected somewhere in the guild.
pub fn check_voice_policy(
    user_channel: Option<ChannelId>,
    bot_channel: Option<ChannelId>,
) -> Result<ChannelId, VoiceRefusal> {
    let user_channel = user_channel.ok_or(VoiceRefusal::NotInVoice)?;
    match bot_channel {
        Some(bot_channel) if bot_channel != user_channel => Err(VoiceRefusal::OtherChannel),
        _ => Ok(user_channel),
    }
}

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &OpenPlayerBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;
    let name = command.data.name.clone();

    info!("📝 Comando /{} usado por {} en guild {}", name, command.user.name, guild_id);

    let voice_channel = if commands::requires_voice(&name) {
        let (user_channel, bot_channel) = voice_channels(ctx, guild_id, command.user.id);
        match check_voice_policy(user_channel, bot_channel) {
            Ok(channel_id) => Some(channel_id),
            Err(refusal) => {
                info!("🚫 /{} rechazado en guild {}: {:?}", name, guild_id, refusal);
                return reply_ephemeral(ctx, &command, embeds::warn_embed(refusal.message())).await;
            }
        }
    } else {
        None
    };

    match (name.as_str(), voice_channel) {
        ("play", Some(channel_id)) => return handle_play(ctx, &command, bot, guild_id, channel_id).await,
        ("join", Some(channel_id)) => return handle_join(ctx, &command, bot, guild_id, channel_id).await,
        ("invite", _) => {
            let embed = link_reply("Haz clic para agregarme a tu servidor", bot.config.invite_url.as_deref());
            return reply(ctx, &command, embed).await;
        }
        ("support-server", _) => {
            let embed = link_reply("Haz clic y únete al servidor", bot.config.support_server.as_deref());
            return reply(ctx, &command, embed).await;
        }
        _ => {}
    }

    // El resto de comandos opera sobre un reproductor ya existente
    let Some(session) = bot.registry.get(guild_id) else {
        return reply(ctx, &command, embeds::error_embed("No hay ningún reproductor en este servidor.")).await;
    };
    session.set_text_channel(command.channel_id);

    let embed = match name.as_str() {
        "leave" => handle_leave(&session).await,
        "skip" => session.skip().await.map(|_| embeds::default_embed("Saltada.")),
        "back" => session.back().await.map(|_| embeds::default_embed("Volviendo a la anterior.")),
        "jump" => handle_jump(&command, &session).await,
        "stop" => session.stop().await.map(|_| embeds::default_embed("Detenido.")),
        "pause" => session.pause().await.map(|paused| {
            if paused {
                embeds::default_embed("⏸️ Reproducción pausada")
            } else {
                embeds::warn_embed("No hay nada que pausar.")
            }
        }),
        "resume" => session.resume().await.map(|resumed| {
            if resumed {
                embeds::default_embed("▶️ Reproducción reanudada")
            } else {
                embeds::warn_embed("No hay nada pausado.")
            }
        }),
        "seek" => handle_seek(&command, &session).await,
        "remove" => handle_remove(&command, &session).await,
        "clear" => session.clear().await.map(|_| embeds::default_embed("Cola limpiada.")),
        "loop" => handle_loop(&command, &session).await,
        "volume" => handle_volume(&command, &session).await,
        "queue" => handle_queue(&command, &session).await,
        _ => Ok(embeds::error_embed("Comando no reconocido")),
    };

    let embed = embed.unwrap_or_else(|e| {
        warn!("⚠️ /{} falló en guild {}: {}", name, guild_id, e);
        embeds::player_error_embed(&e)
    });
    reply(ctx, &command, embed).await
}

// Handlers específicos para cada comando

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPlayerBot,
    guild_id: GuildId,
    channel_id: ChannelId,
) -> Result<()> {
    let session = bot.registry.get_or_create(guild_id, command.channel_id);

    let embed = match ensure_joined(&session, JoinTarget { guild_id, channel_id }).await {
        Ok(()) => embeds::default_embed("🔊 Conectado al canal de voz"),
        Err(e) => embeds::player_error_embed(&e),
    };
    reply(ctx, command, embed).await
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPlayerBot,
    guild_id: GuildId,
    channel_id: ChannelId,
) -> Result<()> {
    let query = option_str(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    // Defer la respuesta ya que la búsqueda puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let session = bot.registry.get_or_create(guild_id, command.channel_id);
    let embed = match play(bot, &session, guild_id, channel_id, &query).await {
        Ok(embed) => embed,
        Err(e) => {
            warn!("⚠️ /play '{}' falló en guild {}: {}", query, guild_id, e);
            embeds::player_error_embed(&e)
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

async fn play(
    bot: &OpenPlayerBot,
    session: &SessionHandle,
    guild_id: GuildId,
    channel_id: ChannelId,
    query: &str,
) -> Result<CreateEmbed, PlayerError> {
    if !bot.transport.has_connection(guild_id) {
        ensure_joined(session, JoinTarget { guild_id, channel_id }).await?;
    }

    let tracks = session.search(query).await?;
    if tracks.is_empty() {
        return Ok(embeds::error_embed("No se encontraron resultados."));
    }

    // Si ya hay un recurso activo (sonando, cargando o en pausa) solo se encola
    let busy = session.snapshot().await?.active;
    session.add_tracks(tracks.clone()).await?;

    if busy {
        return Ok(embeds::tracks_added_embed(&tracks));
    }

    let track = session.play_from_queue(None).await?;
    Ok(embeds::now_playing_embed(&track.title, &track.url))
}

/// Joins the invoker's channel. Losing a race against a concurrent /play or
/// /join of the same guild still leaves the bot connected, so it counts as
/// joined.
async fn ensure_joined(session: &SessionHandle, target: JoinTarget) -> Result<(), PlayerError> {
    match session.join(target).await {
        Ok(()) | Err(PlayerError::DuplicateConnection) => Ok(()),
        Err(e) => Err(e),
    }
}

async fn handle_leave(session: &SessionHandle) -> Result<CreateEmbed, PlayerError> {
    session.leave().await?;
    Ok(embeds::default_embed("👋 Desconectado del canal de voz"))
}

async fn handle_jump(command: &CommandInteraction, session: &SessionHandle) -> Result<CreateEmbed, PlayerError> {
    let Some(index) = option_i64(command, "index") else {
        return Ok(embeds::warn_embed("Indica una posición de la cola."));
    };
    session.jump(index).await?;
    Ok(embeds::default_embed(&format!("Saltando a la posición ` {} `", index)))
}

async fn handle_seek(command: &CommandInteraction, session: &SessionHandle) -> Result<CreateEmbed, PlayerError> {
    let second = option_i64(command, "second").unwrap_or(0).max(0) as u64;
    session.seek(second).await?;
    Ok(embeds::default_embed(&format!("⏩ Posición ajustada a ` {}s `", second)))
}

async fn handle_remove(command: &CommandInteraction, session: &SessionHandle) -> Result<CreateEmbed, PlayerError> {
    let index = option_i64(command, "index").unwrap_or(0);
    Ok(match session.remove_track(index).await? {
        Some(track) => embeds::default_embed(&format!("Quitado de la cola ` {} `", track.title)),
        None => embeds::warn_embed(&format!("No hay ninguna canción en la posición {}.", index)),
    })
}

async fn handle_loop(command: &CommandInteraction, session: &SessionHandle) -> Result<CreateEmbed, PlayerError> {
    let mode = parse_repeat_mode(option_str(command, "mode").unwrap_or("off"));
    session.set_repeat_mode(mode).await?;

    let message = match mode {
        RepeatMode::Track => "🔂 Repetir canción activado",
        RepeatMode::Queue => "🔁 Repetir cola activado",
        RepeatMode::Off => "➡️ Repetición desactivada",
    };
    Ok(embeds::default_embed(message))
}

async fn handle_volume(command: &CommandInteraction, session: &SessionHandle) -> Result<CreateEmbed, PlayerError> {
    let Some(level) = option_i64(command, "level") else {
        let current = session.snapshot().await?.volume;
        return Ok(embeds::default_embed(&format!("🔊 Volumen actual: {}%", current)));
    };
    session.set_volume(level).await?;
    Ok(embeds::default_embed(&format!("🔊 Volumen ajustado a {}%", level)))
}

async fn handle_queue(command: &CommandInteraction, session: &SessionHandle) -> Result<CreateEmbed, PlayerError> {
    let page = option_i64(command, "page").unwrap_or(1).max(1) as usize;
    let snapshot = session.snapshot().await?;
    Ok(embeds::queue_embed(&snapshot, page))
}

// Funciones auxiliares

/// Enlace configurado, o un aviso si el operador no lo definió
fn link_reply(title: &str, url: Option<&str>) -> CreateEmbed {
    match url {
        Some(url) => embeds::link_embed(title, url),
        None => embeds::warn_embed("Este enlace no está configurado."),
    }
}

pub fn parse_repeat_mode(raw: &str) -> RepeatMode {
    match raw {
        "track" => RepeatMode::Track,
        "queue" => RepeatMode::Queue,
        _ => RepeatMode::Off,
    }
}

/// Voice channels of the invoker and of the bot, read from the gateway cache.
fn voice_channels(ctx: &Context, guild_id: GuildId, user_id: UserId) -> (Option<ChannelId>, Option<ChannelId>) {
    let bot_id = ctx.cache.current_user().id;
    let Some(guild) = guild_id.to_guild_cached(&ctx.cache) else {
        return (None, None);
    };

    let channel_of = |id: &UserId| guild.voice_states.get(id).and_then(|state| state.channel_id);
    (channel_of(&user_id), channel_of(&bot_id))
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn option_i64(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

async fn reply(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

async fn reply_ephemeral(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed).ephemeral(true)),
        )
        .await?;
    Ok(())
}
