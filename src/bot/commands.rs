use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Comandos que exigen estar en un canal de voz (y en el mismo que el bot)
pub const VOICE_REQUIRED: &[&str] = &[
    "join", "leave", "play", "skip", "back", "jump", "stop", "pause", "resume", "seek", "remove", "clear", "loop",
    "volume",
];

pub fn requires_voice(name: &str) -> bool {
    VOICE_REQUIRED.contains(&name)
}

pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        leave_command(),
        play_command(),
        skip_command(),
        back_command(),
        jump_command(),
        stop_command(),
        pause_command(),
        resume_command(),
        seek_command(),
        remove_command(),
        clear_command(),
        loop_command(),
        volume_command(),
        queue_command(),
        invite_command(),
        support_server_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción, álbum o playlist de YouTube o Spotify")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "URL o término de búsqueda")
                .required(true),
        )
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción sin avanzar la cola")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn seek_command() -> CreateCommand {
    CreateCommand::new("seek")
        .description("Salta a un segundo de la canción actual")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "second", "Segundo de destino")
                .min_int_value(0)
                .required(true),
        )
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Ajusta el volumen de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "level", "Nivel de volumen (0-100)")
                .min_int_value(0)
                .max_int_value(100),
        )
}

// Comandos de cola

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn back_command() -> CreateCommand {
    CreateCommand::new("back").description("Vuelve a la canción anterior")
}

fn jump_command() -> CreateCommand {
    CreateCommand::new("jump")
        .description("Salta a una posición de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "index", "Posición en la cola")
                .min_int_value(1)
                .required(true),
        )
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita una canción de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "index", "Posición en la cola")
                .min_int_value(1)
                .required(true),
        )
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Limpia la cola de reproducción")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Configura el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .add_string_choice("Desactivar", "off")
                .add_string_choice("Canción", "track")
                .add_string_choice("Cola", "queue")
                .required(true),
        )
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página").min_int_value(1),
        )
}

// Comandos de enlaces

fn invite_command() -> CreateCommand {
    CreateCommand::new("invite").description("Agrega el bot a tu servidor")
}

fn support_server_command() -> CreateCommand {
    CreateCommand::new("support-server").description("Únete al servidor de soporte")
}
