//! # Bot Module
//!
//! Discord side of the player.
//!
//! - [`commands`]: slash-command definitions and registration
//! - [`handlers`]: command dispatch, voice-channel policy and replies
//! - [`voice`]: Songbird implementation of the audio seams
//! - [`notifier`]: Serenity implementation of session announcements
//!
//! [`OpenPlayerBot`] implements Serenity's [`EventHandler`] and routes every
//! interaction to the guild's session through the [`SessionRegistry`].

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, Guild, GuildId, Interaction, Ready, UnavailableGuild, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod notifier;
pub mod voice;

use crate::{audio::registry::SessionRegistry, config::Config};
use voice::SongbirdTransport;

/// Main Discord event handler.
pub struct OpenPlayerBot {
    config: Arc<Config>,
    /// Sesiones de reproducción por guild
    pub registry: Arc<SessionRegistry>,
    /// Capa de voz compartida con las sesiones
    pub transport: Arc<SongbirdTransport>,
}

impl OpenPlayerBot {
    pub fn new(config: Arc<Config>, registry: Arc<SessionRegistry>, transport: Arc<SongbirdTransport>) -> Self {
        Self {
            config,
            registry,
            transport,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// With `GUILD_ID` set, commands go to that guild only (fast propagation,
    /// meant for development). Otherwise they are registered globally.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!(
                        "No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild."
                    )
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!(
                        "No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'."
                    )
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for OpenPlayerBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// The bot was kicked from the guild or the guild was deleted: its voice
    /// link can never come back.
    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // Una guild caída temporalmente no cuenta como eliminada
        if incomplete.unavailable {
            return;
        }
        self.transport.guild_removed(incomplete.id);
    }

    /// Someone joined, left or moved between voice channels. The cache is
    /// already updated, so the session only needs to recount its listeners.
    async fn voice_state_update(&self, _ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        if let Some(session) = self.registry.get(guild_id) {
            debug!("🔈 Cambio de voz en guild {} (usuario {})", guild_id, new.user_id);
            session.members_changed();
        }
    }
}
