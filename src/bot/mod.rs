//! # Bot Module
//!
//! Implementación del bot de Discord: registro de comandos, despacho de
//! interacciones y eventos de voz. Los comandos se traducen 1:1 a
//! operaciones del núcleo ([`crate::audio`]) independientemente de cómo
//! llegan (slash command o texto plano en un canal de autoplay).

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Message, Ready, VoiceState},
    http::Http,
};
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{
        engine::PlaybackEngine,
        registry::SessionRegistry,
        session::Notifier,
        transport::SongbirdTransport,
    },
    autoplay::AutoplayBindings,
    config::Config,
    sources::{SongResolver, YtDlpResolver},
    storage::PlaylistStore,
};

use handlers::PlayOutcome;

/// Handler principal del bot.
///
/// El registro de sesiones se inicializa perezosamente en el primer uso:
/// songbird y el cliente HTTP solo existen cuando el gateway está listo.
pub struct MusicBot {
    pub config: Arc<Config>,
    /// Playlists persistidas, con ciclo de vida independiente de las sesiones
    pub store: Arc<PlaylistStore>,
    /// Canales de autoplay por guild
    pub autoplay: Arc<AutoplayBindings>,
    /// Resolutor de texto libre / URLs a canciones
    pub resolver: Arc<dyn SongResolver>,
    sessions: OnceCell<Arc<SessionRegistry>>,
}

impl MusicBot {
    pub fn new(config: Config, store: Arc<PlaylistStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            autoplay: Arc::new(AutoplayBindings::new()),
            resolver: Arc::new(YtDlpResolver::new()),
            sessions: OnceCell::new(),
        }
    }

    pub async fn sessions(&self, ctx: &Context) -> Result<Arc<SessionRegistry>> {
        self.sessions
            .get_or_try_init(|| async {
                let manager = songbird::get(ctx)
                    .await
                    .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;
                let transport = Arc::new(SongbirdTransport::new(manager));
                let engine = Arc::new(PlaybackEngine::new(self.config.stream_timeout()));
                let notifier = Arc::new(ChannelNotifier {
                    http: ctx.http.clone(),
                });
                Ok(SessionRegistry::new(transport, engine, notifier))
            })
            .await
            .map(Arc::clone)
    }

    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::from(guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Comandos registrados para guild {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
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

    /// Texto plano en un canal de autoplay enlazado = petición de
    /// reproducción implícita.
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot || !self.config.enable_autoplay {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        if !self.autoplay.is_bound(guild_id, msg.channel_id) {
            return;
        }
        let query = msg.content.trim().to_string();
        if query.is_empty() || query.starts_with('/') || query.starts_with('!') {
            return;
        }

        let outcome = handlers::play_request(
            &ctx,
            self,
            guild_id,
            msg.author.id,
            msg.channel_id,
            &query,
        )
        .await;

        let reply = match outcome {
            Ok(PlayOutcome::Added { song, position }) => {
                format!("🎵 **{}** añadida a la cola (posición {})", song.title, position)
            }
            Ok(PlayOutcome::Refused(reply)) => reply,
            Err(e) => {
                error!("Error en petición de autoplay: {:?}", e);
                return;
            }
        };

        if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
            warn!("Error enviando mensaje: {:?}", e);
        }
    }

    /// Si expulsan al bot del canal de voz, la sesión se detiene y se
    /// reclama en vez de quedar colgada sin reproducción.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let me = ctx.cache.current_user().id;
        if new.user_id != me {
            return;
        }
        if old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                info!("🔌 Bot desconectado del canal de voz en guild {}", guild_id);
                match self.sessions(&ctx).await {
                    Ok(sessions) => {
                        if let Some(session) = sessions.get(guild_id) {
                            session.stop().await;
                        }
                        info!("📊 Sesiones activas: {}", sessions.active_sessions());
                    }
                    Err(e) => error!("Error al limpiar la sesión: {:?}", e),
                }
            }
        }
    }
}

/// Reportes de la sesión (ahora suena X, fallo de stream) hacia el último
/// canal de texto desde el que se mandó un comando.
struct ChannelNotifier {
    http: Arc<Http>,
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, channel: Option<ChannelId>, message: String) {
        let Some(channel) = channel else {
            return;
        };
        if let Err(e) = channel.say(&self.http, message).await {
            warn!("Error enviando mensaje: {:?}", e);
        }
    }
}
