use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use tracing::info;

/// Mapa guild → canal de autoplay: en el canal enlazado cualquier mensaje
/// de texto plano se trata como una petición de reproducción implícita.
///
/// Tabla de consulta pura, con ciclo de vida independiente de las sesiones.
#[derive(Default)]
pub struct AutoplayBindings {
    bindings: DashMap<GuildId, ChannelId>,
}

impl AutoplayBindings {
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
        }
    }

    pub fn bind(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.bindings.insert(guild_id, channel_id);
        info!("📻 Autoplay enlazado al canal {} en guild {}", channel_id, guild_id);
    }

    /// Devuelve `true` si había un enlace que quitar.
    pub fn unbind(&self, guild_id: GuildId) -> bool {
        let removed = self.bindings.remove(&guild_id).is_some();
        if removed {
            info!("📴 Autoplay desenlazado en guild {}", guild_id);
        }
        removed
    }

    pub fn resolve(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.bindings.get(&guild_id).map(|c| *c)
    }

    pub fn is_bound(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        self.resolve(guild_id) == Some(channel_id)
    }
}
