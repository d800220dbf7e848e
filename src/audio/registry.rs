use std::sync::Arc;

use dashmap::DashMap;
use serenity::model::id::GuildId;
use tracing::debug;

use crate::audio::engine::PlaybackEngine;
use crate::audio::session::{GuildSession, Notifier};
use crate::audio::transport::VoiceTransport;

/// Registro de sesiones por guild: creación en el primer uso, destrucción
/// cuando la cola se vacía y la reproducción termina. Sin singletons de
/// proceso; el registro es el único dueño del mapa.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<GuildSession>>,
    transport: Arc<dyn VoiceTransport>,
    engine: Arc<PlaybackEngine>,
    notifier: Arc<dyn Notifier>,
}

impl SessionRegistry {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        engine: Arc<PlaybackEngine>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            transport,
            engine,
            notifier,
        })
    }

    /// Devuelve la sesión existente o crea una nueva inactiva. La entrada
    /// del mapa se resuelve de forma atómica: dos llamadas concurrentes para
    /// la misma guild nunca crean sesiones duplicadas.
    pub fn get_or_create(self: &Arc<Self>, guild_id: GuildId) -> Arc<GuildSession> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("Sesión creada para guild {}", guild_id);
                GuildSession::new(
                    guild_id,
                    Arc::downgrade(self),
                    self.transport.clone(),
                    self.engine.clone(),
                    self.notifier.clone(),
                )
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    /// Elimina la sesión solo si sigue siendo exactamente la dada: una
    /// sesión descartada no puede expulsar a su reemplazo.
    pub(crate) fn remove_if(&self, guild_id: GuildId, session: &Arc<GuildSession>) {
        let removed = self
            .sessions
            .remove_if(&guild_id, |_, existing| Arc::ptr_eq(existing, session));
        if removed.is_some() {
            debug!("Sesión reclamada para guild {}", guild_id);
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::audio::transport::testing::{MockConnection, MockNotifier, MockTransport};

    fn registry() -> Arc<SessionRegistry> {
        SessionRegistry::new(
            Arc::new(MockTransport::new(Arc::new(MockConnection::default()))),
            Arc::new(PlaybackEngine::new(Duration::from_secs(1))),
            Arc::new(MockNotifier::default()),
        )
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_yields_one_session() {
        let registry = registry();
        let guild = GuildId::new(1);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move { registry.get_or_create(guild) }));
        }

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }

        assert_eq!(registry.active_sessions(), 1);
        for pair in sessions.windows(2) {
            assert!(Arc::ptr_eq(&pair[0], &pair[1]));
        }
    }

    #[tokio::test]
    async fn test_sessions_are_per_guild() {
        let registry = registry();
        let a = registry.get_or_create(GuildId::new(1));
        let b = registry.get_or_create(GuildId::new(2));

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.active_sessions(), 2);
    }

    #[tokio::test]
    async fn test_remove_if_guards_by_identity() {
        let registry = registry();
        let guild = GuildId::new(1);

        let first = registry.get_or_create(guild);
        registry.remove_if(guild, &first);
        assert!(registry.get(guild).is_none());

        // una referencia vieja no expulsa a la sesión de reemplazo
        let second = registry.get_or_create(guild);
        registry.remove_if(guild, &first);
        assert!(registry.get(guild).is_some());
        assert!(Arc::ptr_eq(&registry.get(guild).unwrap(), &second));
    }
}
