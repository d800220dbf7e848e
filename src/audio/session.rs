use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::engine::PlaybackEngine;
use crate::audio::queue::{LoopMode, SongQueue};
use crate::audio::registry::SessionRegistry;
use crate::audio::transport::{PlaybackOutcome, PlayerHandle, VoiceConnection, VoiceTransport};
use crate::error::MusicError;
use crate::sources::Song;

/// Estado de reproducción de una sesión.
///
/// `stop` no es un estado: es la acción que fuerza la vuelta a `Idle`.
/// `Connecting` solo existe mientras `enqueue` mantiene el lock interno.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Connecting,
    Playing,
    Paused,
}

/// Reporte de una línea hacia el canal de texto del usuario.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: Option<ChannelId>, message: String);
}

/// Instantánea de la cola para el comando `queue`.
#[derive(Debug, Clone)]
pub struct QueueView {
    pub songs: Vec<Song>,
    pub state: PlaybackState,
    pub loop_mode: LoopMode,
}

/// Recurso activo: su generación identifica a qué arranque pertenece cada
/// señal de fin, y el token cancela una apertura de stream en vuelo.
struct ActiveTrack {
    generation: u64,
    cancel: CancellationToken,
}

struct SessionInner {
    queue: SongQueue,
    loop_mode: LoopMode,
    state: PlaybackState,
    connection: Option<Arc<dyn VoiceConnection>>,
    player: Option<Arc<dyn PlayerHandle>>,
    current: Option<ActiveTrack>,
    next_generation: u64,
    announce_channel: Option<ChannelId>,
}

/// Máquina de estados de reproducción de una guild.
///
/// Todas las mutaciones (comandos y señales de fin) se serializan a través
/// de un único mutex: disciplina de un solo escritor por guild. Las guilds
/// son unidades independientes; nada aquí bloquea a otra sesión.
pub struct GuildSession {
    guild_id: GuildId,
    registry: Weak<SessionRegistry>,
    transport: Arc<dyn VoiceTransport>,
    engine: Arc<PlaybackEngine>,
    notifier: Arc<dyn Notifier>,
    inner: Mutex<SessionInner>,
}

impl GuildSession {
    pub(crate) fn new(
        guild_id: GuildId,
        registry: Weak<SessionRegistry>,
        transport: Arc<dyn VoiceTransport>,
        engine: Arc<PlaybackEngine>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            guild_id,
            registry,
            transport,
            engine,
            notifier,
            inner: Mutex::new(SessionInner {
                queue: SongQueue::new(),
                loop_mode: LoopMode::Off,
                state: PlaybackState::Idle,
                connection: None,
                player: None,
                current: None,
                next_generation: 0,
                announce_channel: None,
            }),
        })
    }

    /// Añade una canción a la cola. Si la sesión estaba inactiva, se conecta
    /// al canal de voz y arranca la reproducción de la nueva cabeza.
    ///
    /// Devuelve la posición en la cola (1 = sonando ahora).
    pub async fn enqueue(
        self: &Arc<Self>,
        song: Song,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<usize, MusicError> {
        self.admit(vec![song], voice_channel, text_channel).await
    }

    /// Añade una lista completa (carga de playlist). Misma semántica que
    /// `enqueue`; devuelve la longitud de la cola tras añadir.
    pub async fn enqueue_all(
        self: &Arc<Self>,
        songs: Vec<Song>,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<usize, MusicError> {
        self.admit(songs, voice_channel, text_channel).await
    }

    async fn admit(
        self: &Arc<Self>,
        songs: Vec<Song>,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<usize, MusicError> {
        let mut inner = self.inner.lock().await;
        inner.announce_channel = Some(text_channel);

        if songs.is_empty() {
            // nada que admitir; una sesión recién creada no debe quedarse
            // registrada vacía e inactiva
            let len = inner.queue.len();
            if inner.state == PlaybackState::Idle && inner.queue.is_empty() {
                drop(inner);
                self.discard();
            }
            return Ok(len);
        }

        let was_idle = inner.state == PlaybackState::Idle;
        if was_idle {
            inner.state = PlaybackState::Connecting;
            let conn = match self.transport.connect(self.guild_id, voice_channel).await {
                Ok(conn) => conn,
                Err(err) => {
                    // sesión a medio construir: se descarta, no se deja
                    // registrada sin conexión
                    inner.state = PlaybackState::Idle;
                    drop(inner);
                    self.discard();
                    return Err(err);
                }
            };
            info!("🔊 Conectado al canal de voz en guild {}", self.guild_id);
            inner.connection = Some(conn);
        }

        inner.queue.extend(songs);
        if was_idle {
            self.start_head(&mut inner).await;
        }

        Ok(inner.queue.len())
    }

    /// Termina el recurso actual de inmediato y avanza por el mismo camino
    /// que una finalización natural (la política de repetición aplica).
    pub async fn skip(self: &Arc<Self>) -> Result<Song, MusicError> {
        let mut inner = self.inner.lock().await;
        if inner.connection.is_none() {
            return Err(MusicError::NotConnected);
        }
        let Some(active) = inner.current.take() else {
            return Err(MusicError::NotConnected);
        };

        // cancela una apertura en vuelo y deja huérfana cualquier señal
        // tardía del recurso superado
        active.cancel.cancel();
        if let Some(player) = inner.player.take() {
            player.stop();
        }

        let skipped = inner
            .queue
            .head()
            .cloned()
            .ok_or(MusicError::NotConnected)?;
        self.advance_locked(&mut inner).await;
        Ok(skipped)
    }

    /// Legal solo desde `Playing`.
    pub async fn pause(&self) -> Result<(), MusicError> {
        let mut inner = self.inner.lock().await;
        if inner.state != PlaybackState::Playing {
            return Err(MusicError::NotConnected);
        }
        let player = inner.player.as_ref().ok_or(MusicError::NotConnected)?;
        player.pause()?;
        inner.state = PlaybackState::Paused;
        Ok(())
    }

    /// Legal solo desde `Paused`.
    pub async fn resume(&self) -> Result<(), MusicError> {
        let mut inner = self.inner.lock().await;
        if inner.state != PlaybackState::Paused {
            return Err(MusicError::NotConnected);
        }
        let player = inner.player.as_ref().ok_or(MusicError::NotConnected)?;
        player.resume()?;
        inner.state = PlaybackState::Playing;
        Ok(())
    }

    /// Vacía la cola, termina el recurso actual, libera la conexión y saca
    /// la sesión del registro. Válido desde cualquier estado.
    pub async fn stop(self: &Arc<Self>) {
        let mut inner = self.inner.lock().await;
        inner.queue.clear();
        self.release_locked(&mut inner).await;
        drop(inner);
        self.discard();
        info!("⏹️ Sesión detenida en guild {}", self.guild_id);
    }

    /// Surte efecto a partir de la próxima señal de fin, nunca retroactivo.
    pub async fn set_loop_mode(&self, mode: LoopMode) {
        let mut inner = self.inner.lock().await;
        inner.loop_mode = mode;
        info!("🔁 Modo de repetición {} en guild {}", mode, self.guild_id);
    }

    pub async fn queue_view(&self) -> QueueView {
        let inner = self.inner.lock().await;
        QueueView {
            songs: inner.queue.snapshot(),
            state: inner.state,
            loop_mode: inner.loop_mode,
        }
    }

    /// El motor entrega aquí el player de un recurso que arrancó bien. Si la
    /// sesión ya superó esa generación (skip/stop en la ventana de apertura),
    /// el recurso obsoleto se detiene con su propio handle.
    pub(crate) async fn on_playback_started(
        &self,
        generation: u64,
        player: Arc<dyn PlayerHandle>,
    ) {
        let mut inner = self.inner.lock().await;
        match &inner.current {
            Some(active) if active.generation == generation => {
                inner.player = Some(player);
            }
            _ => {
                debug!("Recurso obsoleto (gen {}) detenido en guild {}", generation, self.guild_id);
                player.stop();
            }
        }
    }

    /// La transición central: aplica la política de repetición a la cabeza y
    /// arranca la siguiente o libera la conexión. Señales con generación
    /// distinta de la activa son duplicados o huérfanas y se ignoran:
    /// exactamente una transición por recurso.
    pub async fn on_playback_finished(self: &Arc<Self>, generation: u64, outcome: PlaybackOutcome) {
        let mut inner = self.inner.lock().await;
        let Some(active) = &inner.current else {
            debug!("Señal de fin sin recurso activo en guild {}", self.guild_id);
            return;
        };
        if active.generation != generation {
            debug!(
                "Señal de fin obsoleta (gen {} ≠ {}) en guild {}",
                generation, active.generation, self.guild_id
            );
            return;
        }
        inner.current = None;
        inner.player = None;

        if let PlaybackOutcome::Failed(reason) = &outcome {
            let title = inner
                .queue
                .head()
                .map(|s| s.title.clone())
                .unwrap_or_default();
            warn!("⚠️ Falló la reproducción de '{}' en guild {}: {}", title, self.guild_id, reason);
            self.notifier
                .notify(
                    inner.announce_channel,
                    format!("⚠️ No se pudo reproducir **{title}**: {reason}. Saltando."),
                )
                .await;
        }

        self.advance_locked(&mut inner).await;
    }

    // Métodos privados — todos asumen el lock interno tomado.

    async fn advance_locked(self: &Arc<Self>, inner: &mut SessionInner) {
        let mode = inner.loop_mode;
        inner.queue.advance(mode);

        if inner.queue.head().is_some() {
            self.start_head(inner).await;
        } else {
            self.release_locked(inner).await;
            self.discard();
        }
    }

    async fn start_head(self: &Arc<Self>, inner: &mut SessionInner) {
        let Some(head) = inner.queue.head().cloned() else {
            return;
        };
        let Some(conn) = inner.connection.clone() else {
            return;
        };

        let generation = inner.next_generation;
        inner.next_generation += 1;
        let cancel = CancellationToken::new();
        inner.current = Some(ActiveTrack {
            generation,
            cancel: cancel.clone(),
        });
        inner.state = PlaybackState::Playing;

        info!("🎵 Reproduciendo '{}' en guild {}", head.title, self.guild_id);
        self.notifier
            .notify(
                inner.announce_channel,
                format!("🎵 Reproduciendo: **{}**", head.title),
            )
            .await;

        self.engine.start(self.clone(), conn, head, generation, cancel);
    }

    /// Libera player y conexión en todo camino que vacía la cola o detiene
    /// la reproducción, incluidos los de error.
    async fn release_locked(&self, inner: &mut SessionInner) {
        if let Some(active) = inner.current.take() {
            active.cancel.cancel();
        }
        if let Some(player) = inner.player.take() {
            player.stop();
        }
        if let Some(conn) = inner.connection.take() {
            conn.disconnect().await;
            info!("👋 Conexión de voz liberada en guild {}", self.guild_id);
        }
        inner.state = PlaybackState::Idle;
    }

    fn discard(self: &Arc<Self>) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_if(self.guild_id, self);
        }
    }

    #[cfg(test)]
    pub(crate) async fn player_ready(&self) -> bool {
        self.inner.lock().await.player.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::audio::transport::testing::{MockConnection, MockNotifier, MockTransport};

    const STREAM_TIMEOUT: Duration = Duration::from_millis(100);

    struct Fixture {
        registry: Arc<SessionRegistry>,
        conn: Arc<MockConnection>,
        notifier: Arc<MockNotifier>,
    }

    fn fixture() -> Fixture {
        let conn = Arc::new(MockConnection::default());
        let notifier = Arc::new(MockNotifier::default());
        let registry = SessionRegistry::new(
            Arc::new(MockTransport::new(conn.clone())),
            Arc::new(PlaybackEngine::new(STREAM_TIMEOUT)),
            notifier.clone(),
        );
        Fixture {
            registry,
            conn,
            notifier,
        }
    }

    fn failing_fixture() -> Fixture {
        let conn = Arc::new(MockConnection::default());
        let notifier = Arc::new(MockNotifier::default());
        let registry = SessionRegistry::new(
            Arc::new(MockTransport::failing()),
            Arc::new(PlaybackEngine::new(STREAM_TIMEOUT)),
            notifier.clone(),
        );
        Fixture {
            registry,
            conn,
            notifier,
        }
    }

    fn guild() -> GuildId {
        GuildId::new(7)
    }

    fn channel() -> ChannelId {
        ChannelId::new(42)
    }

    fn song(title: &str) -> Song {
        Song::new(title, format!("https://example.com/{title}"))
    }

    async fn playing_session(fx: &Fixture, titles: &[&str]) -> Arc<GuildSession> {
        let session = fx.registry.get_or_create(guild());
        for t in titles {
            session
                .enqueue(song(t), channel(), channel())
                .await
                .unwrap();
        }
        fx.conn.wait_for_plays(1).await;
        session
    }

    async fn wait_player_ready(session: &Arc<GuildSession>) {
        for _ in 0..400 {
            if session.player_ready().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("el player nunca llegó a la sesión");
    }

    async fn finish(fx: &Fixture, idx: usize) {
        let callback = fx.conn.take_callback(idx);
        callback(PlaybackOutcome::Finished).await;
    }

    #[tokio::test]
    async fn test_enqueue_starts_playback_on_idle() {
        let fx = fixture();
        let session = playing_session(&fx, &["A", "B"]).await;

        let view = session.queue_view().await;
        assert_eq!(view.state, PlaybackState::Playing);
        assert_eq!(
            view.songs.iter().map(|s| &s.title).collect::<Vec<_>>(),
            vec!["A", "B"]
        );
        assert_eq!(fx.conn.connects.load(Ordering::SeqCst), 1);
        assert_eq!(fx.conn.played_titles(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_loop_off_advances_and_reclaims_session() {
        let fx = fixture();
        let session = playing_session(&fx, &["A", "B"]).await;

        finish(&fx, 0).await;
        fx.conn.wait_for_plays(2).await;
        assert_eq!(fx.conn.played_titles(), vec!["A", "B"]);
        assert_eq!(session.queue_view().await.songs.len(), 1);

        finish(&fx, 1).await;
        let view = session.queue_view().await;
        assert_eq!(view.state, PlaybackState::Idle);
        assert!(view.songs.is_empty());
        assert_eq!(fx.conn.disconnects.load(Ordering::SeqCst), 1);
        assert!(fx.registry.get(guild()).is_none(), "la sesión vacía debe reclamarse");
    }

    #[tokio::test]
    async fn test_loop_all_rotates_full_cycle() {
        let fx = fixture();
        let session = playing_session(&fx, &["A", "B"]).await;
        session.set_loop_mode(LoopMode::All).await;

        finish(&fx, 0).await;
        fx.conn.wait_for_plays(2).await;
        let view = session.queue_view().await;
        assert_eq!(
            view.songs.iter().map(|s| &s.title).collect::<Vec<_>>(),
            vec!["B", "A"]
        );

        finish(&fx, 1).await;
        fx.conn.wait_for_plays(3).await;
        let view = session.queue_view().await;
        assert_eq!(
            view.songs.iter().map(|s| &s.title).collect::<Vec<_>>(),
            vec!["A", "B"],
            "tras N finalizaciones la cola vuelve al orden original"
        );
        assert_eq!(fx.conn.played_titles(), vec!["A", "B", "A"]);
    }

    #[tokio::test]
    async fn test_loop_single_replays_head() {
        let fx = fixture();
        let session = playing_session(&fx, &["A", "B"]).await;
        session.set_loop_mode(LoopMode::Single).await;

        finish(&fx, 0).await;
        fx.conn.wait_for_plays(2).await;
        let view = session.queue_view().await;
        assert_eq!(
            view.songs.iter().map(|s| &s.title).collect::<Vec<_>>(),
            vec!["A", "B"]
        );
        assert_eq!(fx.conn.played_titles(), vec!["A", "A"]);
    }

    #[tokio::test]
    async fn test_skip_then_late_completion_advances_once() {
        let fx = fixture();
        let session = playing_session(&fx, &["A", "B"]).await;
        wait_player_ready(&session).await;

        let stale = fx.conn.take_callback(0);
        let skipped = session.skip().await.unwrap();
        assert_eq!(skipped.title, "A");
        fx.conn.wait_for_plays(2).await;
        assert!(fx.conn.player(0).stopped.load(Ordering::SeqCst));

        // la señal de fin natural del recurso ya saltado llega tarde:
        // no debe provocar un segundo avance
        stale(PlaybackOutcome::Finished).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let view = session.queue_view().await;
        assert_eq!(
            view.songs.iter().map(|s| &s.title).collect::<Vec<_>>(),
            vec!["B"]
        );
        assert_eq!(fx.conn.played_titles(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_duplicate_completion_is_ignored() {
        let fx = fixture();
        let session = playing_session(&fx, &["A", "B"]).await;

        finish(&fx, 0).await;
        fx.conn.wait_for_plays(2).await;

        // entrega duplicada de la misma generación
        session
            .on_playback_finished(0, PlaybackOutcome::Finished)
            .await;

        let view = session.queue_view().await;
        assert_eq!(
            view.songs.iter().map(|s| &s.title).collect::<Vec<_>>(),
            vec!["B"],
            "un duplicado no debe avanzar la cola dos veces"
        );
    }

    #[tokio::test]
    async fn test_connection_failure_discards_session() {
        let fx = failing_fixture();
        let session = fx.registry.get_or_create(guild());

        let err = session.enqueue(song("A"), channel(), channel()).await;
        assert!(matches!(err, Err(MusicError::ConnectionFailed)));
        assert!(fx.registry.get(guild()).is_none());
        assert_eq!(session.queue_view().await.state, PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_stream_failure_reports_once_and_advances() {
        let fx = fixture();
        fx.conn.fail_next.store(1, Ordering::SeqCst);

        let session = fx.registry.get_or_create(guild());
        session
            .enqueue_all(vec![song("A"), song("B")], channel(), channel())
            .await
            .unwrap();

        // A falla al abrir, B debe sonar sin que la sesión muera
        fx.conn.wait_for_plays(1).await;
        assert_eq!(fx.conn.played_titles(), vec!["B"]);
        assert!(fx.registry.get(guild()).is_some());

        let failures: Vec<_> = fx
            .notifier
            .messages
            .lock()
            .iter()
            .filter(|m| m.contains("No se pudo reproducir"))
            .cloned()
            .collect();
        assert_eq!(failures.len(), 1, "el fallo se reporta exactamente una vez");
    }

    #[tokio::test]
    async fn test_stream_open_timeout_advances() {
        let fx = fixture();
        fx.conn.hang_next.store(1, Ordering::SeqCst);

        let session = fx.registry.get_or_create(guild());
        session
            .enqueue_all(vec![song("A"), song("B")], channel(), channel())
            .await
            .unwrap();

        // la apertura de A se cuelga; el timeout la trata como fallo de
        // resolución y avanza a B
        fx.conn.wait_for_plays(1).await;
        assert_eq!(fx.conn.played_titles(), vec!["B"]);
        assert!(fx
            .notifier
            .messages
            .lock()
            .iter()
            .any(|m| m.contains("No se pudo reproducir")));
    }

    #[tokio::test]
    async fn test_skip_cancels_inflight_open() {
        let fx = fixture();
        fx.conn.hang_next.store(1, Ordering::SeqCst);

        let session = fx.registry.get_or_create(guild());
        session
            .enqueue_all(vec![song("A"), song("B")], channel(), channel())
            .await
            .unwrap();
        fx.conn.wait_for_attempts(1).await;

        // skip mientras A sigue resolviendo: cancela la apertura en vuelo
        let skipped = session.skip().await.unwrap();
        assert_eq!(skipped.title, "A");
        fx.conn.wait_for_plays(1).await;
        assert_eq!(fx.conn.played_titles(), vec!["B"]);

        // pasada la ventana del timeout no aparece ningún fallo fantasma
        tokio::time::sleep(STREAM_TIMEOUT + Duration::from_millis(50)).await;
        assert!(!fx
            .notifier
            .messages
            .lock()
            .iter()
            .any(|m| m.contains("No se pudo reproducir")));
        assert_eq!(
            session
                .queue_view()
                .await
                .songs
                .iter()
                .map(|s| &s.title)
                .collect::<Vec<_>>(),
            vec!["B"]
        );
    }

    #[tokio::test]
    async fn test_pause_resume_legality() {
        let fx = fixture();
        let session = fx.registry.get_or_create(guild());

        assert!(matches!(session.pause().await, Err(MusicError::NotConnected)));
        assert!(matches!(session.resume().await, Err(MusicError::NotConnected)));

        session.enqueue(song("A"), channel(), channel()).await.unwrap();
        fx.conn.wait_for_plays(1).await;
        wait_player_ready(&session).await;

        session.pause().await.unwrap();
        assert_eq!(session.queue_view().await.state, PlaybackState::Paused);
        assert!(fx.conn.player(0).paused.load(Ordering::SeqCst));
        assert!(matches!(session.pause().await, Err(MusicError::NotConnected)));

        session.resume().await.unwrap();
        assert_eq!(session.queue_view().await.state, PlaybackState::Playing);
        assert!(matches!(session.resume().await, Err(MusicError::NotConnected)));
    }

    #[tokio::test]
    async fn test_stop_from_any_state_resets_everything() {
        let fx = fixture();
        let session = playing_session(&fx, &["A", "B", "C"]).await;
        wait_player_ready(&session).await;

        session.stop().await;

        let view = session.queue_view().await;
        assert_eq!(view.state, PlaybackState::Idle);
        assert!(view.songs.is_empty());
        assert!(fx.conn.player(0).stopped.load(Ordering::SeqCst));
        assert_eq!(fx.conn.disconnects.load(Ordering::SeqCst), 1);
        assert!(fx.registry.get(guild()).is_none());
    }

    #[tokio::test]
    async fn test_skip_on_idle_session_fails() {
        let fx = fixture();
        let session = fx.registry.get_or_create(guild());
        assert!(matches!(session.skip().await, Err(MusicError::NotConnected)));
    }

    #[tokio::test]
    async fn test_loop_mode_applies_at_next_completion() {
        let fx = fixture();
        let session = playing_session(&fx, &["A", "B"]).await;

        // cambiar el modo con A sonando no toca la cola
        session.set_loop_mode(LoopMode::All).await;
        assert_eq!(session.queue_view().await.songs.len(), 2);

        finish(&fx, 0).await;
        fx.conn.wait_for_plays(2).await;
        assert_eq!(
            session
                .queue_view()
                .await
                .songs
                .iter()
                .map(|s| &s.title)
                .collect::<Vec<_>>(),
            vec!["B", "A"]
        );
    }

    #[tokio::test]
    async fn test_enqueue_all_loads_playlist_in_order() {
        let fx = fixture();
        let session = fx.registry.get_or_create(guild());

        let added = session
            .enqueue_all(vec![song("A"), song("B")], channel(), channel())
            .await
            .unwrap();
        assert_eq!(added, 2);

        fx.conn.wait_for_plays(1).await;
        assert_eq!(fx.conn.played_titles(), vec!["A"]);
        assert_eq!(
            session
                .queue_view()
                .await
                .songs
                .iter()
                .map(|s| &s.title)
                .collect::<Vec<_>>(),
            vec!["A", "B"]
        );
    }
}
