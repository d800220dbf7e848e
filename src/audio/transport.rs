use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::input::Compose;
use songbird::input::YoutubeDl;
use songbird::tracks::TrackHandle;
use songbird::{Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent};
use tracing::{debug, error};

use crate::error::MusicError;
use crate::sources::Song;

/// Resultado final de un recurso reproducido: terminó solo o el stream murió.
#[derive(Debug, Clone)]
pub enum PlaybackOutcome {
    Finished,
    Failed(String),
}

/// Se invoca exactamente una vez cuando el recurso termina o falla.
pub type TrackEndCallback =
    Box<dyn FnOnce(PlaybackOutcome) -> BoxFuture<'static, ()> + Send + 'static>;

/// Subsistema de voz visto desde el núcleo: solo sabe unirse a un canal.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, MusicError>;
}

/// Una conexión de voz viva. Propiedad exclusiva de una sesión.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Abre el stream detrás de `song.source` y arranca la reproducción.
    /// `on_end` se dispara exactamente una vez por recurso.
    async fn play(
        &self,
        song: &Song,
        on_end: TrackEndCallback,
    ) -> Result<Arc<dyn PlayerHandle>, MusicError>;

    /// Abandona el canal de voz y libera el player.
    async fn disconnect(&self);
}

/// Control sobre el recurso actualmente en reproducción.
pub trait PlayerHandle: Send + Sync {
    fn pause(&self) -> Result<(), MusicError>;
    fn resume(&self) -> Result<(), MusicError>;
    fn stop(&self);
}

// ─── Adaptador songbird ───

/// Transporte real respaldado por songbird.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, MusicError> {
        let call = self.manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al conectar al canal de voz en guild {}: {:?}", guild_id, e);
            MusicError::ConnectionFailed
        })?;

        Ok(Arc::new(SongbirdConnection {
            manager: self.manager.clone(),
            guild_id,
            call,
            http: self.http.clone(),
        }))
    }
}

struct SongbirdConnection {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn play(
        &self,
        song: &Song,
        on_end: TrackEndCallback,
    ) -> Result<Arc<dyn PlayerHandle>, MusicError> {
        let mut source = YoutubeDl::new(self.http.clone(), song.source.clone());

        // Sonda temprana: fuerza la resolución aquí para que una fuente rota
        // se reporte como fallo de este recurso en vez de colgar el player.
        source
            .aux_metadata()
            .await
            .map_err(|e| MusicError::StreamFailed(e.to_string()))?;

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(source.into())
        };

        // Un único callback compartido entre End y Error: el primero que
        // llegue lo consume, el otro encuentra el slot vacío.
        let slot = Arc::new(SyncMutex::new(Some(on_end)));
        let registered = handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    slot: slot.clone(),
                    errored: false,
                },
            )
            .and_then(|_| {
                handle.add_event(
                    Event::Track(TrackEvent::Error),
                    TrackEndNotifier {
                        slot,
                        errored: true,
                    },
                )
            });

        if let Err(e) = registered {
            let _ = handle.stop();
            return Err(MusicError::StreamFailed(format!(
                "no se pudo registrar el fin de pista: {e}"
            )));
        }

        Ok(Arc::new(SongbirdPlayer { handle }))
    }

    async fn disconnect(&self) {
        if let Err(e) = self.manager.remove(self.guild_id).await {
            debug!("La conexión de voz ya estaba cerrada en guild {}: {:?}", self.guild_id, e);
        }
    }
}

struct SongbirdPlayer {
    handle: TrackHandle,
}

impl PlayerHandle for SongbirdPlayer {
    fn pause(&self) -> Result<(), MusicError> {
        self.handle.pause().map_err(|_| MusicError::NotConnected)
    }

    fn resume(&self) -> Result<(), MusicError> {
        self.handle.play().map_err(|_| MusicError::NotConnected)
    }

    fn stop(&self) {
        let _ = self.handle.stop();
    }
}

/// Notificador de fin de pista. songbird puede emitir End y Error para el
/// mismo recurso; el slot compartido garantiza una sola entrega.
struct TrackEndNotifier {
    slot: Arc<SyncMutex<Option<TrackEndCallback>>>,
    errored: bool,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if self.errored {
            if let EventContext::Track(track_list) = ctx {
                for (state, _handle) in *track_list {
                    debug!("❌ Pista terminó con error: {:?}", state.playing);
                }
            }
        }

        let callback = self.slot.lock().take();
        if let Some(callback) = callback {
            let outcome = if self.errored {
                PlaybackOutcome::Failed("el stream terminó con error".into())
            } else {
                PlaybackOutcome::Finished
            };
            callback(outcome).await;
        }

        None
    }
}

// ─── Dobles de prueba compartidos por los tests del núcleo ───
